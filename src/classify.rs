// src/classify.rs
//! Theme tagging and budget-band filtering. Keyword sets come exclusively
//! from the run config; there is no ambient keyword state.

use std::collections::BTreeSet;

use crate::config::{BudgetBand, ThemeSet};
use crate::normalize::NormalizedCandidate;
use crate::record::ProposalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No theme matched while the run requires one.
    Theme,
    /// Parsed budget fell outside the inclusive band.
    Budget,
}

#[derive(Debug)]
pub enum FilterOutcome {
    Kept(ProposalRecord),
    Rejected(RejectReason),
}

/// Tag every theme whose keyword set scores at least `min_hits` distinct
/// case-insensitive substring matches against the text.
pub fn theme_tags(text: &str, themes: &[ThemeSet]) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut tags = BTreeSet::new();
    for theme in themes {
        let hits = theme
            .keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count();
        if hits >= theme.min_hits.max(1) {
            tags.insert(theme.name.clone());
        }
    }
    tags
}

/// Decide whether a normalized candidate is retained. A record with null
/// budget passes the band check by policy: an unpriceable proposal is not
/// treated as out-of-range.
pub fn classify_and_filter(
    candidate: NormalizedCandidate,
    themes: &[ThemeSet],
    band: &BudgetBand,
    require_theme: bool,
) -> FilterOutcome {
    let NormalizedCandidate { mut record, text } = candidate;
    record.themes = theme_tags(&text, themes);

    if require_theme && record.themes.is_empty() {
        return FilterOutcome::Rejected(RejectReason::Theme);
    }
    if let Some(amount) = record.amount_requested_usd {
        if !band.contains(amount) {
            return FilterOutcome::Rejected(RejectReason::Budget);
        }
    }
    FilterOutcome::Kept(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentType, RawCandidate, Source};

    fn themes() -> Vec<ThemeSet> {
        vec![
            ThemeSet {
                name: "education".to_string(),
                keywords: vec!["school".to_string(), "teacher".to_string()],
                min_hits: 1,
            },
            ThemeSet {
                name: "youth".to_string(),
                keywords: vec!["youth".to_string(), "children".to_string()],
                min_hits: 2,
            },
        ]
    }

    fn band() -> BudgetBand {
        BudgetBand {
            min_usd: 30_000.0,
            max_usd: 50_000.0,
        }
    }

    fn candidate(text: &str, amount: Option<f64>) -> NormalizedCandidate {
        let mut raw = RawCandidate::new(Source::Asha, "https://ashanet.org/projects-list/");
        raw.title = Some(text.to_string());
        let mut nc =
            crate::normalize::normalize(raw, &crate::config::ExchangeRate {
                currency: "INR".to_string(),
                units_per_usd: 83.0,
            })
            .unwrap();
        nc.record.amount_requested_usd = amount;
        nc
    }

    #[test]
    fn tagging_is_case_insensitive_substring() {
        let tags = theme_tags("New SCHOOL building for teachers", &themes());
        assert!(tags.contains("education"));
        assert!(!tags.contains("youth"));
    }

    #[test]
    fn min_hits_counts_distinct_keywords() {
        let one_hit = theme_tags("youth club", &themes());
        assert!(one_hit.is_empty());
        let two_hits = theme_tags("youth club for children", &themes());
        assert!(two_hits.contains("youth"));
    }

    #[test]
    fn zero_theme_record_rejected_only_when_required() {
        let c = candidate("bridge repair works", Some(35_000.0));
        match classify_and_filter(c, &themes(), &band(), true) {
            FilterOutcome::Rejected(RejectReason::Theme) => {}
            other => panic!("expected theme rejection, got {other:?}"),
        }
        let c = candidate("bridge repair works", Some(35_000.0));
        match classify_and_filter(c, &themes(), &band(), false) {
            FilterOutcome::Kept(r) => assert!(r.themes.is_empty()),
            other => panic!("expected keep, got {other:?}"),
        }
    }

    #[test]
    fn band_rejects_outside_and_keeps_inclusive_edges() {
        for (amount, kept) in [
            (29_999.0, false),
            (30_000.0, true),
            (50_000.0, true),
            (50_001.0, false),
        ] {
            let c = candidate("school roof", Some(amount));
            let outcome = classify_and_filter(c, &themes(), &band(), false);
            match (kept, outcome) {
                (true, FilterOutcome::Kept(_)) => {}
                (false, FilterOutcome::Rejected(RejectReason::Budget)) => {}
                (k, o) => panic!("amount {amount}: expected kept={k}, got {o:?}"),
            }
        }
    }

    // Stated policy: a record the normalizer could not price is never
    // excluded by the budget band.
    #[test]
    fn null_budget_is_retained_regardless_of_band() {
        let c = candidate("school without a budget table", None);
        match classify_and_filter(c, &themes(), &band(), false) {
            FilterOutcome::Kept(r) => {
                assert_eq!(r.amount_requested_usd, None);
                assert_eq!(r.document_type, DocumentType::Unknown);
            }
            other => panic!("expected keep, got {other:?}"),
        }
    }
}
