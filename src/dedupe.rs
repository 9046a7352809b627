// src/dedupe.rs
//! Order-preserving dedup across pages and overlapping search terms.
//! First occurrence wins; later duplicates are dropped without error.

use std::collections::HashSet;

use crate::record::{DedupKey, ProposalRecord};

/// Returns the retained rows in first-seen order plus the dropped count.
pub fn dedupe(rows: Vec<ProposalRecord>) -> (Vec<ProposalRecord>, usize) {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(rows.len());
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        if seen.insert(row.dedup_key()) {
            kept.push(row);
        } else {
            dropped += 1;
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentType, Source};
    use std::collections::BTreeSet;

    fn record(title: &str, link: Option<&str>) -> ProposalRecord {
        ProposalRecord {
            source: Source::Asha,
            title: title.to_string(),
            organization: None,
            geography: None,
            themes: BTreeSet::new(),
            amount_requested_usd: None,
            amount_original: None,
            duration_months: None,
            document_type: DocumentType::Unknown,
            link: link.map(String::from),
            year: None,
            chapter_or_funder: None,
            notes: None,
        }
    }

    #[test]
    fn first_seen_order_is_preserved() {
        let rows = vec![
            record("A", Some("x")),
            record("B", Some("y")),
            record("C", Some("x")),
        ];
        let (kept, dropped) = dedupe(rows);
        let titles: Vec<&str> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let rows = vec![
            record("A", Some("x")),
            record("B", None),
            record("b", None),
            record("C", Some("x")),
        ];
        let (once, dropped_once) = dedupe(rows);
        assert_eq!(dropped_once, 2);
        let (twice, dropped_twice) = dedupe(once.clone());
        assert_eq!(dropped_twice, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn title_fallback_only_without_link() {
        // Same title, different links: distinct records.
        let rows = vec![
            record("Same title", Some("x")),
            record("Same title", Some("y")),
            record("Same title", None),
            record("  same TITLE ", None),
        ];
        let (kept, dropped) = dedupe(rows);
        assert_eq!(kept.len(), 3);
        assert_eq!(dropped, 1);
    }
}
