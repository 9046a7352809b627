// src/record.rs
//! Record types flowing through the pipeline: raw extraction output,
//! canonical proposal rows, and the dedup identity derived from them.

use std::collections::BTreeSet;

/// Which crawler produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Education-NGO site crawler (project listings + detail pages).
    Asha,
    /// USAID public repositories (catalog API + HTML catalogs).
    Usaid,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Asha => "asha",
            Source::Usaid => "usaid",
        }
    }

    /// File name of the per-run CSV artifact for this source.
    pub fn artifact_file_name(&self) -> &'static str {
        match self {
            Source::Asha => "proposals.csv",
            Source::Usaid => "usaid_proposals.csv",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Proposal,
    Report,
    Dataset,
    Evaluation,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Proposal => "proposal",
            DocumentType::Report => "report",
            DocumentType::Dataset => "dataset",
            DocumentType::Evaluation => "evaluation",
            DocumentType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency attribution of a raw amount, before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyHint {
    Usd,
    /// The run's configured local currency (INR for the site crawler).
    Local,
    /// No marker found; treated as USD downstream.
    Unknown,
}

/// An amount as the extractor saw it: either a native numeric field or a
/// noisy text amount still carrying separators and symbols.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAmount {
    Numeric { value: f64, currency: CurrencyHint },
    Text { text: String, currency: CurrencyHint },
}

/// Transient extraction output. Created by a page extractor, consumed by the
/// normalizer, discarded after. Absent fields stay `None` — never placeholder
/// text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub source: Source,
    /// Page the candidate was extracted from.
    pub source_url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub organization: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub chapter: Option<String>,
    pub amount: Option<RawAmount>,
    pub date_text: Option<String>,
    pub duration_text: Option<String>,
    /// Year already resolved by the extractor (e.g. from card metadata).
    pub year: Option<i32>,
    pub document_type: Option<DocumentType>,
    /// Repository metadata timestamps, kept verbatim.
    pub created: Option<String>,
    pub updated: Option<String>,
    /// Source-specific audit text assembled by the extractor.
    pub notes: Option<String>,
}

impl RawCandidate {
    pub fn new(source: Source, source_url: impl Into<String>) -> Self {
        Self {
            source,
            source_url: source_url.into(),
            title: None,
            link: None,
            organization: None,
            location: None,
            status: None,
            description: None,
            chapter: None,
            amount: None,
            date_text: None,
            duration_text: None,
            year: None,
            document_type: None,
            created: None,
            updated: None,
            notes: None,
        }
    }

    /// True when the candidate carries nothing to identify it by.
    pub fn is_blank(&self) -> bool {
        self.title.as_deref().map_or(true, |t| t.trim().is_empty())
            && self.link.as_deref().map_or(true, |l| l.trim().is_empty())
    }
}

/// Audit copy of the pre-conversion amount.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OriginalAmount {
    pub value: f64,
    /// ISO-ish currency code, e.g. "USD", "INR".
    pub currency: String,
}

/// Canonical output row.
///
/// `amount_requested_usd` is whole-unit USD; `None` means "no parsable
/// budget", which is distinct from zero and is never rejected by the budget
/// band. `link` plus `source` identify a proposal within one run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProposalRecord {
    pub source: Source,
    pub title: String,
    pub organization: Option<String>,
    pub geography: Option<String>,
    pub themes: BTreeSet<String>,
    pub amount_requested_usd: Option<f64>,
    pub amount_original: Option<OriginalAmount>,
    pub duration_months: Option<u32>,
    pub document_type: DocumentType,
    pub link: Option<String>,
    pub year: Option<i32>,
    pub chapter_or_funder: Option<String>,
    pub notes: Option<String>,
}

impl ProposalRecord {
    /// Identity within one crawl run: (source, link) when a non-empty link
    /// exists, otherwise (source, lowercased trimmed title).
    pub fn dedup_key(&self) -> DedupKey {
        match self.link.as_deref() {
            Some(link) if !link.trim().is_empty() => {
                DedupKey::Link(self.source, link.trim().to_string())
            }
            _ => DedupKey::Title(self.source, self.title.trim().to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Link(Source, String),
    Title(Source, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(link: Option<&str>, title: &str) -> ProposalRecord {
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
    fn dedup_key_prefers_link() {
        let r = record(Some("https://example.org/p/1"), "Project One");
        assert_eq!(
            r.dedup_key(),
            DedupKey::Link(Source::Asha, "https://example.org/p/1".to_string())
        );
    }

    #[test]
    fn dedup_key_falls_back_to_lowercased_title() {
        let r = record(None, "  Project One  ");
        assert_eq!(
            r.dedup_key(),
            DedupKey::Title(Source::Asha, "project one".to_string())
        );
        let empty_link = record(Some("   "), "Project One");
        assert_eq!(empty_link.dedup_key(), r.dedup_key());
    }

    #[test]
    fn blank_candidate_detection() {
        let mut c = RawCandidate::new(Source::Usaid, "https://example.org");
        assert!(c.is_blank());
        c.title = Some("  ".to_string());
        assert!(c.is_blank());
        c.link = Some("https://example.org/d/x".to_string());
        assert!(!c.is_blank());
    }
}
