// src/extract/mod.rs
//! Per-source extraction strategies behind one seam. Each strategy owns its
//! mini-traversal (follow-up pages, probes) but draws every fetch from the
//! shared page budget, so `max_pages` bounds the whole run.

pub mod repo;
pub mod site;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;

use crate::fetch::Fetcher;
use crate::normalize::clean_text;
use crate::record::{RawCandidate, Source};

/// Shared fetch-operation budget. Every attempted fetch takes one slot,
/// successful or not.
#[derive(Debug)]
pub struct PageBudget {
    limit: u32,
    used: u32,
}

impl PageBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Claim one fetch slot; false once the budget is spent.
    pub fn try_take(&mut self) -> bool {
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.limit
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

/// Accumulates raw candidates and per-run counters across seeds.
#[derive(Debug, Default)]
pub struct HarvestSink {
    pub candidates: Vec<RawCandidate>,
    pub pages_fetched: u32,
    pub fetch_errors: u32,
    pub skipped_items: u32,
}

/// One implementation per source. Harvest visits a seed (and whatever it
/// links to, budget permitting) and pushes raw candidates into the sink.
/// Item and page failures stay inside: they are counted, never propagated.
#[async_trait::async_trait]
pub trait SourceExtractor: Send + Sync {
    fn source(&self) -> Source;

    async fn harvest(
        &self,
        seed: &str,
        fetcher: &Fetcher,
        budget: &mut PageBudget,
        cancel: &CancellationToken,
        sink: &mut HarvestSink,
    );
}

/* ---------------- shared label vocabulary ---------------- */

/// Field meaning of a label cell or column header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldLabel {
    Title,
    Organization,
    Location,
    Status,
    Amount,
    Date,
    Chapter,
    Duration,
}

/// Map a label/header text onto a field through the synonym vocabulary,
/// case-insensitively. "amount" beats "date" so that "last funding amount"
/// and "last funding date" land on different fields.
pub(crate) fn match_label(s: &str) -> Option<FieldLabel> {
    let k = s.trim().to_lowercase();
    if k.is_empty() {
        return None;
    }
    if k.contains("organization") || k.contains("organisation") || k.contains("ngo") {
        Some(FieldLabel::Organization)
    } else if k.contains("location") || k.contains("state") || k.contains("city") || k.contains("district") {
        Some(FieldLabel::Location)
    } else if k.contains("status") {
        Some(FieldLabel::Status)
    } else if k.contains("chapter") || k.contains("steward") {
        Some(FieldLabel::Chapter)
    } else if k.contains("duration") {
        Some(FieldLabel::Duration)
    } else if k.contains("amount") {
        Some(FieldLabel::Amount)
    } else if k.contains("date") || k.contains("posted") || k.contains("updated") {
        Some(FieldLabel::Date)
    } else if k.contains("funding") || k.contains("budget") || k.contains("cost") {
        Some(FieldLabel::Amount)
    } else if k.contains("project") || k.contains("title") || k.contains("name") {
        Some(FieldLabel::Title)
    } else {
        None
    }
}

/* ---------------- shared DOM helpers ---------------- */

static SEL_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));

/// Whitespace-collapsed text content of one element; empty when blank.
pub(crate) fn element_text(el: &ElementRef) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    clean_text(&joined).unwrap_or_default()
}

/// First `take` paragraphs longer than `min_len` characters, joined.
pub(crate) fn first_long_paragraphs(doc: &Html, min_len: usize, take: usize) -> Option<String> {
    let mut parts = Vec::new();
    for p in doc.select(&SEL_P) {
        let text = element_text(&p);
        if text.len() > min_len {
            parts.push(text);
            if parts.len() == take {
                break;
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Resolve `href` against the page URL; `None` for unparseable links.
pub(crate) fn absolutize(base: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Suffix match of the URL host against the allow list, `www.` stripped.
/// An empty list allows everything.
pub(crate) fn host_allowed(raw_url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    allowed.iter().any(|d| {
        let d = d.trim().to_lowercase();
        !d.is_empty() && host.ends_with(&d)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_synonyms_map_case_insensitively() {
        assert_eq!(match_label("Organization / NGO"), Some(FieldLabel::Organization));
        assert_eq!(match_label("STATE"), Some(FieldLabel::Location));
        assert_eq!(match_label("Amount Requested"), Some(FieldLabel::Amount));
        assert_eq!(match_label("Funding"), Some(FieldLabel::Amount));
        assert_eq!(match_label("Steward Chapter"), Some(FieldLabel::Chapter));
        assert_eq!(match_label("Project Name"), Some(FieldLabel::Title));
        assert_eq!(match_label("Duration (months)"), Some(FieldLabel::Duration));
        assert_eq!(match_label("frobnication"), None);
        assert_eq!(match_label("   "), None);
    }

    #[test]
    fn funding_date_is_a_date_not_an_amount() {
        assert_eq!(match_label("Last Funding Date"), Some(FieldLabel::Date));
        assert_eq!(match_label("Last Funding Amount"), Some(FieldLabel::Amount));
    }

    #[test]
    fn host_allow_list_is_suffix_matched() {
        let allowed = vec!["ashanet.org".to_string()];
        assert!(host_allowed("https://www.ashanet.org/projects-list/", &allowed));
        assert!(host_allowed("https://documents.ashanet.org/x.pdf", &allowed));
        assert!(!host_allowed("https://evil.example.com/ashanet.org", &allowed));
        assert!(!host_allowed("not a url", &allowed));
        assert!(host_allowed("https://anything.example/", &[]));
    }

    #[test]
    fn absolutize_joins_relative_links() {
        assert_eq!(
            absolutize("https://ashanet.org/projects-list/", "/project/?pid=12"),
            Some("https://ashanet.org/project/?pid=12".to_string())
        );
        assert_eq!(absolutize("not a url", "/x"), None);
    }

    #[test]
    fn budget_is_consumed_per_attempt() {
        let mut b = PageBudget::new(2);
        assert!(b.try_take());
        assert!(b.try_take());
        assert!(!b.try_take());
        assert!(b.exhausted());
        assert_eq!(b.used(), 2);
    }
}
