// src/extract/site.rs
//! Site-crawler extraction: paginated project listing tables, individual
//! project detail pages, and linked proposal/report documents, traversed
//! breadth-first under the shared page budget.

use std::collections::{HashSet, VecDeque};

use metrics::counter;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::fetch::Fetcher;
use crate::normalize::{clean_text, detect_currency_hint};
use crate::record::{CurrencyHint, RawAmount, RawCandidate, Source};

use super::{
    absolutize, element_text, first_long_paragraphs, host_allowed, match_label, FieldLabel,
    HarvestSink, PageBudget, SourceExtractor,
};

static SEL_TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector"));
static SEL_TR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("tr selector"));
static SEL_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("cell selector"));
static SEL_A_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("a selector"));
static SEL_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("h1 selector"));
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));

/// Extensions emitted directly as document candidates instead of followed.
const DOC_EXTS: &[&str] = &[".pdf", ".doc", ".docx"];

/// Paragraphs shorter than this are navigation noise, not description text.
const MIN_PARAGRAPH_LEN: usize = 50;
const MAX_DESCRIPTION_PARAGRAPHS: usize = 3;

pub struct SiteExtractor {
    allowed_domains: Vec<String>,
}

impl SiteExtractor {
    pub fn from_config(cfg: &CrawlConfig) -> Self {
        Self {
            allowed_domains: cfg.allowed_domains.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageKind {
    Listing,
    Detail,
}

#[async_trait::async_trait]
impl SourceExtractor for SiteExtractor {
    fn source(&self) -> Source {
        Source::Asha
    }

    async fn harvest(
        &self,
        seed: &str,
        fetcher: &Fetcher,
        budget: &mut PageBudget,
        cancel: &CancellationToken,
        sink: &mut HarvestSink,
    ) {
        let mut queue: VecDeque<(String, PageKind)> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        queue.push_back((seed.to_string(), PageKind::Listing));
        seen.insert(seed.to_string());

        while let Some((url, kind)) = queue.pop_front() {
            if cancel.is_cancelled() {
                debug!(target: "crawl::site", url, "cancelled, stopping traversal");
                break;
            }
            if !host_allowed(&url, &self.allowed_domains) {
                continue;
            }
            if !budget.try_take() {
                break;
            }

            let page = match fetcher.get(&url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(target: "crawl::site", url, error = %e, "page fetch failed, skipping");
                    sink.fetch_errors += 1;
                    continue;
                }
            };
            sink.pages_fetched += 1;

            if !page.is_html() {
                // A followed link that turned out to be a file; keep it as a
                // document candidate if the URL says it is one.
                if looks_like_document(&page.url) {
                    counter!("crawl_candidates_total").increment(1);
                    sink.candidates.push(document_candidate(&url, &page.url));
                }
                continue;
            }

            match kind {
                PageKind::Listing => {
                    let items = parse_listing_page(&page.body, &page.url);
                    counter!("crawl_candidates_total").increment(items.len() as u64);
                    sink.candidates.extend(items);

                    let links = partition_links(&page.body, &page.url);
                    for detail in links.details {
                        if seen.insert(detail.clone()) {
                            queue.push_back((detail, PageKind::Detail));
                        }
                    }
                    for doc in links.documents {
                        if seen.insert(doc.clone()) {
                            counter!("crawl_candidates_total").increment(1);
                            sink.candidates.push(document_candidate(&page.url, &doc));
                        }
                    }
                    for listing in links.listings {
                        if seen.insert(listing.clone()) {
                            queue.push_back((listing, PageKind::Listing));
                        }
                    }
                }
                PageKind::Detail => match parse_detail_page(&page.body, &page.url) {
                    Some(candidate) => {
                        counter!("crawl_candidates_total").increment(1);
                        sink.candidates.push(candidate);
                    }
                    None => sink.skipped_items += 1,
                },
            }
        }
    }
}

/* ---------------- pure page parsers ---------------- */

/// One candidate per data row of every column table on a listing page.
/// A table counts as a column table when its first row is a header: `<th>`
/// cells, or two or more cells mapping through the label vocabulary. Any
/// other table is read as a single key/value candidate (label cell, value
/// cell per row). Unparseable markup yields an empty vec, never an error.
pub fn parse_listing_page(body: &str, page_url: &str) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let mut out = Vec::new();

    for table in doc.select(&SEL_TABLE) {
        let rows: Vec<_> = table.select(&SEL_TR).collect();
        if rows.is_empty() {
            continue;
        }

        let first_cells: Vec<_> = rows[0].select(&SEL_CELL).collect();
        let header: Vec<Option<FieldLabel>> = first_cells
            .iter()
            .map(|c| match_label(&element_text(c)))
            .collect();
        let mapped = header.iter().flatten().count();
        let has_th = first_cells.iter().any(|c| c.value().name() == "th");

        // A kv table's first row maps exactly one label (the left cell), so
        // one match alone must not promote it to a column table.
        if mapped > 0 && (has_th || mapped >= 2) {
            for row in &rows[1..] {
                let mut candidate = RawCandidate::new(Source::Asha, page_url);
                for (idx, cell) in row.select(&SEL_CELL).enumerate() {
                    let Some(Some(label)) = header.get(idx) else {
                        continue;
                    };
                    let text = element_text(&cell);
                    assign_field(&mut candidate, *label, &text);
                    if *label == FieldLabel::Title {
                        if let Some(href) = cell
                            .select(&SEL_A_HREF)
                            .next()
                            .and_then(|a| a.value().attr("href"))
                        {
                            candidate.link = absolutize(page_url, href);
                        }
                    }
                }
                if candidate.is_blank() {
                    continue;
                }
                out.push(candidate);
            }
        } else if let Some(candidate) = candidate_from_kv_table(&rows, page_url) {
            out.push(candidate);
        }
    }
    out
}

/// One project page → one candidate. `None` when the page carries neither a
/// heading nor any labeled field (callers count it as a skipped item).
pub fn parse_detail_page(body: &str, page_url: &str) -> Option<RawCandidate> {
    let doc = Html::parse_document(body);
    let mut candidate = RawCandidate::new(Source::Asha, page_url);
    candidate.link = Some(page_url.to_string());

    candidate.title = doc
        .select(&SEL_H1)
        .next()
        .map(|h| element_text(&h))
        .and_then(|t| clean_text(&t))
        .or_else(|| {
            doc.select(&SEL_TITLE)
                .next()
                .map(|t| element_text(&t))
                .and_then(|t| clean_text(&t))
        });

    let mut any_field = false;
    for table in doc.select(&SEL_TABLE) {
        for row in table.select(&SEL_TR) {
            let cells: Vec<_> = row.select(&SEL_CELL).collect();
            if cells.len() < 2 {
                continue;
            }
            let Some(label) = match_label(&element_text(&cells[0])) else {
                continue;
            };
            let value = element_text(&cells[1]);
            if value.is_empty() {
                continue;
            }
            assign_field(&mut candidate, label, &value);
            any_field = true;
        }
    }

    candidate.description =
        first_long_paragraphs(&doc, MIN_PARAGRAPH_LEN, MAX_DESCRIPTION_PARAGRAPHS);

    if candidate.title.is_none() && !any_field {
        return None;
    }
    Some(candidate)
}

fn candidate_from_kv_table(rows: &[scraper::ElementRef], page_url: &str) -> Option<RawCandidate> {
    let mut candidate = RawCandidate::new(Source::Asha, page_url);
    let mut any = false;
    for row in rows {
        let cells: Vec<_> = row.select(&SEL_CELL).collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(label) = match_label(&element_text(&cells[0])) else {
            continue;
        };
        let value = element_text(&cells[1]);
        if value.is_empty() {
            continue;
        }
        assign_field(&mut candidate, label, &value);
        any = true;
    }
    (any && !candidate.is_blank()).then_some(candidate)
}

fn assign_field(candidate: &mut RawCandidate, label: FieldLabel, text: &str) {
    let Some(value) = clean_text(text) else {
        return;
    };
    match label {
        FieldLabel::Title => candidate.title = Some(value),
        FieldLabel::Organization => candidate.organization = Some(value),
        FieldLabel::Location => candidate.location = Some(value),
        FieldLabel::Status => candidate.status = Some(value),
        FieldLabel::Chapter => candidate.chapter = Some(value),
        FieldLabel::Date => candidate.date_text = Some(value),
        FieldLabel::Duration => candidate.duration_text = Some(value),
        FieldLabel::Amount => {
            // Unmarked site amounts are quoted in the local currency.
            let currency = match detect_currency_hint(&value) {
                CurrencyHint::Usd => CurrencyHint::Usd,
                _ => CurrencyHint::Local,
            };
            candidate.amount = Some(RawAmount::Text {
                text: value,
                currency,
            });
        }
    }
}

/// Anchors on a page, partitioned by what the traversal does with them.
#[derive(Debug, Default, PartialEq)]
pub struct SiteLinks {
    /// Individual project pages, followed and parsed as detail pages.
    pub details: Vec<String>,
    /// Proposal/report files, emitted directly as document candidates.
    pub documents: Vec<String>,
    /// Other same-site pages, enqueued breadth-first.
    pub listings: Vec<String>,
}

pub fn partition_links(body: &str, base_url: &str) -> SiteLinks {
    let doc = Html::parse_document(body);
    let mut links = SiteLinks::default();
    let mut seen = HashSet::new();

    for a in doc.select(&SEL_A_HREF) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(url) = absolutize(base_url, href) else {
            continue;
        };
        if url.starts_with("mailto:") || url.starts_with("javascript:") {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }
        if is_project_detail(&url) {
            links.details.push(url);
        } else if looks_like_document(&url) {
            links.documents.push(url);
        } else {
            links.listings.push(url);
        }
    }
    links
}

pub(crate) fn is_project_detail(url: &str) -> bool {
    url.contains("/project/?pid=")
}

/// File extension or a proposal-ish path word marks a document link.
pub(crate) fn looks_like_document(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    DOC_EXTS.iter().any(|ext| path.ends_with(ext)) || lower.contains("proposal")
}

/// Candidate for a linked file: no budget, the link itself carries the
/// title (derived later) and the document-type signal.
fn document_candidate(page_url: &str, doc_url: &str) -> RawCandidate {
    let mut candidate = RawCandidate::new(Source::Asha, page_url);
    candidate.link = Some(doc_url.to_string());
    candidate
}
