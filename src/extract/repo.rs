// src/extract/repo.rs
//! Repository-crawler extraction: USAID catalog search JSON, capped
//! per-dataset row probes for budget discovery, and HTML catalog/search
//! card pages.

use std::collections::HashSet;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::fetch::Fetcher;
use crate::normalize::{clean_text, parse_amount_text};
use crate::record::{CurrencyHint, DocumentType, RawAmount, RawCandidate, Source};

use super::{absolutize, element_text, HarvestSink, PageBudget, SourceExtractor};

static SEL_CARD_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div, article, li").expect("card selector"));
static SEL_CARD_HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1 a, h2 a, h3 a, h4 a, a").expect("heading selector"));
static SEL_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));
static SEL_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span, small, div").expect("meta selector"));
static SEL_A_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("a selector"));

static RE_CARD_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)result|document|card|item|dataset|resource").expect("card class"));
static RE_META_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)meta|date|year|location").expect("meta class"));
static RE_META_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b20[0-4][0-9]\b").expect("year"));

/// Key-name substrings marking a dataset column as budget-like.
const BUDGET_KEY_HINTS: &[&str] = &["amount", "budget", "funding", "cost"];

const DATASET_PERMALINK_BASE: &str = "https://data.usaid.gov/d";

/// Row probes go to the same host that answered the catalog search
/// (`/resource/<id>.json` is served next to `/api/catalog/v1`).
fn probe_url(catalog_url: &str, dataset_id: &str, row_limit: u32) -> Option<String> {
    let mut probe = url::Url::parse(catalog_url).ok()?;
    probe.set_path(&format!("/resource/{dataset_id}.json"));
    probe.set_query(Some(&format!("$limit={row_limit}")));
    Some(probe.to_string())
}

pub struct RepoExtractor {
    dataset_row_limit: u32,
}

impl RepoExtractor {
    pub fn from_config(cfg: &CrawlConfig) -> Self {
        Self {
            dataset_row_limit: cfg.dataset_row_limit.min(10),
        }
    }
}

#[async_trait::async_trait]
impl SourceExtractor for RepoExtractor {
    fn source(&self) -> Source {
        Source::Usaid
    }

    async fn harvest(
        &self,
        seed: &str,
        fetcher: &Fetcher,
        budget: &mut PageBudget,
        cancel: &CancellationToken,
        sink: &mut HarvestSink,
    ) {
        if cancel.is_cancelled() || !budget.try_take() {
            return;
        }
        let page = match fetcher.get(seed).await {
            Ok(page) => page,
            Err(e) => {
                warn!(target: "crawl::repo", seed, error = %e, "seed fetch failed, skipping");
                sink.fetch_errors += 1;
                return;
            }
        };
        sink.pages_fetched += 1;

        if page.is_json() || page.body.trim_start().starts_with('{') {
            let entries = parse_catalog_search(&page.body, &page.url);
            counter!("crawl_candidates_total").increment(entries.len() as u64);
            for entry in entries {
                let CatalogEntry {
                    mut candidate,
                    dataset_id,
                } = entry;

                // Budget probe: a capped row query against the dataset
                // itself. Probe failure or no rows means null budget, not
                // an error.
                if let Some(id) = dataset_id {
                    if cancel.is_cancelled() {
                        sink.candidates.push(candidate);
                        continue;
                    }
                    let probe = probe_url(&page.url, &id, self.dataset_row_limit);
                    if let Some(probe) = probe.filter(|_| budget.try_take()) {
                        match fetcher.get(&probe).await {
                            Ok(rows_page) => {
                                sink.pages_fetched += 1;
                                if let Some(amount) = budget_from_rows(&rows_page.body) {
                                    candidate.amount = Some(amount);
                                }
                            }
                            Err(e) => {
                                debug!(target: "crawl::repo", dataset = %id, error = %e, "budget probe failed");
                                sink.fetch_errors += 1;
                            }
                        }
                    }
                }
                sink.candidates.push(candidate);
            }
        } else {
            let mut items = parse_catalog_cards(&page.body, &page.url);
            if items.is_empty() {
                // Bare repository index pages carry no cards, only direct
                // file links.
                items = parse_document_links(&page.body, &page.url);
            }
            counter!("crawl_candidates_total").increment(items.len() as u64);
            sink.candidates.extend(items);
        }
    }
}

/* ---------------- pure parsers ---------------- */

#[derive(Debug)]
pub struct CatalogEntry {
    pub candidate: RawCandidate,
    /// Socrata dataset id, when present; drives the budget probe.
    pub dataset_id: Option<String>,
}

/// Walk `results[].resource` of a catalog search response. Results missing
/// both a name and an id are skipped; anything else best-effort.
pub fn parse_catalog_search(body: &str, source_url: &str) -> Vec<CatalogEntry> {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(results) = json.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for result in results {
        let Some(resource) = result.get("resource") else {
            continue;
        };
        let mut candidate = RawCandidate::new(Source::Usaid, source_url);
        candidate.title = resource
            .get("name")
            .and_then(Value::as_str)
            .and_then(clean_text);
        candidate.description = resource
            .get("description")
            .and_then(Value::as_str)
            .and_then(clean_text);
        candidate.created = resource
            .get("createdAt")
            .and_then(Value::as_str)
            .map(str::to_string);
        candidate.updated = resource
            .get("updatedAt")
            .and_then(Value::as_str)
            .map(str::to_string);
        candidate.organization = Some("USAID".to_string());
        candidate.document_type = Some(DocumentType::Dataset);

        let dataset_id = resource
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(id) = &dataset_id {
            candidate.link = Some(format!("{DATASET_PERMALINK_BASE}/{id}"));
        }
        if candidate.is_blank() {
            continue;
        }
        out.push(CatalogEntry {
            candidate,
            dataset_id,
        });
    }
    out
}

/// Scan dataset rows for the first coercible budget-like value: key name
/// containing amount/budget/funding/cost, native numbers used directly,
/// strings scanned for the first decimal digit run.
pub fn budget_from_rows(body: &str) -> Option<RawAmount> {
    let rows: Value = serde_json::from_str(body).ok()?;
    let rows = rows.as_array()?;
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        for (key, value) in obj {
            let key_lower = key.to_lowercase();
            if !BUDGET_KEY_HINTS.iter().any(|hint| key_lower.contains(hint)) {
                continue;
            }
            match value {
                Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        if v > 0.0 {
                            return Some(RawAmount::Numeric {
                                value: v,
                                currency: CurrencyHint::Usd,
                            });
                        }
                    }
                }
                Value::String(s) => {
                    if let Some(v) = parse_amount_text(s) {
                        if v > 0.0 {
                            return Some(RawAmount::Numeric {
                                value: v,
                                currency: CurrencyHint::Usd,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// Repeating card blocks on an HTML search/catalog page: heading anchor
/// gives title + link, first long paragraph gives description, meta spans
/// may carry a year.
pub fn parse_catalog_cards(body: &str, page_url: &str) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let mut out = Vec::new();
    let mut seen_links: HashSet<String> = HashSet::new();

    for block in doc.select(&SEL_CARD_BLOCK) {
        let classes = block.value().attr("class").unwrap_or_default();
        if !RE_CARD_CLASS.is_match(classes) {
            continue;
        }
        // A wrapper whose descendants are themselves cards is a results
        // container, not a card.
        let is_container = block.select(&SEL_CARD_BLOCK).any(|inner| {
            RE_CARD_CLASS.is_match(inner.value().attr("class").unwrap_or_default())
        });
        if is_container {
            continue;
        }

        let Some(anchor) = block.select(&SEL_CARD_HEADING).next() else {
            continue;
        };
        let title = clean_text(&element_text(&anchor));
        let link = anchor
            .value()
            .attr("href")
            .and_then(|href| absolutize(page_url, href));
        if title.is_none() || link.is_none() {
            continue;
        }
        // Nested matching blocks resolve to the same anchor; keep the
        // outermost occurrence only.
        if let Some(l) = &link {
            if !seen_links.insert(l.clone()) {
                continue;
            }
        }

        let mut candidate = RawCandidate::new(Source::Usaid, page_url);
        candidate.title = title;
        candidate.link = link;
        candidate.description = block
            .select(&SEL_P)
            .map(|p| element_text(&p))
            .find(|t| t.len() >= 20);

        for meta in block.select(&SEL_META) {
            let classes = meta.value().attr("class").unwrap_or_default();
            if !RE_META_CLASS.is_match(classes) {
                continue;
            }
            if let Some(m) = RE_META_YEAR.find(&element_text(&meta)) {
                candidate.year = m.as_str().parse().ok();
            }
        }
        out.push(candidate);
    }
    out
}

/// Fallback for index pages without cards: direct links to data files.
pub fn parse_document_links(body: &str, page_url: &str) -> Vec<RawCandidate> {
    let doc = Html::parse_document(body);
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for a in doc.select(&SEL_A_HREF) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let lower = href.to_lowercase();
        if ![".pdf", ".doc", ".csv"].iter().any(|ext| lower.contains(ext)) {
            continue;
        }
        let Some(url) = absolutize(page_url, href) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let mut candidate = RawCandidate::new(Source::Usaid, page_url);
        candidate.title = clean_text(&element_text(&a));
        candidate.link = Some(url);
        candidate.notes = Some("Dataset from USAID Development Data Library".to_string());
        out.push(candidate);
    }
    out
}
