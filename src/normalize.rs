// src/normalize.rs
//! Field canonicalization: noisy amount text to integers, local currency to
//! USD, trim-to-null text cleanup, best-effort date and year recovery,
//! document-type detection. Nothing here fails — unparseable fields become
//! null.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ExchangeRate;
use crate::record::{
    CurrencyHint, DocumentType, OriginalAmount, ProposalRecord, RawAmount, RawCandidate,
};

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,. ]*").expect("amount regex"));
static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20[0-4][0-9])\b").expect("year regex"));
static RE_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,3}").expect("duration regex"));
static RE_LOCAL_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\u{20b9}|\brs\.?|\binr\b)\s*\d").expect("local mark regex"));
static RE_USD_MARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\$|\busd\b|\bus\$|\bdollars?\b)\s*\d").expect("usd mark regex"));

static DOC_TYPE_PATTERNS: Lazy<Vec<(Regex, DocumentType)>> = Lazy::new(|| {
    let pat = |p: &str| Regex::new(p).expect("doc type regex");
    vec![
        (pat(r"(?i)proposal|application|submission"), DocumentType::Proposal),
        (pat(r"(?i)evaluation|assessment|review"), DocumentType::Evaluation),
        (pat(r"(?i)report|study|analysis"), DocumentType::Report),
        (pat(r"(?i)grant|award|funding"), DocumentType::Proposal),
        (pat(r"(?i)technical|guidance|manual"), DocumentType::Report),
        (pat(r"(?i)dataset|data\s+library"), DocumentType::Dataset),
    ]
});

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
];

/// Normalizer output: the canonical record plus the text the classifier
/// scores (title + description).
#[derive(Debug, Clone)]
pub struct NormalizedCandidate {
    pub record: ProposalRecord,
    pub text: String,
}

/// Decode HTML entities, strip stray markup, trim and collapse whitespace.
/// Empty comes back as `None`, never `""`. API descriptions sometimes embed
/// HTML; scraper-sourced text passes through unchanged.
pub fn clean_text(s: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let collapsed = RE_WS.replace_all(stripped.trim(), " ").to_string();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// First run of digits in the text, thousands separators ignored. Handles
/// Western ("1,234,567") and Indian ("12,34,567") grouping alike.
pub fn parse_amount_text(s: &str) -> Option<f64> {
    let m = RE_AMOUNT.find(s)?;
    let cleaned: String = m
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = cleaned.trim_end_matches('.').parse().ok()?;
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Currency marker adjacent to the first number, if any.
pub(crate) fn detect_currency_hint(s: &str) -> CurrencyHint {
    if RE_LOCAL_MARK.is_match(s) {
        CurrencyHint::Local
    } else if RE_USD_MARK.is_match(s) {
        CurrencyHint::Usd
    } else {
        CurrencyHint::Unknown
    }
}

/// Convert to whole-unit USD, keeping the pre-conversion amount for audit.
/// Unknown currency is treated as USD.
pub fn to_usd(value: f64, hint: CurrencyHint, exchange: &ExchangeRate) -> (f64, OriginalAmount) {
    match hint {
        CurrencyHint::Local => (
            (value / exchange.units_per_usd).round(),
            OriginalAmount {
                value,
                currency: exchange.currency.clone(),
            },
        ),
        CurrencyHint::Usd | CurrencyHint::Unknown => (
            value.round(),
            OriginalAmount {
                value,
                currency: "USD".to_string(),
            },
        ),
    }
}

/// Year from a date-ish string: fixed format list first (ISO timestamp
/// prefixes included), then the first in-range year literal.
pub fn year_from_date_text(s: &str) -> Option<i32> {
    let t = s.trim();
    if let Some(prefix) = t.get(..10) {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d.year());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = chrono::NaiveDate::parse_from_str(t, fmt) {
            return Some(d.year());
        }
    }
    RE_YEAR
        .captures(t)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Scan free text for year literals; the latest one wins.
pub fn guess_year(texts: &[&str]) -> Option<i32> {
    texts
        .iter()
        .flat_map(|t| RE_YEAR.captures_iter(t))
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<i32>().ok()))
        .max()
}

fn parse_duration_months(s: &str) -> Option<u32> {
    RE_DURATION.find(s).and_then(|m| m.as_str().parse().ok())
}

/// URL first, then text, against a fixed pattern table.
pub fn detect_document_type(link: Option<&str>, text: &str) -> DocumentType {
    if let Some(link) = link {
        for (pattern, doc_type) in DOC_TYPE_PATTERNS.iter() {
            if pattern.is_match(link) {
                return *doc_type;
            }
        }
    }
    for (pattern, doc_type) in DOC_TYPE_PATTERNS.iter() {
        if pattern.is_match(text) {
            return *doc_type;
        }
    }
    DocumentType::Unknown
}

fn title_from_link(link: &str) -> Option<String> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    let name = path.rsplit('/').find(|seg| !seg.is_empty())?;
    clean_text(name)
}

/// Canonicalize one raw candidate. `None` only when no title can be derived
/// at all (callers count it as a skipped item).
pub fn normalize(raw: RawCandidate, exchange: &ExchangeRate) -> Option<NormalizedCandidate> {
    let link = raw.link.as_deref().and_then(clean_text);
    let title = raw
        .title
        .as_deref()
        .and_then(clean_text)
        .or_else(|| link.as_deref().and_then(title_from_link))?;

    let organization = raw.organization.as_deref().and_then(clean_text);
    let geography = raw.location.as_deref().and_then(clean_text);
    let description = raw.description.as_deref().and_then(clean_text);
    let chapter_or_funder = raw.chapter.as_deref().and_then(clean_text);
    let notes = raw.notes.as_deref().and_then(clean_text);

    let (amount_requested_usd, amount_original) = match raw.amount {
        Some(RawAmount::Numeric { value, currency }) => {
            let (usd, original) = to_usd(value, currency, exchange);
            (Some(usd), Some(original))
        }
        Some(RawAmount::Text { ref text, currency }) => match parse_amount_text(text) {
            Some(value) => {
                let (usd, original) = to_usd(value, currency, exchange);
                (Some(usd), Some(original))
            }
            None => (None, None),
        },
        None => (None, None),
    };

    let year = raw
        .year
        .or_else(|| raw.date_text.as_deref().and_then(year_from_date_text))
        .or_else(|| raw.created.as_deref().and_then(year_from_date_text))
        .or_else(|| raw.updated.as_deref().and_then(year_from_date_text))
        .or_else(|| {
            guess_year(&[
                title.as_str(),
                description.as_deref().unwrap_or(""),
            ])
        });

    let duration_months = raw
        .duration_text
        .as_deref()
        .and_then(parse_duration_months);

    let text = match &description {
        Some(d) => format!("{title} {d}"),
        None => title.clone(),
    };

    let document_type = raw
        .document_type
        .unwrap_or_else(|| detect_document_type(link.as_deref(), &text));

    let record = ProposalRecord {
        source: raw.source,
        title,
        organization,
        geography,
        themes: Default::default(),
        amount_requested_usd,
        amount_original,
        duration_months,
        document_type,
        link,
        year,
        chapter_or_funder,
        notes,
    };
    Some(NormalizedCandidate { record, text })
}
