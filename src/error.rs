// src/error.rs
//! Error taxonomy: fetch failures are recoverable and handled per item;
//! config and export failures are fatal and abort the run before/at the edge.

use std::path::PathBuf;
use thiserror::Error;

/// A single failed fetch. Recoverable: callers skip the page and continue.
#[derive(Debug, Error)]
#[error("fetch {url}: {kind}")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

#[derive(Debug, Error)]
pub enum FetchErrorKind {
    #[error("status {0}")]
    Status(u16),
    #[error("timed out")]
    Timeout,
    #[error("network: {0}")]
    Network(#[source] reqwest::Error),
    #[error("body read: {0}")]
    BodyRead(#[source] reqwest::Error),
}

/// Invalid run configuration. Always raised before the first fetch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("budget band is inverted: min {min} > max {max}")]
    InvertedBand { min: f64, max: f64 },
    #[error("exchange rate must be positive, got {0}")]
    BadExchangeRate(f64),
    #[error("max_pages must be at least 1")]
    ZeroPageBudget,
    #[error("no seeds configured")]
    NoSeeds,
    #[error("theme '{0}' has an empty keyword set")]
    EmptyTheme(String),
}

/// Fatal pipeline failures. Per-item fetch/extraction errors never surface
/// here; they are counted and the run continues.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("export artifact {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
