// src/lib.rs
//! Multi-source funding-proposal discovery pipeline: polite crawling, field
//! extraction, currency normalization, theme and budget filtering, dedup,
//! CSV export.
//!
//! Two crawlers share the pipeline: the site crawler ("asha", NGO project
//! listings and detail pages) and the repository crawler ("usaid", catalog
//! API plus HTML catalog pages). Entry point: [`pipeline::run`] with a
//! [`config::CrawlConfig`] preset or a custom one.

pub mod classify;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod upload;

// ---- Stable public surface ----
pub use config::{BudgetBand, CrawlConfig, ExchangeRate, ThemeSet};
pub use error::{ConfigError, CrawlError, FetchError};
pub use pipeline::{run, run_with, CrawlResult, RunOptions};
pub use record::{DocumentType, ProposalRecord, Source};
pub use upload::{ArtifactUploader, UploadReceipt};
