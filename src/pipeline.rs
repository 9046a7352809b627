// src/pipeline.rs
//! Pipeline orchestrator: drives seeds through fetch → extract → normalize →
//! classify/filter → dedupe → export under one shared page budget, and
//! aggregates everything into an immutable `CrawlResult`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classify::{classify_and_filter, FilterOutcome, RejectReason};
use crate::config::CrawlConfig;
use crate::dedupe::dedupe;
use crate::error::CrawlError;
use crate::export;
use crate::extract::{repo::RepoExtractor, site::SiteExtractor};
use crate::extract::{HarvestSink, PageBudget, SourceExtractor};
use crate::fetch::Fetcher;
use crate::normalize::normalize;
use crate::record::{ProposalRecord, Source};
use crate::upload::{resolve_folder_id, ArtifactUploader, UploadReceipt};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_pages_fetched_total", "Pages fetched successfully.");
        describe_counter!("crawl_fetch_errors_total", "Failed fetch attempts.");
        describe_counter!(
            "crawl_candidates_total",
            "Raw candidates produced by extractors."
        );
        describe_counter!("crawl_kept_total", "Records retained after filtering.");
        describe_counter!(
            "crawl_rejected_budget_total",
            "Records rejected by the budget band."
        );
        describe_counter!(
            "crawl_rejected_theme_total",
            "Records rejected for matching no theme."
        );
        describe_counter!(
            "crawl_dedup_dropped_total",
            "Duplicate records dropped across pages."
        );
        describe_histogram!("crawl_fetch_duration_ms", "Fetch time in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Fetching,
    Extracting,
    Filtering,
    Deduping,
    Exporting,
    Done,
    Errored,
}

fn enter(phase: Phase, source: Source) {
    info!(target: "crawl::pipeline", source = %source, phase = ?phase, "phase");
}

/// Per-run options beyond the config: cooperative cancellation and an
/// optional artifact uploader.
#[derive(Default)]
pub struct RunOptions {
    pub cancel: CancellationToken,
    pub uploader: Option<Box<dyn ArtifactUploader>>,
}

/// Aggregate output of one run. Built once, never mutated after.
#[derive(Debug)]
pub struct CrawlResult {
    /// Retained records in discovery order after dedup.
    pub rows: Vec<ProposalRecord>,
    /// Candidates seen before filtering.
    pub total_documents_found: usize,
    /// Retained-row count per theme tag.
    pub theme_counts: BTreeMap<String, usize>,
    /// Retained rows carrying a parsed (in-band) budget.
    pub under_budget_threshold: usize,
    pub rejected_budget: usize,
    pub rejected_theme: usize,
    pub duplicates_dropped: usize,
    /// Items the extractors or normalizer had to skip.
    pub skipped_items: u32,
    pub pages_fetched: u32,
    pub fetch_errors: u32,
    pub cancelled: bool,
    pub csv_path: PathBuf,
    pub upload: Option<UploadReceipt>,
}

/// Run one crawl with default options.
pub async fn run(cfg: &CrawlConfig) -> Result<CrawlResult, CrawlError> {
    run_with(cfg, RunOptions::default()).await
}

/// Run one crawl. Fatal only on invalid config or export I/O; per-item and
/// per-page failures are counted and skipped. Safe to call repeatedly with
/// different configs — no state survives between runs.
pub async fn run_with(cfg: &CrawlConfig, opts: RunOptions) -> Result<CrawlResult, CrawlError> {
    ensure_metrics_described();

    enter(Phase::Init, cfg.source);
    if let Err(e) = cfg.validate() {
        enter(Phase::Errored, cfg.source);
        return Err(e.into());
    }
    let band = cfg.resolved_band()?;
    if let Err(e) = std::fs::create_dir_all(&cfg.output_directory) {
        enter(Phase::Errored, cfg.source);
        return Err(CrawlError::OutputDir {
            path: cfg.output_directory.clone(),
            source: e,
        });
    }

    let fetcher = Fetcher::from_config(cfg)?;
    let extractor: Box<dyn SourceExtractor> = match cfg.source {
        Source::Asha => Box::new(SiteExtractor::from_config(cfg)),
        Source::Usaid => Box::new(RepoExtractor::from_config(cfg)),
    };

    enter(Phase::Fetching, cfg.source);
    let mut budget = PageBudget::new(cfg.max_pages);
    let mut sink = HarvestSink::default();
    for seed in &cfg.seeds {
        if opts.cancel.is_cancelled() {
            info!(target: "crawl::pipeline", source = %cfg.source, "run cancelled, finalizing with partial results");
            break;
        }
        if budget.exhausted() {
            info!(
                target: "crawl::pipeline",
                source = %cfg.source,
                max_pages = cfg.max_pages,
                "page budget exhausted, remaining seeds skipped"
            );
            break;
        }
        // Extraction runs per fetched page inside harvest; the phase marker
        // covers both for this seed.
        enter(Phase::Extracting, cfg.source);
        extractor
            .harvest(seed, &fetcher, &mut budget, &opts.cancel, &mut sink)
            .await;
    }

    enter(Phase::Filtering, cfg.source);
    let total_documents_found = sink.candidates.len();
    let mut skipped_items = sink.skipped_items;
    let mut rejected_budget = 0usize;
    let mut rejected_theme = 0usize;
    let mut kept: Vec<ProposalRecord> = Vec::new();

    for raw in sink.candidates {
        let Some(candidate) = normalize(raw, &cfg.exchange) else {
            skipped_items += 1;
            continue;
        };
        match classify_and_filter(candidate, &cfg.themes, &band, cfg.require_theme) {
            FilterOutcome::Kept(record) => kept.push(record),
            FilterOutcome::Rejected(RejectReason::Budget) => {
                rejected_budget += 1;
                counter!("crawl_rejected_budget_total").increment(1);
            }
            FilterOutcome::Rejected(RejectReason::Theme) => {
                rejected_theme += 1;
                counter!("crawl_rejected_theme_total").increment(1);
            }
        }
    }

    enter(Phase::Deduping, cfg.source);
    let (rows, duplicates_dropped) = dedupe(kept);
    counter!("crawl_kept_total").increment(rows.len() as u64);
    counter!("crawl_dedup_dropped_total").increment(duplicates_dropped as u64);

    let mut theme_counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in &rows {
        for theme in &row.themes {
            *theme_counts.entry(theme.clone()).or_default() += 1;
        }
    }
    let under_budget_threshold = rows
        .iter()
        .filter(|r| r.amount_requested_usd.is_some())
        .count();

    enter(Phase::Exporting, cfg.source);
    let csv_path = match export::write_csv(&cfg.output_directory, cfg.source, &rows) {
        Ok(path) => path,
        Err(e) => {
            enter(Phase::Errored, cfg.source);
            return Err(e);
        }
    };

    // Best-effort upload; failures are warnings, never run failures.
    let mut upload = None;
    if let Some(uploader) = &opts.uploader {
        if let Some(folder_id) = resolve_folder_id(cfg) {
            match uploader.upload(&csv_path, &folder_id).await {
                Ok(receipt) => upload = Some(receipt),
                Err(e) => {
                    warn!(target: "crawl::pipeline", error = ?e, "artifact upload failed");
                }
            }
        }
    }

    enter(Phase::Done, cfg.source);
    info!(
        target: "crawl::pipeline",
        source = %cfg.source,
        found = total_documents_found,
        kept = rows.len(),
        rejected_budget,
        rejected_theme,
        duplicates_dropped,
        pages = sink.pages_fetched,
        fetch_errors = sink.fetch_errors,
        "run finished"
    );

    Ok(CrawlResult {
        rows,
        total_documents_found,
        theme_counts,
        under_budget_threshold,
        rejected_budget,
        rejected_theme,
        duplicates_dropped,
        skipped_items,
        pages_fetched: sink.pages_fetched,
        fetch_errors: sink.fetch_errors,
        cancelled: opts.cancel.is_cancelled(),
        csv_path,
        upload,
    })
}
