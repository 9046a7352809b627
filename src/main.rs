// src/main.rs
//! CLI over the two crawler presets. `fundingbot-crawler site` and
//! `fundingbot-crawler repo`, each with per-flag overrides; prints a run
//! summary when done.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fundingbot_crawler::config::{load_themes_default, seeds_from_csv, CrawlConfig};
use fundingbot_crawler::pipeline::{run_with, CrawlResult, RunOptions};

#[derive(Parser)]
#[command(name = "fundingbot-crawler", version, about = "Funding-proposal discovery crawler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the NGO project site (listing pages, project pages, documents).
    Site(RunArgs),
    /// Query the USAID repositories (catalog API, dataset probes, catalogs).
    Repo(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory the CSV artifact is written to.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Hard cap on fetch operations for the whole run.
    #[arg(long)]
    max_pages: Option<u32>,

    /// Minimum spacing between fetches, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Inclusive USD band, lower bound.
    #[arg(long)]
    min_budget: Option<f64>,

    /// Inclusive USD band, upper bound.
    #[arg(long)]
    max_budget: Option<f64>,

    /// Alternate band in local currency (requires --max-local).
    #[arg(long, requires = "max_local")]
    min_local: Option<f64>,

    /// Alternate band in local currency (requires --min-local).
    #[arg(long, requires = "min_local")]
    max_local: Option<f64>,

    /// Local-currency units per USD.
    #[arg(long)]
    rate: Option<f64>,

    /// CSV file of seed URLs (replaces the preset seeds).
    #[arg(long)]
    seeds_csv: Option<PathBuf>,

    /// Reject records that match no theme.
    #[arg(long)]
    require_theme: bool,

    /// Upload destination folder id (also: FUNDINGBOT_DRIVE_FOLDER_ID).
    #[arg(long)]
    upload_folder: Option<String>,
}

impl RunArgs {
    fn apply(self, mut cfg: CrawlConfig) -> Result<CrawlConfig> {
        cfg.themes = load_themes_default().context("loading theme config")?;
        if let Some(dir) = self.out_dir {
            cfg.output_directory = dir;
        }
        if let Some(n) = self.max_pages {
            cfg.max_pages = n;
        }
        if let Some(ms) = self.delay_ms {
            cfg.delay = std::time::Duration::from_millis(ms);
        }
        if let Some(v) = self.min_budget {
            cfg.min_budget_usd = v;
        }
        if let Some(v) = self.max_budget {
            cfg.max_budget_usd = v;
        }
        if let (Some(min), Some(max)) = (self.min_local, self.max_local) {
            cfg.local_band = Some((min, max));
        }
        if let Some(rate) = self.rate {
            cfg.exchange.units_per_usd = rate;
        }
        if let Some(path) = self.seeds_csv {
            cfg.seeds = seeds_from_csv(&path).context("reading seeds CSV")?;
        }
        if self.require_theme {
            cfg.require_theme = true;
        }
        if self.upload_folder.is_some() {
            cfg.upload_folder_id = self.upload_folder;
        }
        Ok(cfg)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_summary(result: &CrawlResult) {
    println!("Crawl finished{}", if result.cancelled { " (cancelled)" } else { "" });
    println!("  pages fetched:    {}", result.pages_fetched);
    println!("  fetch errors:     {}", result.fetch_errors);
    println!("  candidates found: {}", result.total_documents_found);
    println!("  retained rows:    {}", result.rows.len());
    println!("  with budget:      {}", result.under_budget_threshold);
    println!("  rejected (band):  {}", result.rejected_budget);
    println!("  rejected (theme): {}", result.rejected_theme);
    println!("  duplicates:       {}", result.duplicates_dropped);
    for (theme, count) in &result.theme_counts {
        println!("  theme {theme}: {count}");
    }
    println!("  csv: {}", result.csv_path.display());
    if let Some(receipt) = &result.upload {
        println!("  uploaded: {} ({})",
            receipt.file_id,
            receipt.web_link.as_deref().unwrap_or("no link"));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = match cli.command {
        Command::Site(args) => args.apply(CrawlConfig::asha())?,
        Command::Repo(args) => args.apply(CrawlConfig::usaid())?,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let result = run_with(
        &cfg,
        RunOptions {
            cancel,
            uploader: None,
        },
    )
    .await
    .context("crawl run failed")?;

    print_summary(&result);
    Ok(())
}
