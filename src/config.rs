// src/config.rs
//! Run configuration: every knob a crawl accepts lives on `CrawlConfig`,
//! resolved explicitly per run. Theme keyword sets load from TOML with an
//! embedded default, a conventional path, and an env-var override.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::record::Source;

// --- env defaults & names ---
pub const DEFAULT_THEMES_PATH: &str = "config/themes.toml";
pub const ENV_THEMES_PATH: &str = "FUNDINGBOT_THEMES_PATH";

const DEFAULT_THEMES_TOML: &str = include_str!("../config/themes.toml");

static DEFAULT_THEMES: Lazy<Vec<ThemeSet>> = Lazy::new(|| {
    themes_from_toml_str(DEFAULT_THEMES_TOML).expect("embedded themes.toml must parse")
});

/// One theme: a name plus the keyword set that tags it.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ThemeSet {
    pub name: String,
    pub keywords: Vec<String>,
    /// Minimum number of distinct keywords that must occur for the tag.
    #[serde(default = "default_min_hits")]
    pub min_hits: usize,
}

fn default_min_hits() -> usize {
    1
}

#[derive(serde::Deserialize)]
struct ThemesFile {
    themes: Vec<ThemeSet>,
}

/// Parse theme sets from TOML. Keywords are trimmed, lowercased and
/// deduplicated; empty entries are dropped.
pub fn themes_from_toml_str(s: &str) -> Result<Vec<ThemeSet>> {
    let parsed: ThemesFile = toml::from_str(s).context("parsing themes TOML")?;
    let mut out = Vec::with_capacity(parsed.themes.len());
    for mut theme in parsed.themes {
        theme.name = theme.name.trim().to_lowercase();
        theme.keywords = clean_keywords(theme.keywords);
        out.push(theme);
    }
    Ok(out)
}

fn clean_keywords(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}

pub fn load_themes_from(path: &Path) -> Result<Vec<ThemeSet>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading themes from {}", path.display()))?;
    themes_from_toml_str(&content)
}

/// Load theme sets using env var + fallbacks:
/// 1) $FUNDINGBOT_THEMES_PATH
/// 2) config/themes.toml
/// 3) the embedded default
pub fn load_themes_default() -> Result<Vec<ThemeSet>> {
    if let Ok(p) = std::env::var(ENV_THEMES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_themes_from(&pb);
        }
        anyhow::bail!("{ENV_THEMES_PATH} points to non-existent path");
    }
    let default_p = PathBuf::from(DEFAULT_THEMES_PATH);
    if default_p.exists() {
        return load_themes_from(&default_p);
    }
    Ok(DEFAULT_THEMES.clone())
}

/// Built-in theme sets (education, youth) from the embedded config.
pub fn default_themes() -> Vec<ThemeSet> {
    DEFAULT_THEMES.clone()
}

/// Local-currency exchange: `units_per_usd` local units buy one USD.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    pub currency: String,
    pub units_per_usd: f64,
}

/// Inclusive USD filter band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetBand {
    pub min_usd: f64,
    pub max_usd: f64,
}

impl BudgetBand {
    pub fn contains(&self, value: f64) -> bool {
        self.min_usd <= value && value <= self.max_usd
    }
}

/// Everything one crawl run accepts. Presets mirror the two deployed
/// configurations; callers override fields before `run`.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub source: Source,
    pub output_directory: PathBuf,
    pub seeds: Vec<String>,
    /// Hard cap on fetch operations for the whole run, follow-up
    /// pages and dataset probes included.
    pub max_pages: u32,
    /// Minimum spacing between consecutive fetches.
    pub delay: Duration,
    pub min_budget_usd: f64,
    pub max_budget_usd: f64,
    /// Alternate band in local currency; when set it overrides the USD band
    /// after conversion through `exchange`.
    pub local_band: Option<(f64, f64)>,
    pub exchange: ExchangeRate,
    pub themes: Vec<ThemeSet>,
    /// Reject records that match no theme at all.
    pub require_theme: bool,
    /// Suffix-matched host allow list for followed links. Empty = no
    /// restriction.
    pub allowed_domains: Vec<String>,
    pub user_agent: String,
    pub timeout: Duration,
    /// Row cap for per-dataset budget probes.
    pub dataset_row_limit: u32,
    pub upload_folder_id: Option<String>,
}

impl CrawlConfig {
    /// Site-crawler preset: ashanet.org project listings, INR amounts.
    pub fn asha() -> Self {
        Self {
            source: Source::Asha,
            output_directory: PathBuf::from("./out"),
            seeds: vec!["https://ashanet.org/projects-list/".to_string()],
            max_pages: 400,
            delay: Duration::from_millis(800),
            min_budget_usd: 30_000.0,
            max_budget_usd: 50_000.0,
            local_band: None,
            exchange: ExchangeRate {
                currency: "INR".to_string(),
                units_per_usd: 83.0,
            },
            themes: default_themes(),
            require_theme: false,
            allowed_domains: vec![
                "ashanet.org".to_string(),
                "documents.ashanet.org".to_string(),
                "ashadocserver.s3.amazonaws.com".to_string(),
            ],
            user_agent: "Mozilla/5.0 (compatible; FundingBot/asha-crawler; +https://example.org)"
                .to_string(),
            timeout: Duration::from_secs(20),
            dataset_row_limit: 10,
            upload_folder_id: None,
        }
    }

    /// Repository-crawler preset: USAID catalog API queries per search term,
    /// then the HTML search/catalog seeds.
    pub fn usaid() -> Self {
        let search_terms = [
            "education",
            "youth",
            "school",
            "training",
            "learning",
            "children",
        ];
        let mut seeds: Vec<String> = search_terms
            .iter()
            .map(|t| {
                format!("https://data.usaid.gov/api/catalog/v1?q={t}&limit=20&only=datasets")
            })
            .collect();
        seeds.extend(
            [
                "https://decfinder.devme.ai/search?q=education",
                "https://decfinder.devme.ai/search?q=youth",
                "https://decfinder.devme.ai/search?q=primary+education",
                "https://decfinder.devme.ai/search?q=vocational+training",
                "https://decfinder.devme.ai/search?q=children",
                "https://catalog.data.gov/dataset?organization=usaid-gov",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        Self {
            source: Source::Usaid,
            output_directory: PathBuf::from("./usaid_out"),
            seeds,
            max_pages: 200,
            delay: Duration::from_secs(1),
            min_budget_usd: 1_000.0,
            max_budget_usd: 100_000.0,
            local_band: None,
            exchange: ExchangeRate {
                currency: "USD".to_string(),
                units_per_usd: 1.0,
            },
            themes: default_themes(),
            require_theme: true,
            allowed_domains: vec![
                "dec.usaid.gov".to_string(),
                "data.usaid.gov".to_string(),
                "foreignassistance.gov".to_string(),
                "catalog.data.gov".to_string(),
                "decfinder.devme.ai".to_string(),
            ],
            user_agent: "Mozilla/5.0 (compatible; FundingBot/usaid-crawler; +https://example.org)"
                .to_string(),
            timeout: Duration::from_secs(20),
            dataset_row_limit: 10,
            upload_folder_id: None,
        }
    }

    /// The effective USD band: the local-currency alternative wins when set.
    pub fn resolved_band(&self) -> Result<BudgetBand, ConfigError> {
        let rate = self.exchange.units_per_usd;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::BadExchangeRate(rate));
        }
        let band = match self.local_band {
            Some((min_local, max_local)) => BudgetBand {
                min_usd: min_local / rate,
                max_usd: max_local / rate,
            },
            None => BudgetBand {
                min_usd: self.min_budget_usd,
                max_usd: self.max_budget_usd,
            },
        };
        if band.min_usd > band.max_usd {
            return Err(ConfigError::InvertedBand {
                min: band.min_usd,
                max: band.max_usd,
            });
        }
        Ok(band)
    }

    /// Fatal checks, run before the first fetch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::ZeroPageBudget);
        }
        self.resolved_band()?;
        for theme in &self.themes {
            if theme.keywords.is_empty() {
                return Err(ConfigError::EmptyTheme(theme.name.clone()));
            }
        }
        Ok(())
    }
}

/// Read seed URLs from a CSV handed over by the sheet-config layer.
/// Accepts a `url` column (any position) or bare first-column URLs; blank
/// cells and `#` comment lines are skipped, order preserved, duplicates
/// dropped.
pub fn seeds_from_csv(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening seeds CSV {}", path.display()))?;

    let mut url_col = 0usize;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("reading seeds CSV {}", path.display()))?;
        if i == 0 {
            if let Some(idx) = rec.iter().position(|c| c.eq_ignore_ascii_case("url")) {
                url_col = idx;
                continue;
            }
        }
        let Some(cell) = rec.get(url_col) else {
            continue;
        };
        let t = cell.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if seen.insert(t.to_string()) {
            out.push(t.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn themes_toml_cleans_and_dedups_keywords() {
        let toml = r#"
            [[themes]]
            name = " Education "
            keywords = [" School ", "school", "", "LITERACY"]
        "#;
        let themes = themes_from_toml_str(toml).unwrap();
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].name, "education");
        assert_eq!(themes[0].keywords, vec!["literacy", "school"]);
        assert_eq!(themes[0].min_hits, 1);
    }

    #[test]
    fn embedded_default_themes_parse() {
        let themes = default_themes();
        let names: Vec<&str> = themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["education", "youth"]);
        assert!(themes.iter().all(|t| !t.keywords.is_empty()));
    }

    #[test]
    fn validate_rejects_inverted_band() {
        let mut cfg = CrawlConfig::asha();
        cfg.min_budget_usd = 50_000.0;
        cfg.max_budget_usd = 30_000.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedBand { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_budget_and_no_seeds() {
        let mut cfg = CrawlConfig::asha();
        cfg.max_pages = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPageBudget)));

        let mut cfg = CrawlConfig::asha();
        cfg.seeds.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoSeeds)));
    }

    #[test]
    fn local_band_overrides_usd_band() {
        let mut cfg = CrawlConfig::asha();
        cfg.local_band = Some((2_500_000.0, 4_200_000.0));
        let band = cfg.resolved_band().unwrap();
        assert!((band.min_usd - 30_120.48).abs() < 0.01);
        assert!((band.max_usd - 50_602.41).abs() < 0.01);
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_rate_is_fatal() {
        let mut cfg = CrawlConfig::asha();
        cfg.exchange.units_per_usd = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadExchangeRate(_))
        ));
    }

    #[test]
    fn band_is_inclusive_at_both_edges() {
        let band = BudgetBand {
            min_usd: 30_000.0,
            max_usd: 50_000.0,
        };
        assert!(band.contains(30_000.0));
        assert!(band.contains(50_000.0));
        assert!(!band.contains(29_999.99));
        assert!(!band.contains(50_000.01));
    }

    #[serial_test::serial]
    #[test]
    fn themes_env_override_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("themes.toml");
        fs::write(
            &p,
            r#"
                [[themes]]
                name = "water"
                min_hits = 2
                keywords = ["well", "sanitation"]
            "#,
        )
        .unwrap();
        std::env::set_var(ENV_THEMES_PATH, p.display().to_string());
        let themes = load_themes_default().unwrap();
        std::env::remove_var(ENV_THEMES_PATH);
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].name, "water");
        assert_eq!(themes[0].min_hits, 2);
    }

    #[test]
    fn seeds_csv_reads_url_column_and_skips_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("seeds.csv");
        fs::write(
            &p,
            "name,url\nfirst,https://example.org/a\n# skip me,\nsecond,https://example.org/b\nsecond again,https://example.org/b\n",
        )
        .unwrap();
        let seeds = seeds_from_csv(&p).unwrap();
        assert_eq!(
            seeds,
            vec![
                "https://example.org/a".to_string(),
                "https://example.org/b".to_string()
            ]
        );
    }

    #[test]
    fn seeds_csv_without_header_uses_first_column() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("seeds.csv");
        fs::write(&p, "https://example.org/a\n\nhttps://example.org/b\n").unwrap();
        let seeds = seeds_from_csv(&p).unwrap();
        assert_eq!(seeds.len(), 2);
    }
}
