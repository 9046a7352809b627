// src/fetch.rs
//! Polite HTTP fetcher: one client per run with a fixed identifying user
//! agent and timeout, minimum spacing between consecutive fetches, and
//! typed per-request errors the caller can skip on.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::debug;

use crate::config::CrawlConfig;
use crate::error::{CrawlError, FetchError, FetchErrorKind};

/// One fetched page, body already read.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    /// Content-Type is matched case-insensitively; servers that omit the
    /// header fall back to sniffing the body.
    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => ct.to_ascii_lowercase().contains("text/html"),
            None => self.body.trim_start().starts_with('<'),
        }
    }

    pub fn is_json(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => ct.to_ascii_lowercase().contains("json"),
            None => matches!(self.body.trim_start().chars().next(), Some('{' | '[')),
        }
    }
}

pub struct Fetcher {
    client: reqwest::Client,
    delay: Duration,
    last_fetch: Mutex<Option<Instant>>,
}

impl Fetcher {
    pub fn from_config(cfg: &CrawlConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()
            .map_err(CrawlError::Client)?;
        Ok(Self {
            client,
            delay: cfg.delay,
            last_fetch: Mutex::new(None),
        })
    }

    /// GET one URL. Non-2xx, network and timeout failures come back as
    /// `FetchError`; the caller decides whether to skip or stop.
    pub async fn get(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.pause_for_politeness().await;

        let started = Instant::now();
        let result = self.get_inner(url).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;
        histogram!("crawl_fetch_duration_ms").record(elapsed_ms);

        match &result {
            Ok(page) => {
                counter!("crawl_pages_fetched_total").increment(1);
                debug!(target: "crawl::fetch", url, status = page.status, elapsed_ms, "fetched");
            }
            Err(e) => {
                counter!("crawl_fetch_errors_total").increment(1);
                debug!(target: "crawl::fetch", url, error = %e, "fetch failed");
            }
        }
        result
    }

    async fn get_inner(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| FetchError {
            url: url.to_string(),
            kind: if e.is_timeout() {
                FetchErrorKind::Timeout
            } else {
                FetchErrorKind::Network(e)
            },
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError {
                url: url.to_string(),
                kind: FetchErrorKind::Status(status.as_u16()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| FetchError {
            url: url.to_string(),
            kind: if e.is_timeout() {
                FetchErrorKind::Timeout
            } else {
                FetchErrorKind::BodyRead(e)
            },
        })?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    /// Sleep whatever remains of `delay` since the previous fetch started.
    /// First fetch goes out immediately.
    async fn pause_for_politeness(&self) {
        let wait = {
            let guard = self.last_fetch.lock().expect("fetch clock mutex poisoned");
            guard.map(|last| self.delay.saturating_sub(last.elapsed()))
        };
        if let Some(wait) = wait {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        let mut guard = self.last_fetch.lock().expect("fetch clock mutex poisoned");
        *guard = Some(Instant::now());
    }
}
