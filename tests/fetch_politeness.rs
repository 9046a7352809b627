// tests/fetch_politeness.rs
// Fetcher contract against a local mock server: politeness spacing, fixed
// user agent, typed non-2xx errors.

use std::time::{Duration, Instant};

use fundingbot_crawler::config::CrawlConfig;
use fundingbot_crawler::error::FetchErrorKind;
use fundingbot_crawler::fetch::Fetcher;

fn test_config(delay_ms: u64) -> CrawlConfig {
    let mut cfg = CrawlConfig::asha();
    cfg.delay = Duration::from_millis(delay_ms);
    cfg.allowed_domains.clear();
    cfg
}

#[tokio::test]
async fn sequential_fetches_are_spaced_by_delay() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html></html>")
        .expect(3)
        .create_async()
        .await;

    let cfg = test_config(150);
    let fetcher = Fetcher::from_config(&cfg).unwrap();
    let url = format!("{}/page", server.url());

    let started = Instant::now();
    for _ in 0..3 {
        fetcher.get(&url).await.unwrap();
    }
    let elapsed = started.elapsed();

    mock.assert_async().await;
    assert!(
        elapsed >= Duration::from_millis(300),
        "3 fetches with 150ms delay took only {elapsed:?}"
    );
}

#[tokio::test]
async fn fetcher_sends_the_configured_user_agent() {
    let mut server = mockito::Server::new_async().await;
    let cfg = test_config(0);
    let mock = server
        .mock("GET", "/ua")
        .match_header("user-agent", cfg.user_agent.as_str())
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let fetcher = Fetcher::from_config(&cfg).unwrap();
    fetcher.get(&format!("{}/ua", server.url())).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn non_2xx_is_a_typed_error_not_a_panic() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .create_async()
        .await;

    let fetcher = Fetcher::from_config(&test_config(0)).unwrap();
    let url = format!("{}/missing", server.url());
    let err = fetcher.get(&url).await.unwrap_err();
    assert_eq!(err.url, url);
    assert!(matches!(err.kind, FetchErrorKind::Status(404)));
}

#[tokio::test]
async fn network_failure_is_recoverable() {
    // Nothing listens on this port.
    let fetcher = Fetcher::from_config(&test_config(0)).unwrap();
    let err = fetcher.get("http://127.0.0.1:1/nope").await.unwrap_err();
    assert!(matches!(
        err.kind,
        FetchErrorKind::Network(_) | FetchErrorKind::Timeout
    ));
}

#[tokio::test]
async fn final_url_and_content_type_are_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/data.json")
        .with_status(200)
        .with_header("content-type", "application/json; charset=utf-8")
        .with_body("{}")
        .create_async()
        .await;

    let fetcher = Fetcher::from_config(&test_config(0)).unwrap();
    let page = fetcher
        .get(&format!("{}/data.json", server.url()))
        .await
        .unwrap();
    assert_eq!(page.status, 200);
    assert!(page.is_json());
    assert!(!page.is_html());
    assert!(page.url.ends_with("/data.json"));
}
