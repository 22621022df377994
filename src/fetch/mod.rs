//! Fetch-and-classify pipeline.
//!
//! A URL is tried as a feed (when its path looks like one), then as a
//! Statuspage JSON API, then as a plain HTML page. Every failed stage leaves
//! a note in the trail; only a transport failure of the final HTML stage
//! surfaces as `ConnectionError`.

pub mod feed;
pub mod html;
pub mod json_api;

use crate::models::{FetchOutcome, Incident, Maintenance, StatusLevel};
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("statusboard/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const SUMMARY_PATH: &str = "/api/v2/summary.json";
const JSON_ACCEPT: &str = "application/json";
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml";

/// What a single format classifier concluded.
#[derive(Debug, Clone)]
pub struct Classification {
    pub level: StatusLevel,
    pub label: String,
    pub incidents: Vec<Incident>,
    pub maintenances: Vec<Maintenance>,
    pub note: String,
}

pub(crate) fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

/// Non-terminal stages, tried in order before the HTML fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Feed,
    JsonApi,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Feed => "RSS/Atom",
            Stage::JsonApi => "JSON API",
        }
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Feed(#[from] feed::FeedError),
}

/// HTTP client plus the fallback chain.
#[derive(Debug, Clone)]
pub struct StatusFetcher {
    client: Client,
    timeout: Duration,
}

impl StatusFetcher {
    /// Builds a client with the crate user agent. Proxy settings come from
    /// the environment.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(StatusFetcher { client, timeout })
    }

    /// Classifies `raw_url`. Never fails: problems become `ParseError` or
    /// `ConnectionError` outcomes. The whole chain is bounded by the
    /// fetcher's timeout.
    pub async fn fetch(&self, raw_url: &str) -> FetchOutcome {
        match rocket::tokio::time::timeout(self.timeout, self.run_chain(raw_url)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let reason = format!("timed out after {}s", self.timeout.as_secs_f32());
                warn!("Fetch of {raw_url} {reason}");
                FetchOutcome::failure(
                    StatusLevel::ConnectionError,
                    raw_url,
                    format!("Connection error: {reason}"),
                    reason,
                )
            }
        }
    }

    async fn run_chain(&self, raw_url: &str) -> FetchOutcome {
        let url = match parse_target(raw_url) {
            Ok(url) => url,
            Err(reason) => {
                return FetchOutcome::failure(
                    StatusLevel::ParseError,
                    raw_url,
                    format!("Invalid URL: {reason}"),
                    reason,
                );
            }
        };

        let mut trail = Vec::new();
        for stage in plan(&url) {
            match self.attempt(stage, &url).await {
                Ok((classification, source)) => {
                    return finish(classification, &source, trail);
                }
                Err(err) => {
                    debug!("{} stage failed for {url}: {err}", stage.name());
                    trail.push(format!("{} fetch failed: {err}", stage.name()));
                }
            }
        }

        match self.get(&url, None).await {
            Ok(body) => {
                let classification = html::classify(&String::from_utf8_lossy(&body));
                finish(classification, &url, trail)
            }
            Err(err) => {
                warn!("Connection error for {url}: {err}");
                trail.push(format!("Connection error: {err}"));
                FetchOutcome::failure(
                    StatusLevel::ConnectionError,
                    url.as_str(),
                    trail.join("; "),
                    err.to_string(),
                )
            }
        }
    }

    async fn attempt(
        &self,
        stage: Stage,
        url: &Url,
    ) -> Result<(Classification, Url), AttemptError> {
        match stage {
            Stage::Feed => {
                let body = self.get(url, Some(FEED_ACCEPT)).await?;
                Ok((feed::classify(&body, Utc::now())?, url.clone()))
            }
            Stage::JsonApi => {
                let api_url = summary_url(url);
                let body = self.get(&api_url, Some(JSON_ACCEPT)).await?;
                Ok((json_api::classify(&body, Utc::now())?, api_url))
            }
        }
    }

    async fn get(&self, url: &Url, accept: Option<&str>) -> Result<Vec<u8>, AttemptError> {
        let mut request = self.client.get(url.clone());
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(AttemptError::Status(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn finish(classification: Classification, source: &Url, mut trail: Vec<String>) -> FetchOutcome {
    trail.push(classification.note);
    FetchOutcome {
        level: classification.level,
        label: classification.label,
        checked_at: Utc::now(),
        incidents: classification.incidents,
        maintenances: classification.maintenances,
        source_url: source.to_string(),
        parse_note: trail.join("; "),
        error: None,
    }
}

fn parse_target(raw_url: &str) -> Result<Url, String> {
    let url = Url::parse(raw_url.trim()).map_err(|err| err.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

fn plan(url: &Url) -> Vec<Stage> {
    let mut stages = Vec::with_capacity(2);
    if is_feed_path(url.path()) {
        stages.push(Stage::Feed);
    }
    stages.push(Stage::JsonApi);
    stages
}

fn is_feed_path(path: &str) -> bool {
    let path = path.to_lowercase();
    path.ends_with(".rss")
        || path.ends_with(".xml")
        || ["/rss", "/feed", "/atom"]
            .iter()
            .any(|marker| path.contains(marker))
}

/// Same scheme and host, path replaced with the Statuspage summary endpoint.
fn summary_url(url: &Url) -> Url {
    if url.path() == SUMMARY_PATH {
        return url.clone();
    }
    let mut api = url.clone();
    api.set_path(SUMMARY_PATH);
    api.set_query(None);
    api.set_fragment(None);
    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Route, closed_port, serve, serve_silently};

    fn fetcher() -> StatusFetcher {
        StatusFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn feed_paths_are_detected() {
        for path in ["/history.rss", "/feed.xml", "/rss", "/x/feed", "/atom/all", "/History.RSS"] {
            assert!(is_feed_path(path), "{path}");
        }
        for path in ["/", "/status", "/api/v2/summary.json"] {
            assert!(!is_feed_path(path), "{path}");
        }
    }

    #[test]
    fn summary_url_keeps_scheme_and_host() {
        let url = Url::parse("https://status.example.com:8443/incidents?page=2#top").unwrap();
        assert_eq!(
            summary_url(&url).as_str(),
            "https://status.example.com:8443/api/v2/summary.json"
        );
        let already = Url::parse("http://status.example.com/api/v2/summary.json").unwrap();
        assert_eq!(summary_url(&already), already);
    }

    #[tokio::test]
    async fn malformed_url_is_a_parse_error_without_io() {
        let outcome = fetcher().fetch("::not a url").await;
        assert_eq!(outcome.level, StatusLevel::ParseError);
        assert!(outcome.parse_note.starts_with("Invalid URL"));
        assert!(outcome.error.is_some());

        let outcome = fetcher().fetch("ftp://status.example.com").await;
        assert_eq!(outcome.level, StatusLevel::ParseError);
    }

    #[tokio::test]
    async fn json_api_is_preferred() {
        let addr = serve(vec![
            Route::json(SUMMARY_PATH, r#"{"status":{"indicator":"minor","description":"Slow"}}"#),
            Route::html("/", "<h1>All Systems Operational</h1>"),
        ])
        .await;
        let outcome = fetcher().fetch(&format!("http://{addr}/")).await;
        assert_eq!(outcome.level, StatusLevel::Degraded);
        assert_eq!(outcome.label, "Slow");
        assert!(outcome.source_url.ends_with(SUMMARY_PATH));
        assert_eq!(outcome.parse_note, "Parsed Statuspage JSON API");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_html_with_a_trail() {
        let addr = serve(vec![Route::html(
            "/status",
            "<html><body><h1>All Systems Operational</h1></body></html>",
        )])
        .await;
        let outcome = fetcher().fetch(&format!("http://{addr}/status")).await;
        assert_eq!(outcome.level, StatusLevel::Operational);
        assert_eq!(
            outcome.parse_note,
            "JSON API fetch failed: HTTP 404 Not Found; Parsed HTML fallback"
        );
        assert!(outcome.source_url.ends_with("/status"));
    }

    #[tokio::test]
    async fn html_without_keywords_is_a_parse_error() {
        let addr = serve(vec![Route::html("/", "<p>Hello there</p>")]).await;
        let outcome = fetcher().fetch(&format!("http://{addr}/")).await;
        assert_eq!(outcome.level, StatusLevel::ParseError);
        assert!(outcome.parse_note.ends_with(html::NO_KEYWORDS_NOTE));
    }

    #[tokio::test]
    async fn feed_urls_are_tried_first() {
        let feed = "<rss><channel><item><title>Major outage affecting logins</title>\
                    </item></channel></rss>";
        let addr = serve(vec![
            Route::xml("/history.rss", feed),
            Route::json(SUMMARY_PATH, r#"{"status":{"indicator":"none"}}"#),
        ])
        .await;
        let outcome = fetcher().fetch(&format!("http://{addr}/history.rss")).await;
        assert_eq!(outcome.level, StatusLevel::MajorDisruption);
        assert_eq!(outcome.label, "Major outage affecting logins");
        assert_eq!(outcome.parse_note, "Parsed RSS feed");
    }

    #[tokio::test]
    async fn broken_feed_falls_through_to_json() {
        let addr = serve(vec![
            Route::html("/feed", "<html><body>not a feed</body></html>"),
            Route::json(SUMMARY_PATH, r#"{"status":{"indicator":"none"}}"#),
        ])
        .await;
        let outcome = fetcher().fetch(&format!("http://{addr}/feed")).await;
        assert_eq!(outcome.level, StatusLevel::Operational);
        assert_eq!(
            outcome.parse_note,
            "RSS/Atom fetch failed: failed to parse as RSS or Atom feed; Parsed Statuspage JSON API"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let port = closed_port().await;
        let outcome = fetcher().fetch(&format!("http://127.0.0.1:{port}/")).await;
        assert_eq!(outcome.level, StatusLevel::ConnectionError);
        assert!(outcome.parse_note.contains("JSON API fetch failed"));
        assert!(outcome.parse_note.contains("Connection error"));
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn deadline_is_a_connection_error() {
        let addr = serve_silently().await;
        let fetcher = StatusFetcher::new(Duration::from_millis(300)).unwrap();
        let outcome = fetcher.fetch(&format!("http://{addr}/")).await;
        assert_eq!(outcome.level, StatusLevel::ConnectionError);
        assert!(outcome.error.is_some());
    }
}
