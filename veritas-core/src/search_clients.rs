//! External search provider clients (C2, §4.2): one client per
//! provider, each gated by a bounded semaphore, retried with
//! `veritas_common::retry`, and normalized to a common result shape.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use veritas_common::retry::{execute_with_backoff, RetryClassifiable, RetryConfig, RetryError};

#[derive(Debug, thiserror::Error)]
pub enum SearchClientError {
    #[error("http error: {0}")]
    Http(String),
    #[error("rate limited")]
    RateLimited,
    #[error("provider returned an unparseable response")]
    MalformedResponse,
}

impl RetryClassifiable for SearchClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, SearchClientError::Http(_) | SearchClientError::RateLimited)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    pub provider: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, query: &str) -> Result<Vec<NormalizedResult>, SearchClientError>;
}

/// Wraps a [`SearchProvider`] with the concurrency gate, timeout, and
/// retry policy the spec requires, so individual provider
/// implementations only need to know how to call their API.
pub struct GatedSearchClient {
    provider: Arc<dyn SearchProvider>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    retry_config: RetryConfig,
}

impl GatedSearchClient {
    pub fn new(provider: Arc<dyn SearchProvider>, concurrency: usize, timeout: Duration, retry_config: RetryConfig) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            retry_config,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<NormalizedResult>, RetryError<SearchClientError>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| RetryError::Permanent(SearchClientError::Http("semaphore closed".to_string())))?;

        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;
        let query = query.to_string();

        execute_with_backoff(
            move || {
                let provider = Arc::clone(&provider);
                let query = query.clone();
                async move {
                    match tokio::time::timeout(timeout, provider.fetch(&query)).await {
                        Ok(result) => result.map(strip_html_from_results),
                        Err(_) => Err(SearchClientError::Http("request timed out".to_string())),
                    }
                }
            },
            &self.retry_config,
        )
        .await
    }
}

fn strip_tags(value: &str) -> String {
    let re = Regex::new(r"<[^>]+>").expect("valid regex");
    re.replace_all(value, "").trim().to_string()
}

fn strip_html_from_results(results: Vec<NormalizedResult>) -> Vec<NormalizedResult> {
    results
        .into_iter()
        .map(|mut r| {
            r.title = strip_tags(&r.title);
            r.snippet = strip_tags(&r.snippet);
            r
        })
        .collect()
}

#[derive(Deserialize)]
struct NaverItem {
    title: String,
    link: String,
    description: String,
    #[serde(default, rename = "pubDate")]
    pub_date: Option<String>,
}

#[derive(Deserialize)]
struct NaverResponse {
    items: Vec<NaverItem>,
}

const NAVER_BASE_URL: &str = "https://openapi.naver.com";

/// Naver Open API search (`/v1/search/news.json`), credentialed via
/// the `X-Naver-Client-Id`/`X-Naver-Client-Secret` headers.
pub struct NaverSearchProvider {
    http_client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl NaverSearchProvider {
    pub fn new(http_client: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self { http_client, base_url: NAVER_BASE_URL.to_string(), client_id, client_secret }
    }

    /// Points the client at a non-default base URL, for tests.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl SearchProvider for NaverSearchProvider {
    fn name(&self) -> &str {
        "naver"
    }

    async fn fetch(&self, query: &str) -> Result<Vec<NormalizedResult>, SearchClientError> {
        let response = self
            .http_client
            .get(format!("{}/v1/search/news.json", self.base_url.trim_end_matches('/')))
            .query(&[("query", query), ("display", "10")])
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .send()
            .await
            .map_err(|e| SearchClientError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SearchClientError::Http(format!("status {}", response.status())));
        }

        let parsed: NaverResponse = response.json().await.map_err(|_| SearchClientError::MalformedResponse)?;
        Ok(parsed
            .items
            .into_iter()
            .map(|item| NormalizedResult {
                title: item.title,
                url: item.link,
                snippet: item.description,
                published_at: item.pub_date,
                provider: "naver".to_string(),
            })
            .collect())
    }
}

/// DuckDuckGo HTML search (`html.duckduckgo.com/html/`), scraped with
/// a regex rather than a full HTML parser since only the result title
/// and snippet anchors are needed.
const DDG_BASE_URL: &str = "https://html.duckduckgo.com";

pub struct DdgSearchProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl DdgSearchProvider {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client, base_url: DDG_BASE_URL.to_string() }
    }

    /// Points the client at a non-default base URL, for tests.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl SearchProvider for DdgSearchProvider {
    fn name(&self) -> &str {
        "ddg"
    }

    async fn fetch(&self, query: &str) -> Result<Vec<NormalizedResult>, SearchClientError> {
        let response = self
            .http_client
            .get(format!("{}/html/", self.base_url.trim_end_matches('/')))
            .query(&[("q", query)])
            .header("User-Agent", "Mozilla/5.0 (VeritasBot/1.0; +https://local)")
            .send()
            .await
            .map_err(|e| SearchClientError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(SearchClientError::Http(format!("status {}", response.status())));
        }

        let html = response.text().await.map_err(|_| SearchClientError::MalformedResponse)?;
        Ok(parse_ddg_results(&html))
    }
}

fn parse_ddg_results(html: &str) -> Vec<NormalizedResult> {
    let result_re = Regex::new(
        r#"(?is)<a[^>]+class="result__a"[^>]+href="([^"]+)"[^>]*>(.*?)</a>.*?<a[^>]+class="result__snippet"[^>]*>(.*?)</a>"#,
    )
    .expect("valid regex");

    result_re
        .captures_iter(html)
        .map(|caps| NormalizedResult {
            title: strip_tags(&caps[2]),
            url: caps[1].to_string(),
            snippet: strip_tags(&caps[3]),
            published_at: None,
            provider: "ddg".to_string(),
        })
        .collect()
}

/// Dispatches `query` to every configured client in parallel and
/// merges the results by URL, first occurrence wins, per §4.2's
/// ordering rule.
pub async fn run_web_async(clients: &[Arc<GatedSearchClient>], queries: &[String]) -> Vec<NormalizedResult> {
    let mut tasks = Vec::new();
    for client in clients {
        for query in queries {
            let client = Arc::clone(client);
            let query = query.clone();
            tasks.push(tokio::spawn(async move { client.search(&query).await }));
        }
    }

    let mut merged: Vec<NormalizedResult> = Vec::new();
    let mut seen_urls = std::collections::HashSet::new();

    for task in tasks {
        let Ok(outcome) = task.await else { continue };
        let Ok(results) = outcome else { continue };
        for result in results {
            if seen_urls.insert(result.url.clone()) {
                merged.push(result);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        name: String,
        attempts: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl SearchProvider for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, query: &str) -> Result<Vec<NormalizedResult>, SearchClientError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(SearchClientError::RateLimited);
            }
            Ok(vec![NormalizedResult {
                title: "<b>Title</b>".to_string(),
                url: format!("https://example.com/{query}"),
                snippet: "<i>snippet</i>".to_string(),
                published_at: None,
                provider: self.name.clone(),
            }])
        }
    }

    #[tokio::test]
    async fn retries_on_rate_limit_and_eventually_succeeds() {
        let provider = Arc::new(FlakyProvider {
            name: "test-provider".to_string(),
            attempts: AtomicUsize::new(0),
            fail_first_n: 1,
        });
        let client = GatedSearchClient::new(provider, 3, Duration::from_secs(5), RetryConfig::from_seconds(0.01, 3));

        let results = client.search("query").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Title");
    }

    #[tokio::test]
    async fn html_is_stripped_from_title_and_snippet() {
        let provider = Arc::new(FlakyProvider {
            name: "test-provider".to_string(),
            attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let client = GatedSearchClient::new(provider, 1, Duration::from_secs(5), RetryConfig::default());
        let results = client.search("x").await.unwrap();
        assert_eq!(results[0].snippet, "snippet");
    }

    #[tokio::test]
    async fn run_web_async_merges_by_url_first_occurrence_wins() {
        let provider_a = Arc::new(FlakyProvider {
            name: "a".to_string(),
            attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let client_a = Arc::new(GatedSearchClient::new(provider_a, 2, Duration::from_secs(5), RetryConfig::default()));
        let results = run_web_async(&[client_a], &["shared".to_string(), "shared".to_string()]).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn naver_provider_parses_items_and_sends_credential_headers() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/v1/search/news.json"))
            .and(wiremock::matchers::header("X-Naver-Client-Id", "my-id"))
            .and(wiremock::matchers::header("X-Naver-Client-Secret", "my-secret"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"title": "<b>Headline</b>", "link": "https://news.example/a", "description": "body", "pubDate": "Mon, 01 Jan 2024 00:00:00 +0900"},
                ]
            })))
            .mount(&server)
            .await;

        let provider = NaverSearchProvider::new(reqwest::Client::new(), "my-id".to_string(), "my-secret".to_string()).with_base_url(server.uri());
        let results = provider.fetch("query").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Headline");
        assert_eq!(results[0].provider, "naver");
    }

    #[tokio::test]
    async fn naver_provider_maps_429_to_rate_limited() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = NaverSearchProvider::new(reqwest::Client::new(), "id".to_string(), "secret".to_string()).with_base_url(server.uri());
        let err = provider.fetch("query").await.unwrap_err();
        assert!(matches!(err, SearchClientError::RateLimited));
    }

    #[tokio::test]
    async fn ddg_provider_scrapes_result_links_from_html() {
        let server = wiremock::MockServer::start().await;
        let html = r#"<div class="result"><a class="result__a" href="https://example.com/page">Example <b>Result</b></a><a class="result__snippet">a short snippet</a></div>"#;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/html/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let provider = DdgSearchProvider::new(reqwest::Client::new()).with_base_url(server.uri());
        let results = provider.fetch("query").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Example Result");
        assert_eq!(results[0].url, "https://example.com/page");
        assert_eq!(results[0].snippet, "a short snippet");
        assert_eq!(results[0].provider, "ddg");
    }
}
