//! URL/media prefetcher (C3, §4.3): YouTube transcript extraction and
//! article boilerplate removal, used by S1 when the input is a URL.

use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("no transcript available")]
    NoTranscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchSourceType {
    Article,
    Youtube,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchResult {
    pub text: String,
    pub title: String,
    pub source_type: PrefetchSourceType,
    pub url: String,
}

const VIDEO_ID_PATTERNS: &[&str] = &[
    r"(?:v=|/)([0-9A-Za-z_-]{11})",
    r"youtu\.be/([0-9A-Za-z_-]{11})",
    r"embed/([0-9A-Za-z_-]{11})",
];

/// Extracts the 11-character opaque video ID from any recognized
/// YouTube URL shape, or `None` if the URL isn't a video URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    for pattern in VIDEO_ID_PATTERNS {
        let re = Regex::new(pattern).expect("valid regex");
        if let Some(caps) = re.captures(url) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

pub fn is_video_url(url: &str) -> bool {
    extract_video_id(url).is_some()
}

/// Fetches and joins transcript lines for a video, Korean preferred
/// then English. External because transcript retrieval depends on a
/// third-party captions API that isn't part of this workspace's stack.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str, language_preference: &[&str]) -> Result<String, PrefetchError>;
}

/// Default production wiring: no captions API is part of this
/// workspace's stack, so every video URL falls back to the
/// title-only path (§4.3's documented failure mode).
#[derive(Default)]
pub struct NullTranscriptProvider;

#[async_trait]
impl TranscriptProvider for NullTranscriptProvider {
    async fn fetch_transcript(&self, _video_id: &str, _language_preference: &[&str]) -> Result<String, PrefetchError> {
        Err(PrefetchError::NoTranscript)
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn fetch_title_only(client: &reqwest::Client, url: &str) -> String {
    let Ok(response) = client.get(url).timeout(Duration::from_secs(10)).send().await else {
        return url.to_string();
    };
    let Ok(html) = response.text().await else {
        return url.to_string();
    };
    extract_title(&html).unwrap_or_else(|| url.to_string())
}

fn extract_title(html: &str) -> Option<String> {
    let og_title = Regex::new(r#"(?is)<meta[^>]+property=["']og:title["'][^>]+content=["']([^"']+)["']"#)
        .expect("valid regex");
    if let Some(caps) = og_title.captures(html) {
        if let Some(m) = caps.get(1) {
            return Some(normalize_whitespace(m.as_str()));
        }
    }
    let title_tag = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex");
    title_tag
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_whitespace(m.as_str()))
}

/// Prefetches a YouTube URL: fetches the transcript (Korean, then
/// English), falling back to a title-only article-style result if no
/// transcript is available.
pub async fn prefetch_youtube(
    http_client: &reqwest::Client,
    transcripts: &dyn TranscriptProvider,
    url: &str,
) -> PrefetchResult {
    let Some(video_id) = extract_video_id(url) else {
        return PrefetchResult {
            text: String::new(),
            title: url.to_string(),
            source_type: PrefetchSourceType::Youtube,
            url: url.to_string(),
        };
    };

    match transcripts.fetch_transcript(&video_id, &["ko", "en"]).await {
        Ok(text) => {
            let title = fetch_title_only(http_client, url).await;
            PrefetchResult {
                text: normalize_whitespace(&text),
                title,
                source_type: PrefetchSourceType::Youtube,
                url: url.to_string(),
            }
        }
        Err(_) => {
            let title = fetch_title_only(http_client, url).await;
            PrefetchResult {
                text: String::new(),
                title,
                source_type: PrefetchSourceType::Youtube,
                url: url.to_string(),
            }
        }
    }
}

/// Prefetches an article URL: strips markup via `htmd`'s HTML→Markdown
/// conversion (a reasonable proxy for boilerplate removal without a
/// dedicated readability crate), falling back to `og:title`/`<title>`.
pub async fn prefetch_article(http_client: &reqwest::Client, url: &str) -> Result<PrefetchResult, PrefetchError> {
    let response = http_client
        .get(url)
        .timeout(Duration::from_secs(10))
        .header("User-Agent", "Mozilla/5.0 (VeritasBot/1.0; +https://local)")
        .send()
        .await
        .map_err(|e| PrefetchError::Fetch(e.to_string()))?;

    if !response.status().is_success() {
        return Err(PrefetchError::Fetch(format!("status {}", response.status())));
    }

    let html = response.text().await.map_err(|e| PrefetchError::Fetch(e.to_string()))?;
    let title = extract_title(&html).unwrap_or_else(|| url.to_string());

    let markdown = htmd::convert(&html).map_err(|e| PrefetchError::Fetch(e.to_string()))?;
    let text = normalize_whitespace(&markdown);

    Ok(PrefetchResult {
        text,
        title,
        source_type: PrefetchSourceType::Article,
        url: url.to_string(),
    })
}

/// Dispatches `url` to the YouTube or article prefetcher per §4.3.
pub async fn prefetch(
    http_client: &reqwest::Client,
    transcripts: &dyn TranscriptProvider,
    url: &str,
) -> PrefetchResult {
    if is_video_url(url) {
        return prefetch_youtube(http_client, transcripts, url).await;
    }

    match prefetch_article(http_client, url).await {
        Ok(result) => result,
        Err(_) => PrefetchResult {
            text: String::new(),
            title: url.to_string(),
            source_type: PrefetchSourceType::Article,
            url: url.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTranscriptProvider {
        result: Result<String, PrefetchError>,
    }

    #[async_trait]
    impl TranscriptProvider for FixedTranscriptProvider {
        async fn fetch_transcript(&self, _video_id: &str, _language_preference: &[&str]) -> Result<String, PrefetchError> {
            match &self.result {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(PrefetchError::NoTranscript),
            }
        }
    }

    #[test]
    fn extracts_video_id_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_video_id_from_short_url() {
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
    }

    #[test]
    fn non_video_url_has_no_id() {
        assert_eq!(extract_video_id("https://example.com/article/1"), None);
    }

    #[test]
    fn title_extraction_prefers_og_title() {
        let html = r#"<html><head><meta property="og:title" content="Real Title"><title>Fallback</title></head></html>"#;
        assert_eq!(extract_title(html), Some("Real Title".to_string()));
    }

    #[tokio::test]
    async fn youtube_prefetch_with_no_transcript_returns_empty_text() {
        let http_client = reqwest::Client::new();
        let transcripts = FixedTranscriptProvider {
            result: Err(PrefetchError::NoTranscript),
        };
        let result = prefetch_youtube(&http_client, &transcripts, "https://youtu.be/dQw4w9WgXcQ").await;
        assert!(result.text.is_empty());
        assert_eq!(result.source_type, PrefetchSourceType::Youtube);
    }

    #[tokio::test]
    async fn youtube_prefetch_with_transcript_joins_whitespace() {
        let http_client = reqwest::Client::new();
        let transcripts = FixedTranscriptProvider {
            result: Ok("hello   world\nagain".to_string()),
        };
        let result = prefetch_youtube(&http_client, &transcripts, "https://youtu.be/dQw4w9WgXcQ").await;
        assert_eq!(result.text, "hello world again");
    }

    #[tokio::test]
    async fn null_transcript_provider_always_reports_no_transcript() {
        let provider = NullTranscriptProvider;
        let err = provider.fetch_transcript("dQw4w9WgXcQ", &["en"]).await.unwrap_err();
        assert!(matches!(err, PrefetchError::NoTranscript));
    }
}
