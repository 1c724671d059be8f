//! Request/response shapes for the auxiliary retrieval endpoints
//! (`/api/wiki/search`, `/api/wiki/keyword-search`, `/api/rag/wiki/search`,
//! `/wiki/rag-stream`). These sit alongside the main verification surface
//! and expose the corpus retrieval backend (C1) directly to callers.

use serde::{Deserialize, Serialize};

fn default_top_k() -> usize {
    10
}

fn default_window() -> usize {
    1
}

fn default_max_chars() -> usize {
    2000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Auto,
    Lexical,
    Fts,
    Vector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSearchRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub page_ids: Option<Vec<i64>>,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub mode: Option<SearchMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiChunkHit {
    pub page_id: i64,
    pub chunk_id: i64,
    pub chunk_idx: i64,
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiSearchResponse {
    pub candidates: Vec<WikiChunkHit>,
    pub hits: Vec<WikiChunkHit>,
    pub prompt_context: String,
    #[serde(default)]
    pub debug: Option<serde_json::Value>,
}

/// `/api/wiki/keyword-search` — title/keyword substring search, cheaper
/// than the hybrid lexical+vector path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiKeywordSearchRequest {
    pub keyword: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiKeywordSearchResponse {
    pub pages: Vec<WikiPageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPageSummary {
    pub page_id: i64,
    pub title: String,
}

/// `/api/rag/wiki/search` — assembles a context string for a downstream
/// generation model from the top-K wiki hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchRequest {
    pub question: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSearchResponse {
    pub context: String,
    pub sources: Vec<WikiPageSummary>,
}

/// `/wiki/rag-stream` — ndjson stream: a `sources` preamble line followed
/// by generation-token lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RagStreamLine {
    Sources { sources: Vec<WikiPageSummary> },
    Token { text: String },
    Done,
}

impl RagStreamLine {
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}
