//! Hybrid lexical + vector retrieval over the pre-embedded corpus (C1,
//! §4.1). The corpus lives in the same kind of SQLite store as the
//! checkpoint backend (see `veritas_common::db`), with `wiki_pages`/
//! `wiki_chunks` tables and embeddings stored as serialized `f32`
//! blobs rather than a dedicated vector column, since this is SQLite
//! and not pgvector.

use std::sync::Arc;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::SearchMode;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// Embeds text for the retrieval backend's missing-embedding backfill.
/// A separate trait from the LLM call layer's clients because it is
/// called from a different concern (corpus maintenance, not a pipeline
/// stage) and is easiest to fake in retrieval tests on its own.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

#[derive(serde::Deserialize)]
struct EmbeddingResponseRow {
    embedding: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseRow>,
}

/// Calls an OpenAI-compatible `/embeddings` endpoint — the same
/// primary base URL the LLM call layer targets, just a different
/// route, so a local Ollama-style server serves both.
pub struct HttpEmbeddingClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(http_client: reqwest::Client, base_url: String, model: String) -> Self {
        Self { http_client, base_url, model }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[derive(Debug, Clone)]
pub struct WikiChunkHit {
    pub page_id: i64,
    pub chunk_id: i64,
    pub chunk_idx: i64,
    pub title: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalDebug {
    pub mode_used: String,
    pub candidate_count: usize,
    pub embedded_on_demand: usize,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub candidates: Vec<WikiChunkHit>,
    pub hits: Vec<WikiChunkHit>,
    pub prompt_context: String,
    pub debug: RetrievalDebug,
}

pub struct RetrievalBackend {
    pool: Pool<SqliteConnectionManager>,
    embedder: Arc<dyn EmbeddingClient>,
    embed_missing: bool,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let cosine_similarity = (dot / (norm_a * norm_b)) as f64;
    (1.0 - cosine_similarity).clamp(0.0, 2.0)
}

/// Combines vector similarity, a full-text rank, and an exact
/// title-token match per the hybrid scoring formula in §4.1.
pub fn hybrid_score(vec_distance: Option<f64>, fts_rank: Option<f64>, title_matches: bool) -> f64 {
    let vec = vec_distance.map(|dist| 1.0 / (1.0 + dist)).unwrap_or(0.0);
    let fts_boost = fts_rank.map(|rank| 0.3 * (2.0 * rank).min(1.0)).unwrap_or(0.0);
    let title_boost = if title_matches { 0.2 } else { 0.0 };
    (vec + fts_boost + title_boost).min(1.0)
}

/// `mode=auto` heuristic from §4.1: a query is treated as descriptive
/// (routed to `vector`) once it has at least three tokens; anything
/// shorter is routed to `lexical`.
fn choose_auto_mode(question: &str, embeddings_exist: bool) -> SearchMode {
    let token_count = question.split_whitespace().count();
    if token_count >= 3 && embeddings_exist {
        SearchMode::Vector
    } else {
        SearchMode::Lexical
    }
}

fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl RetrievalBackend {
    pub fn new(pool: Pool<SqliteConnectionManager>, embedder: Arc<dyn EmbeddingClient>, embed_missing: bool) -> Self {
        Self {
            pool,
            embedder,
            embed_missing,
        }
    }

    fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, RetrievalError> {
        self.pool.get().map_err(|e| RetrievalError::Pool(e.to_string()))
    }

    /// Checks out a pooled connection and confirms WAL mode is still in
    /// effect, the same pragma `veritas_common::db::initialize_pool`
    /// verifies at startup. Used by the `/healthz` route.
    pub fn check_connectivity(&self) -> Result<(), RetrievalError> {
        let conn = self.connection()?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode != "wal" {
            return Err(RetrievalError::Pool(format!("WAL mode not enabled (got: {journal_mode})")));
        }
        Ok(())
    }

    /// Embeds any chunk in `page_ids` (or the whole corpus, if `None`)
    /// missing an embedding, then persists the vectors. Returns the
    /// number of chunks embedded.
    pub async fn embed_missing_chunks(&self, page_ids: Option<&[i64]>, limit: usize) -> Result<usize, RetrievalError> {
        if !self.embed_missing {
            return Ok(0);
        }

        let rows: Vec<(i64, String)> = {
            let conn = self.connection()?;
            let mut stmt = conn.prepare(
                "SELECT chunk_id, content FROM wiki_chunks
                 WHERE embedding IS NULL
                 AND (?1 IS NULL OR page_id IN (SELECT value FROM json_each(?1)))
                 LIMIT ?2",
            )?;
            let page_ids_json = page_ids.map(|ids| serde_json::to_string(ids).unwrap_or_default());
            stmt.query_map(rusqlite::params![page_ids_json, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<_, _>>()?
        };

        if rows.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = rows.iter().map(|(_, content)| content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let conn = self.connection()?;
        for ((chunk_id, _), embedding) in rows.iter().zip(embeddings.iter()) {
            conn.execute(
                "UPDATE wiki_chunks SET embedding = ?1 WHERE chunk_id = ?2",
                rusqlite::params![serialize_embedding(embedding), chunk_id],
            )?;
        }

        Ok(rows.len())
    }

    /// Fetches a ±`window` neighbor expansion around `chunk_idx` within
    /// the same page, truncated to `max_chars` total content.
    fn fetch_window(&self, page_id: i64, chunk_idx: i64, window: i64, max_chars: usize) -> Result<String, RetrievalError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT content FROM wiki_chunks
             WHERE page_id = ?1 AND chunk_idx BETWEEN ?2 AND ?3
             ORDER BY chunk_idx ASC",
        )?;
        let rows: Vec<String> = stmt
            .query_map(
                rusqlite::params![page_id, chunk_idx - window, chunk_idx + window],
                |row| row.get(0),
            )?
            .collect::<Result<_, _>>()?;

        let mut joined = rows.join(" ");
        joined.truncate(max_chars);
        Ok(joined)
    }

    pub async fn search(
        &self,
        question: &str,
        top_k: usize,
        page_ids: Option<&[i64]>,
        window: i64,
        max_chars: usize,
        mode: SearchMode,
    ) -> Result<SearchResult, RetrievalError> {
        let embeddings_exist = self.any_embeddings_exist()?;
        let resolved_mode = match mode {
            SearchMode::Auto => choose_auto_mode(question, embeddings_exist),
            other => other,
        };

        let mut embedded_on_demand = 0;
        if self.embed_missing && matches!(resolved_mode, SearchMode::Vector) {
            embedded_on_demand = self.embed_missing_chunks(page_ids, 128).await?;
        }

        let query_embedding = if matches!(resolved_mode, SearchMode::Vector) {
            self.embedder.embed(std::slice::from_ref(&question.to_string())).await?.into_iter().next()
        } else {
            None
        };

        let rows = self.fetch_candidate_rows(page_ids)?;

        let mut scored: Vec<(WikiChunkHit, f64, i64)> = rows
            .into_iter()
            .map(|row| {
                let vec_distance = match (&query_embedding, &row.embedding) {
                    (Some(q), Some(e)) => Some(cosine_distance(q, e)),
                    _ => None,
                };
                let title_matches = question
                    .split_whitespace()
                    .any(|token| row.title.eq_ignore_ascii_case(token));
                let score = match resolved_mode {
                    SearchMode::Vector => hybrid_score(vec_distance, None, title_matches),
                    _ => hybrid_score(None, Some(lexical_rank(question, &row.content)), title_matches),
                };
                (
                    WikiChunkHit {
                        page_id: row.page_id,
                        chunk_id: row.chunk_id,
                        chunk_idx: row.chunk_idx,
                        title: row.title,
                        content: row.content,
                        score,
                    },
                    score,
                    row.chunk_idx,
                )
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });

        let candidates: Vec<WikiChunkHit> = scored.into_iter().take(top_k).map(|(hit, _, _)| hit).collect();

        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let expanded = self.fetch_window(candidate.page_id, candidate.chunk_idx, window, max_chars)?;
            hits.push(WikiChunkHit {
                content: expanded,
                ..candidate.clone()
            });
        }

        let prompt_context = hits
            .iter()
            .map(|hit| format!("[{}] {}", hit.title, hit.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(SearchResult {
            debug: RetrievalDebug {
                mode_used: format!("{resolved_mode:?}"),
                candidate_count: candidates.len(),
                embedded_on_demand,
            },
            candidates,
            hits,
            prompt_context,
        })
    }

    fn any_embeddings_exist(&self) -> Result<bool, RetrievalError> {
        let conn = self.connection()?;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM wiki_chunks WHERE embedding IS NOT NULL LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    fn fetch_candidate_rows(&self, page_ids: Option<&[i64]>) -> Result<Vec<CandidateRow>, RetrievalError> {
        let conn = self.connection()?;
        let page_ids_json = page_ids.map(|ids| serde_json::to_string(ids).unwrap_or_default());
        let mut stmt = conn.prepare(
            "SELECT c.page_id, c.chunk_id, c.chunk_idx, p.title, c.content, c.embedding
             FROM wiki_chunks c JOIN wiki_pages p ON p.page_id = c.page_id
             WHERE ?1 IS NULL OR c.page_id IN (SELECT value FROM json_each(?1))",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![page_ids_json], |row| {
                let embedding_bytes: Option<Vec<u8>> = row.get(5)?;
                Ok(CandidateRow {
                    page_id: row.get(0)?,
                    chunk_id: row.get(1)?,
                    chunk_idx: row.get(2)?,
                    title: row.get(3)?,
                    content: row.get(4)?,
                    embedding: embedding_bytes.map(|bytes| deserialize_embedding(&bytes)),
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }
}

struct CandidateRow {
    page_id: i64,
    chunk_id: i64,
    chunk_idx: i64,
    title: String,
    content: String,
    embedding: Option<Vec<f32>>,
}

/// Crude lexical rank in `[0, 1]`: share of query tokens present in the
/// content. A stand-in for a server-side FTS rank when the corpus has
/// no FTS5 index configured.
fn lexical_rank(question: &str, content: &str) -> f64 {
    let content_lower = content.to_lowercase();
    let tokens: Vec<&str> = question.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| content_lower.contains(&t.to_lowercase())).count();
    hits as f64 / tokens.len() as f64
}

pub fn ensure_corpus_schema(conn: &rusqlite::Connection) -> Result<(), RetrievalError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS wiki_pages (
            page_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS wiki_chunks (
            chunk_id INTEGER PRIMARY KEY,
            page_id INTEGER NOT NULL REFERENCES wiki_pages(page_id),
            chunk_idx INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB
        );",
    )?;
    Ok(())
}

#[allow(dead_code)]
fn unused_debug_value() -> Value {
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritas_common::db::initialize_pool;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    fn seeded_backend() -> RetrievalBackend {
        let dir = tempfile::tempdir().unwrap();
        let pool = initialize_pool(&dir.path().join("corpus.db"), 4).unwrap();
        {
            let conn = pool.get().unwrap();
            ensure_corpus_schema(&conn).unwrap();
            conn.execute("INSERT INTO wiki_pages (page_id, title) VALUES (1, 'Hinton')", [])
                .unwrap();
            conn.execute(
                "INSERT INTO wiki_chunks (chunk_id, page_id, chunk_idx, content, embedding) VALUES (1, 1, 0, 'Hinton won the prize', ?1)",
                rusqlite::params![serialize_embedding(&[1.0, 0.0, 0.0])],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO wiki_chunks (chunk_id, page_id, chunk_idx, content, embedding) VALUES (2, 1, 1, 'more context about Hinton', NULL)",
                [],
            )
            .unwrap();
        }
        std::mem::forget(dir); // keep db file alive for the pool's lifetime in this test
        RetrievalBackend::new(pool, Arc::new(FixedEmbedder), true)
    }

    #[test]
    fn cosine_distance_is_zero_for_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn hybrid_score_is_bounded_by_one() {
        assert!(hybrid_score(Some(0.0), Some(1.0), true) <= 1.0);
    }

    #[test]
    fn auto_mode_without_embeddings_falls_back_to_lexical() {
        assert_eq!(choose_auto_mode("a descriptive multi word query", false), SearchMode::Lexical);
    }

    #[test]
    fn auto_mode_with_embeddings_and_enough_tokens_uses_vector() {
        assert_eq!(choose_auto_mode("a descriptive multi word query", true), SearchMode::Vector);
    }

    #[tokio::test]
    async fn search_returns_window_expanded_hits() {
        let backend = seeded_backend();
        let result = backend
            .search("Hinton prize", 5, None, 1, 2000, SearchMode::Vector)
            .await
            .unwrap();
        assert!(!result.hits.is_empty());
        assert!(result.hits[0].content.contains("context"));
    }

    #[tokio::test]
    async fn embed_missing_chunks_fills_null_embeddings() {
        let backend = seeded_backend();
        let embedded = backend.embed_missing_chunks(None, 10).await.unwrap();
        assert_eq!(embedded, 1);
    }

    #[tokio::test]
    async fn http_embedding_client_posts_model_and_input_and_parses_rows() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/embeddings"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["a", "b"],
            })))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [1.0, 0.0]},
                    {"embedding": [0.0, 1.0]},
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::new(reqwest::Client::new(), server.uri(), "text-embedding-3-small".to_string());
        let vectors = client.embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
