//! Analysis-result persistence (§6): `analysis_results` keyed by
//! `analysis_id`. A save failure never aborts the response — the
//! orchestrator appends `PERSISTENCE_FAILED` to `risk_flags` instead
//! (§7). Mirrors [`crate::checkpoint`]'s store abstraction.

use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use veritas_common::error::PersistenceError;
use veritas_protocol::response::TruthCheckResponse;

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, response: &TruthCheckResponse) -> Result<(), PersistenceError>;
}

/// No-op store for deployments with `checkpoint_backend=none`-style
/// persistence disabled.
#[derive(Default)]
pub struct NullResultStore;

#[async_trait]
impl ResultStore for NullResultStore {
    async fn save(&self, _response: &TruthCheckResponse) -> Result<(), PersistenceError> {
        Ok(())
    }
}

pub struct SqliteResultStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteResultStore {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, response: &TruthCheckResponse) -> Result<(), PersistenceError> {
        let conn = self.pool.get().map_err(|e| PersistenceError(e.to_string()))?;
        let response_json = serde_json::to_string(response).map_err(|e| PersistenceError(e.to_string()))?;
        conn.execute(
            "INSERT INTO analysis_results (analysis_id, response_json, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(analysis_id) DO UPDATE SET response_json = excluded.response_json",
            rusqlite::params![response.analysis_id, response_json, Utc::now().timestamp()],
        )
        .map_err(|e| PersistenceError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritas_common::db::{ensure_analysis_results_schema, initialize_pool};
    use veritas_protocol::response::{Label, ModelInfo};

    fn sample_response() -> TruthCheckResponse {
        TruthCheckResponse {
            analysis_id: "analysis-1".to_string(),
            label: Label::True,
            confidence: 0.9,
            summary: "summary".to_string(),
            model_info: ModelInfo {
                provider: "openai-compatible".to_string(),
                model: "test-model".to_string(),
                version: "1".to_string(),
            },
            latency_ms: 10,
            cost_usd: 0.0,
            created_at: Utc::now(),
            rationale: Vec::new(),
            citations: Vec::new(),
            counter_evidence: Vec::new(),
            limitations: Vec::new(),
            recommended_next_steps: Vec::new(),
            risk_flags: Vec::new(),
            stage_logs: Vec::new(),
            stage_outputs: Default::default(),
            stage_full_outputs: None,
            checkpoint_thread_id: None,
            checkpoint_resumed: None,
            checkpoint_expired: None,
        }
    }

    #[tokio::test]
    async fn null_store_always_succeeds() {
        let store = NullResultStore;
        assert!(store.save(&sample_response()).await.is_ok());
    }

    #[tokio::test]
    async fn sqlite_store_upserts_by_analysis_id() {
        let dir = tempfile::tempdir().unwrap();
        let pool = initialize_pool(&dir.path().join("results.db"), 2).unwrap();
        {
            let conn = pool.get().unwrap();
            ensure_analysis_results_schema(&conn).unwrap();
        }
        let store = SqliteResultStore::new(pool);
        let mut response = sample_response();
        store.save(&response).await.unwrap();
        response.summary = "updated".to_string();
        store.save(&response).await.unwrap();

        let conn = store.pool.get().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
