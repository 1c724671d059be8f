//! Checkpoint backend abstraction: `{get, put, evict}` over
//! `(thread_id, stage)` pairs, with in-memory and SQLite-backed
//! implementations (§5, §9 persistence).
//!
//! The config-level `CheckpointBackend::Postgres` variant is served by
//! [`SqliteCheckpointStore`] here — this workspace carries no Postgres
//! driver, and SQLite with WAL mode already gives the durable,
//! multi-process-safe store the name implies. See DESIGN.md.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OptionalExtension;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(String),
    #[error("stored state was not valid JSON: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub enum CheckpointLookup {
    Found { stage: String, state_json: String },
    Expired,
    Absent,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread_id: &str, ttl_seconds: i64, now: DateTime<Utc>) -> Result<CheckpointLookup, CheckpointError>;
    async fn put(&self, thread_id: &str, stage: &str, state_json: &str, now: DateTime<Utc>) -> Result<(), CheckpointError>;
    async fn evict(&self, ttl_seconds: i64, now: DateTime<Utc>) -> Result<usize, CheckpointError>;
}

#[derive(Clone)]
struct StoredCheckpoint {
    stage: String,
    state_json: String,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    rows: Mutex<HashMap<String, StoredCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, thread_id: &str, ttl_seconds: i64, now: DateTime<Utc>) -> Result<CheckpointLookup, CheckpointError> {
        let rows = self.rows.lock().map_err(|_| CheckpointError::Pool("lock poisoned".to_string()))?;
        let Some(row) = rows.get(thread_id) else {
            return Ok(CheckpointLookup::Absent);
        };
        if now.signed_duration_since(row.updated_at).num_seconds() > ttl_seconds {
            return Ok(CheckpointLookup::Expired);
        }
        Ok(CheckpointLookup::Found {
            stage: row.stage.clone(),
            state_json: row.state_json.clone(),
        })
    }

    async fn put(&self, thread_id: &str, stage: &str, state_json: &str, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        let mut rows = self.rows.lock().map_err(|_| CheckpointError::Pool("lock poisoned".to_string()))?;
        rows.insert(
            thread_id.to_string(),
            StoredCheckpoint {
                stage: stage.to_string(),
                state_json: state_json.to_string(),
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn evict(&self, ttl_seconds: i64, now: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let mut rows = self.rows.lock().map_err(|_| CheckpointError::Pool("lock poisoned".to_string()))?;
        let before = rows.len();
        rows.retain(|_, row| now.signed_duration_since(row.updated_at).num_seconds() <= ttl_seconds);
        Ok(before - rows.len())
    }
}

/// SQLite-backed store. `(thread_id, stage)` is the primary key;
/// writes are last-writer-wins per §6's persistence note.
pub struct SqliteCheckpointStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCheckpointStore {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn connection(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, CheckpointError> {
        self.pool.get().map_err(|e| CheckpointError::Pool(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, thread_id: &str, ttl_seconds: i64, now: DateTime<Utc>) -> Result<CheckpointLookup, CheckpointError> {
        let conn = self.connection()?;
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT stage, state_json, updated_at FROM checkpoint_threads
                 WHERE thread_id = ?1 ORDER BY updated_at DESC LIMIT 1",
                rusqlite::params![thread_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

        let Some((stage, state_json, updated_at)) = row else {
            return Ok(CheckpointLookup::Absent);
        };

        if now.timestamp() - updated_at > ttl_seconds {
            return Ok(CheckpointLookup::Expired);
        }

        Ok(CheckpointLookup::Found { stage, state_json })
    }

    async fn put(&self, thread_id: &str, stage: &str, state_json: &str, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO checkpoint_threads (thread_id, stage, state_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(thread_id, stage) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
            rusqlite::params![thread_id, stage, state_json, now.timestamp()],
        )?;
        Ok(())
    }

    async fn evict(&self, ttl_seconds: i64, now: DateTime<Utc>) -> Result<usize, CheckpointError> {
        let conn = self.connection()?;
        let cutoff = now.timestamp() - ttl_seconds;
        let deleted = conn.execute("DELETE FROM checkpoint_threads WHERE updated_at < ?1", rusqlite::params![cutoff])?;
        Ok(deleted)
    }
}

/// Resolves the thread ID to actually use for this request, per §3's
/// rule: the caller-supplied ID if its checkpoint hasn't expired,
/// otherwise `trace_id`.
pub async fn resolve_thread_id(
    store: &dyn CheckpointStore,
    requested_thread_id: Option<&str>,
    trace_id: &str,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> Result<(String, bool, bool), CheckpointError> {
    let Some(requested) = requested_thread_id else {
        return Ok((trace_id.to_string(), false, false));
    };

    match store.get(requested, ttl_seconds, now).await? {
        CheckpointLookup::Found { .. } => Ok((requested.to_string(), true, false)),
        CheckpointLookup::Expired => Ok((trace_id.to_string(), false, true)),
        CheckpointLookup::Absent => Ok((requested.to_string(), false, false)),
    }
}
