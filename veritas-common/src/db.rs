//! SQLite connection pooling and pragma tuning, shared by the corpus
//! retrieval store and the checkpoint store.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
}

/// Initializes a pool with WAL mode and the performance pragmas below
/// applied to every connection on acquisition.
///
/// Pragmas: `journal_mode=WAL`, `synchronous=NORMAL`, `foreign_keys=ON`,
/// `cache_size=-32000` (32MB), `temp_store=MEMORY`,
/// `auto_vacuum=INCREMENTAL`, `mmap_size=1GB`, `busy_timeout=5000`.
pub fn initialize_pool(db_path: &Path, pool_size: u32) -> Result<Pool<SqliteConnectionManager>> {
    let manager = SqliteConnectionManager::file(db_path);

    let pool = Pool::builder()
        .max_size(pool_size)
        .min_idle(Some(1))
        .connection_customizer(Box::new(ConnectionCustomizer))
        .test_on_check_out(true)
        .build(manager)
        .map_err(|e| DbError::Pool(format!("failed to create connection pool: {e}")))?;

    let conn = pool
        .get()
        .map_err(|e| DbError::Pool(format!("failed to get initial connection: {e}")))?;
    verify_pragmas(&conn)?;

    Ok(pool)
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -32000;
             PRAGMA temp_store = MEMORY;
             PRAGMA auto_vacuum = INCREMENTAL;
             PRAGMA mmap_size = 1073741824;
             PRAGMA busy_timeout = 5000;",
        )
    }
}

fn verify_pragmas(conn: &Connection) -> Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if journal_mode != "wal" {
        return Err(DbError::Pool(format!(
            "WAL mode not enabled (got: {journal_mode})"
        )));
    }

    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    if foreign_keys != 1 {
        return Err(DbError::Pool(
            "foreign key enforcement not enabled".to_string(),
        ));
    }

    Ok(())
}

/// Creates the checkpoint-threads table if it doesn't already exist.
/// `(thread_id, stage)` is the primary key; `updated_at` drives TTL
/// eviction.
pub fn ensure_checkpoint_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS checkpoint_threads (
            thread_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            state_json TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (thread_id, stage)
        );",
    )?;
    Ok(())
}

/// Creates the analysis-results table if it doesn't already exist.
/// `analysis_id` is the primary key; `response_json` is the full
/// serialized `TruthCheckResponse`.
pub fn ensure_analysis_results_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS analysis_results (
            analysis_id TEXT PRIMARY KEY,
            response_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_pool_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = initialize_pool(&db_path, 5).unwrap();
        assert_eq!(pool.max_size(), 5);
    }

    #[test]
    fn pragmas_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = initialize_pool(&db_path, 5).unwrap();
        let conn = pool.get().unwrap();

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }

    #[test]
    fn analysis_results_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("results.db");
        let pool = initialize_pool(&db_path, 2).unwrap();
        let conn = pool.get().unwrap();
        ensure_analysis_results_schema(&conn).unwrap();
        ensure_analysis_results_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='analysis_results'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn checkpoint_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("checkpoints.db");
        let pool = initialize_pool(&db_path, 2).unwrap();
        let conn = pool.get().unwrap();
        ensure_checkpoint_schema(&conn).unwrap();
        ensure_checkpoint_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='checkpoint_threads'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn concurrent_inserts_from_multiple_threads_all_land() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = Arc::new(initialize_pool(&db_path, 10).unwrap());

        {
            let conn = pool.get().unwrap();
            conn.execute("CREATE TABLE t (id INTEGER)", []).unwrap();
        }

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let conn = pool.get().unwrap();
                    conn.execute("INSERT INTO t (id) VALUES (?1)", rusqlite::params![i])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let conn = pool.get().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 10);
    }
}
