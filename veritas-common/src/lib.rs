#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Ambient stack shared by the pipeline and the HTTP surface:
//! configuration, error taxonomy, SQLite pooling, retry/backoff,
//! timing macros, and bounded observability accumulators.

pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod retry;
pub mod timing;

pub use config::{AppConfig, CheckpointBackend, ConfigLoader};
pub use error::{InputError, PersistenceError, PipelineError, StageError, TransientExternalError};
pub use observability::Observability;
pub use retry::{RetryConfig, RetryError, execute_with_backoff, execute_with_backoff_sync};
