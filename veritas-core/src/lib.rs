#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The nine-stage verification pipeline (C6) plus the clients and
//! stores it depends on: retrieval, web search, prefetching, LLM
//! calls, scoring, checkpointing, and result persistence. See
//! [`orchestrator`] for the driver that ties them together.

pub mod checkpoint;
pub mod html_signals;
pub mod llm;
pub mod orchestrator;
pub mod persistence;
pub mod prefetch;
pub mod retrieval;
pub mod scoring;
pub mod search_clients;
pub mod source_trust;
pub mod stages;
pub mod state;

pub use checkpoint::{CheckpointError, CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use persistence::{NullResultStore, ResultStore, SqliteResultStore};
pub use stages::StageContext;
pub use state::PipelineState;
