#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Wire types shared between the pipeline core and the HTTP surface:
//! requests, responses, stream events, stage identifiers, and the
//! auxiliary retrieval endpoint shapes.

pub mod events;
pub mod request;
pub mod response;
pub mod stage;
pub mod wiki;

pub use events::{EventKind, StreamEvent};
pub use request::{InputType, TruthCheckRequest};
pub use response::{Citation, Label, ModelInfo, SourceType, TruthCheckResponse};
pub use stage::{STAGE_ORDER, StageName, is_stage_name, normalize_stage_name};
