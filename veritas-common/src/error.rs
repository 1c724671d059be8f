//! Error taxonomy and the stable code/message envelope surfaced to
//! HTTP callers. Codes are enumerated and never leak raw exception text.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("input_payload must not be empty")]
    EmptyPayload,
    #[error("unknown input_type: {0}")]
    UnknownInputType(String),
    #[error("input_payload exceeds maximum size of {max_bytes} bytes")]
    OversizedInput { max_bytes: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum TransientExternalError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("server error (HTTP {0})")]
    ServerError(u16),
    #[error("connection error: {0}")]
    Connection(String),
}

#[derive(Debug, thiserror::Error)]
#[error("LLM output could not be parsed as JSON after one repair attempt: {0}")]
pub struct JsonParseError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("stage {stage} failed: {message}")]
pub struct StageError {
    pub stage: String,
    pub message: String,
}

/// Orchestrator-level failure. Surfaced as HTTP 500 with a stable code.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline execution failed: {0}")]
    ExecutionFailed(String),
    #[error("pipeline stream initialization failed: {0}")]
    StreamInitFailed(String),
    #[error("checkpoint backend unavailable: {0}")]
    CheckpointBackendUnavailable(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ExecutionFailed(_) | PipelineError::CheckpointBackendUnavailable(_) => {
                "PIPELINE_EXECUTION_FAILED"
            }
            PipelineError::StreamInitFailed(_) => "PIPELINE_STREAM_INIT_FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to persist analysis result: {0}")]
pub struct PersistenceError(pub String);

/// The `{detail: {code, message}}` body returned for pipeline-level
/// HTTP failures.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub detail: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            detail: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl From<&PipelineError> for ErrorEnvelope {
    fn from(err: &PipelineError) -> Self {
        ErrorEnvelope::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_failure_maps_to_stable_code() {
        let err = PipelineError::ExecutionFailed("boom".to_string());
        assert_eq!(err.code(), "PIPELINE_EXECUTION_FAILED");
    }

    #[test]
    fn stream_init_failure_maps_to_stable_code() {
        let err = PipelineError::StreamInitFailed("boom".to_string());
        assert_eq!(err.code(), "PIPELINE_STREAM_INIT_FAILED");
    }

    #[test]
    fn envelope_carries_code_and_message() {
        let err = PipelineError::ExecutionFailed("disk full".to_string());
        let envelope: ErrorEnvelope = (&err).into();
        assert_eq!(envelope.detail.code, "PIPELINE_EXECUTION_FAILED");
        assert!(envelope.detail.message.contains("disk full"));
    }
}
