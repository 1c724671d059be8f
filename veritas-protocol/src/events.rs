use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::TruthCheckResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// v2-only: first line of the stream, emitted before any stage runs.
    StreamOpen,
    /// v2-only: keep-alive emitted on a timer while no stage event fires.
    Heartbeat,
    StageComplete,
    Complete,
    Error,
}

/// One ndjson line. `stage`/`data` are populated depending on `event`;
/// `trace_id`/`ts` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub trace_id: String,
    pub ts: DateTime<Utc>,
}

impl StreamEvent {
    pub fn stream_open(trace_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            event: EventKind::StreamOpen,
            stage: None,
            data: None,
            trace_id: trace_id.into(),
            ts: now,
        }
    }

    pub fn heartbeat(trace_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            event: EventKind::Heartbeat,
            stage: None,
            data: None,
            trace_id: trace_id.into(),
            ts: now,
        }
    }

    pub fn stage_complete(
        trace_id: impl Into<String>,
        stage: impl Into<String>,
        data: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event: EventKind::StageComplete,
            stage: Some(stage.into()),
            data: Some(data),
            trace_id: trace_id.into(),
            ts: now,
        }
    }

    pub fn complete(trace_id: impl Into<String>, response: &TruthCheckResponse, now: DateTime<Utc>) -> Self {
        Self {
            event: EventKind::Complete,
            stage: None,
            data: Some(serde_json::to_value(response).unwrap_or(Value::Null)),
            trace_id: trace_id.into(),
            ts: now,
        }
    }

    pub fn error(
        trace_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event: EventKind::Error,
            stage: None,
            data: Some(serde_json::json!({ "code": code.into(), "message": message.into() })),
            trace_id: trace_id.into(),
            ts: now,
        }
    }

    /// Serializes as a single ndjson line, newline included.
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.event, EventKind::Complete | EventKind::Error)
    }
}

pub const CANCELLED_ERROR_CODE: &str = "CANCELLED";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_are_complete_or_error() {
        let now = Utc::now();
        assert!(StreamEvent::error("t", "CANCELLED", "cancelled", now).is_terminal());
        assert!(!StreamEvent::heartbeat("t", now).is_terminal());
        assert!(!StreamEvent::stream_open("t", now).is_terminal());
    }

    #[test]
    fn ndjson_line_ends_with_newline() {
        let now = Utc::now();
        let line = StreamEvent::heartbeat("trace-1", now).to_ndjson_line();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
