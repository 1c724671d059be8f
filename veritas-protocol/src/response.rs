use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    True,
    False,
    Mixed,
    Unverified,
    Refused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Wiki,
    News,
    WebUrl,
    KbDoc,
}

/// A single piece of evidence surfaced to the caller. `evid_id` must
/// resolve to a member of `evidence_topk` at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub source_type: SourceType,
    pub title: String,
    pub url: String,
    pub quote: String,
    pub relevance: f64,
    pub evid_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub version: String,
}

/// Well-known risk flags emitted into `risk_flags`. Other string values
/// are permitted; these are the ones the pipeline itself can raise.
pub mod risk_flag {
    pub const LOW_EVIDENCE: &str = "LOW_EVIDENCE";
    pub const QUALITY_GATE_FAILED: &str = "QUALITY_GATE_FAILED";
    pub const PREFETCH_FAILED: &str = "PREFETCH_FAILED";
    pub const PERSISTENCE_FAILED: &str = "PERSISTENCE_FAILED";
}

/// Body returned by `POST /truth/check` and the terminal `complete`
/// event of both streaming variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthCheckResponse {
    pub analysis_id: String,
    pub label: Label,
    pub confidence: f64,
    pub summary: String,
    pub model_info: ModelInfo,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub counter_evidence: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub recommended_next_steps: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub stage_logs: Vec<String>,

    #[serde(default)]
    pub stage_outputs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_full_outputs: Option<HashMap<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_resumed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_expired: Option<bool>,
}

impl TruthCheckResponse {
    /// `|citations| ≤ |evidence_topk|` is enforced upstream; this checks
    /// the weaker, externally observable half of that invariant: every
    /// citation id is unique within the response.
    pub fn citations_reference_distinct_evidence(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.citations.iter().all(|c| seen.insert(c.evid_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_serializes_uppercase() {
        let value = serde_json::to_value(Label::Unverified).unwrap();
        assert_eq!(value, serde_json::json!("UNVERIFIED"));
    }

    #[test]
    fn source_type_serializes_screaming_snake_case() {
        let value = serde_json::to_value(SourceType::WebUrl).unwrap();
        assert_eq!(value, serde_json::json!("WEB_URL"));
    }
}
