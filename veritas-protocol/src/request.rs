use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Url,
    Text,
    Image,
}

fn default_language() -> String {
    "ko".to_string()
}

/// Body of `POST /truth/check` and the two streaming variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthCheckRequest {
    pub input_type: InputType,
    pub input_payload: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,

    /// Resume-window start stage; `stage03_collect` is accepted as an
    /// alias resolving to `stage03_wiki`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_stage: Option<String>,

    /// Resume-window end stage; `stage03_collect` resolves to
    /// `stage03_merge` here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_stage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize_mode: Option<String>,

    /// Prior pipeline state to merge in before execution (resume path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_state: Option<HashMap<String, Value>>,

    #[serde(default)]
    pub include_full_outputs: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_thread_id: Option<String>,

    #[serde(default = "default_checkpoint_resume")]
    pub checkpoint_resume: Option<bool>,
}

fn default_checkpoint_resume() -> Option<bool> {
    Some(true)
}

impl TruthCheckRequest {
    /// Validates the request shape before it enters the pipeline.
    ///
    /// Empty payload is rejected here so the HTTP layer can answer 422
    /// without ever constructing a `PipelineState`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.input_payload.trim().is_empty() {
            return Err("input_payload must not be empty");
        }
        Ok(())
    }
}
