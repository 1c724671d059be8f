//! The pipeline state and the evidence/verdict types that flow through
//! it. `PipelineState` is an explicit struct rather than a dynamic map:
//! each stage's read/write set is the set of fields it touches, and the
//! two shared accumulators (`stage_logs`, `stage_outputs`/
//! `stage_full_outputs`) use the append/union-merge helpers below
//! instead of plain field assignment.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use veritas_protocol::response::Citation;
use veritas_protocol::response::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginalIntent {
    Verification,
    Exploration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimMode {
    Fact,
    Rumor,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Support,
    Skeptic,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Government,
    PublicOrg,
    Encyclopedia,
    MajorNews,
    SpecializedNews,
    Unknown,
    Platform,
}

impl SourceTier {
    /// Fixed base score per §4.8.
    pub fn base_score(self) -> f64 {
        match self {
            SourceTier::Government => 0.96,
            SourceTier::PublicOrg => 0.90,
            SourceTier::Encyclopedia => 0.82,
            SourceTier::MajorNews => 0.80,
            SourceTier::SpecializedNews => 0.72,
            SourceTier::Unknown => 0.55,
            SourceTier::Platform => 0.45,
        }
    }
}

/// Free-form per-candidate metadata. The named fields are the ones the
/// pipeline reads and writes; `extra` carries anything else a stage
/// attaches without forcing every caller to know about it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default)]
    pub stance: Option<Stance>,
    pub claim_id: String,
    #[serde(default)]
    pub mode: Option<ClaimMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tier: Option<SourceTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_trust_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_signal_score: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCandidate {
    pub source_type: veritas_protocol::response::SourceType,
    pub title: String,
    pub url: String,
    pub content: String,
    pub snippet: String,
    pub metadata: EvidenceMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub overlap: f64,
    pub prior: f64,
    pub trust: f64,
    pub html: f64,
    pub intent_bonus: f64,
    pub stance: Option<Stance>,
    pub overlap_cap_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEvidence {
    #[serde(flatten)]
    pub evidence: EvidenceCandidate,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
}

impl ScoredEvidence {
    pub fn evid_id(&self) -> String {
        // Stable within a single pipeline run: URL is the natural
        // dedup key already used by S3 merge.
        self.evidence.url.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Wiki,
    News,
    Web,
    Verification,
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Auto,
    Lexical,
    Fts,
    Vector,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMeta {
    pub claim_id: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub mode: Option<ClaimMode>,
    #[serde(default)]
    pub stance: Option<Stance>,
    #[serde(default)]
    pub query_strategy: Option<String>,
    #[serde(default)]
    pub keyword_tokens: Vec<String>,
    #[serde(default)]
    pub anchor_tokens: Vec<String>,
    #[serde(default)]
    pub quality_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryVariant {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub text: String,
    #[serde(default)]
    pub search_mode: Option<SearchMode>,
    pub meta: QueryMeta,
}

/// S6/S7 output stance. Distinct from [`Label`]: a draft verdict can
/// never be `REFUSED` — that terminal state is only reachable from S1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DraftStance {
    True,
    False,
    Mixed,
    Unverified,
}

impl From<DraftStance> for Label {
    fn from(stance: DraftStance) -> Self {
        match stance {
            DraftStance::True => Label::True,
            DraftStance::False => Label::False,
            DraftStance::Mixed => Label::Mixed,
            DraftStance::Unverified => Label::Unverified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftVerdict {
    pub stance: DraftStance,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_bullets: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub weak_points: Vec<String>,
    #[serde(default)]
    pub followup_queries: Vec<String>,
}

impl DraftVerdict {
    /// S6/S7 rule 5: if no citations survive validation, force the
    /// verdict down to an unverified, zero-confidence stance.
    pub fn force_unverified_on_empty_citations(mut self) -> Self {
        if self.citations.is_empty() {
            self.stance = DraftStance::Unverified;
            self.confidence = 0.0;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub label: Label,
    pub confidence: f64,
    pub summary: String,
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
    pub quality_score: f64,
    #[serde(default)]
    pub judge_retrieval: Vec<Citation>,
}

pub mod risk_flag {
    pub use veritas_protocol::response::risk_flag::*;
}

/// Mutable state threaded through the nine stages. Fields are
/// `Option`/empty-default until the stage that produces them runs;
/// `stage_logs`/`stage_outputs`/`stage_full_outputs` are the only
/// fields every stage writes to, via the merge helpers below rather
/// than direct assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub trace_id: String,
    #[serde(default)]
    pub checkpoint_thread_id: Option<String>,

    pub input_type: veritas_protocol::request::InputType,
    pub input_payload: String,
    pub language: String,
    #[serde(default)]
    pub as_of: Option<String>,

    #[serde(default)]
    pub claim_text: Option<String>,
    #[serde(default)]
    pub original_intent: Option<OriginalIntent>,
    #[serde(default)]
    pub claim_mode: Option<ClaimMode>,
    #[serde(default)]
    pub verification_priority: Option<String>,
    #[serde(default)]
    pub entity_map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub risk_markers: Vec<String>,
    #[serde(default)]
    pub canonical_evidence: Option<String>,

    #[serde(default)]
    pub query_variants: Option<Vec<QueryVariant>>,

    /// Transient: present after S3 merge, cleared by S4.
    #[serde(default)]
    pub evidence_candidates: Option<Vec<EvidenceCandidate>>,
    #[serde(default)]
    pub stage03_merge_stats: Option<Value>,

    #[serde(default)]
    pub scored_evidence: Option<Vec<ScoredEvidence>>,
    #[serde(default)]
    pub score_diagnostics: Option<Value>,

    #[serde(default)]
    pub evidence_topk: Option<Vec<ScoredEvidence>>,
    #[serde(default)]
    pub evidence_topk_support: Option<Vec<ScoredEvidence>>,
    #[serde(default)]
    pub evidence_topk_skeptic: Option<Vec<ScoredEvidence>>,

    #[serde(default)]
    pub verdict_support: Option<DraftVerdict>,
    #[serde(default)]
    pub verdict_skeptic: Option<DraftVerdict>,

    #[serde(default)]
    pub draft_verdict: Option<DraftVerdict>,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub support_pack: Option<Value>,
    #[serde(default)]
    pub skeptic_pack: Option<Value>,
    #[serde(default)]
    pub evidence_index: Option<HashMap<String, ScoredEvidence>>,

    #[serde(default)]
    pub final_verdict: Option<FinalVerdict>,

    #[serde(default)]
    pub stage_logs: Vec<String>,
    #[serde(default)]
    pub stage_outputs: HashMap<String, Value>,
    #[serde(default)]
    pub stage_full_outputs: HashMap<String, Value>,
}

impl PipelineState {
    pub fn new(
        trace_id: impl Into<String>,
        input_type: veritas_protocol::request::InputType,
        input_payload: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            checkpoint_thread_id: None,
            input_type,
            input_payload: input_payload.into(),
            language: language.into(),
            as_of: None,
            claim_text: None,
            original_intent: None,
            claim_mode: None,
            verification_priority: None,
            entity_map: None,
            risk_markers: Vec::new(),
            canonical_evidence: None,
            query_variants: None,
            evidence_candidates: None,
            stage03_merge_stats: None,
            scored_evidence: None,
            score_diagnostics: None,
            evidence_topk: None,
            evidence_topk_support: None,
            evidence_topk_skeptic: None,
            verdict_support: None,
            verdict_skeptic: None,
            draft_verdict: None,
            quality_score: None,
            support_pack: None,
            skeptic_pack: None,
            evidence_index: None,
            final_verdict: None,
            stage_logs: Vec::new(),
            stage_outputs: HashMap::new(),
            stage_full_outputs: HashMap::new(),
        }
    }

    /// Append-only reducer for `stage_logs`, mirroring the source
    /// graph's `operator.add` annotation.
    pub fn append_stage_log(&mut self, line: impl Into<String>) {
        self.stage_logs.push(line.into());
    }

    /// Union-merge reducer for `stage_outputs`/`stage_full_outputs`,
    /// mirroring the source graph's `operator.or_` annotation: later
    /// writes for the same key win, earlier keys are preserved.
    pub fn merge_stage_outputs(&mut self, entries: HashMap<String, Value>) {
        self.stage_outputs.extend(entries);
    }

    pub fn merge_stage_full_outputs(&mut self, entries: HashMap<String, Value>) {
        self.stage_full_outputs.extend(entries);
    }

    pub fn push_risk_flag_if_absent(&mut self, flag: &str) {
        if !self.risk_markers.iter().any(|existing| existing == flag) {
            self.risk_markers.push(flag.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> PipelineState {
        PipelineState::new(
            "trace-1",
            veritas_protocol::request::InputType::Text,
            "claim",
            "ko",
        )
    }

    #[test]
    fn stage_logs_accumulate_in_order() {
        let mut state = fresh_state();
        state.append_stage_log("s1 done");
        state.append_stage_log("s2 done");
        assert_eq!(state.stage_logs, vec!["s1 done", "s2 done"]);
    }

    #[test]
    fn stage_outputs_union_merge_preserves_existing_keys() {
        let mut state = fresh_state();
        state.merge_stage_outputs(HashMap::from([("s1".to_string(), serde_json::json!(1))]));
        state.merge_stage_outputs(HashMap::from([("s2".to_string(), serde_json::json!(2))]));
        assert_eq!(state.stage_outputs.len(), 2);
        assert_eq!(state.stage_outputs["s1"], serde_json::json!(1));
        assert_eq!(state.stage_outputs["s2"], serde_json::json!(2));
    }

    #[test]
    fn risk_flag_is_not_duplicated() {
        let mut state = fresh_state();
        state.push_risk_flag_if_absent(risk_flag::LOW_EVIDENCE);
        state.push_risk_flag_if_absent(risk_flag::LOW_EVIDENCE);
        assert_eq!(state.risk_markers, vec![risk_flag::LOW_EVIDENCE]);
    }

    #[test]
    fn draft_verdict_with_no_citations_forces_unverified() {
        let verdict = DraftVerdict {
            stance: DraftStance::True,
            confidence: 0.9,
            reasoning_bullets: vec![],
            citations: vec![],
            weak_points: vec![],
            followup_queries: vec![],
        }
        .force_unverified_on_empty_citations();
        assert_eq!(verdict.stance, DraftStance::Unverified);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn source_tier_scores_match_fixed_table() {
        assert_eq!(SourceTier::Government.base_score(), 0.96);
        assert_eq!(SourceTier::Platform.base_score(), 0.45);
    }
}
