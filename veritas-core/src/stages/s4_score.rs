//! S4 Score (§4.6): runs C5 over `evidence_candidates` and clears the
//! transient candidate list once scored.

use serde_json::json;

use crate::scoring::score_candidates;
use crate::state::PipelineState;

use super::StageContext;

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let Some(candidates) = state.evidence_candidates.take() else {
        state.append_stage_log("s4_score: skipped, no evidence_candidates");
        return;
    };
    let Some(claim_text) = state.claim_text.clone() else {
        state.append_stage_log("s4_score: skipped, no claim_text");
        return;
    };
    let claim_mode = state.claim_mode.unwrap_or(crate::state::ClaimMode::Fact);

    let (scored, diagnostics) = score_candidates(&claim_text, claim_mode, candidates, ctx.scoring_config);

    state.score_diagnostics = Some(json!({
        "candidate_count": diagnostics.candidate_count,
        "high_score_low_overlap_count": diagnostics.high_score_low_overlap_count,
    }));
    state.scored_evidence = Some(scored);
    state.append_stage_log("s4_score: ok");
}
