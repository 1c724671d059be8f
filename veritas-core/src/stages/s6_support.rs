//! S6 Support (§4.6): the support-leaning adversarial evaluator, run
//! in parallel with S7. Takes a read-only snapshot and returns its
//! outcome rather than mutating `PipelineState` directly — the
//! orchestrator joins S6 and S7 concurrently, which rules out two
//! simultaneous `&mut PipelineState` borrows.

use crate::state::PipelineState;

use super::evaluator_shared::{run_evaluator, EvaluatorOutcome};
use super::StageContext;

const SYSTEM_PROMPT: &str = "You are a fact-checking analyst arguing the claim is supported by the evidence where warranted. \
Be rigorous: only cite evidence that actually backs your reasoning, and say UNVERIFIED if the evidence doesn't settle it. \
Respond with strict JSON: {\"stance\":\"TRUE|FALSE|MIXED|UNVERIFIED\",\"confidence\":0.0-1.0,\"reasoning_bullets\":[...],\"citations\":[{\"evid_id\":\"...\",\"quote\":\"...\"}],\"weak_points\":[...],\"followup_queries\":[...]}";

pub async fn run(state: &PipelineState, ctx: &StageContext) -> Option<EvaluatorOutcome> {
    let claim_text = state.claim_text.clone()?;
    let specialized = state.evidence_topk_support.clone().unwrap_or_default();
    let general = state.evidence_topk.clone().unwrap_or_default();

    Some(run_evaluator(&ctx.evaluator_llm, &claim_text, &specialized, &general, SYSTEM_PROMPT).await)
}
