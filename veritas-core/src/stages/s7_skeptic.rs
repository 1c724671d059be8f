//! S7 Skeptic (§4.6): the skeptic-leaning adversarial evaluator, run
//! in parallel with S6. See [`super::s6_support`] for why this takes a
//! read-only snapshot and returns its outcome instead of mutating
//! `PipelineState` directly.

use crate::state::PipelineState;

use super::evaluator_shared::{run_evaluator, EvaluatorOutcome};
use super::StageContext;

const SYSTEM_PROMPT: &str = "You are a fact-checking analyst actively looking for reasons the claim is false or unsupported. \
Be rigorous: only cite evidence that actually backs your reasoning, and say UNVERIFIED if the evidence doesn't settle it. \
Respond with strict JSON: {\"stance\":\"TRUE|FALSE|MIXED|UNVERIFIED\",\"confidence\":0.0-1.0,\"reasoning_bullets\":[...],\"citations\":[{\"evid_id\":\"...\",\"quote\":\"...\"}],\"weak_points\":[...],\"followup_queries\":[...]}";

pub async fn run(state: &PipelineState, ctx: &StageContext) -> Option<EvaluatorOutcome> {
    let claim_text = state.claim_text.clone()?;
    let specialized = state.evidence_topk_skeptic.clone().unwrap_or_default();
    let general = state.evidence_topk.clone().unwrap_or_default();

    Some(run_evaluator(&ctx.evaluator_llm, &claim_text, &specialized, &general, SYSTEM_PROMPT).await)
}
