//! S9 Judge (§4.6): the quality gate. Below threshold, the draft is
//! downgraded to UNVERIFIED regardless of what S8 produced. Above it,
//! an optional judge LLM call produces the user-facing summary; absent
//! that client, a deterministic summary is synthesized from the draft.

use veritas_protocol::response::Label;

use crate::state::{risk_flag, DraftVerdict, FinalVerdict, PipelineState};

use super::StageContext;

fn deterministic_summary(verdict: &DraftVerdict) -> String {
    if let Some(first) = verdict.reasoning_bullets.first() {
        first.clone()
    } else {
        "No summary could be synthesized from the available evidence.".to_string()
    }
}

async fn judge_summary(ctx: &StageContext, claim_text: &str, verdict: &DraftVerdict) -> String {
    let Some(judge_llm) = &ctx.judge_llm else {
        return deterministic_summary(verdict);
    };

    let system = "You write a short, neutral one-paragraph summary of a fact-check verdict for an end user. \
Do not introduce claims beyond what the reasoning bullets say.";
    let user = format!(
        "CLAIM: {claim_text}\nSTANCE: {:?}\nCONFIDENCE: {:.2}\nREASONING:\n{}",
        verdict.stance,
        verdict.confidence,
        verdict.reasoning_bullets.join("\n")
    );

    match judge_llm.call(system, &user, 300, 0.3).await {
        Ok(result) if !result.raw_text.trim().is_empty() => result.raw_text.trim().to_string(),
        _ => deterministic_summary(verdict),
    }
}

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let Some(draft) = state.draft_verdict.clone() else {
        state.append_stage_log("s9_judge: skipped, no draft_verdict");
        return;
    };
    let quality_score = state.quality_score.unwrap_or(0.0);
    let claim_text = state.claim_text.clone().unwrap_or_default();

    let gate_failed = quality_score < ctx.quality_gate_threshold;

    let (label, confidence, mut rationale) = if gate_failed {
        state.push_risk_flag_if_absent(risk_flag::QUALITY_GATE_FAILED);
        (Label::Unverified, 0.0, vec!["Quality gate failed: evidence did not meet the confidence bar for a verdict.".to_string()])
    } else {
        (Label::from(draft.stance), draft.confidence, draft.reasoning_bullets.clone())
    };

    if gate_failed {
        rationale.extend(draft.reasoning_bullets.clone());
    }

    let summary = if gate_failed {
        "This claim could not be confidently verified with the available evidence.".to_string()
    } else {
        judge_summary(ctx, &claim_text, &draft).await
    };

    let judge_retrieval = draft.citations.clone();

    let final_verdict = FinalVerdict {
        label,
        confidence,
        summary,
        rationale,
        citations: draft.citations,
        counter_evidence: draft.weak_points,
        limitations: if gate_failed { vec!["Quality gate failed.".to_string()] } else { Vec::new() },
        recommended_next_steps: draft.followup_queries,
        risk_flags: state.risk_markers.clone(),
        quality_score,
        judge_retrieval,
    };

    state.final_verdict = Some(final_verdict);
    state.append_stage_log("s9_judge: ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DraftStance;

    fn draft(stance: DraftStance, confidence: f64) -> DraftVerdict {
        DraftVerdict {
            stance,
            confidence,
            reasoning_bullets: vec!["evidence supports the claim".to_string()],
            citations: Vec::new(),
            weak_points: Vec::new(),
            followup_queries: Vec::new(),
        }
    }

    #[test]
    fn deterministic_summary_uses_first_bullet() {
        let d = draft(DraftStance::True, 0.9);
        assert_eq!(deterministic_summary(&d), "evidence supports the claim");
    }

    #[test]
    fn deterministic_summary_falls_back_when_no_bullets() {
        let mut d = draft(DraftStance::True, 0.9);
        d.reasoning_bullets.clear();
        assert!(deterministic_summary(&d).contains("No summary"));
    }
}
