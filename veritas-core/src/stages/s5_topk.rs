//! S5 TopK (§4.6): thresholds and partitions `scored_evidence` into
//! support/skeptic pools for S6/S7.

use veritas_protocol::response::risk_flag;

use crate::state::{PipelineState, ScoredEvidence, Stance};

use super::StageContext;

const CREDIBILITY_FLOOR: f64 = 0.7;

fn is_support_eligible(evidence: &ScoredEvidence) -> bool {
    matches!(evidence.evidence.metadata.stance, None | Some(Stance::Support) | Some(Stance::Neutral))
        && evidence.evidence.metadata.credibility_score.unwrap_or(0.0) >= CREDIBILITY_FLOOR
}

fn is_skeptic_eligible(evidence: &ScoredEvidence) -> bool {
    matches!(evidence.evidence.metadata.stance, None | Some(Stance::Skeptic) | Some(Stance::Neutral))
        && evidence.evidence.metadata.credibility_score.unwrap_or(0.0) >= CREDIBILITY_FLOOR
}

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let Some(scored) = state.scored_evidence.clone() else {
        state.append_stage_log("s5_topk: skipped, no scored_evidence");
        return;
    };

    let mut filtered: Vec<ScoredEvidence> = scored.into_iter().filter(|e| e.score >= ctx.top_k_threshold).collect();
    filtered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let top_k: Vec<ScoredEvidence> = filtered.into_iter().take(ctx.top_k_size).collect();

    let mut support_pool: Vec<ScoredEvidence> = top_k.iter().filter(|e| is_support_eligible(e)).cloned().collect();
    let mut skeptic_pool: Vec<ScoredEvidence> = top_k.iter().filter(|e| is_skeptic_eligible(e)).cloned().collect();

    if support_pool.is_empty() {
        support_pool = top_k.clone();
    }
    if skeptic_pool.is_empty() {
        skeptic_pool = top_k.clone();
    }

    if top_k.is_empty() {
        state.push_risk_flag_if_absent(risk_flag::LOW_EVIDENCE);
    }

    state.evidence_topk_support = Some(support_pool);
    state.evidence_topk_skeptic = Some(skeptic_pool);
    state.evidence_topk = Some(top_k);
    state.append_stage_log("s5_topk: ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EvidenceCandidate, EvidenceMetadata, ScoreBreakdown};
    use veritas_protocol::response::SourceType;

    fn evidence(stance: Option<Stance>, credibility: f64, score: f64) -> ScoredEvidence {
        ScoredEvidence {
            evidence: EvidenceCandidate {
                source_type: SourceType::WebUrl,
                title: "t".to_string(),
                url: "https://example.com".to_string(),
                content: "c".to_string(),
                snippet: "s".to_string(),
                metadata: EvidenceMetadata {
                    stance,
                    credibility_score: Some(credibility),
                    claim_id: "claim".to_string(),
                    ..Default::default()
                },
            },
            score,
            score_breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn support_eligible_includes_neutral_and_support_above_floor() {
        assert!(is_support_eligible(&evidence(Some(Stance::Support), 0.8, 0.9)));
        assert!(is_support_eligible(&evidence(Some(Stance::Neutral), 0.75, 0.9)));
        assert!(!is_support_eligible(&evidence(Some(Stance::Skeptic), 0.9, 0.9)));
        assert!(!is_support_eligible(&evidence(Some(Stance::Support), 0.5, 0.9)));
    }
}
