//! S8 Aggregate (§4.6): merges the support/skeptic drafts under
//! explicit precedence rules and computes the quality gate input.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::state::{DraftStance, DraftVerdict, PipelineState};

use super::StageContext;

const MAX_CITATION_COUNT_FOR_SCORE: usize = 6;
const KNOWN_TIER_COUNT: f64 = 7.0;

fn dedup_bullets(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for bullet in a.iter().chain(b.iter()) {
        if seen.insert(bullet.clone()) {
            out.push(bullet.clone());
        }
    }
    out
}

fn merge_drafts(support: &DraftVerdict, skeptic: &DraftVerdict) -> DraftVerdict {
    let bullets = dedup_bullets(&support.reasoning_bullets, &skeptic.reasoning_bullets);
    let mut citations = support.citations.clone();
    citations.extend(skeptic.citations.clone());

    if support.stance == DraftStance::Unverified && skeptic.stance != DraftStance::Unverified {
        return DraftVerdict {
            stance: skeptic.stance,
            confidence: skeptic.confidence * 0.7,
            reasoning_bullets: bullets,
            citations,
            weak_points: skeptic.weak_points.clone(),
            followup_queries: skeptic.followup_queries.clone(),
        };
    }
    if skeptic.stance == DraftStance::Unverified && support.stance != DraftStance::Unverified {
        return DraftVerdict {
            stance: support.stance,
            confidence: support.confidence * 0.7,
            reasoning_bullets: bullets,
            citations,
            weak_points: support.weak_points.clone(),
            followup_queries: support.followup_queries.clone(),
        };
    }

    if support.stance == skeptic.stance {
        return DraftVerdict {
            stance: support.stance,
            confidence: (support.confidence + skeptic.confidence) / 2.0,
            reasoning_bullets: bullets,
            citations,
            weak_points: dedup_bullets(&support.weak_points, &skeptic.weak_points),
            followup_queries: dedup_bullets(&support.followup_queries, &skeptic.followup_queries),
        };
    }

    DraftVerdict {
        stance: DraftStance::Mixed,
        confidence: (support.confidence - skeptic.confidence).abs(),
        reasoning_bullets: bullets,
        citations,
        weak_points: dedup_bullets(&support.weak_points, &skeptic.weak_points),
        followup_queries: dedup_bullets(&support.followup_queries, &skeptic.followup_queries),
    }
}

fn compute_quality_score(merged: &DraftVerdict, support: &DraftVerdict, skeptic: &DraftVerdict, evidence_index: &HashMap<String, crate::state::ScoredEvidence>) -> f64 {
    let citation_component = (merged.citations.len().min(MAX_CITATION_COUNT_FOR_SCORE) as f64 / MAX_CITATION_COUNT_FOR_SCORE as f64) * 40.0;

    let avg_credibility = if evidence_index.is_empty() {
        0.0
    } else {
        evidence_index.values().map(|e| e.evidence.metadata.credibility_score.unwrap_or(0.0)).sum::<f64>() / evidence_index.len() as f64
    };
    let trust_component = avg_credibility * 30.0;

    let agreement_component = if support.stance == skeptic.stance { 20.0 } else { 0.0 };

    let distinct_tiers: HashSet<_> = evidence_index.values().filter_map(|e| e.evidence.metadata.source_tier).collect();
    let diversity_component = (distinct_tiers.len() as f64 / KNOWN_TIER_COUNT).min(1.0) * 10.0;

    (citation_component + trust_component + agreement_component + diversity_component).clamp(0.0, 100.0)
}

pub async fn run(state: &mut PipelineState, _ctx: &StageContext) {
    let (Some(support), Some(skeptic)) = (state.verdict_support.clone(), state.verdict_skeptic.clone()) else {
        state.append_stage_log("s8_aggregate: skipped, missing support/skeptic verdict");
        return;
    };

    let mut evidence_index = HashMap::new();
    for evidence in state.evidence_topk.clone().unwrap_or_default() {
        evidence_index.insert(evidence.evid_id(), evidence);
    }

    let merged = merge_drafts(&support, &skeptic);
    let quality_score = compute_quality_score(&merged, &support, &skeptic, &evidence_index);

    state.support_pack = Some(json!({ "verdict": support }));
    state.skeptic_pack = Some(json!({ "verdict": skeptic }));
    state.evidence_index = Some(evidence_index);
    state.draft_verdict = Some(merged);
    state.quality_score = Some(quality_score);
    state.append_stage_log("s8_aggregate: ok");
}
