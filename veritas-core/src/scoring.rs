//! Deterministic multi-signal scoring engine (C5, §4.5).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::state::{ClaimMode, EvidenceCandidate, ScoreBreakdown, ScoredEvidence};
use veritas_protocol::response::SourceType;

#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub low_overlap_threshold: f64,
    pub rumor_score_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            low_overlap_threshold: 0.4,
            rumor_score_cap: 0.78,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreDiagnostics {
    pub high_score_low_overlap_count: usize,
    pub candidate_count: usize,
}

fn source_prior(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::WebUrl => 1.0,
        SourceType::News => 1.1,
        SourceType::Wiki => 1.05,
        SourceType::KbDoc => 1.0,
    }
}

fn intent_bonus(intent: Option<&str>) -> f64 {
    match intent {
        Some("official_statement") => 0.05,
        Some("fact_check") => 0.08,
        _ => 0.0,
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard-like overlap between the claim's keyword tokens and the
/// candidate's content, lowercased.
pub fn token_overlap(claim_text: &str, content: &str) -> f64 {
    let claim_tokens = tokenize(claim_text);
    let content_tokens = tokenize(content);
    if claim_tokens.is_empty() || content_tokens.is_empty() {
        return 0.0;
    }
    let intersection = claim_tokens.intersection(&content_tokens).count() as f64;
    let union = claim_tokens.union(&content_tokens).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Scores every candidate per §4.5, returning the evidence sorted
/// descending by score plus aggregate diagnostics.
pub fn score_candidates(
    claim_text: &str,
    _claim_mode: ClaimMode,
    candidates: Vec<EvidenceCandidate>,
    config: ScoringConfig,
) -> (Vec<ScoredEvidence>, ScoreDiagnostics) {
    let mut diagnostics = ScoreDiagnostics {
        candidate_count: candidates.len(),
        ..ScoreDiagnostics::default()
    };

    let mut scored: Vec<ScoredEvidence> = candidates
        .into_iter()
        .map(|evidence| {
            let overlap = token_overlap(claim_text, &evidence.content);
            let prior = source_prior(evidence.source_type);
            let trust = evidence
                .metadata
                .credibility_score
                .or(evidence.metadata.source_trust_score)
                .unwrap_or(0.55);
            let bonus = intent_bonus(evidence.metadata.intent.as_deref());

            let mut score = (overlap * prior + 0.25 * trust + bonus).clamp(0.0, 1.0);
            let mut overlap_cap_applied = false;

            if overlap < config.low_overlap_threshold {
                if score > config.rumor_score_cap {
                    diagnostics.high_score_low_overlap_count += 1;
                }
                score = score.min(config.rumor_score_cap);
                overlap_cap_applied = true;
            }

            let breakdown = ScoreBreakdown {
                overlap,
                prior,
                trust,
                html: evidence.metadata.html_signal_score.unwrap_or(0.5),
                intent_bonus: bonus,
                stance: evidence.metadata.stance,
                overlap_cap_applied,
            };

            ScoredEvidence {
                evidence,
                score,
                score_breakdown: breakdown,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    (scored, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EvidenceMetadata;

    fn candidate(content: &str, credibility: f64, intent: Option<&str>) -> EvidenceCandidate {
        EvidenceCandidate {
            source_type: SourceType::WebUrl,
            title: "title".to_string(),
            url: "https://example.com".to_string(),
            content: content.to_string(),
            snippet: content.chars().take(50).collect(),
            metadata: EvidenceMetadata {
                intent: intent.map(str::to_string),
                credibility_score: Some(credibility),
                claim_id: "claim-1".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let (scored, _) = score_candidates(
            "힌튼 노벨 물리학상 수상",
            ClaimMode::Fact,
            vec![candidate("힌튼 노벨 물리학상 수상 2024", 1.0, Some("fact_check"))],
            ScoringConfig::default(),
        );
        assert_eq!(scored.len(), 1);
        assert!(scored[0].score >= 0.0 && scored[0].score <= 1.0);
    }

    #[test]
    fn low_overlap_caps_score_at_rumor_threshold() {
        let config = ScoringConfig::default();
        let (scored, diagnostics) = score_candidates(
            "완전히 다른 주장",
            ClaimMode::Rumor,
            vec![candidate("전혀 관련 없는 내용의 긴 본문입니다", 1.0, None)],
            config,
        );
        assert!(scored[0].score_breakdown.overlap_cap_applied);
        assert!(scored[0].score <= config.rumor_score_cap);
        assert_eq!(diagnostics.candidate_count, 1);
    }

    #[test]
    fn results_are_sorted_descending() {
        let (scored, _) = score_candidates(
            "동일 문장 반복 주장",
            ClaimMode::Fact,
            vec![
                candidate("동일 문장 반복 주장 완전 일치", 0.9, Some("fact_check")),
                candidate("아무 관련 없음", 0.2, None),
            ],
            ScoringConfig::default(),
        );
        assert!(scored[0].score >= scored[1].score);
    }

    #[test]
    fn intent_bonus_is_additive() {
        let plain = candidate("본문", 0.55, None);
        let bonused = candidate("본문", 0.55, Some("fact_check"));
        let (scored_plain, _) = score_candidates("본문", ClaimMode::Fact, vec![plain], ScoringConfig::default());
        let (scored_bonus, _) = score_candidates("본문", ClaimMode::Fact, vec![bonused], ScoringConfig::default());
        assert!(scored_bonus[0].score >= scored_plain[0].score);
    }
}
