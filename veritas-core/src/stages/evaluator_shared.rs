//! Shared S6/S7 evaluator logic (§4.6 rules 1-6): pool selection,
//! prompt construction, citation validation, and the
//! force-to-unverified rule. S6 and S7 differ only in which pool and
//! system prompt they pass in.

use serde::Deserialize;
use serde_json::{json, Value};

use veritas_protocol::response::Citation;

use crate::llm::LlmClient;
use crate::scoring::token_overlap;
use crate::state::{DraftStance, DraftVerdict, ScoredEvidence};

const SNIPPET_CHAR_LIMIT: usize = 500;
const QUOTE_OVERLAP_THRESHOLD: f64 = 0.8;

#[derive(Debug, Deserialize)]
struct RawCitation {
    #[serde(default)]
    evid_id: Option<String>,
    #[serde(default)]
    quote: String,
}

#[derive(Debug, Deserialize)]
struct RawDraftVerdict {
    stance: String,
    confidence: f64,
    #[serde(default)]
    reasoning_bullets: Vec<String>,
    #[serde(default)]
    citations: Vec<RawCitation>,
    #[serde(default)]
    weak_points: Vec<String>,
    #[serde(default)]
    followup_queries: Vec<String>,
}

fn parse_stance(raw: &str) -> DraftStance {
    match raw.to_uppercase().as_str() {
        "TRUE" => DraftStance::True,
        "FALSE" => DraftStance::False,
        "MIXED" => DraftStance::Mixed,
        _ => DraftStance::Unverified,
    }
}

/// Case-folded substring match, or ≥0.8 token overlap, against the
/// evidence's content — S6/S7 rule 4.
fn quote_is_valid(quote: &str, evidence: &ScoredEvidence) -> bool {
    if quote.trim().is_empty() {
        return false;
    }
    let quote_lower = quote.to_lowercase();
    let content_lower = evidence.evidence.content.to_lowercase();
    if content_lower.contains(&quote_lower) {
        return true;
    }
    token_overlap(quote, &evidence.evidence.content) >= QUOTE_OVERLAP_THRESHOLD
}

pub(super) struct EvaluatorOutcome {
    pub verdict: DraftVerdict,
    pub diagnostics: Value,
}

fn select_pool<'a>(specialized: &'a [ScoredEvidence], general: &'a [ScoredEvidence]) -> (&'a [ScoredEvidence], &'static str) {
    if specialized.is_empty() {
        (general, "fallback_general")
    } else {
        (specialized, "specialized")
    }
}

fn build_prompt(claim_text: &str, pool: &[ScoredEvidence]) -> String {
    let mut sections = vec![format!("CLAIM: {claim_text}")];
    for evidence in pool {
        let mut snippet: String = evidence.evidence.snippet.chars().take(SNIPPET_CHAR_LIMIT).collect();
        if snippet.is_empty() {
            snippet = evidence.evidence.content.chars().take(SNIPPET_CHAR_LIMIT).collect();
        }
        sections.push(format!(
            "EVIDENCE[{}] ({}): {}",
            evidence.evid_id(),
            evidence.evidence.title,
            snippet
        ));
    }
    sections.join("\n")
}

fn deterministic_unverified(pool: &[ScoredEvidence], pool_type: &'static str) -> EvaluatorOutcome {
    EvaluatorOutcome {
        verdict: DraftVerdict {
            stance: DraftStance::Unverified,
            confidence: 0.0,
            reasoning_bullets: vec!["evaluator call failed; defaulting to unverified".to_string()],
            citations: Vec::new(),
            weak_points: Vec::new(),
            followup_queries: Vec::new(),
        },
        diagnostics: pool_diagnostics(pool, pool_type),
    }
}

fn pool_diagnostics(pool: &[ScoredEvidence], pool_type: &'static str) -> Value {
    let avg_trust = if pool.is_empty() {
        0.0
    } else {
        pool.iter().map(|e| e.evidence.metadata.credibility_score.unwrap_or(0.0)).sum::<f64>() / pool.len() as f64
    };
    json!({
        "input_pool_type": pool_type,
        "total_evidence_count": pool.len(),
        "input_pool_avg_trust": avg_trust,
    })
}

pub(super) async fn run_evaluator(
    llm: &LlmClient,
    claim_text: &str,
    specialized_pool: &[ScoredEvidence],
    general_pool: &[ScoredEvidence],
    system_prompt: &str,
) -> EvaluatorOutcome {
    let (pool, pool_type) = select_pool(specialized_pool, general_pool);
    if pool.is_empty() {
        return deterministic_unverified(pool, pool_type);
    }

    let user_prompt = build_prompt(claim_text, pool);

    let raw_text = match llm.call(system_prompt, &user_prompt, 800, 0.2).await {
        Ok(result) => result.raw_text,
        Err(_) => return deterministic_unverified(pool, pool_type),
    };

    let repair = |raw: String, error: String| {
        let llm = llm;
        let system_prompt = system_prompt;
        async move {
            let hint = format!("Your previous output was not valid JSON ({error}). Re-emit strictly valid JSON only.\n\n{raw}");
            llm.call(system_prompt, &hint, 800, 0.0).await.map(|r| r.raw_text)
        }
    };

    let parsed: Value = match crate::llm::parse_json_with_repair(&raw_text, repair).await {
        Ok(value) => value,
        Err(_) => return deterministic_unverified(pool, pool_type),
    };

    let raw_verdict: RawDraftVerdict = match serde_json::from_value(parsed) {
        Ok(v) => v,
        Err(_) => return deterministic_unverified(pool, pool_type),
    };

    let citations: Vec<Citation> = raw_verdict
        .citations
        .into_iter()
        .filter_map(|raw| {
            let evid_id = raw.evid_id?;
            let evidence = pool.iter().find(|e| e.evid_id() == evid_id)?;
            if !quote_is_valid(&raw.quote, evidence) {
                return None;
            }
            Some(Citation {
                source_type: evidence.evidence.source_type,
                title: evidence.evidence.title.clone(),
                url: evidence.evidence.url.clone(),
                quote: raw.quote,
                relevance: evidence.score,
                evid_id,
            })
        })
        .collect();

    let verdict = DraftVerdict {
        stance: parse_stance(&raw_verdict.stance),
        confidence: raw_verdict.confidence.clamp(0.0, 1.0),
        reasoning_bullets: raw_verdict.reasoning_bullets,
        citations,
        weak_points: raw_verdict.weak_points,
        followup_queries: raw_verdict.followup_queries,
    }
    .force_unverified_on_empty_citations();

    EvaluatorOutcome {
        verdict,
        diagnostics: pool_diagnostics(pool, pool_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EvidenceCandidate, EvidenceMetadata, ScoreBreakdown};
    use veritas_protocol::response::SourceType;

    fn evidence(content: &str) -> ScoredEvidence {
        ScoredEvidence {
            evidence: EvidenceCandidate {
                source_type: SourceType::WebUrl,
                title: "title".to_string(),
                url: "https://example.com/a".to_string(),
                content: content.to_string(),
                snippet: content.to_string(),
                metadata: EvidenceMetadata {
                    claim_id: "claim".to_string(),
                    ..Default::default()
                },
            },
            score: 0.9,
            score_breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn quote_valid_via_substring_match() {
        let e = evidence("Hinton won the Nobel prize in physics");
        assert!(quote_is_valid("nobel prize", &e));
    }

    #[test]
    fn quote_invalid_when_unrelated() {
        let e = evidence("Hinton won the Nobel prize in physics");
        assert!(!quote_is_valid("completely unrelated sentence about weather", &e));
    }

    #[test]
    fn empty_quote_is_invalid() {
        let e = evidence("anything");
        assert!(!quote_is_valid("", &e));
    }

    #[test]
    fn select_pool_prefers_specialized_when_nonempty() {
        let specialized = vec![evidence("a")];
        let general = vec![evidence("b"), evidence("c")];
        let (pool, kind) = select_pool(&specialized, &general);
        assert_eq!(pool.len(), 1);
        assert_eq!(kind, "specialized");
    }

    #[test]
    fn select_pool_falls_back_to_general_when_specialized_empty() {
        let specialized: Vec<ScoredEvidence> = Vec::new();
        let general = vec![evidence("b")];
        let (pool, kind) = select_pool(&specialized, &general);
        assert_eq!(pool.len(), 1);
        assert_eq!(kind, "fallback_general");
    }
}
