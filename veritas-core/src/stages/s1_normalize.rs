//! S1 Normalize (§4.6): resolves the input payload (prefetching URLs)
//! into `claim_text` plus the intent/mode/priority metadata the rest
//! of the pipeline keys off.

use std::collections::HashMap;

use regex_lite::Regex;

use veritas_protocol::request::InputType;
use veritas_protocol::response::{risk_flag, Citation, Label, SourceType};

use crate::prefetch;
use crate::state::{ClaimMode, FinalVerdict, OriginalIntent, PipelineState};

use super::StageContext;

const RUMOR_TERMS: &[&str] = &["카더라", "루머", "소문", "지라시", "알려졌다", "전해졌다"];
const EXPLORATION_MARKERS: &[&str] = &["?", "궁금", "왜", "무엇", "어떻게"];

fn basic_normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn classify_claim_mode(text: &str) -> ClaimMode {
    if RUMOR_TERMS.iter().any(|term| text.contains(term)) {
        ClaimMode::Rumor
    } else {
        ClaimMode::Fact
    }
}

fn classify_intent(text: &str) -> OriginalIntent {
    if EXPLORATION_MARKERS.iter().any(|marker| text.contains(marker)) {
        OriginalIntent::Exploration
    } else {
        OriginalIntent::Verification
    }
}

/// Naive proper-noun/quoted-phrase entity extraction: a placeholder
/// for a dedicated NER model that keys words worth preserving for
/// querygen's keyword/anchor tokens.
fn extract_entity_map(text: &str) -> HashMap<String, String> {
    let quoted = Regex::new("\u{201c}([^\u{201d}]+)\u{201d}|\"([^\"]+)\"").expect("valid regex");
    let mut entities = HashMap::new();
    for caps in quoted.captures_iter(text) {
        let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string());
        if let Some(value) = value {
            entities.insert(format!("entity_{}", entities.len() + 1), value);
        }
    }
    entities
}

pub(crate) fn refused_verdict(reason: &str) -> FinalVerdict {
    FinalVerdict {
        label: Label::Refused,
        confidence: 0.0,
        summary: reason.to_string(),
        rationale: Vec::new(),
        citations: Vec::<Citation>::new(),
        counter_evidence: Vec::new(),
        limitations: Vec::new(),
        recommended_next_steps: Vec::new(),
        risk_flags: Vec::new(),
        quality_score: 0.0,
        judge_retrieval: Vec::new(),
    }
}

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let source_text = if matches!(state.input_type, InputType::Url) {
        let result = prefetch::prefetch(&ctx.http_client, ctx.transcripts.as_ref(), &state.input_payload).await;
        if result.text.is_empty() {
            state.push_risk_flag_if_absent(risk_flag::PREFETCH_FAILED);
        }
        state.canonical_evidence = Some(format!("{} ({})", result.title, result.url));
        if result.text.is_empty() {
            result.title
        } else {
            result.text
        }
    } else {
        state.input_payload.clone()
    };

    let normalized = match ctx.normalize_mode.as_str() {
        "llm" => match normalize_via_llm(ctx, &source_text).await {
            Some(text) => text,
            None => basic_normalize(&source_text),
        },
        _ => basic_normalize(&source_text),
    };

    if normalized.is_empty() {
        state.final_verdict = Some(refused_verdict("입력에서 검증 가능한 주장을 찾지 못했습니다."));
        state.append_stage_log("s1_normalize: empty claim_text, emitting REFUSED");
        return;
    }

    state.claim_text = Some(normalized.clone());
    state.original_intent = Some(classify_intent(&normalized));
    state.claim_mode = Some(classify_claim_mode(&normalized));
    state.verification_priority = Some(
        match state.original_intent {
            Some(OriginalIntent::Verification) => "high",
            _ => "normal",
        }
        .to_string(),
    );
    state.entity_map = Some(extract_entity_map(&normalized));

    state.append_stage_log("s1_normalize: ok");
}

async fn normalize_via_llm(ctx: &StageContext, raw: &str) -> Option<String> {
    let system = "You extract a single clean, verifiable claim sentence from noisy user input. Respond with only the claim text.";
    match ctx.querygen_llm.call(system, raw, 256, 0.0).await {
        Ok(result) => {
            let cleaned = basic_normalize(&result.raw_text);
            if cleaned.is_empty() {
                None
            } else {
                Some(cleaned)
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_normalize_collapses_whitespace() {
        assert_eq!(basic_normalize("  hello   world  "), "hello world");
    }

    #[test]
    fn rumor_terms_trigger_rumor_mode() {
        assert_eq!(classify_claim_mode("이건 카더라 통신이다"), ClaimMode::Rumor);
    }

    #[test]
    fn plain_statement_is_fact_mode() {
        assert_eq!(classify_claim_mode("힌튼이 노벨상을 받았다"), ClaimMode::Fact);
    }

    #[test]
    fn question_marker_triggers_exploration_intent() {
        assert_eq!(classify_intent("이게 사실인지 궁금해요?"), OriginalIntent::Exploration);
    }

    #[test]
    fn entity_map_extracts_quoted_phrases() {
        let entities = extract_entity_map("그는 \"노벨 물리학상\"을 수상했다고 주장했다");
        assert_eq!(entities.len(), 1);
    }
}
