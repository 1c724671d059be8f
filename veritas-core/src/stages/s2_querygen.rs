//! S2 Querygen (§4.6): turns `claim_text`/`entity_map` into the
//! bounded set of retrieval queries S3 dispatches to C1/C2.

use crate::state::{PipelineState, QueryMeta, QueryType, QueryVariant, SearchMode, Stance};

use super::StageContext;

const REQUIRED_INTENTS: &[&str] = &["official_statement", "fact_check", "origin_trace"];
const MAX_NON_WIKI_TEXT_LEN: usize = 50;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | '.'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strips `:`, `,`, `.`, truncates to 50 chars, and pads with extra
/// claim tokens if fewer than two survive — S2's non-wiki text rule.
fn sanitize_non_wiki_text(base: &str, claim_tokens: &[String]) -> String {
    let cleaned: String = base.chars().filter(|c| !matches!(c, ':' | ',' | '.')).collect();
    let mut tokens: Vec<String> = tokenize(&cleaned);

    let mut idx = 0;
    while tokens.len() < 2 && idx < claim_tokens.len() {
        if !tokens.contains(&claim_tokens[idx]) {
            tokens.push(claim_tokens[idx].clone());
        }
        idx += 1;
    }

    let mut joined = tokens.join(" ");
    joined.truncate(MAX_NON_WIKI_TEXT_LEN);
    joined
}

fn base_meta(claim_id: &str, intent: &str, keyword_tokens: Vec<String>, anchor_tokens: Vec<String>) -> QueryMeta {
    QueryMeta {
        claim_id: claim_id.to_string(),
        intent: Some(intent.to_string()),
        mode: None,
        stance: None,
        query_strategy: None,
        keyword_tokens,
        anchor_tokens,
        quality_flags: Vec::new(),
    }
}

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let Some(claim_text) = state.claim_text.clone() else {
        state.append_stage_log("s2_querygen: skipped, no claim_text");
        return;
    };

    let claim_tokens = tokenize(&claim_text);
    let anchor_tokens: Vec<String> = state
        .entity_map
        .as_ref()
        .map(|map| map.values().cloned().collect())
        .unwrap_or_default();
    let claim_mode = state.claim_mode;
    let claim_id = state.trace_id.clone();

    let mut variants = Vec::new();

    let mut wiki_meta = base_meta(&claim_id, "wiki_lookup", claim_tokens.clone(), anchor_tokens.clone());
    wiki_meta.mode = claim_mode;
    wiki_meta.query_strategy = Some("wiki_vector_single".to_string());
    variants.push(QueryVariant {
        query_type: QueryType::Wiki,
        text: claim_text.clone(),
        search_mode: Some(SearchMode::Vector),
        meta: wiki_meta,
    });

    let non_wiki_types = [QueryType::News, QueryType::Verification, QueryType::Web];
    let cap = ctx.non_wiki_query_cap.max(REQUIRED_INTENTS.len());

    for (idx, intent) in REQUIRED_INTENTS.iter().enumerate().take(cap) {
        let query_type = non_wiki_types[idx % non_wiki_types.len()];
        let text = sanitize_non_wiki_text(&claim_text, &claim_tokens);

        let needs_both_stances = matches!(query_type, QueryType::News | QueryType::Verification);
        let stances: Vec<Option<Stance>> = if needs_both_stances {
            vec![Some(Stance::Support), Some(Stance::Skeptic)]
        } else {
            vec![None]
        };

        for stance in stances {
            let mut meta = base_meta(&claim_id, intent, claim_tokens.clone(), anchor_tokens.clone());
            meta.mode = claim_mode;
            meta.stance = stance;
            meta.query_strategy = Some(format!("{query_type:?}_{intent}").to_lowercase());
            variants.push(QueryVariant {
                query_type,
                text: text.clone(),
                search_mode: None,
                meta,
            });
        }
    }

    state.query_variants = Some(variants);
    state.append_stage_log("s2_querygen: ok");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_punctuation_and_truncates() {
        let claim_tokens = vec!["힌튼".to_string(), "노벨상".to_string(), "수상".to_string()];
        let sanitized = sanitize_non_wiki_text("힌튼: 노벨, 물리학상. 수상", &claim_tokens);
        assert!(!sanitized.contains(':'));
        assert!(!sanitized.contains(','));
        assert!(!sanitized.contains('.'));
        assert!(sanitized.len() <= 50);
    }

    #[test]
    fn sanitize_pads_short_text_to_two_tokens() {
        let claim_tokens = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let sanitized = sanitize_non_wiki_text("alpha", &claim_tokens);
        assert!(tokenize(&sanitized).len() >= 2);
    }
}
