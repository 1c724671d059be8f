//! S3 Collect (§4.6): dispatches wiki queries to C1 and non-wiki
//! queries to C2, then merges and enriches the combined candidate set.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;

use veritas_protocol::response::SourceType;

use crate::html_signals::analyze_html_signals;
use crate::retrieval::RetrievalBackend;
use crate::search_clients::{run_web_async, NormalizedResult};
use crate::source_trust::build_source_trust;
use crate::state::{EvidenceCandidate, EvidenceMetadata, PipelineState, QueryType};

use super::StageContext;

async fn run_wiki_async(retrieval: &RetrievalBackend, queries: &[&crate::state::QueryVariant]) -> Vec<EvidenceCandidate> {
    let mut candidates = Vec::new();
    for query in queries {
        let Ok(result) = retrieval
            .search(&query.text, 10, None, 1, 2000, query.search_mode.unwrap_or(crate::state::SearchMode::Vector))
            .await
        else {
            continue;
        };
        for hit in result.hits {
            candidates.push(EvidenceCandidate {
                source_type: SourceType::Wiki,
                title: hit.title,
                url: format!("wiki://page/{}", hit.page_id),
                content: hit.content.clone(),
                snippet: hit.content.chars().take(300).collect(),
                metadata: EvidenceMetadata {
                    intent: query.meta.intent.clone(),
                    stance: query.meta.stance,
                    claim_id: query.meta.claim_id.clone(),
                    mode: query.meta.mode,
                    ..Default::default()
                },
            });
        }
    }
    candidates
}

fn query_type_to_source_type(query_type: QueryType) -> SourceType {
    match query_type {
        QueryType::News => SourceType::News,
        _ => SourceType::WebUrl,
    }
}

fn normalized_results_to_candidates(
    results: Vec<NormalizedResult>,
    queries: &[&crate::state::QueryVariant],
) -> Vec<EvidenceCandidate> {
    let fallback_meta = queries.first().map(|q| &q.meta);
    let fallback_source_type = queries.first().map(|q| query_type_to_source_type(q.query_type)).unwrap_or(SourceType::WebUrl);
    results
        .into_iter()
        .map(|result| EvidenceCandidate {
            source_type: fallback_source_type,
            title: result.title,
            url: result.url,
            content: result.snippet.clone(),
            snippet: result.snippet,
            metadata: EvidenceMetadata {
                intent: fallback_meta.and_then(|m| m.intent.clone()),
                stance: fallback_meta.and_then(|m| m.stance),
                claim_id: fallback_meta.map(|m| m.claim_id.clone()).unwrap_or_default(),
                mode: fallback_meta.and_then(|m| m.mode),
                ..Default::default()
            },
        })
        .collect()
}

pub async fn run(state: &mut PipelineState, ctx: &StageContext) {
    let Some(variants) = state.query_variants.clone() else {
        state.append_stage_log("s3_collect: skipped, no query_variants");
        return;
    };

    let wiki_queries: Vec<&crate::state::QueryVariant> = variants.iter().filter(|v| v.query_type == QueryType::Wiki).collect();
    let web_queries: Vec<&crate::state::QueryVariant> = variants.iter().filter(|v| v.query_type != QueryType::Wiki).collect();

    let wiki_candidates = run_wiki_async(ctx.retrieval.as_ref(), &wiki_queries).await;

    let web_query_texts: Vec<String> = web_queries.iter().map(|v| v.text.clone()).collect();
    let web_raw_results = run_web_async(&ctx.search_clients, &web_query_texts).await;
    let web_candidates = normalized_results_to_candidates(web_raw_results, &web_queries);

    let (merged, stats) = run_merge(ctx, wiki_candidates, web_candidates).await;

    state.evidence_candidates = Some(merged);
    state.stage03_merge_stats = Some(stats);
    state.append_stage_log("s3_collect: ok");
}

async fn run_merge(
    ctx: &StageContext,
    wiki_candidates: Vec<EvidenceCandidate>,
    web_candidates: Vec<EvidenceCandidate>,
) -> (Vec<EvidenceCandidate>, serde_json::Value) {
    let mut merged = Vec::new();
    let mut seen_urls = std::collections::HashSet::new();

    for candidate in wiki_candidates.into_iter().chain(web_candidates) {
        if seen_urls.insert(candidate.url.clone()) {
            merged.push(candidate);
        }
    }

    let mut html_enriched_count = 0usize;
    let mut html_fetch_fail_count = 0usize;
    let mut tier_distribution: HashMap<String, usize> = HashMap::new();

    let web_indices: Vec<usize> = merged
        .iter()
        .enumerate()
        .filter(|(_, c)| c.source_type != SourceType::Wiki)
        .map(|(i, _)| i)
        .take(ctx.merge_html_enrich_top_n)
        .collect();

    for idx in web_indices {
        let (url, title, snippet) = {
            let candidate = &merged[idx];
            (candidate.url.clone(), candidate.title.clone(), candidate.snippet.clone())
        };

        let signals = analyze_html_signals(&ctx.http_client, &url, &title, &snippet, Duration::from_secs(5)).await;
        if signals.fetch_ok {
            html_enriched_count += 1;
        } else {
            html_fetch_fail_count += 1;
        }

        let trust = build_source_trust(&url, SourceType::WebUrl, &ctx.source_trust_overrides);
        let credibility_score = 0.6 * trust.source_trust_score + 0.4 * signals.html_signal_score;

        *tier_distribution.entry(format!("{:?}", trust.source_tier)).or_insert(0) += 1;

        let candidate = &mut merged[idx];
        candidate.metadata.source_tier = Some(trust.source_tier);
        candidate.metadata.source_trust_score = Some(trust.source_trust_score);
        candidate.metadata.html_signal_score = Some(signals.html_signal_score);
        candidate.metadata.credibility_score = Some(credibility_score);
    }

    for candidate in merged.iter_mut() {
        if candidate.metadata.source_tier.is_none() {
            let trust = build_source_trust(&candidate.url, candidate.source_type, &ctx.source_trust_overrides);
            *tier_distribution.entry(format!("{:?}", trust.source_tier)).or_insert(0) += 1;
            candidate.metadata.source_tier = Some(trust.source_tier);
            candidate.metadata.source_trust_score = Some(trust.source_trust_score);
            candidate.metadata.credibility_score.get_or_insert(trust.source_trust_score);
        }
    }

    let stats = json!({
        "html_enriched_count": html_enriched_count,
        "html_fetch_fail_count": html_fetch_fail_count,
        "tier_distribution": tier_distribution,
    });

    (merged, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_maps_news_to_news_source_type() {
        assert_eq!(query_type_to_source_type(QueryType::News), SourceType::News);
        assert_eq!(query_type_to_source_type(QueryType::Web), SourceType::WebUrl);
    }
}
