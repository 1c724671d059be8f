//! Auxiliary retrieval endpoints exposing the corpus backend (C1)
//! directly, alongside the main verification surface.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream;

use veritas_protocol::wiki::{
    RagSearchRequest, RagSearchResponse, RagStreamLine, WikiKeywordSearchRequest, WikiKeywordSearchResponse, WikiPageSummary, WikiSearchRequest,
    WikiSearchResponse,
};

use crate::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/wiki/search", post(wiki_search))
        .route("/api/wiki/keyword-search", post(wiki_keyword_search))
        .route("/api/rag/wiki/search", post(rag_wiki_search))
        .route("/wiki/rag-stream", post(rag_stream))
}

fn to_search_mode(mode: Option<veritas_protocol::wiki::SearchMode>) -> veritas_core::state::SearchMode {
    match mode {
        Some(veritas_protocol::wiki::SearchMode::Lexical) => veritas_core::state::SearchMode::Lexical,
        Some(veritas_protocol::wiki::SearchMode::Fts) => veritas_core::state::SearchMode::Fts,
        Some(veritas_protocol::wiki::SearchMode::Vector) => veritas_core::state::SearchMode::Vector,
        Some(veritas_protocol::wiki::SearchMode::Auto) | None => veritas_core::state::SearchMode::Auto,
    }
}

async fn wiki_search(State(state): State<AppState>, Json(request): Json<WikiSearchRequest>) -> Response {
    let mode = to_search_mode(request.mode);
    match state
        .retrieval
        .search(&request.question, request.top_k, request.page_ids.as_deref(), request.window as i64, request.max_chars, mode)
        .await
    {
        Ok(result) => {
            let to_hit = |h: veritas_core::retrieval::WikiChunkHit| veritas_protocol::wiki::WikiChunkHit {
                page_id: h.page_id,
                chunk_id: h.chunk_id,
                chunk_idx: h.chunk_idx,
                title: h.title,
                content: h.content,
                score: h.score,
            };
            let response = WikiSearchResponse {
                candidates: result.candidates.into_iter().map(to_hit).collect(),
                hits: result.hits.into_iter().map(to_hit).collect(),
                prompt_context: result.prompt_context,
                debug: serde_json::to_value(&result.debug).ok(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn wiki_keyword_search(State(_state): State<AppState>, Json(request): Json<WikiKeywordSearchRequest>) -> Response {
    // No dedicated keyword-only index; approximate with a lexical-mode
    // hybrid search and collapse hits down to distinct pages.
    let retrieval = _state.retrieval;
    match retrieval.search(&request.keyword, request.top_k, None, 0, 2000, veritas_core::state::SearchMode::Lexical).await {
        Ok(result) => {
            let mut seen = std::collections::HashSet::new();
            let pages = result
                .hits
                .into_iter()
                .filter(|h| seen.insert(h.page_id))
                .map(|h| WikiPageSummary { page_id: h.page_id, title: h.title })
                .collect();
            (StatusCode::OK, Json(WikiKeywordSearchResponse { pages })).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))).into_response(),
    }
}

async fn rag_wiki_search(State(state): State<AppState>, Json(request): Json<RagSearchRequest>) -> Response {
    match state
        .retrieval
        .search(&request.question, request.top_k, None, 1, 2000, veritas_core::state::SearchMode::Auto)
        .await
    {
        Ok(result) => {
            let mut seen = std::collections::HashSet::new();
            let sources = result
                .hits
                .iter()
                .filter(|h| seen.insert(h.page_id))
                .map(|h| WikiPageSummary { page_id: h.page_id, title: h.title.clone() })
                .collect();
            (StatusCode::OK, Json(RagSearchResponse { context: result.prompt_context, sources })).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))).into_response(),
    }
}

/// Assembles the same RAG context `rag_wiki_search` does, then streams
/// a generation pass over it as ndjson: a `sources` preamble line, one
/// `token` line per whitespace-delimited word of the generated answer,
/// and a trailing `done` line. The generation call itself is not
/// token-streamed by the upstream endpoint, so this chunks the
/// completed response rather than forwarding provider-side deltas.
async fn rag_stream(State(state): State<AppState>, Json(request): Json<RagSearchRequest>) -> Response {
    if request.question.trim().is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": "question must not be empty" }))).into_response();
    }

    let search_result = match state
        .retrieval
        .search(&request.question, request.top_k, None, 1, 2000, veritas_core::state::SearchMode::Auto)
        .await
    {
        Ok(result) => result,
        Err(err) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))).into_response(),
    };

    let mut seen = HashSet::new();
    let sources: Vec<WikiPageSummary> =
        search_result.hits.iter().filter(|h| seen.insert(h.page_id)).map(|h| WikiPageSummary { page_id: h.page_id, title: h.title.clone() }).collect();

    let llm = state.orchestrator.ctx.judge_llm.clone().unwrap_or_else(|| Arc::clone(&state.orchestrator.ctx.evaluator_llm));
    let system = "Answer the question using only the provided wiki context. Be concise.";
    let user = format!("Context:\n{}\n\nQuestion: {}", search_result.prompt_context, request.question);

    let answer = match llm.call(system, &user, 512, 0.2).await {
        Ok(result) => result.raw_text,
        Err(err) => return (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "error": err.to_string() }))).into_response(),
    };

    let mut lines = Vec::with_capacity(answer.split_whitespace().count() + 2);
    lines.push(RagStreamLine::Sources { sources });
    lines.extend(answer.split_whitespace().map(|word| RagStreamLine::Token { text: format!("{word} ") }));
    lines.push(RagStreamLine::Done);

    let body = Body::from_stream(stream::iter(lines.into_iter().map(|line| Ok::<_, std::io::Error>(line.to_ndjson_line()))));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static headers are valid")
}
