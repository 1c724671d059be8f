//! `POST /truth/check` (sync) and the ndjson streaming variants
//! (`/api/truth/check/stream`, `/api/truth/check/stream-v2`).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use veritas_common::observability::TraceSummary;
use veritas_protocol::request::TruthCheckRequest;

use crate::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/truth/check", post(check_sync))
        .route("/api/truth/check/stream", post(check_stream))
        .route("/api/truth/check/stream-v2", post(check_stream_v2))
}

async fn check_sync(State(state): State<AppState>, Json(request): Json<TruthCheckRequest>) -> Response {
    if let Err(reason) = request.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": reason }))).into_response();
    }
    match state.orchestrator.run_sync(&request).await {
        Ok(response) => {
            state.observability.record_trace(TraceSummary {
                trace_id: response.analysis_id.clone(),
                label: Some(format!("{:?}", response.label)),
                total_latency_ms: response.latency_ms,
            });
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(veritas_common::error::ErrorEnvelope::from(&err))).into_response(),
    }
}

fn stream_response(orchestrator: Arc<veritas_core::orchestrator::Orchestrator>, request: TruthCheckRequest, with_heartbeat: bool) -> Response {
    let stream = orchestrator.run_stream(request, with_heartbeat).map(|event| Ok::<_, std::io::Error>(event.to_ndjson_line()));
    let body = Body::from_stream(stream);

    let mut builder = Response::builder().status(StatusCode::OK).header(header::CONTENT_TYPE, "application/x-ndjson").header(header::CACHE_CONTROL, "no-cache");
    if with_heartbeat {
        builder = builder.header("X-Accel-Buffering", "no");
    }
    builder.body(body).expect("static headers are valid")
}

async fn check_stream(State(state): State<AppState>, Json(request): Json<TruthCheckRequest>) -> Response {
    if let Err(reason) = request.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": reason }))).into_response();
    }
    stream_response(Arc::clone(&state.orchestrator), request, false)
}

async fn check_stream_v2(State(state): State<AppState>, Json(request): Json<TruthCheckRequest>) -> Response {
    if let Err(reason) = request.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": reason }))).into_response();
    }
    stream_response(Arc::clone(&state.orchestrator), request, true)
}
