//! Ambient `/healthz` and a debug metrics endpoint over the bounded
//! observability accumulators.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz)).route("/debug/metrics", get(metrics))
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let started_at = *STARTED_AT.get_or_init(Instant::now);
    let uptime_seconds = started_at.elapsed().as_secs();

    match state.retrieval.check_connectivity() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "uptime_seconds": uptime_seconds,
                "corpus_store": "ok",
            })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "uptime_seconds": uptime_seconds,
                "corpus_store": format!("unavailable: {err}"),
            })),
        ),
    }
}

async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let traces = state.observability.recent_traces();
    Json(serde_json::json!({
        "recent_traces": traces.iter().map(|t| serde_json::json!({
            "trace_id": t.trace_id,
            "label": t.label,
            "total_latency_ms": t.total_latency_ms,
        })).collect::<Vec<_>>(),
        "naver_success_ratio": state.observability.provider_success_ratio("naver"),
        "ddg_success_ratio": state.observability.provider_success_ratio("ddg"),
    }))
}
