//! HTTP-surface tests: request validation and the ambient health
//! endpoint, built against a hand-assembled `AppState` so the test
//! doesn't need a live LLM or search provider to exercise the routes
//! that reject or answer before the pipeline runs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use veritas_common::db::initialize_pool;
use veritas_common::observability::Observability;
use veritas_core::checkpoint::InMemoryCheckpointStore;
use veritas_core::llm::{LlmClient, LlmEndpointConfig};
use veritas_core::orchestrator::{Orchestrator, OrchestratorConfig};
use veritas_core::persistence::NullResultStore;
use veritas_core::prefetch::NullTranscriptProvider;
use veritas_core::retrieval::{ensure_corpus_schema, EmbeddingClient, RetrievalBackend, RetrievalError};
use veritas_core::scoring::ScoringConfig;
use veritas_core::stages::StageContext;
use veritas_protocol::response::ModelInfo;

struct FixedEmbedder;

#[async_trait::async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|_| vec![0.0]).collect())
    }
}

fn test_app() -> axum::Router {
    let dir = tempfile::tempdir().unwrap();
    let pool = initialize_pool(&dir.path().join("corpus.db"), 1).unwrap();
    {
        let conn = pool.get().unwrap();
        ensure_corpus_schema(&conn).unwrap();
    }
    let retrieval = Arc::new(RetrievalBackend::new(pool, Arc::new(FixedEmbedder), false));

    let llm_config = LlmEndpointConfig {
        primary_base_url: "http://127.0.0.1:0".to_string(),
        primary_model: "unused".to_string(),
        primary_api_key: None,
        fallback_base_url: None,
        fallback_model: None,
        fallback_api_key: None,
    };
    let http_client = reqwest::Client::new();

    let ctx = StageContext {
        http_client: http_client.clone(),
        retrieval: Arc::clone(&retrieval),
        search_clients: Vec::new(),
        transcripts: Arc::new(NullTranscriptProvider),
        querygen_llm: Arc::new(LlmClient::new(http_client.clone(), llm_config.clone())),
        evaluator_llm: Arc::new(LlmClient::new(http_client, llm_config)),
        judge_llm: None,
        checkpoint_store: Arc::new(InMemoryCheckpointStore::new()),
        scoring_config: ScoringConfig::default(),
        source_trust_overrides: HashMap::new(),
        normalize_mode: "basic".to_string(),
        non_wiki_query_cap: 3,
        top_k_threshold: 0.3,
        top_k_size: 10,
        merge_html_enrich_top_n: 3,
        quality_gate_threshold: 0.5,
    };
    let orchestrator_config = OrchestratorConfig {
        checkpoint_enabled: false,
        checkpoint_ttl_seconds: 3600,
        heartbeat_interval_seconds: 10,
        stage_soft_timeout_seconds: 30,
        model_info: ModelInfo {
            provider: "test".to_string(),
            model: "test".to_string(),
            version: "0.0.0".to_string(),
        },
    };
    let orchestrator = Arc::new(Orchestrator::new(ctx, orchestrator_config, Arc::new(NullResultStore)));
    let state = veritas_server::AppState { orchestrator, retrieval, observability: Arc::new(Observability::default()) };

    veritas_server::build_router(state)
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app();
    let response = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn truth_check_rejects_empty_input_payload() {
    let app = test_app();
    let body = serde_json::json!({ "input_type": "text", "input_payload": "" });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/truth/check")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
