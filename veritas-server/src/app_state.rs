//! Shared application state constructed once at startup and cloned
//! (cheaply, via `Arc`) into every request handler.

use std::sync::Arc;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use veritas_common::config::AppConfig;
use veritas_common::observability::Observability;
use veritas_core::checkpoint::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
use veritas_core::llm::{LlmClient, LlmEndpointConfig};
use veritas_core::orchestrator::{Orchestrator, OrchestratorConfig};
use veritas_core::persistence::{NullResultStore, ResultStore, SqliteResultStore};
use veritas_core::prefetch::NullTranscriptProvider;
use veritas_core::retrieval::{HttpEmbeddingClient, RetrievalBackend};
use veritas_core::scoring::ScoringConfig;
use veritas_core::search_clients::{DdgSearchProvider, GatedSearchClient, NaverSearchProvider};
use veritas_core::stages::StageContext;
use veritas_common::retry::RetryConfig;
use veritas_protocol::response::ModelInfo;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub retrieval: Arc<RetrievalBackend>,
    pub observability: Arc<Observability>,
}

impl AppState {
    pub fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(Duration::from_secs_f64(config.external_api_timeout_seconds)).build()?;

        let corpus_pool = veritas_common::db::initialize_pool(std::path::Path::new(&config.corpus_db_path), config.corpus_db_pool_size)?;
        {
            let conn = corpus_pool.get()?;
            veritas_core::retrieval::ensure_corpus_schema(&conn)?;
        }
        let embedder = Arc::new(HttpEmbeddingClient::new(http_client.clone(), config.llm_primary_base_url.clone(), config.embed_model.clone()));
        let retrieval = Arc::new(RetrievalBackend::new(corpus_pool, embedder, true));

        let checkpoint_store: Arc<dyn CheckpointStore> = match config.checkpoint_backend {
            veritas_common::config::CheckpointBackend::Memory => Arc::new(InMemoryCheckpointStore::new()),
            veritas_common::config::CheckpointBackend::None => Arc::new(InMemoryCheckpointStore::new()),
            veritas_common::config::CheckpointBackend::Postgres => {
                let pool: r2d2::Pool<SqliteConnectionManager> =
                    veritas_common::db::initialize_pool(std::path::Path::new(&config.checkpoint_db_path), 5)?;
                {
                    let conn = pool.get()?;
                    veritas_common::db::ensure_checkpoint_schema(&conn)?;
                    veritas_common::db::ensure_analysis_results_schema(&conn)?;
                }
                Arc::new(SqliteCheckpointStore::new(pool))
            }
        };

        let result_store: Arc<dyn ResultStore> = if matches!(config.checkpoint_backend, veritas_common::config::CheckpointBackend::Postgres) {
            let pool: r2d2::Pool<SqliteConnectionManager> = veritas_common::db::initialize_pool(std::path::Path::new(&config.checkpoint_db_path), 5)?;
            Arc::new(SqliteResultStore::new(pool))
        } else {
            Arc::new(NullResultStore)
        };

        let search_retry = RetryConfig::from_seconds(config.external_api_backoff_seconds, config.external_api_retry_attempts);
        let timeout = Duration::from_secs_f64(config.external_api_timeout_seconds);
        let search_clients: Vec<Arc<GatedSearchClient>> = {
            let mut clients = Vec::new();
            if let (Ok(id), Ok(secret)) = (std::env::var("NAVER_CLIENT_ID"), std::env::var("NAVER_CLIENT_SECRET")) {
                clients.push(Arc::new(GatedSearchClient::new(
                    Arc::new(NaverSearchProvider::new(http_client.clone(), id, secret)),
                    config.naver_max_concurrency,
                    timeout,
                    search_retry.clone(),
                )));
            }
            clients.push(Arc::new(GatedSearchClient::new(
                Arc::new(DdgSearchProvider::new(http_client.clone())),
                config.ddg_max_concurrency,
                timeout,
                search_retry.clone(),
            )));
            clients
        };

        let querygen_llm = Arc::new(LlmClient::new(http_client.clone(), llm_endpoint_config(config)));
        let evaluator_llm = Arc::new(LlmClient::new(http_client.clone(), llm_endpoint_config(config)));
        let judge_llm = config.judge_base_url.as_ref().map(|base_url| {
            Arc::new(LlmClient::new(
                http_client.clone(),
                LlmEndpointConfig {
                    primary_base_url: base_url.clone(),
                    primary_model: "judge".to_string(),
                    primary_api_key: None,
                    fallback_base_url: None,
                    fallback_model: None,
                    fallback_api_key: None,
                },
            ))
        });

        let ctx = StageContext {
            http_client,
            retrieval: Arc::clone(&retrieval),
            search_clients,
            transcripts: Arc::new(NullTranscriptProvider),
            querygen_llm,
            evaluator_llm,
            judge_llm,
            checkpoint_store,
            scoring_config: ScoringConfig {
                low_overlap_threshold: config.stage4_low_overlap_threshold,
                rumor_score_cap: config.stage5_threshold_rumor,
            },
            source_trust_overrides: Default::default(),
            normalize_mode: "basic".to_string(),
            non_wiki_query_cap: config.stage3_web_query_cap_per_claim,
            top_k_threshold: 0.3,
            top_k_size: 10,
            merge_html_enrich_top_n: config.stage3_html_signal_top_n,
            quality_gate_threshold: config.stage9_quality_cutoff,
        };

        let orchestrator_config = OrchestratorConfig {
            checkpoint_enabled: config.checkpoint_enabled,
            checkpoint_ttl_seconds: config.checkpoint_ttl_seconds,
            heartbeat_interval_seconds: config.heartbeat_interval_seconds,
            stage_soft_timeout_seconds: config.stage_soft_timeout_seconds,
            model_info: ModelInfo {
                provider: "openai-compatible".to_string(),
                model: "veritas-pipeline".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let orchestrator = Arc::new(Orchestrator::new(ctx, orchestrator_config, result_store));

        Ok(Self { orchestrator, retrieval, observability: Arc::new(Observability::default()) })
    }
}

fn llm_endpoint_config(config: &AppConfig) -> LlmEndpointConfig {
    LlmEndpointConfig {
        primary_base_url: config.llm_primary_base_url.clone(),
        primary_model: config.embed_model.clone(),
        primary_api_key: std::env::var("VERITAS_LLM_API_KEY").ok(),
        fallback_base_url: config.llm_fallback_base_url.clone(),
        fallback_model: config.llm_fallback_base_url.as_ref().map(|_| "fallback".to_string()),
        fallback_api_key: None,
    }
}
