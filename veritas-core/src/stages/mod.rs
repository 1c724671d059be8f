//! The nine pipeline stages (C6, §4.6). Each stage module exposes a
//! single `run(state, ctx)` that reads its input fields off
//! `PipelineState` and writes its output fields directly — the
//! read/write discipline lives in which fields each stage's `run`
//! touches, not in a separate enforced contract.

mod evaluator_shared;

pub mod s1_normalize;
pub mod s2_querygen;
pub mod s3_collect;
pub mod s4_score;
pub mod s5_topk;
pub mod s6_support;
pub mod s7_skeptic;
pub mod s8_aggregate;
pub mod s9_judge;

use std::collections::HashMap;
use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::llm::LlmClient;
use crate::prefetch::TranscriptProvider;
use crate::retrieval::RetrievalBackend;
use crate::scoring::ScoringConfig;
use crate::search_clients::GatedSearchClient;
use crate::state::SourceTier;

/// Everything a stage needs besides the mutable `PipelineState`:
/// external clients and the tunables spec.md leaves
/// implementation-defined (pool sizes, thresholds, caps).
pub struct StageContext {
    pub http_client: reqwest::Client,
    pub retrieval: Arc<RetrievalBackend>,
    pub search_clients: Vec<Arc<GatedSearchClient>>,
    pub transcripts: Arc<dyn TranscriptProvider>,
    pub querygen_llm: Arc<LlmClient>,
    pub evaluator_llm: Arc<LlmClient>,
    pub judge_llm: Option<Arc<LlmClient>>,
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    pub scoring_config: ScoringConfig,
    pub source_trust_overrides: HashMap<String, SourceTier>,
    pub normalize_mode: String,
    pub non_wiki_query_cap: usize,
    pub top_k_threshold: f64,
    pub top_k_size: usize,
    pub merge_html_enrich_top_n: usize,
    pub quality_gate_threshold: f64,
}
