//! C7 Orchestrator: drives the nine stages synchronously or as an
//! ndjson event stream, resolves the checkpoint thread, honors the
//! `start_stage`/`end_stage` resume window, and races stage execution
//! against cancellation and a soft timeout (§5, §9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use veritas_async_utils::OrCancelExt;
use veritas_common::error::PipelineError;
use veritas_protocol::events::StreamEvent;
use veritas_protocol::request::TruthCheckRequest;
use veritas_protocol::response::{ModelInfo, TruthCheckResponse};
use veritas_protocol::stage::{StageName, normalize_stage_name, STAGE_ORDER};

use crate::checkpoint::resolve_thread_id;
use crate::persistence::ResultStore;
use crate::state::PipelineState;
use crate::stages::{s1_normalize, s2_querygen, s3_collect, s4_score, s5_topk, s6_support, s7_skeptic, s8_aggregate, s9_judge, StageContext};

/// Tunables the orchestrator itself owns, distinct from the stage
/// clients/thresholds in [`StageContext`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub checkpoint_enabled: bool,
    pub checkpoint_ttl_seconds: i64,
    pub heartbeat_interval_seconds: u64,
    pub stage_soft_timeout_seconds: u64,
    pub model_info: ModelInfo,
}

pub struct Orchestrator {
    pub ctx: StageContext,
    pub config: OrchestratorConfig,
    pub result_store: Arc<dyn ResultStore>,
}

fn default_stage_range(request: &TruthCheckRequest) -> (StageName, StageName) {
    let start = request
        .start_stage
        .as_deref()
        .and_then(|raw| normalize_stage_name(raw, false))
        .unwrap_or(StageName::Stage01Normalize);
    let end = request
        .end_stage
        .as_deref()
        .and_then(|raw| normalize_stage_name(raw, true))
        .unwrap_or(StageName::Stage09Judge);
    (start, end)
}

fn stage_index(name: StageName) -> usize {
    STAGE_ORDER.iter().position(|s| *s == name).unwrap_or(0)
}

/// Collapses the eleven wire-level stage names to the nine stages that
/// actually run; `Stage03Wiki`/`Stage03Web`/`Stage03Merge` all point at
/// one execution of `s3_collect::run`.
fn run_key_for_index(idx: usize) -> &'static str {
    match STAGE_ORDER[idx] {
        StageName::Stage01Normalize => "s1_normalize",
        StageName::AdapterQueries => "s2_querygen",
        StageName::Stage03Wiki | StageName::Stage03Web | StageName::Stage03Merge => "s3_collect",
        StageName::Stage04Score => "s4_score",
        StageName::Stage05Topk => "s5_topk",
        StageName::Stage06VerifySupport | StageName::Stage07VerifySkeptic => "s6_s7_parallel",
        StageName::Stage08Merge => "s8_aggregate",
        StageName::Stage09Judge => "s9_judge",
    }
}

impl Orchestrator {
    pub fn new(ctx: StageContext, config: OrchestratorConfig, result_store: Arc<dyn ResultStore>) -> Self {
        Self { ctx, config, result_store }
    }

    fn build_initial_state(&self, trace_id: &str, request: &TruthCheckRequest) -> PipelineState {
        let mut state = PipelineState::new(trace_id, request.input_type, request.input_payload.clone(), request.language.clone());
        state.as_of = request.as_of.clone();
        if let Some(prior) = &request.stage_state {
            merge_prior_state(&mut state, prior);
        }
        state
    }

    /// Runs the full (or resume-windowed) pipeline, emitting a
    /// `StreamEvent` for every stage boundary and checkpointing after
    /// each one when enabled. Shared by the sync and streaming entry
    /// points; `events` is `None` for the sync path.
    async fn execute(
        &self,
        trace_id: String,
        request: &TruthCheckRequest,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<(PipelineState, bool, bool), PipelineError> {
        let now = Utc::now();
        let (thread_id, resumed, expired) = if self.config.checkpoint_enabled {
            resolve_thread_id(
                self.ctx.checkpoint_store.as_ref(),
                request.checkpoint_thread_id.as_deref().filter(|_| request.checkpoint_resume.unwrap_or(true)),
                &trace_id,
                self.config.checkpoint_ttl_seconds,
                now,
            )
            .await
            .map_err(|e| PipelineError::CheckpointBackendUnavailable(e.to_string()))?
        } else {
            (trace_id.clone(), false, false)
        };

        let mut state = self.build_initial_state(&trace_id, request);
        state.checkpoint_thread_id = Some(thread_id.clone());

        let mut checkpointed_stage: Option<StageName> = None;
        if resumed && let crate::checkpoint::CheckpointLookup::Found { stage, state_json } = self
            .ctx
            .checkpoint_store
            .get(&thread_id, self.config.checkpoint_ttl_seconds, now)
            .await
            .map_err(|e| PipelineError::CheckpointBackendUnavailable(e.to_string()))?
        {
            if let Ok(checkpointed) = serde_json::from_str::<PipelineState>(&state_json) {
                state = checkpointed;
            }
            checkpointed_stage = normalize_stage_name(&stage, false);
        }
        state.entity_map.get_or_insert_with(HashMap::new);

        let (start_stage, end_stage) = default_stage_range(request);
        let end_idx = stage_index(end_stage);
        // A found checkpoint records the last stage that completed, so
        // resume picks up one stage after it (spec §6 scenario 5: a
        // checkpoint at S5 resumes from S6). An explicit `start_stage`
        // from the caller is never regressed past.
        let start_idx = match checkpointed_stage {
            Some(stage) => stage_index(start_stage).max((stage_index(stage) + 1).min(STAGE_ORDER.len() - 1)),
            None => stage_index(start_stage),
        };

        let mut ran_keys: Vec<&'static str> = Vec::new();
        for idx in 0..STAGE_ORDER.len() {
            let key = run_key_for_index(idx);
            if idx < start_idx || idx > end_idx {
                continue;
            }
            if ran_keys.last() == Some(&key) {
                // Same collapsed stage (S3's three sub-names, S6/S7's
                // pair) already ran for an earlier index in this range.
                self.emit_and_checkpoint(&events, &thread_id, &trace_id, STAGE_ORDER[idx], &state, now).await?;
                continue;
            }
            ran_keys.push(key);

            if cancel.is_cancelled() {
                return Err(PipelineError::ExecutionFailed("cancelled".to_string()));
            }

            let soft_timeout = Duration::from_secs(self.config.stage_soft_timeout_seconds);
            let run_result = tokio::time::timeout(soft_timeout, self.run_key(key, &mut state, &cancel)).await;
            match run_result {
                Ok(Ok(())) => {}
                Ok(Err(_cancelled)) => {
                    return Err(PipelineError::ExecutionFailed("cancelled".to_string()));
                }
                Err(_elapsed) => {
                    state.append_stage_log(&format!("{key}: soft timeout exceeded, stage abandoned"));
                }
            }

            self.emit_and_checkpoint(&events, &thread_id, &trace_id, STAGE_ORDER[idx], &state, now).await?;

            if state.claim_text.as_deref().map(str::is_empty).unwrap_or(true) && key == "s1_normalize" {
                break;
            }
        }

        Ok((state, resumed, expired))
    }

    async fn emit_and_checkpoint(
        &self,
        events: &Option<mpsc::Sender<StreamEvent>>,
        thread_id: &str,
        trace_id: &str,
        stage: StageName,
        state: &PipelineState,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if self.config.checkpoint_enabled
            && let Ok(state_json) = serde_json::to_string(state)
        {
            let _ = self.ctx.checkpoint_store.put(thread_id, &stage.to_string(), &state_json, now).await;
        }
        if let Some(tx) = events {
            let data = serde_json::json!({ "stage_logs_tail": state.stage_logs.last().cloned() });
            let _ = tx.send(StreamEvent::stage_complete(trace_id, stage.to_string(), data, Utc::now())).await;
        }
        Ok(())
    }

    async fn run_key(&self, key: &str, state: &mut PipelineState, cancel: &CancellationToken) -> Result<(), ()> {
        match key {
            "s1_normalize" => s1_normalize::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s2_querygen" => s2_querygen::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s3_collect" => s3_collect::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s4_score" => s4_score::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s5_topk" => s5_topk::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s6_s7_parallel" => {
                let (support, skeptic) = {
                    let snapshot: &PipelineState = state;
                    let joined = async { tokio::join!(s6_support::run(snapshot, &self.ctx), s7_skeptic::run(snapshot, &self.ctx)) };
                    joined.or_cancel(cancel).await.map_err(|_| ())?
                };
                match support {
                    Some(outcome) => {
                        state.verdict_support = Some(outcome.verdict);
                        state.merge_stage_outputs(HashMap::from([("s6_support_diagnostics".to_string(), outcome.diagnostics)]));
                        state.append_stage_log("s6_support: ok");
                    }
                    None => state.append_stage_log("s6_support: skipped, no claim_text"),
                }
                match skeptic {
                    Some(outcome) => {
                        state.verdict_skeptic = Some(outcome.verdict);
                        state.merge_stage_outputs(HashMap::from([("s7_skeptic_diagnostics".to_string(), outcome.diagnostics)]));
                        state.append_stage_log("s7_skeptic: ok");
                    }
                    None => state.append_stage_log("s7_skeptic: skipped, no claim_text"),
                }
                Ok(())
            }
            "s8_aggregate" => s8_aggregate::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            "s9_judge" => s9_judge::run(state, &self.ctx).or_cancel(cancel).await.map_err(|_| ()),
            _ => Ok(()),
        }
    }

    fn build_response(
        &self,
        state: &PipelineState,
        analysis_id: String,
        latency_ms: u64,
        include_full_outputs: bool,
        resumed: bool,
        expired: bool,
    ) -> TruthCheckResponse {
        let verdict = state.final_verdict.clone().unwrap_or_else(|| crate::stages::s1_normalize::refused_verdict("pipeline did not produce a verdict"));

        TruthCheckResponse {
            analysis_id,
            label: verdict.label,
            confidence: verdict.confidence,
            summary: verdict.summary,
            model_info: self.config.model_info.clone(),
            latency_ms,
            cost_usd: 0.0,
            created_at: Utc::now(),
            rationale: verdict.rationale,
            citations: verdict.citations,
            counter_evidence: verdict.counter_evidence,
            limitations: verdict.limitations,
            recommended_next_steps: verdict.recommended_next_steps,
            risk_flags: verdict.risk_flags,
            stage_logs: state.stage_logs.clone(),
            stage_outputs: state.stage_outputs.clone(),
            stage_full_outputs: include_full_outputs.then(|| state.stage_full_outputs.clone()),
            checkpoint_thread_id: state.checkpoint_thread_id.clone(),
            checkpoint_resumed: Some(resumed),
            checkpoint_expired: Some(expired),
        }
    }

    /// `POST /truth/check`: runs the pipeline to completion and returns
    /// the final response directly.
    pub async fn run_sync(&self, request: &TruthCheckRequest) -> Result<TruthCheckResponse, PipelineError> {
        let trace_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        let cancel = CancellationToken::new();

        let (state, resumed, expired) = self.execute(trace_id, request, cancel, None).await?;
        let mut response =
            self.build_response(&state, Uuid::new_v4().to_string(), started.elapsed().as_millis() as u64, request.include_full_outputs, resumed, expired);

        if let Err(_persistence_err) = self.result_store.save(&response).await {
            response.risk_flags.push(veritas_protocol::response::risk_flag::PERSISTENCE_FAILED.to_string());
        }

        Ok(response)
    }

    /// `POST /api/truth/check/stream` and `/stream-v2`: returns an
    /// ndjson event stream. `with_heartbeat` selects the v2 behavior
    /// (`stream_open` first, periodic `heartbeat` while idle).
    pub fn run_stream(self: Arc<Self>, request: TruthCheckRequest, with_heartbeat: bool) -> impl Stream<Item = StreamEvent> {
        let trace_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel::<StreamEvent>(32);
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();

        let opener = with_heartbeat.then(|| StreamEvent::stream_open(trace_id.clone(), Utc::now()));

        let orchestrator = Arc::clone(&self);
        let driver_trace_id = trace_id.clone();
        let driver_request = request.clone();
        let driver_cancel = cancel.clone();
        let driver_tx = tx.clone();
        tokio::spawn(async move {
            let include_full_outputs = driver_request.include_full_outputs;
            match orchestrator.execute(driver_trace_id.clone(), &driver_request, driver_cancel, Some(driver_tx.clone())).await {
                Ok((state, resumed, expired)) => {
                    let response = orchestrator.build_response(
                        &state,
                        Uuid::new_v4().to_string(),
                        started.elapsed().as_millis() as u64,
                        include_full_outputs,
                        resumed,
                        expired,
                    );
                    let _ = driver_tx.send(StreamEvent::complete(driver_trace_id, &response, Utc::now())).await;
                }
                Err(err) => {
                    let _ = driver_tx.send(StreamEvent::error(driver_trace_id, err.code(), err.to_string(), Utc::now())).await;
                }
            }
        });

        let heartbeat_interval = with_heartbeat.then(|| Duration::from_secs(self.config.heartbeat_interval_seconds));
        let body = event_stream(rx, heartbeat_interval, trace_id);

        match opener {
            Some(open) => stream::once(async move { open }).chain(body).left_stream(),
            None => body.right_stream(),
        }
    }
}

/// Merges `stage_state` (a caller-supplied prior-state map) into a
/// freshly constructed state, field by field, so a partial resume
/// payload doesn't require the caller to round-trip the whole struct.
fn merge_prior_state(state: &mut PipelineState, prior: &HashMap<String, Value>) {
    let Ok(mut as_value) = serde_json::to_value(&*state) else {
        return;
    };
    let Some(target) = as_value.as_object_mut() else {
        return;
    };
    for (key, value) in prior {
        target.insert(key.clone(), value.clone());
    }
    if let Ok(merged) = serde_json::from_value::<PipelineState>(as_value) {
        *state = merged;
    }
}

/// Turns a channel of stage events into a `Stream`, interleaving
/// heartbeats on `heartbeat_interval` while the channel is otherwise
/// idle. `None` disables heartbeats (the non-v2 stream variant).
fn event_stream(rx: mpsc::Receiver<StreamEvent>, heartbeat_interval: Option<Duration>, trace_id: String) -> impl Stream<Item = StreamEvent> {
    stream::unfold((rx, heartbeat_interval, trace_id, false), |(mut rx, heartbeat_interval, trace_id, done)| async move {
        if done {
            return None;
        }
        match heartbeat_interval {
            Some(interval) => {
                tokio::select! {
                    biased;
                    maybe_event = rx.recv() => match maybe_event {
                        Some(event) => {
                            let terminal = event.is_terminal();
                            Some((event, (rx, heartbeat_interval, trace_id, terminal)))
                        }
                        None => None,
                    },
                    _ = tokio::time::sleep(interval) => {
                        let heartbeat = StreamEvent::heartbeat(trace_id.clone(), Utc::now());
                        Some((heartbeat, (rx, heartbeat_interval, trace_id, false)))
                    }
                }
            }
            None => rx.recv().await.map(|event| {
                let terminal = event.is_terminal();
                (event, (rx, heartbeat_interval, trace_id, terminal))
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_range_spans_full_pipeline_when_unset() {
        let request = TruthCheckRequest {
            input_type: veritas_protocol::request::InputType::Text,
            input_payload: "claim".to_string(),
            language: "ko".to_string(),
            as_of: None,
            start_stage: None,
            end_stage: None,
            normalize_mode: None,
            stage_state: None,
            include_full_outputs: false,
            checkpoint_thread_id: None,
            checkpoint_resume: Some(true),
        };
        let (start, end) = default_stage_range(&request);
        assert_eq!(start, StageName::Stage01Normalize);
        assert_eq!(end, StageName::Stage09Judge);
    }

    #[test]
    fn stage03_collect_alias_resolves_resume_window() {
        let request = TruthCheckRequest {
            input_type: veritas_protocol::request::InputType::Text,
            input_payload: "claim".to_string(),
            language: "ko".to_string(),
            as_of: None,
            start_stage: Some("stage03_collect".to_string()),
            end_stage: Some("stage03_collect".to_string()),
            normalize_mode: None,
            stage_state: None,
            include_full_outputs: false,
            checkpoint_thread_id: None,
            checkpoint_resume: Some(true),
        };
        let (start, end) = default_stage_range(&request);
        assert_eq!(start, StageName::Stage03Wiki);
        assert_eq!(end, StageName::Stage03Merge);
    }

    #[test]
    fn run_key_collapses_s3_and_s6_s7() {
        assert_eq!(run_key_for_index(stage_index(StageName::Stage03Wiki)), "s3_collect");
        assert_eq!(run_key_for_index(stage_index(StageName::Stage03Merge)), "s3_collect");
        assert_eq!(run_key_for_index(stage_index(StageName::Stage06VerifySupport)), "s6_s7_parallel");
        assert_eq!(run_key_for_index(stage_index(StageName::Stage07VerifySkeptic)), "s6_s7_parallel");
    }
}
