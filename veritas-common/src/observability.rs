//! Bounded, process-wide observability accumulators (C8): per-stage
//! latency samples, per-provider success ratios, and a recent-trace
//! ring buffer. All bounded so memory use is flat over a long-running
//! process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const MAX_LATENCY_SAMPLES_PER_STAGE: usize = 500;
const MAX_RECENT_TRACES: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub successes: u64,
    pub failures: u64,
}

impl ProviderStats {
    pub fn success_ratio(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceSummary {
    pub trace_id: String,
    pub label: Option<String>,
    pub total_latency_ms: u64,
}

#[derive(Default)]
struct Inner {
    stage_latencies: HashMap<String, VecDeque<u64>>,
    provider_stats: HashMap<String, ProviderStats>,
    recent_traces: VecDeque<TraceSummary>,
}

/// Thread-safe accumulator, meant to be held behind a single process-wide
/// `Arc` (or as a `OnceLock`), mirroring the "lazily initialized under a
/// mutex" guidance for global accumulators.
#[derive(Default)]
pub struct Observability {
    inner: Mutex<Inner>,
}

impl Observability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_stage_latency(&self, stage: &str, elapsed_ms: u64) {
        let mut inner = self.inner.lock().expect("observability mutex poisoned");
        let samples = inner.stage_latencies.entry(stage.to_string()).or_default();
        samples.push_back(elapsed_ms);
        while samples.len() > MAX_LATENCY_SAMPLES_PER_STAGE {
            samples.pop_front();
        }
    }

    pub fn record_provider_result(&self, provider: &str, success: bool) {
        let mut inner = self.inner.lock().expect("observability mutex poisoned");
        let stats = inner.provider_stats.entry(provider.to_string()).or_default();
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
    }

    pub fn record_trace(&self, summary: TraceSummary) {
        let mut inner = self.inner.lock().expect("observability mutex poisoned");
        inner.recent_traces.push_back(summary);
        while inner.recent_traces.len() > MAX_RECENT_TRACES {
            inner.recent_traces.pop_front();
        }
    }

    pub fn stage_latency_samples(&self, stage: &str) -> Vec<u64> {
        let inner = self.inner.lock().expect("observability mutex poisoned");
        inner
            .stage_latencies
            .get(stage)
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn provider_success_ratio(&self, provider: &str) -> f64 {
        let inner = self.inner.lock().expect("observability mutex poisoned");
        inner
            .provider_stats
            .get(provider)
            .map(ProviderStats::success_ratio)
            .unwrap_or(1.0)
    }

    pub fn recent_traces(&self) -> Vec<TraceSummary> {
        let inner = self.inner.lock().expect("observability mutex poisoned");
        inner.recent_traces.iter().cloned().collect()
    }

    /// Drops all accumulated state. Exposed for tests that need a clean
    /// slate against a shared process-wide instance.
    pub fn reset_for_test(&self) {
        let mut inner = self.inner.lock().expect("observability mutex poisoned");
        *inner = Inner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_ring_buffer_is_bounded() {
        let obs = Observability::new();
        for i in 0..(MAX_LATENCY_SAMPLES_PER_STAGE + 50) {
            obs.record_stage_latency("stage01_normalize", i as u64);
        }
        let samples = obs.stage_latency_samples("stage01_normalize");
        assert_eq!(samples.len(), MAX_LATENCY_SAMPLES_PER_STAGE);
        assert_eq!(samples[0], 50);
    }

    #[test]
    fn provider_success_ratio_computes_correctly() {
        let obs = Observability::new();
        obs.record_provider_result("naver", true);
        obs.record_provider_result("naver", true);
        obs.record_provider_result("naver", false);
        assert!((obs.provider_success_ratio("naver") - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_provider_defaults_to_full_success_ratio() {
        let obs = Observability::new();
        assert_eq!(obs.provider_success_ratio("unknown"), 1.0);
    }

    #[test]
    fn recent_trace_ring_buffer_is_bounded() {
        let obs = Observability::new();
        for i in 0..(MAX_RECENT_TRACES + 10) {
            obs.record_trace(TraceSummary {
                trace_id: format!("trace-{i}"),
                label: None,
                total_latency_ms: 10,
            });
        }
        assert_eq!(obs.recent_traces().len(), MAX_RECENT_TRACES);
    }
}
