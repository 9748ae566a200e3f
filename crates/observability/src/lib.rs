use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide counters. Read by `/health`, never by request routing.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    clarifications_total: AtomicU64,
    upstream_failures_total: AtomicU64,
    llm_fallbacks_total: AtomicU64,
    steps_synthesized_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub clarifications_total: u64,
    pub upstream_failures_total: u64,
    pub llm_fallbacks_total: u64,
    pub steps_synthesized_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_clarification(&self) {
        self.clarifications_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream_failure(&self) {
        self.upstream_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_llm_fallback(&self) {
        self.llm_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_synthesized_steps(&self, steps: usize) {
        self.steps_synthesized_total
            .fetch_add(steps as u64, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            clarifications_total: self.clarifications_total.load(Ordering::Relaxed),
            upstream_failures_total: self.upstream_failures_total.load(Ordering::Relaxed),
            llm_fallbacks_total: self.llm_fallbacks_total.load(Ordering::Relaxed),
            steps_synthesized_total: self.steps_synthesized_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

/// JSON logs filtered by `RUST_LOG`, else by `MATHGATE_LOG_LEVEL`.
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = env::var("MATHGATE_LOG_LEVEL")
                .map(|value| value.trim().to_lowercase())
                .unwrap_or_else(|_| "info".to_string());
            EnvFilter::new(format!(
                "{service_name}={level},mathgate_api={level},mathgate_agents={level},mathgate_upstream={level},tower_http=info"
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_latency() {
        let metrics = AppMetrics::default();
        assert_eq!(metrics.snapshot().avg_latency_millis, 0.0);

        metrics.inc_request();
        metrics.inc_request();
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));
        metrics.add_synthesized_steps(6);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.avg_latency_millis, 20.0);
        assert_eq!(snapshot.steps_synthesized_total, 6);
    }
}
