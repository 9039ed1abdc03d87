use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cardassist_core::Intent;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    activate_total: AtomicU64,
    deactivate_total: AtomicU64,
    knowledge_total: AtomicU64,
    classification_fallback_total: AtomicU64,
    generation_failures_total: AtomicU64,
    retrieval_hits_total: AtomicU64,
    knowledge_not_found_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub activate_total: u64,
    pub deactivate_total: u64,
    pub knowledge_total: u64,
    pub classification_fallback_total: u64,
    pub generation_failures_total: u64,
    pub retrieval_hits_total: u64,
    pub knowledge_not_found_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardassist_requests_total").increment(1);
    }

    pub fn inc_dispatch(&self, intent: Intent) {
        let counter = match intent {
            Intent::Activate => &self.activate_total,
            Intent::Deactivate => &self.deactivate_total,
            Intent::Knowledge => &self.knowledge_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardassist_dispatch_total", "intent" => intent.as_str()).increment(1);
    }

    pub fn inc_classification_fallback(&self) {
        self.classification_fallback_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardassist_classification_fallback_total").increment(1);
    }

    pub fn inc_generation_failure(&self) {
        self.generation_failures_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardassist_generation_failures_total").increment(1);
    }

    pub fn add_retrieval_hits(&self, hits: usize) {
        self.retrieval_hits_total
            .fetch_add(hits as u64, Ordering::Relaxed);
    }

    pub fn inc_knowledge_not_found(&self) {
        self.knowledge_not_found_total
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cardassist_knowledge_not_found_total").increment(1);
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("cardassist_request_latency_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            activate_total: self.activate_total.load(Ordering::Relaxed),
            deactivate_total: self.deactivate_total.load(Ordering::Relaxed),
            knowledge_total: self.knowledge_total.load(Ordering::Relaxed),
            classification_fallback_total: self
                .classification_fallback_total
                .load(Ordering::Relaxed),
            generation_failures_total: self.generation_failures_total.load(Ordering::Relaxed),
            retrieval_hits_total: self.retrieval_hits_total.load(Ordering::Relaxed),
            knowledge_not_found_total: self.knowledge_not_found_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,cardassist_agents=info,cardassist_retrieval=info",
                service_name
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
