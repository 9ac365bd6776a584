//! Prometheus metrics for observability.
//!
//! The server registry carries the HTTP request metrics recorded by the
//! middleware, gauges refreshed from the job store on every scrape, and every
//! metric defined by the core crate.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use reelforge_core::{JobFilter, JobStatus};
use tracing::warn;

use crate::state::AppState;

const NAMESPACE: &str = "reelforge";

/// Labels on every per-request series.
const REQUEST_LABELS: [&str; 3] = ["method", "path", "status"];

/// API calls are fast; static media downloads can take a while.
const LATENCY_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0, 2.5, 10.0, 30.0];

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

fn http_opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem("http")
}

/// Time to produce a response, by route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::from(http_opts(
        "request_duration_seconds",
        "Time spent handling a request",
    ))
    .buckets(LATENCY_BUCKETS.to_vec());
    HistogramVec::new(opts, &REQUEST_LABELS).unwrap()
});

/// Requests answered, by route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        http_opts("requests_total", "Requests answered"),
        &REQUEST_LABELS,
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(http_opts("requests_in_flight", "Requests being handled")).unwrap()
});

/// Stored jobs per status, refreshed on scrape.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("jobs_by_status", "Stored jobs per status").namespace(NAMESPACE),
        &["status"],
    )
    .unwrap()
});

/// 1 while the orchestrator accepts work.
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("orchestrator_running", "Whether the orchestrator accepts work")
            .namespace(NAMESPACE),
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    let mut collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(JOBS_BY_STATUS.clone()),
        Box::new(ORCHESTRATOR_RUNNING.clone()),
    ];
    collectors.extend(reelforge_core::metrics::all_metrics());

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Holds one slot of the in-flight gauge until dropped.
pub struct InFlight(());

impl InFlight {
    pub fn enter() -> Self {
        HTTP_REQUESTS_IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        HTTP_REQUESTS_IN_FLIGHT.dec();
    }
}

/// Count one answered request.
pub fn record_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status = status.to_string();
    let labels = [method, path, status.as_str()];
    HTTP_REQUEST_DURATION
        .with_label_values(&labels)
        .observe(elapsed.as_secs_f64());
    HTTP_REQUESTS_TOTAL.with_label_values(&labels).inc();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Refresh gauges that mirror current state before a scrape.
pub async fn collect_dynamic_metrics(state: &AppState) {
    ORCHESTRATOR_RUNNING.set(i64::from(state.orchestrator().is_running()));

    let store = state.job_store();
    for status in [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        match store.count(&JobFilter::new().with_status(status)) {
            Ok(count) => JOBS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count),
            Err(e) => warn!("Failed to count {} jobs: {}", status, e),
        }
    }
}

/// Collapse ids and cache file names so label cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    static UUID: Lazy<regex_lite::Regex> = Lazy::new(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .unwrap()
    });
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());
    static STATIC_FILE: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"^(/static/[^/]+)/.+$").unwrap());

    let result = UUID.replace_all(path, "{id}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    let result = STATIC_FILE.replace(&result, "$1/{file}");
    result.to_string()
}
