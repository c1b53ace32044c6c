//! Metrics collection and reporting for the control plane.

use crate::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec, Registry,
};

/// Global metrics registry.
pub static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Count of state-machine transitions, by entity kind and resulting state.
pub static TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "am_transitions_total",
        "Total state-machine transitions",
        &["entity", "to_state"]
    )
    .unwrap()
});

/// Count of events dispatched, by event kind.
pub static EVENTS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "am_events_dispatched_total",
        "Total events dispatched on the bus",
        &["kind"]
    )
    .unwrap()
});

/// RPC call counter, by operation and outcome.
pub static RPC_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "am_rpc_calls_total",
        "Total worker RPC calls handled",
        &["operation", "outcome"]
    )
    .unwrap()
});

/// RPC call latency, by operation.
pub static RPC_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "am_rpc_latency_seconds",
        "Worker RPC latency in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap()
});

/// Active containers gauge, by state.
pub static ACTIVE_CONTAINERS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "am_active_containers",
        "Number of containers currently in a given state",
        &["state"]
    )
    .unwrap()
});

/// Error counter, by kind and severity.
pub static ERROR_COUNTER: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "am_errors_total",
        "Total number of errors",
        &["error_kind", "severity"]
    )
    .unwrap()
});

/// Register all metrics collectors with the global registry. Idempotent
/// per-process; call once during startup.
pub fn init_metrics() -> Result<()> {
    METRICS_REGISTRY.register(Box::new(TRANSITIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(EVENTS_DISPATCHED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RPC_CALLS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RPC_LATENCY_SECONDS.clone()))?;
    METRICS_REGISTRY.register(Box::new(ACTIVE_CONTAINERS.clone()))?;
    METRICS_REGISTRY.register(Box::new(ERROR_COUNTER.clone()))?;
    Ok(())
}

impl From<prometheus::Error> for crate::error::Error {
    fn from(e: prometheus::Error) -> Self {
        crate::error::Error::Internal(format!("prometheus: {e}"))
    }
}
