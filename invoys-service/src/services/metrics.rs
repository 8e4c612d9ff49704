//! Prometheus metrics for invoys-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// RPC request counter by method and status.
pub static RPC_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoys_rpc_requests_total",
        "Total number of RPC requests",
        &["method", "status"]
    )
    .expect("Failed to register rpc_requests_total")
});

/// RPC request duration histogram by method.
pub static RPC_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoys_rpc_request_duration_seconds",
        "RPC request duration in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register rpc_request_duration")
});

/// Invoice lifecycle events.
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoys_invoices_total",
        "Total number of invoice lifecycle events",
        &["event"] // created, edited, deleted, status_pending, status_paid, ...
    )
    .expect("Failed to register invoices_total")
});

/// Outbound notification calls by kind and outcome.
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoys_notifications_total",
        "Total number of notification provider calls",
        &["kind", "outcome"]
    )
    .expect("Failed to register notifications_total")
});

/// Invoices moved to OVERDUE by the sweep, by trigger.
pub static OVERDUE_SWEPT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoys_overdue_swept_total",
        "Total number of invoices marked overdue",
        &["trigger"]
    )
    .expect("Failed to register overdue_swept_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "invoys_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "invoys_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&RPC_REQUESTS_TOTAL);
    Lazy::force(&RPC_REQUEST_DURATION);
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&NOTIFICATIONS_TOTAL);
    Lazy::force(&OVERDUE_SWEPT_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
