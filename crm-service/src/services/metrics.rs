//! Prometheus metrics for crm-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec,
    HistogramVec, IntCounterVec, TextEncoder,
};

/// Invoices created, by what triggered them (manual, recurring_manual, recurring_scheduled).
pub static INVOICES_CREATED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "crm_invoices_created_total",
        "Total number of invoices created by trigger",
        &["trigger"]
    )
    .expect("Failed to register invoices_created_total")
});

/// Invoiced amount, by trigger.
pub static INVOICE_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crm_invoice_amount_total",
        "Total invoiced amount by trigger",
        &["trigger"]
    )
    .expect("Failed to register invoice_amount_total")
});

/// Invoice-number collisions that were retried.
pub static INVOICE_NUMBER_CONFLICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "crm_invoice_number_conflicts_total",
        "Invoice number uniqueness conflicts by outcome",
        &["outcome"] // retried, exhausted
    )
    .expect("Failed to register invoice_number_conflicts_total")
});

/// Per-template outcomes of recurring generation.
pub static RECURRING_TEMPLATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "crm_recurring_templates_total",
        "Recurring templates processed by outcome",
        &["outcome"] // generated, failed, tenant_failed
    )
    .expect("Failed to register recurring_templates_total")
});

/// Duration of a full recurring batch run.
pub static RECURRING_RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "crm_recurring_run_duration_seconds",
        "Recurring batch run duration in seconds",
        &["trigger"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .expect("Failed to register recurring_run_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "crm_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "crm_db_query_duration_seconds",
        "Database query duration in seconds",
        &["backend", "operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_CREATED_TOTAL);
    Lazy::force(&INVOICE_AMOUNT_TOTAL);
    Lazy::force(&INVOICE_NUMBER_CONFLICTS_TOTAL);
    Lazy::force(&RECURRING_TEMPLATES_TOTAL);
    Lazy::force(&RECURRING_RUN_DURATION);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&service_core::middleware::metrics::HTTP_REQUESTS_TOTAL);
    Lazy::force(&service_core::middleware::metrics::HTTP_REQUEST_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
