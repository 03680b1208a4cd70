//! Prometheus metrics for triage observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record an imported report entry.
pub fn report_imported(bucketed: bool) {
    counter!("triage_reports_imported_total", "bucketed" => bucketed.to_string()).increment(1);
}

/// Record entries moved into or out of a bucket by reassignment.
pub fn reassigned(direction: &'static str, count: usize) {
    counter!("triage_reassign_entries_total", "direction" => direction).increment(count as u64);
}

/// Record a bucket hit counter change.
pub fn bucket_hit_changed(op: &'static str) {
    counter!("triage_bucket_hits_total", "op" => op).increment(1);
}

/// Record the outcome of a signature optimization attempt.
pub fn optimization(outcome: &'static str) {
    counter!("triage_optimizations_total", "outcome" => outcome).increment(1);
}

/// Record reassignment page duration.
pub fn reassign_duration(duration_ms: u64) {
    histogram!("triage_reassign_duration_ms").record(duration_ms as f64);
}
