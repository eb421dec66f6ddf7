//! Prometheus metrics for the sync scheduler
//!
//! Exposed as text at `/metrics`.

use crate::{Result, SyncError};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Histogram: pass duration per job (seconds)
    pub static ref PASS_DURATION: HistogramVec = register_histogram_vec!(
        "fieldsync_pass_duration_seconds",
        "Duration of sync passes",
        &["job"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to create pass_duration metric");

    /// Counter: passes by job and outcome
    pub static ref PASSES: CounterVec = register_counter_vec!(
        "fieldsync_passes_total",
        "Total sync passes by job and status",
        &["job", "status"]
    )
    .expect("Failed to create passes metric");

    /// Counter: scheduled ticks that did not start a pass
    pub static ref SKIPPED_TICKS: CounterVec = register_counter_vec!(
        "fieldsync_skipped_ticks_total",
        "Scheduled ticks skipped by job and reason",
        &["job", "reason"]
    )
    .expect("Failed to create skipped_ticks metric");

    /// Counter: rows written per table
    pub static ref ROWS_WRITTEN: CounterVec = register_counter_vec!(
        "fieldsync_rows_written_total",
        "Rows inserted or updated per table",
        &["table"]
    )
    .expect("Failed to create rows_written metric");

    /// Gauge: 1 while the scheduler timers are armed
    pub static ref SCHEDULER_ACTIVE: Gauge = register_gauge!(
        "fieldsync_scheduler_active",
        "Whether the sync scheduler is active (1 = active, 0 = stopped)"
    )
    .expect("Failed to create scheduler_active metric");
}

/// Record a finished pass
pub fn record_pass(job: &str, status: &str, duration_secs: f64) {
    PASS_DURATION.with_label_values(&[job]).observe(duration_secs);
    PASSES.with_label_values(&[job, status]).inc();
}

/// Record a skipped tick (`busy` or `backoff`)
pub fn record_skipped_tick(job: &str, reason: &str) {
    SKIPPED_TICKS.with_label_values(&[job, reason]).inc();
}

/// Add to the written-rows counter of a table
pub fn record_rows_written(table: &str, rows: usize) {
    if rows > 0 {
        ROWS_WRITTEN.with_label_values(&[table]).inc_by(rows as f64);
    }
}

/// Set scheduler status
pub fn set_scheduler_active(active: bool) {
    SCHEDULER_ACTIVE.set(if active { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| SyncError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| SyncError::Other(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        record_pass("plot-sync", "success", 0.2);
        record_skipped_tick("zone-sync", "busy");
        record_rows_written("parcelas", 3);
        record_rows_written("zonas_riego", 0);
        set_scheduler_active(true);
    }

    #[test]
    fn test_encode_metrics() {
        record_pass("plot-sync", "transport_error", 0.1);

        let output = encode_metrics().unwrap();
        assert!(output.contains("fieldsync_passes_total"));
        assert!(output.contains("fieldsync_pass_duration_seconds"));
    }
}
