//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Poll cycles, empty ticks, failed pulls
//! - **Records**: Raw records received and how they merged
//! - **Chart**: Upserts forwarded to and dropped before the chart surface
//! - **Latency**: Data source pull duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the dashboard server port.
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::aggregation::MergeSummary;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Returns `None` if the recorder could not be installed (for example when
/// another global recorder is already present). Repeated calls return the
/// handle installed by the first successful call.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            register_metrics();
            Some(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!("dashboard_ticks_total", "Total poll ticks executed");
    describe_counter!(
        "dashboard_empty_ticks_total",
        "Poll ticks whose batch held no records"
    );
    describe_counter!(
        "dashboard_pull_failures_total",
        "Data source pulls that failed, by error kind"
    );
    describe_counter!(
        "dashboard_records_received_total",
        "Raw price update records received"
    );

    describe_counter!(
        "dashboard_points_inserted_total",
        "Aggregated points created for new keys"
    );
    describe_counter!(
        "dashboard_points_updated_total",
        "Aggregated points merged in place"
    );

    describe_counter!(
        "dashboard_chart_updates_total",
        "Upsert batches delivered to the chart surface"
    );
    describe_counter!(
        "dashboard_chart_updates_dropped_total",
        "Upsert batches dropped because no chart surface was mounted"
    );

    describe_gauge!(
        "dashboard_aggregate_points",
        "Points in the session aggregate table"
    );
    describe_gauge!(
        "dashboard_active_timers",
        "Poll timer loops currently alive"
    );

    describe_histogram!(
        "dashboard_pull_duration_seconds",
        "Time spent waiting on the data source per tick"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a completed tick.
pub fn record_tick(source: &'static str) {
    counter!("dashboard_ticks_total", "source" => source).increment(1);
}

/// Record a tick that yielded no records.
pub fn record_empty_tick(source: &'static str) {
    counter!("dashboard_empty_ticks_total", "source" => source).increment(1);
}

/// Record a failed pull.
pub fn record_pull_failure(source: &'static str, error_kind: &'static str) {
    counter!(
        "dashboard_pull_failures_total",
        "source" => source,
        "error_kind" => error_kind
    )
    .increment(1);
}

/// Record how a batch merged.
pub fn record_merge(source: &'static str, summary: &MergeSummary) {
    counter!("dashboard_records_received_total", "source" => source)
        .increment(summary.records as u64);
    counter!("dashboard_points_inserted_total").increment(summary.inserted as u64);
    counter!("dashboard_points_updated_total").increment(summary.updated as u64);
}

/// Update the aggregate table size.
#[allow(clippy::cast_precision_loss)]
pub fn set_aggregate_points(count: usize) {
    gauge!("dashboard_aggregate_points").set(count as f64);
}

/// Update the live timer count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_timers(count: usize) {
    gauge!("dashboard_active_timers").set(count as f64);
}

/// Record an upsert batch delivered to the chart.
pub fn record_chart_update() {
    counter!("dashboard_chart_updates_total").increment(1);
}

/// Record an upsert batch dropped before the chart was mounted.
pub fn record_chart_update_dropped() {
    counter!("dashboard_chart_updates_dropped_total").increment(1);
}

/// Record data source pull duration.
pub fn record_pull_duration(source: &'static str, duration: Duration) {
    histogram!("dashboard_pull_duration_seconds", "source" => source)
        .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
