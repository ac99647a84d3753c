//! Prometheus Metrics Module
//!
//! Exposes collection metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Cycles**: Collection cycles by stream and outcome, and their duration
//! - **Records**: Records written to the store by stream
//! - **Trades**: Trade events received and feed reconnects
//! - **Supervisor**: Collection loop restarts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
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
    describe_counter!(
        "exchange_recorder_cycles_total",
        "Collection cycles by stream and outcome"
    );
    describe_histogram!(
        "exchange_recorder_cycle_duration_seconds",
        "Duration of one fetch-normalize-write cycle"
    );
    describe_counter!(
        "exchange_recorder_records_written_total",
        "Records committed to the time-series store"
    );
    describe_counter!(
        "exchange_recorder_collection_restarts_total",
        "Collection loop restarts after an escaped fault"
    );

    describe_counter!(
        "exchange_recorder_trade_events_total",
        "Trade feed events received"
    );
    describe_counter!(
        "exchange_recorder_feed_reconnects_total",
        "Trade feed reconnection attempts"
    );
    describe_gauge!(
        "exchange_recorder_feed_subscribed",
        "Whether the trade feed subscription is live (1) or not (0)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Cycle completed.
    Success,
    /// Data source failed or timed out.
    SourceUnavailable,
    /// Response lacked identity keys.
    MalformedResponse,
    /// Store write failed.
    SinkUnavailable,
}

impl CycleOutcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SourceUnavailable => "source_unavailable",
            Self::MalformedResponse => "malformed_response",
            Self::SinkUnavailable => "sink_unavailable",
        }
    }
}

/// Record a finished collection cycle.
pub fn record_cycle(stream: &'static str, outcome: CycleOutcome, duration: Duration) {
    counter!(
        "exchange_recorder_cycles_total",
        "stream" => stream,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "exchange_recorder_cycle_duration_seconds",
        "stream" => stream
    )
    .record(duration.as_secs_f64());
}

/// Record records committed for a stream.
pub fn record_records_written(stream: &'static str, count: u64) {
    counter!(
        "exchange_recorder_records_written_total",
        "stream" => stream
    )
    .increment(count);
}

/// Record a collection loop restart.
pub fn record_collection_restart() {
    counter!("exchange_recorder_collection_restarts_total").increment(1);
}

/// Record a trade feed event.
pub fn record_trade_event() {
    counter!("exchange_recorder_trade_events_total").increment(1);
}

/// Record a trade feed reconnection attempt.
pub fn record_feed_reconnect() {
    counter!("exchange_recorder_feed_reconnects_total").increment(1);
}

/// Update the trade feed subscription gauge.
pub fn set_feed_subscribed(subscribed: bool) {
    gauge!("exchange_recorder_feed_subscribed").set(if subscribed { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
