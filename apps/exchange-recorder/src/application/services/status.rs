//! Collection Status Registry
//!
//! Shared, lock-protected view of per-stream outcomes and trade feed state.
//! Workers never touch it directly: the supervisor and the trade recorder
//! report into it, and the health endpoint reads snapshots out of it.
//! Every update is mirrored to the Prometheus metrics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::worker::{CycleReport, StreamError, StreamKind};
use crate::infrastructure::metrics::{self, CycleOutcome};

/// Health counters for one polling stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    /// Successful cycles.
    pub cycles_succeeded: u64,
    /// Failed cycles.
    pub cycles_failed: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    /// Records committed.
    pub records_written: u64,
    /// Time of the last successful cycle.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Time of the last failed cycle.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Message of the last failure.
    pub last_error: Option<String>,
}

/// Trade subscription state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    /// No subscription.
    #[default]
    Disconnected,
    /// Opening a subscription.
    Connecting,
    /// Subscription live.
    Subscribed,
}

/// Health counters for the trade feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Current subscription state.
    pub state: FeedState,
    /// Events received since start.
    pub events_received: u64,
    /// Trade records committed.
    pub records_written: u64,
    /// Reconnection attempts since start.
    pub reconnects: u64,
    /// Time of the last received event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Message of the last fault.
    pub last_error: Option<String>,
}

/// Shared status for all collectors.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    streams: RwLock<BTreeMap<StreamKind, StreamStatus>>,
    feed: RwLock<FeedStatus>,
    restarts: AtomicU64,
}

impl StatusRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful cycle.
    pub fn record_success(&self, report: &CycleReport, elapsed: Duration) {
        let written = report.records_written as u64;
        {
            let mut streams = self.streams.write();
            let status = streams.entry(report.stream).or_default();
            status.cycles_succeeded += 1;
            status.consecutive_failures = 0;
            status.records_written += written;
            status.last_success_at = Some(Utc::now());
        }
        metrics::record_cycle(report.stream.as_str(), CycleOutcome::Success, elapsed);
        metrics::record_records_written(report.stream.as_str(), written);
    }

    /// Record a failed cycle.
    pub fn record_failure(&self, error: &StreamError, elapsed: Duration) {
        let stream = error.stream();
        {
            let mut streams = self.streams.write();
            let status = streams.entry(stream).or_default();
            status.cycles_failed += 1;
            status.consecutive_failures += 1;
            status.last_failure_at = Some(Utc::now());
            status.last_error = Some(error.to_string());
        }
        metrics::record_cycle(stream.as_str(), error.outcome(), elapsed);
    }

    /// Record a collection loop restart.
    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        metrics::record_collection_restart();
    }

    /// Collection loop restarts since start.
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    /// Status of one stream, if it has run.
    #[must_use]
    pub fn stream(&self, kind: StreamKind) -> Option<StreamStatus> {
        self.streams.read().get(&kind).cloned()
    }

    /// Status of every stream that has run.
    #[must_use]
    pub fn streams(&self) -> BTreeMap<StreamKind, StreamStatus> {
        self.streams.read().clone()
    }

    /// Update the trade feed state.
    pub fn set_feed_state(&self, state: FeedState) {
        self.feed.write().state = state;
        metrics::set_feed_subscribed(state == FeedState::Subscribed);
    }

    /// Record one trade event and the records written from it.
    pub fn record_feed_event(&self, records_written: usize) {
        {
            let mut feed = self.feed.write();
            feed.events_received += 1;
            feed.records_written += records_written as u64;
            feed.last_event_at = Some(Utc::now());
        }
        metrics::record_trade_event();
        metrics::record_records_written("trades", records_written as u64);
    }

    /// Record a subscription fault.
    pub fn record_feed_error(&self, message: String) {
        self.feed.write().last_error = Some(message);
    }

    /// Record a reconnection attempt.
    pub fn record_feed_reconnect(&self) {
        self.feed.write().reconnects += 1;
        metrics::record_feed_reconnect();
    }

    /// Trade feed status.
    #[must_use]
    pub fn feed(&self) -> FeedStatus {
        self.feed.read().clone()
    }
}
