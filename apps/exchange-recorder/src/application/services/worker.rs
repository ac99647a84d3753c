//! Stream Worker
//!
//! One fetch → normalize → aggregate → write cycle for one logical stream.
//! Each worker exclusively owns its window state; the supervisor moves the
//! worker into a task for a cycle and gets it back afterwards.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::application::ports::{
    ExchangePort, RawResponse, RecordSink, SinkError, SourceError, SourceRequest,
};
use crate::domain::aggregate::POSITIONS_AGGREGATE;
use crate::domain::normalizer::{
    NormalizeError, normalize_account, normalize_balances, normalize_fills, normalize_orders,
};
use crate::domain::record::TimeSeriesRecord;
use crate::domain::window::{WindowConfig, WindowTracker};
use crate::infrastructure::metrics::CycleOutcome;

// =============================================================================
// Stream Identity
// =============================================================================

/// Logical polling stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Account snapshot, positions and positions aggregate.
    Account,
    /// Wallet balances.
    Balances,
    /// Order history within the lookback window.
    Orders,
    /// Fills within the lookback window.
    Fills,
}

impl StreamKind {
    /// Every polling stream, in collection order.
    pub const ALL: [Self; 4] = [Self::Account, Self::Balances, Self::Orders, Self::Fills];

    /// Stable lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Balances => "balances",
            Self::Orders => "orders",
            Self::Fills => "fills",
        }
    }

    /// Whether the stream polls a lookback window.
    #[must_use]
    pub const fn is_incremental(self) -> bool {
        matches!(self, Self::Orders | Self::Fills)
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors and Reports
// =============================================================================

/// Typed failure of one cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The data source failed or timed out.
    #[error("{stream}: source unavailable: {source}")]
    SourceUnavailable {
        /// Failing stream.
        stream: StreamKind,
        /// Cause.
        source: SourceError,
    },

    /// The response lacked its identity keys.
    #[error("{stream}: {source}")]
    MalformedResponse {
        /// Failing stream.
        stream: StreamKind,
        /// Cause.
        source: NormalizeError,
    },

    /// The store write failed.
    #[error("{stream}: sink unavailable: {source}")]
    SinkUnavailable {
        /// Failing stream.
        stream: StreamKind,
        /// Cause.
        source: SinkError,
    },
}

impl StreamError {
    /// Stream the error belongs to.
    #[must_use]
    pub const fn stream(&self) -> StreamKind {
        match self {
            Self::SourceUnavailable { stream, .. }
            | Self::MalformedResponse { stream, .. }
            | Self::SinkUnavailable { stream, .. } => *stream,
        }
    }

    /// Metric outcome for this error.
    #[must_use]
    pub const fn outcome(&self) -> CycleOutcome {
        match self {
            Self::SourceUnavailable { .. } => CycleOutcome::SourceUnavailable,
            Self::MalformedResponse { .. } => CycleOutcome::MalformedResponse,
            Self::SinkUnavailable { .. } => CycleOutcome::SinkUnavailable,
        }
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Stream that ran.
    pub stream: StreamKind,
    /// Records committed (including any aggregate).
    pub records_written: usize,
    /// Window start requested, for incremental streams.
    pub window_start: Option<DateTime<Utc>>,
}

// =============================================================================
// Worker
// =============================================================================

/// Worker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Bound on each data-source call.
    pub call_timeout: Duration,
    /// Lookback windows for incremental streams.
    pub window: WindowConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            window: WindowConfig::default(),
        }
    }
}

/// Runs collection cycles for one stream.
pub struct StreamWorker {
    kind: StreamKind,
    exchange: Arc<dyn ExchangePort>,
    sink: Arc<dyn RecordSink>,
    call_timeout: Duration,
    window: Option<WindowTracker>,
}

impl fmt::Debug for StreamWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWorker")
            .field("kind", &self.kind)
            .field("call_timeout", &self.call_timeout)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl StreamWorker {
    /// Create a worker. Incremental streams start in first-run mode.
    #[must_use]
    pub fn new(
        kind: StreamKind,
        exchange: Arc<dyn ExchangePort>,
        sink: Arc<dyn RecordSink>,
        config: WorkerConfig,
    ) -> Self {
        let tracker = WindowTracker::new(config.window);
        Self {
            kind,
            exchange,
            sink,
            call_timeout: config.call_timeout,
            window: kind.is_incremental().then_some(tracker),
        }
    }

    /// One worker per polling stream, sharing the exchange and sink.
    #[must_use]
    pub fn for_all_streams(
        exchange: &Arc<dyn ExchangePort>,
        sink: &Arc<dyn RecordSink>,
        config: WorkerConfig,
    ) -> Vec<Self> {
        StreamKind::ALL
            .into_iter()
            .map(|kind| Self::new(kind, Arc::clone(exchange), Arc::clone(sink), config))
            .collect()
    }

    /// Stream this worker collects.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Window tracker, for incremental streams.
    #[must_use]
    pub const fn window(&self) -> Option<&WindowTracker> {
        self.window.as_ref()
    }

    /// Run one cycle. The window advances whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if the source, the response or the store
    /// fails; nothing is retried within the cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, StreamError> {
        let now = Utc::now();
        let window_start = self.window.as_mut().map(|w| w.next_window_start(now));

        let result = self.collect(now, window_start).await;

        if let Some(window) = self.window.as_mut() {
            window.complete_cycle();
        }
        result
    }

    async fn collect(
        &self,
        now: DateTime<Utc>,
        window_start: Option<DateTime<Utc>>,
    ) -> Result<CycleReport, StreamError> {
        let stream = self.kind;
        let request = self.request(window_start.unwrap_or(now));

        let call = tokio::time::timeout(self.call_timeout, self.exchange.fetch(request));
        let response = match call.await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(StreamError::SourceUnavailable { stream, source }),
            Err(_) => {
                return Err(StreamError::SourceUnavailable {
                    stream,
                    source: SourceError::Timeout(self.call_timeout),
                });
            }
        };

        let mut records = self
            .normalize(&response, now)
            .map_err(|source| StreamError::MalformedResponse { stream, source })?;
        // The store cannot hold a point without fields.
        records.retain(TimeSeriesRecord::has_fields);

        if !records.is_empty() {
            self.sink
                .write_batch(&records)
                .await
                .map_err(|source| StreamError::SinkUnavailable { stream, source })?;
        }

        Ok(CycleReport {
            stream,
            records_written: records.len(),
            window_start,
        })
    }

    const fn request(&self, since: DateTime<Utc>) -> SourceRequest {
        match self.kind {
            StreamKind::Account => SourceRequest::Account,
            StreamKind::Balances => SourceRequest::Balances,
            StreamKind::Orders => SourceRequest::OrderHistory { since },
            StreamKind::Fills => SourceRequest::Fills { since },
        }
    }

    fn normalize(
        &self,
        response: &RawResponse,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeSeriesRecord>, NormalizeError> {
        match self.kind {
            StreamKind::Account => {
                let snapshot = normalize_account(response, now)?;
                let total = POSITIONS_AGGREGATE.aggregate(&snapshot.positions, now);

                let mut records = Vec::with_capacity(snapshot.positions.len() + 2);
                records.push(snapshot.account);
                records.extend(snapshot.positions);
                records.extend(total);
                Ok(records)
            }
            StreamKind::Balances => normalize_balances(response, now),
            StreamKind::Orders => normalize_orders(response, now),
            StreamKind::Fills => normalize_fills(response, now),
        }
    }
}
