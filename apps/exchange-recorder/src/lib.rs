#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Exchange Recorder - Account and Trade Time-Series Collector
//!
//! Polls an exchange's authenticated REST API for account state, balances,
//! order history and fills, subscribes to its public trade feed, and writes
//! everything as normalized time-series records.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data shaping
//!   - `record`: Time-series record and value coercion
//!   - `normalizer`: Raw response → records, per stream
//!   - `window`: Lookback window per incremental stream
//!   - `aggregate`: Cross-record totals
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Exchange, trade feed and record sink interfaces
//!   - `services`: Stream workers, collector supervisor, trade recorder
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: Signed REST client
//!   - `feed`: WebSocket trade subscription
//!   - `store`: InfluxDB and in-memory sinks
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                ┌────────────┐  tick   ┌─────────────┐
//! Exchange REST ◄┤  Workers   ├◄────────┤ Supervisor  │
//!                └─────┬──────┘         └─────────────┘
//!                      ▼
//!                 Normalizer ──► InfluxDB (accountinfo)
//!
//! Exchange WS ──► Trade Recorder ──► Normalizer ──► InfluxDB (trades)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Records and normalization with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregate::{AggregateSpec, POSITIONS_AGGREGATE};
pub use domain::normalizer::{AccountSnapshot, NormalizeError};
pub use domain::record::TimeSeriesRecord;
pub use domain::window::{WindowConfig, WindowTracker};

// Ports
pub use application::ports::{
    ExchangePort, FeedError, RawResponse, RecordSink, SinkError, SourceError, SourceRequest,
    Subscription, TradeFeedPort,
};

// Services
pub use application::services::{
    CollectorSupervisor, CycleReport, FeedState, FeedStatus, ReconnectConfig, StatusRegistry,
    StreamError, StreamKind, StreamStatus, StreamWorker, SupervisorConfig, SupervisorError,
    TradeRecorder, TradeRecorderConfig, WorkerConfig, WorkerFactory,
};

// Infrastructure config
pub use infrastructure::config::{
    CollectionSettings, ConfigError, Credentials, ExchangeSettings, RecorderConfig,
    ServerSettings, StoreSettings, TradeSettings,
};

// Adapters
pub use infrastructure::exchange::FtxRestClient;
pub use infrastructure::feed::FtxTradeFeed;
pub use infrastructure::store::{InMemorySink, InfluxSink};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
