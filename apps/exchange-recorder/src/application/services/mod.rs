//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StreamWorker`: One collection cycle for one polling stream
//! - `CollectorSupervisor`: Drives the workers and restarts on escaped faults
//! - `TradeRecorder`: Keeps the trade subscription alive and records events
//! - `StatusRegistry`: Per-stream and feed health shared with the health server

mod reconnect;
mod status;
mod supervisor;
mod trade_recorder;
mod worker;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use status::{FeedState, FeedStatus, StatusRegistry, StreamStatus};
pub use supervisor::{CollectorSupervisor, SupervisorConfig, SupervisorError, WorkerFactory};
pub use trade_recorder::{TradeRecorder, TradeRecorderConfig};
pub use worker::{CycleReport, StreamError, StreamKind, StreamWorker, WorkerConfig};
