//! Domain Layer - Records and the rules that produce them.
//!
//! Pure types and functions with no I/O: the time-series record shape,
//! value coercion, per-stream normalization, lookback windows and
//! cross-record aggregation.

/// Summing fields across a batch of records.
pub mod aggregate;

/// Turning raw exchange responses into records.
pub mod normalizer;

/// Time-series record type and value coercion.
pub mod record;

/// Lookback windows for incremental polling streams.
pub mod window;
