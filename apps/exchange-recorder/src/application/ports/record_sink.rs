//! Record Sink Port (Driven Port)
//!
//! Batched writes to a time-series store.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::record::TimeSeriesRecord;

/// Store write errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The store could not be reached.
    #[error("store unreachable: {message}")]
    Unreachable {
        /// Error details.
        message: String,
    },

    /// The store refused the batch.
    #[error("store rejected write (status {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
}

/// Port for committing records. Implementations must accept concurrent writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write one batch of records.
    async fn write_batch(&self, records: &[TimeSeriesRecord]) -> Result<(), SinkError>;
}
