//! In-memory sink.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{RecordSink, SinkError};
use crate::domain::record::TimeSeriesRecord;

/// Keeps every written batch in memory. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct InMemorySink {
    batches: Mutex<Vec<Vec<TimeSeriesRecord>>>,
    failing: AtomicBool,
}

impl InMemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Committed batches, in write order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<TimeSeriesRecord>> {
        self.batches.lock().clone()
    }

    /// All committed records, flattened.
    #[must_use]
    pub fn records(&self) -> Vec<TimeSeriesRecord> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Committed records with the given measurement.
    #[must_use]
    pub fn measurement(&self, name: &str) -> Vec<TimeSeriesRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.measurement() == name)
            .collect()
    }
}

#[async_trait]
impl RecordSink for InMemorySink {
    async fn write_batch(&self, records: &[TimeSeriesRecord]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unreachable {
                message: "in-memory sink set to fail".to_string(),
            });
        }
        self.batches.lock().push(records.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn stores_batches_until_failing() {
        let sink = InMemorySink::new();
        let record = TimeSeriesRecord::new("trades", Utc::now()).with_field("price", 1.0);

        sink.write_batch(&[record.clone()]).await.unwrap();
        sink.set_failing(true);
        assert!(sink.write_batch(&[record]).await.is_err());

        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.measurement("trades").len(), 1);
        assert!(sink.measurement("fills").is_empty());
    }
}
