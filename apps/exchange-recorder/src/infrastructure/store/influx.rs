//! InfluxDB v1 HTTP sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::line_protocol::encode_batch;
use crate::application::ports::{RecordSink, SinkError};
use crate::domain::record::TimeSeriesRecord;

/// Default bound on each write request.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes batches to one InfluxDB database.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    write_url: Url,
    database: String,
}

impl InfluxSink {
    /// Create a sink for `database` on the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unreachable`] if the URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, database: &str) -> Result<Self, SinkError> {
        let unreachable = |message: String| SinkError::Unreachable { message };

        let mut write_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .and_then(|url| url.join("write"))
            .map_err(|e| unreachable(format!("invalid store URL {base_url}: {e}")))?;
        write_url
            .query_pairs_mut()
            .append_pair("db", database)
            .append_pair("precision", "ms");

        let client = Client::builder()
            .timeout(DEFAULT_WRITE_TIMEOUT)
            .build()
            .map_err(|e| unreachable(e.to_string()))?;

        Ok(Self {
            client,
            write_url,
            database: database.to_string(),
        })
    }

    /// Target database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl RecordSink for InfluxSink {
    async fn write_batch(&self, records: &[TimeSeriesRecord]) -> Result<(), SinkError> {
        let body = encode_batch(records);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Unreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(database = %self.database, records = records.len(), "Batch written");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
