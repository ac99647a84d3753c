//! Exchange Port (Driven Port)
//!
//! Authenticated data-source calls against the exchange REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Raw, unvalidated response body.
pub type RawResponse = serde_json::Value;

/// One data-source call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRequest {
    /// Account summary with nested positions.
    Account,
    /// Wallet balances.
    Balances,
    /// Order history created since the given instant.
    OrderHistory {
        /// Window start.
        since: DateTime<Utc>,
    },
    /// Fills since the given instant.
    Fills {
        /// Window start.
        since: DateTime<Utc>,
    },
}

/// Data-source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Transport failure.
    #[error("exchange network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The call did not complete in time.
    #[error("exchange call timed out after {0:?}")]
    Timeout(Duration),

    /// Credentials were rejected.
    #[error("exchange authentication failed: {message}")]
    AuthenticationFailed {
        /// Error details.
        message: String,
    },

    /// Rate limited by the exchange.
    #[error("rate limited by exchange")]
    RateLimited,

    /// The exchange reported a failure.
    #[error("exchange API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the envelope or body.
        message: String,
    },

    /// The body could not be decoded.
    #[error("failed to decode exchange response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// Port for exchange data-source calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Perform one data-source call and return the raw response.
    async fn fetch(&self, request: SourceRequest) -> Result<RawResponse, SourceError>;

    /// Load the names of all listed markets.
    async fn load_markets(&self) -> Result<Vec<String>, SourceError>;
}
