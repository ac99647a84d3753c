//! Trade Feed Port (Driven Port)
//!
//! Push subscription to public trade events.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use super::RawResponse;

/// An open subscription. Dropping it closes the underlying connection.
pub type Subscription = BoxStream<'static, Result<RawResponse, FeedError>>;

/// Subscription faults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// The connection could not be established.
    #[error("feed connection failed: {message}")]
    ConnectionFailed {
        /// Error details.
        message: String,
    },

    /// The feed reported an error for the subscription.
    #[error("feed rejected subscription: {message}")]
    Rejected {
        /// Error details.
        message: String,
    },

    /// The connection was closed.
    #[error("feed connection closed")]
    Closed,

    /// A frame could not be read or sent.
    #[error("feed protocol error: {message}")]
    Protocol {
        /// Error details.
        message: String,
    },
}

/// Port for opening trade subscriptions.
#[async_trait]
pub trait TradeFeedPort: Send + Sync {
    /// Subscribe to trades for the given markets.
    async fn open(&self, markets: &[String]) -> Result<Subscription, FeedError>;
}
