//! Streaming Trade Recorder
//!
//! Keeps one trade subscription open, writing every event as it arrives.
//! Any subscription fault drops the current subscription and re-opens a new
//! one after an exponential backoff; there is no retry cap.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::status::{FeedState, StatusRegistry};
use crate::application::ports::{FeedError, RawResponse, RecordSink, Subscription, TradeFeedPort};
use crate::domain::normalizer::normalize_trades;
use crate::domain::record::TimeSeriesRecord;

/// Trade recorder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecorderConfig {
    /// Markets to subscribe to.
    pub markets: Vec<String>,
    /// Value of the `exchange` tag on every trade record.
    pub exchange: String,
    /// Backoff between subscription attempts.
    pub reconnect: ReconnectConfig,
}

/// Records public trades from a push feed.
pub struct TradeRecorder {
    feed: Arc<dyn TradeFeedPort>,
    sink: Arc<dyn RecordSink>,
    config: TradeRecorderConfig,
    status: Arc<StatusRegistry>,
}

impl fmt::Debug for TradeRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TradeRecorder {
    /// Create a recorder.
    #[must_use]
    pub fn new(
        feed: Arc<dyn TradeFeedPort>,
        sink: Arc<dyn RecordSink>,
        config: TradeRecorderConfig,
        status: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            feed,
            sink,
            config,
            status,
        }
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        while !cancel.is_cancelled() {
            self.status.set_feed_state(FeedState::Connecting);
            tracing::info!(markets = self.config.markets.len(), "Opening trade subscription");

            let fault = match self.feed.open(&self.config.markets).await {
                Ok(subscription) => {
                    self.status.set_feed_state(FeedState::Subscribed);
                    policy.reset();
                    tracing::info!("Trade subscription established");

                    match self.consume(subscription, &cancel).await {
                        Some(fault) => fault,
                        None => break,
                    }
                }
                Err(e) => e,
            };

            self.status.set_feed_state(FeedState::Disconnected);
            self.status.record_feed_error(fault.to_string());

            let delay = policy.next_delay();
            tracing::warn!(
                error = %fault,
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Trade subscription fault, reconnecting"
            );
            self.status.record_feed_reconnect();

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.status.set_feed_state(FeedState::Disconnected);
        tracing::info!("Trade recorder stopped");
    }

    /// Drain a subscription until it faults (`Some`) or the token fires (`None`).
    /// The subscription is dropped on return.
    async fn consume(
        &self,
        mut subscription: Subscription,
        cancel: &CancellationToken,
    ) -> Option<FeedError> {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return None,
                next = subscription.next() => next,
            };

            match next {
                Some(Ok(event)) => self.record(&event).await,
                Some(Err(e)) => return Some(e),
                None => return Some(FeedError::Closed),
            }
        }
    }

    async fn record(&self, event: &RawResponse) {
        let mut records = match normalize_trades(event, &self.config.exchange, Utc::now()) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed trade event");
                return;
            }
        };
        records.retain(TimeSeriesRecord::has_fields);

        if records.is_empty() {
            return;
        }

        match self.sink.write_batch(&records).await {
            Ok(()) => self.status.record_feed_event(records.len()),
            Err(e) => {
                self.status.record_feed_event(0);
                tracing::warn!(error = %e, trades = records.len(), "Failed to write trades");
            }
        }
    }
}
