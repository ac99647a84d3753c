//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ExchangePort`: Authenticated REST calls and the market catalog
//! - `TradeFeedPort`: Push subscription to public trades
//! - `RecordSink`: Batched writes to the time-series store

mod exchange_port;
mod record_sink;
mod trade_feed_port;

pub use exchange_port::{ExchangePort, RawResponse, SourceError, SourceRequest};
pub use record_sink::{RecordSink, SinkError};
pub use trade_feed_port::{FeedError, Subscription, TradeFeedPort};

#[cfg(test)]
pub use exchange_port::MockExchangePort;
#[cfg(test)]
pub use record_sink::MockRecordSink;
