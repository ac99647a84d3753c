//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the collection services and the port interfaces
//! that define how they reach the exchange and the time-series store.

/// Port interfaces for external systems (exchange, feed, store).
pub mod ports;

/// Collection services: workers, supervisor, trade recorder and status.
pub mod services;
