//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loading.
pub mod config;

/// Exchange REST client adapter.
pub mod exchange;

/// WebSocket trade feed adapter.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Time-series store adapters.
pub mod store;

/// OpenTelemetry tracing integration.
pub mod telemetry;
