//! FTX REST Adapter
//!
//! Implements [`ExchangePort`](crate::application::ports::ExchangePort) over
//! the FTX REST API with per-request HMAC signing.

mod client;
mod signing;

pub use client::FtxRestClient;
pub use signing::sign_request;
