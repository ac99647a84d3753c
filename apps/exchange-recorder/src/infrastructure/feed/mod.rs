//! Trade Feed Adapter
//!
//! WebSocket implementation of the trade feed port.

mod websocket;

pub use websocket::{FeedMessage, FtxTradeFeed, classify_message};
