//! FTX WebSocket trade feed.
//!
//! One connection per subscription. The returned stream owns the socket, so
//! dropping it closes the connection.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::application::ports::{FeedError, RawResponse, Subscription, TradeFeedPort};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default interval between application-level pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Default bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default silence after which a connection is considered dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Info code sent by the exchange before it restarts a socket server.
const INFO_RECONNECT: i64 = 20001;

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A trade update carrying `market` and a `data` array.
    Trades(RawResponse),
    /// Subscription acks, pongs and other control traffic.
    Control(String),
}

/// Classify one text frame.
///
/// # Errors
///
/// - [`FeedError::Protocol`] if the frame is not a JSON object with a `type`
/// - [`FeedError::Rejected`] for `type=error`
/// - [`FeedError::Closed`] when the exchange announces a server restart
pub fn classify_message(text: &str) -> Result<FeedMessage, FeedError> {
    let value: Value = serde_json::from_str(text).map_err(|e| FeedError::Protocol {
        message: format!("invalid frame: {e}"),
    })?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Protocol {
            message: "frame has no type".to_string(),
        })?
        .to_string();

    match kind.as_str() {
        "update" => Ok(FeedMessage::Trades(value)),
        "error" => Err(FeedError::Rejected {
            message: describe(&value),
        }),
        "info" if value.get("code").and_then(Value::as_i64) == Some(INFO_RECONNECT) => {
            Err(FeedError::Closed)
        }
        _ => Ok(FeedMessage::Control(kind)),
    }
}

fn describe(value: &Value) -> String {
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    match value.get("code").and_then(Value::as_i64) {
        Some(code) => format!("{msg} (code {code})"),
        None => msg.to_string(),
    }
}

fn subscribe_request(market: &str) -> Value {
    json!({"op": "subscribe", "channel": "trades", "market": market})
}

fn protocol_error(error: &tungstenite::Error) -> FeedError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            FeedError::Closed
        }
        other => FeedError::Protocol {
            message: other.to_string(),
        },
    }
}

async fn send_json(socket: &mut Socket, value: &Value) -> Result<(), FeedError> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| protocol_error(&e))
}

/// FTX trade feed over WebSocket.
#[derive(Debug, Clone)]
pub struct FtxTradeFeed {
    ws_url: String,
    ping_interval: Duration,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl FtxTradeFeed {
    /// Create a feed for the given URL and application ping cadence.
    ///
    /// A zero ping interval is replaced by [`DEFAULT_PING_INTERVAL`].
    #[must_use]
    pub fn new(ws_url: impl Into<String>, ping_interval: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            ping_interval: if ping_interval.is_zero() {
                DEFAULT_PING_INTERVAL
            } else {
                ping_interval
            },
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<Socket, FeedError> {
        let connecting = connect_async(self.ws_url.as_str());
        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| FeedError::ConnectionFailed {
                message: format!(
                    "handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                ),
            })?
            .map_err(|e| FeedError::ConnectionFailed {
                message: e.to_string(),
            })?;
        Ok(socket)
    }
}

#[async_trait]
impl TradeFeedPort for FtxTradeFeed {
    async fn open(&self, markets: &[String]) -> Result<Subscription, FeedError> {
        tracing::debug!(url = %self.ws_url, "Connecting to trade feed");
        let mut socket = self.connect().await?;

        for market in markets {
            send_json(&mut socket, &subscribe_request(market)).await?;
        }
        tracing::info!(url = %self.ws_url, markets = markets.len(), "Trade feed subscribed");

        let mut ping =
            tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let session = Session {
            socket,
            ping,
            idle_timeout: self.idle_timeout,
            last_frame: Instant::now(),
        };

        let events = stream::unfold(Some(session), |state| async move {
            let mut session = state?;
            match session.next_event().await {
                Ok(event) => Some((Ok(event), Some(session))),
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(events.boxed())
    }
}

enum Wake {
    Ping,
    Idle,
    Frame(Option<Result<Message, tungstenite::Error>>),
}

/// A live connection. Ends after the first fault.
struct Session {
    socket: Socket,
    ping: Interval,
    idle_timeout: Duration,
    last_frame: Instant,
}

impl Session {
    async fn next_event(&mut self) -> Result<RawResponse, FeedError> {
        loop {
            let wake = tokio::select! {
                _ = self.ping.tick() => Wake::Ping,
                () = tokio::time::sleep_until(self.last_frame + self.idle_timeout) => Wake::Idle,
                frame = self.socket.next() => Wake::Frame(frame),
            };

            match wake {
                Wake::Ping => send_json(&mut self.socket, &json!({"op": "ping"})).await?,
                Wake::Idle => {
                    return Err(FeedError::Protocol {
                        message: format!("no frames for {}s", self.idle_timeout.as_secs()),
                    });
                }
                Wake::Frame(frame) => {
                    self.last_frame = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => match classify_message(&text)? {
                            FeedMessage::Trades(event) => return Ok(event),
                            FeedMessage::Control(kind) => {
                                tracing::trace!(kind = %kind, "Feed control message");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            self.socket
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| protocol_error(&e))?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Trade feed sent close frame");
                            return Err(FeedError::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(protocol_error(&e)),
                        None => return Err(FeedError::Closed),
                    }
                }
            }
        }
    }
}
