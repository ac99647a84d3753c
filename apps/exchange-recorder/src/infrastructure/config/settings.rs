//! Recorder Configuration Settings
//!
//! Configuration types for the recorder, loaded from environment variables.
//! Parsing runs over a lookup function so tests can supply variables without
//! touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{ReconnectConfig, SupervisorConfig, WorkerConfig};
use crate::domain::window::WindowConfig;

/// Exchange API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
    subaccount: Option<String>,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String, subaccount: Option<String>) -> Self {
        Self {
            api_key,
            api_secret,
            subaccount,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Get the subaccount name, if any.
    #[must_use]
    pub fn subaccount(&self) -> Option<&str> {
        self.subaccount.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("subaccount", &self.subaccount)
            .finish()
    }
}

/// Exchange endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSettings {
    /// Exchange name, used as the `exchange` tag on trades.
    pub name: String,
    /// REST API base URL.
    pub rest_url: String,
    /// WebSocket URL.
    pub ws_url: String,
    /// Bound on each REST call.
    pub call_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            name: "FTX".to_string(),
            rest_url: "https://ftx.com/api".to_string(),
            ws_url: "wss://ftx.com/ws/".to_string(),
            call_timeout: Duration::from_millis(5000),
        }
    }
}

/// Polling collection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    /// Delay between ticks.
    pub tick_interval: Duration,
    /// Delay before restarting an aborted collection loop.
    pub restart_delay: Duration,
    /// Lookback on the first cycle of incremental streams.
    pub first_run_lookback: Duration,
    /// Lookback on later cycles.
    pub steady_lookback: Duration,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        let window = WindowConfig::default();
        Self {
            tick_interval: Duration::from_millis(1000),
            restart_delay: Duration::from_millis(1000),
            first_run_lookback: window.first_run_lookback,
            steady_lookback: window.steady_lookback,
        }
    }
}

/// Trade feed settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSettings {
    /// Whether the trade recorder runs at all.
    pub enabled: bool,
    /// Catalog markets ending in this suffix are subscribed.
    pub market_suffix: String,
    /// Markets subscribed in addition to the suffix matches.
    pub extra_markets: Vec<String>,
    /// Interval between application-level pings.
    pub ping_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            market_suffix: "PERP".to_string(),
            extra_markets: vec![
                "ETH/BTC".to_string(),
                "ETH/USD".to_string(),
                "BTC/USD".to_string(),
            ],
            ping_interval: Duration::from_secs(15),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
        }
    }
}

impl TradeSettings {
    /// Select the markets to subscribe to from the exchange catalog.
    ///
    /// Suffix matches keep catalog order; extra markets follow, without
    /// duplicates.
    #[must_use]
    pub fn select_markets(&self, catalog: &[String]) -> Vec<String> {
        let mut markets: Vec<String> = catalog
            .iter()
            .filter(|name| !self.market_suffix.is_empty() && name.ends_with(&self.market_suffix))
            .cloned()
            .collect();
        for extra in &self.extra_markets {
            if !markets.contains(extra) {
                markets.push(extra.clone());
            }
        }
        markets
    }
}

/// Time-series store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// InfluxDB base URL.
    pub url: String,
    /// Database for account, balance, order and fill records.
    pub account_database: String,
    /// Database for trade records.
    pub trades_database: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            account_database: "accountinfo".to_string(),
            trades_database: "trades".to_string(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Exchange endpoints.
    pub exchange: ExchangeSettings,
    /// Polling cadence and windows.
    pub collection: CollectionSettings,
    /// Trade feed settings.
    pub trades: TradeSettings,
    /// Store settings.
    pub store: StoreSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl RecorderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, "FTX_API_KEY")?;
        let api_secret = required(&lookup, "FTX_API_SECRET")?;
        let subaccount = lookup("FTX_SUBACCOUNT").filter(|s| !s.trim().is_empty());

        let exchange_defaults = ExchangeSettings::default();
        let exchange = ExchangeSettings {
            rest_url: lookup("FTX_REST_URL").map_or(exchange_defaults.rest_url, trim_url),
            ws_url: lookup("FTX_WS_URL").unwrap_or(exchange_defaults.ws_url),
            call_timeout: parse_env_nonzero_duration_millis(
                &lookup,
                "RECORDER_CALL_TIMEOUT_MS",
                exchange_defaults.call_timeout,
            ),
            name: exchange_defaults.name,
        };

        let collection_defaults = CollectionSettings::default();
        let collection = CollectionSettings {
            tick_interval: parse_env_nonzero_duration_millis(
                &lookup,
                "RECORDER_TICK_INTERVAL_MS",
                collection_defaults.tick_interval,
            ),
            restart_delay: parse_env_duration_millis(
                &lookup,
                "RECORDER_RESTART_DELAY_MS",
                collection_defaults.restart_delay,
            ),
            first_run_lookback: parse_env_duration_secs(
                &lookup,
                "RECORDER_FIRST_RUN_LOOKBACK_SECS",
                collection_defaults.first_run_lookback,
            ),
            steady_lookback: parse_env_duration_secs(
                &lookup,
                "RECORDER_STEADY_LOOKBACK_SECS",
                collection_defaults.steady_lookback,
            ),
        };

        let trade_defaults = TradeSettings::default();
        let trades = TradeSettings {
            enabled: parse_env_bool(&lookup, "RECORDER_TRADES_ENABLED", trade_defaults.enabled),
            market_suffix: lookup("RECORDER_MARKET_SUFFIX").unwrap_or(trade_defaults.market_suffix),
            extra_markets: lookup("RECORDER_EXTRA_MARKETS")
                .map_or(trade_defaults.extra_markets, |list| parse_list(&list)),
            ping_interval: parse_env_nonzero_duration_secs(
                &lookup,
                "RECORDER_PING_INTERVAL_SECS",
                trade_defaults.ping_interval,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                &lookup,
                "RECORDER_RECONNECT_DELAY_INITIAL_MS",
                trade_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "RECORDER_RECONNECT_DELAY_MAX_SECS",
                trade_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env(
                &lookup,
                "RECORDER_RECONNECT_DELAY_MULTIPLIER",
                trade_defaults.reconnect_delay_multiplier,
            ),
        };

        let store_defaults = StoreSettings::default();
        let store = StoreSettings {
            url: lookup("INFLUX_URL").map_or(store_defaults.url, trim_url),
            account_database: lookup("INFLUX_ACCOUNT_DB")
                .unwrap_or(store_defaults.account_database),
            trades_database: lookup("INFLUX_TRADES_DB").unwrap_or(store_defaults.trades_database),
        };

        let server = ServerSettings {
            health_port: parse_env(
                &lookup,
                "RECORDER_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            credentials: Credentials::new(api_key, api_secret, subaccount),
            exchange,
            collection,
            trades,
            store,
            server,
        })
    }

    /// Worker settings derived from this configuration.
    #[must_use]
    pub const fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            call_timeout: self.exchange.call_timeout,
            window: WindowConfig {
                first_run_lookback: self.collection.first_run_lookback,
                steady_lookback: self.collection.steady_lookback,
            },
        }
    }

    /// Supervisor settings derived from this configuration.
    #[must_use]
    pub const fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            tick_interval: self.collection.tick_interval,
            restart_delay: self.collection.restart_delay,
        }
    }

    /// Reconnect settings for the trade recorder.
    #[must_use]
    pub const fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::from_trade_settings(&self.trades)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| {
        matches!(
            v.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        )
    })
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Like [`parse_env_duration_secs`], but zero falls back to the default.
fn parse_env_nonzero_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_env_duration_secs(lookup, key, default);
    nonzero_or_default(key, value, default)
}

/// Like [`parse_env_duration_millis`], but zero falls back to the default.
fn parse_env_nonzero_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_env_duration_millis(lookup, key, default);
    nonzero_or_default(key, value, default)
}

fn nonzero_or_default(key: &str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        tracing::warn!(key, default = ?default, "Zero duration not allowed, using default");
        return default;
    }
    value
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] = [("FTX_API_KEY", "key"), ("FTX_API_SECRET", "secret")];

    #[test]
    fn defaults_apply_when_only_credentials_set() {
        let config = RecorderConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();

        assert_eq!(config.exchange, ExchangeSettings::default());
        assert_eq!(config.collection, CollectionSettings::default());
        assert_eq!(config.trades, TradeSettings::default());
        assert_eq!(config.store.account_database, "accountinfo");
        assert_eq!(config.store.trades_database, "trades");
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(
            config.collection.first_run_lookback,
            Duration::from_secs(18_000)
        );
        assert!(config.credentials.subaccount().is_none());
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = RecorderConfig::from_lookup(lookup(&[("FTX_API_KEY", "key")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnvVar("FTX_API_SECRET".to_string())
        );

        let err =
            RecorderConfig::from_lookup(lookup(&[("FTX_API_KEY", " "), ("FTX_API_SECRET", "s")]))
                .unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue("FTX_API_KEY".to_string()));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("FTX_SUBACCOUNT", "bot"),
            ("FTX_REST_URL", "http://localhost:9000/api/"),
            ("RECORDER_CALL_TIMEOUT_MS", "250"),
            ("RECORDER_STEADY_LOOKBACK_SECS", "60"),
            ("RECORDER_EXTRA_MARKETS", " BTC/USD , ,SOL/USD"),
            ("RECORDER_TRADES_ENABLED", "false"),
            ("RECORDER_RECONNECT_DELAY_MULTIPLIER", "1.5"),
            ("RECORDER_HEALTH_PORT", "0"),
            ("INFLUX_TRADES_DB", "ticks"),
        ]);

        let config = RecorderConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.credentials.subaccount(), Some("bot"));
        assert_eq!(config.exchange.rest_url, "http://localhost:9000/api");
        assert_eq!(
            config.worker_config().call_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(
            config.worker_config().window.steady_lookback,
            Duration::from_secs(60)
        );
        assert_eq!(config.trades.extra_markets, ["BTC/USD", "SOL/USD"]);
        assert!(!config.trades.enabled);
        assert!((config.reconnect_config().multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.server.health_port, 0);
        assert_eq!(config.store.trades_database, "ticks");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("RECORDER_TICK_INTERVAL_MS", "soon"),
            ("RECORDER_HEALTH_PORT", "99999"),
        ]);

        let config = RecorderConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(
            config.supervisor_config().tick_interval,
            Duration::from_secs(1)
        );
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("RECORDER_PING_INTERVAL_SECS", "0"),
            ("RECORDER_TICK_INTERVAL_MS", "0"),
            ("RECORDER_CALL_TIMEOUT_MS", " 0 "),
        ]);

        let config = RecorderConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.trades.ping_interval, Duration::from_secs(15));
        assert_eq!(config.collection.tick_interval, Duration::from_secs(1));
        assert_eq!(config.exchange.call_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let credentials = Credentials::new("key".into(), "secret".into(), None);
        let debug = format!("{credentials:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret\""));
    }

    #[test]
    fn market_selection_filters_suffix_and_appends_extras() {
        let settings = TradeSettings::default();
        let catalog: Vec<String> = ["BTC-PERP", "BTC-0325", "ETH-PERP", "ETH/USD", "BTC/USD"]
            .into_iter()
            .map(String::from)
            .collect();

        let markets = settings.select_markets(&catalog);

        assert_eq!(
            markets,
            ["BTC-PERP", "ETH-PERP", "ETH/BTC", "ETH/USD", "BTC/USD"]
        );
    }
}
