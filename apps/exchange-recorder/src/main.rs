//! Exchange Recorder Binary
//!
//! Starts the account collectors and the trade recorder.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin exchange-recorder
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FTX_API_KEY`: Exchange API key
//! - `FTX_API_SECRET`: Exchange API secret
//!
//! ## Optional
//! - `FTX_SUBACCOUNT`: Subaccount name
//! - `FTX_REST_URL` / `FTX_WS_URL`: Exchange endpoints
//! - `INFLUX_URL`: InfluxDB base URL (default: <http://localhost:8086>)
//! - `INFLUX_ACCOUNT_DB` / `INFLUX_TRADES_DB`: Target databases
//! - `RECORDER_TRADES_ENABLED`: Run the trade recorder (default: true)
//! - `RECORDER_HEALTH_PORT`: Health check HTTP port (default: 8083, 0 disables)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use exchange_recorder::{
    CollectorSupervisor, ExchangePort, FtxRestClient, FtxTradeFeed, HealthServer,
    HealthServerState, InfluxSink, RecordSink, RecorderConfig, StatusRegistry, StreamWorker,
    TradeFeedPort, TradeRecorder, TradeRecorderConfig, WorkerFactory, init_metrics,
    init_telemetry,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = init_telemetry();

    tracing::info!("Starting exchange recorder");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RecorderConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let status = Arc::new(StatusRegistry::new());

    let exchange: Arc<dyn ExchangePort> = Arc::new(
        FtxRestClient::new(&config.exchange, config.credentials.clone())
            .context("failed to build exchange client")?,
    );

    let catalog = exchange
        .load_markets()
        .await
        .context("failed to load market catalog")?;
    let markets = config.trades.select_markets(&catalog);
    tracing::info!(
        catalog = catalog.len(),
        subscribed = markets.len(),
        "Market catalog loaded"
    );

    let account_sink: Arc<dyn RecordSink> = Arc::new(
        InfluxSink::new(&config.store.url, &config.store.account_database)
            .context("failed to build account store sink")?,
    );
    let trades_sink: Arc<dyn RecordSink> = Arc::new(
        InfluxSink::new(&config.store.url, &config.store.trades_database)
            .context("failed to build trades store sink")?,
    );

    let mut tasks = JoinSet::new();

    // Spawn health server
    if config.server.health_port != 0 {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&status),
            config.trades.enabled,
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tasks.spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Spawn collector supervisor
    let worker_config = config.worker_config();
    let factory: WorkerFactory = Box::new(move || {
        StreamWorker::for_all_streams(&exchange, &account_sink, worker_config)
    });
    let supervisor =
        CollectorSupervisor::new(factory, config.supervisor_config(), Arc::clone(&status));
    let supervisor_cancel = shutdown_token.clone();
    tasks.spawn(async move { supervisor.run(supervisor_cancel).await });

    // Spawn trade recorder
    if config.trades.enabled {
        let feed: Arc<dyn TradeFeedPort> = Arc::new(
            FtxTradeFeed::new(config.exchange.ws_url.clone(), config.trades.ping_interval)
                .with_connect_timeout(config.exchange.call_timeout),
        );
        let recorder = TradeRecorder::new(
            feed,
            trades_sink,
            TradeRecorderConfig {
                markets,
                exchange: config.exchange.name.clone(),
                reconnect: config.reconnect_config(),
            },
            Arc::clone(&status),
        );
        let recorder_cancel = shutdown_token.clone();
        tasks.spawn(async move { recorder.run(recorder_cancel).await });
    } else {
        tracing::info!("Trade recorder disabled");
    }

    tracing::info!("Exchange recorder ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Shutdown timeout elapsed, aborting remaining tasks");
        tasks.abort_all();
    }

    tracing::info!("Exchange recorder stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &RecorderConfig) {
    tracing::info!(
        exchange = %config.exchange.name,
        subaccount = config.credentials.subaccount().unwrap_or("main"),
        trades_enabled = config.trades.enabled,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        rest_url = %config.exchange.rest_url,
        ws_url = %config.exchange.ws_url,
        store_url = %config.store.url,
        account_db = %config.store.account_database,
        trades_db = %config.store.trades_database,
        "Endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
