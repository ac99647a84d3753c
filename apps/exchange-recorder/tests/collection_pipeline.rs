//! Collection Pipeline Integration Tests
//!
//! Drives stream workers and the collector supervisor against a scripted
//! exchange and the in-memory sink.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use exchange_recorder::{
    CollectorSupervisor, ExchangePort, InMemorySink, RawResponse, RecordSink, SourceError,
    SourceRequest, StatusRegistry, StreamError, StreamKind, StreamWorker, SupervisorConfig,
    WorkerConfig, WorkerFactory,
};

#[derive(Default)]
struct ScriptedExchange {
    account: Mutex<Option<Value>>,
    orders: Mutex<Option<Value>>,
    fail_balances: Mutex<bool>,
    requests: Mutex<Vec<(SourceRequest, DateTime<Utc>)>>,
}

impl ScriptedExchange {
    fn with_account(account: Value) -> Self {
        let exchange = Self::default();
        *exchange.account.lock() = Some(account);
        exchange
    }

    fn window_starts(&self) -> Vec<TimeDelta> {
        self.requests
            .lock()
            .iter()
            .filter_map(|(request, at)| match request {
                SourceRequest::Fills { since } => Some(*at - *since),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ExchangePort for ScriptedExchange {
    async fn fetch(&self, request: SourceRequest) -> Result<RawResponse, SourceError> {
        self.requests.lock().push((request, Utc::now()));
        match request {
            SourceRequest::Account => Ok(self
                .account
                .lock()
                .clone()
                .unwrap_or_else(|| json!({"success": true, "result": {"collateral": 1}}))),
            SourceRequest::Balances if *self.fail_balances.lock() => Err(SourceError::Network {
                message: "connection reset by peer".to_string(),
            }),
            SourceRequest::Balances => Ok(json!({
                "success": true,
                "result": [{"coin": "USD", "free": 100.5, "total": 120}]
            })),
            SourceRequest::OrderHistory { .. } => Ok(self
                .orders
                .lock()
                .clone()
                .unwrap_or_else(|| json!({"success": true, "result": []}))),
            SourceRequest::Fills { .. } => Ok(json!({
                "success": true,
                "result": [{
                    "market": "BTC-PERP",
                    "side": "buy",
                    "price": 30000,
                    "size": 0.1,
                    "fee": 0.5,
                    "time": "2021-01-01T00:00:01+00:00"
                }]
            })),
        }
    }

    async fn load_markets(&self) -> Result<Vec<String>, SourceError> {
        Ok(vec!["BTC-PERP".to_string()])
    }
}

fn worker(
    kind: StreamKind,
    exchange: &Arc<ScriptedExchange>,
    sink: &Arc<InMemorySink>,
) -> StreamWorker {
    let exchange: Arc<dyn ExchangePort> = Arc::clone(exchange) as Arc<dyn ExchangePort>;
    let sink: Arc<dyn RecordSink> = Arc::clone(sink) as Arc<dyn RecordSink>;
    StreamWorker::new(kind, exchange, sink, WorkerConfig::default())
}

fn approx(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap();
    assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
}

#[tokio::test]
async fn account_cycle_writes_ratios_positions_and_total() {
    let exchange = Arc::new(ScriptedExchange::with_account(json!({
        "success": true,
        "result": {
            "username": "trader",
            "collateral": 1000,
            "freeCollateral": 400,
            "totalPositionSize": 2500,
            "positions": [
                {"future": "BTC-PERP", "side": "buy", "collateralUsed": 10, "cost": 100},
                {"future": "ETH-PERP", "side": "sell", "collateralUsed": 20, "cost": -50},
                {"future": "SOL-PERP", "side": "buy", "collateralUsed": 30, "cost": 25}
            ]
        }
    })));
    let sink = Arc::new(InMemorySink::new());

    let report = worker(StreamKind::Account, &exchange, &sink)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.records_written, 5);
    assert_eq!(sink.batches().len(), 1);

    let account = &sink.measurement("account")[0];
    assert_eq!(account.tag("username"), Some("trader"));
    approx(account.field("percentUsedCollateral"), 0.6);
    approx(account.field("percentFreeCollateral"), 0.4);
    approx(account.field("currentLeverage"), 2.5);

    assert_eq!(sink.measurement("positions").len(), 3);
    let totals = sink.measurement("all_positions");
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].field("totalCollateralUsed"), Some(60.0));
    assert_eq!(totals[0].field("totalCost"), Some(75.0));
    assert!(totals[0].tags().is_empty());
}

#[tokio::test]
async fn account_without_positions_writes_no_total() {
    let exchange = Arc::new(ScriptedExchange::with_account(json!({
        "success": true,
        "result": {"collateral": 0, "freeCollateral": 0, "positions": []}
    })));
    let sink = Arc::new(InMemorySink::new());

    let report = worker(StreamKind::Account, &exchange, &sink)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(report.records_written, 1);
    assert!(sink.measurement("all_positions").is_empty());
    let account = &sink.measurement("account")[0];
    assert_eq!(account.field("percentUsedCollateral"), None);
    assert_eq!(account.field("collateral"), Some(0.0));
}

#[tokio::test]
async fn order_timestamps_are_truncated_to_milliseconds() {
    let exchange = Arc::new(ScriptedExchange::default());
    *exchange.orders.lock() = Some(json!({
        "success": true,
        "result": [{
            "market": "BTC-PERP",
            "side": "sell",
            "type": "limit",
            "reduceOnly": false,
            "price": 29000.5,
            "size": 1,
            "filledSize": null,
            "createdAt": "2021-01-01T00:00:00.123456+00:00"
        }]
    }));
    let sink = Arc::new(InMemorySink::new());

    worker(StreamKind::Orders, &exchange, &sink)
        .run_cycle()
        .await
        .unwrap();

    let orders = sink.measurement("orders");
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].timestamp_iso(), "2021-01-01T00:00:00.123Z");
    assert_eq!(orders[0].tag("reduceOnly"), Some("false"));
    assert_eq!(orders[0].field("filledSize"), None);
    assert_eq!(orders[0].field("price"), Some(29000.5));
}

#[tokio::test]
async fn fills_window_narrows_after_first_cycle() {
    let exchange = Arc::new(ScriptedExchange::default());
    let sink = Arc::new(InMemorySink::new());
    let mut fills = worker(StreamKind::Fills, &exchange, &sink);

    fills.run_cycle().await.unwrap();
    sink.set_failing(true);
    assert!(matches!(
        fills.run_cycle().await,
        Err(StreamError::SinkUnavailable {
            stream: StreamKind::Fills,
            ..
        })
    ));
    sink.set_failing(false);
    fills.run_cycle().await.unwrap();

    let lookbacks = exchange.window_starts();
    assert_eq!(lookbacks.len(), 3);
    assert!((lookbacks[0] - TimeDelta::hours(5)).abs() < TimeDelta::seconds(1));
    for lookback in &lookbacks[1..] {
        assert!((*lookback - TimeDelta::seconds(120)).abs() < TimeDelta::seconds(1));
    }
}

#[tokio::test]
async fn malformed_response_fails_only_that_cycle() {
    let exchange = Arc::new(ScriptedExchange::with_account(json!({"success": true, "result": []})));
    let sink = Arc::new(InMemorySink::new());

    let err = worker(StreamKind::Account, &exchange, &sink)
        .run_cycle()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StreamError::MalformedResponse {
            stream: StreamKind::Account,
            ..
        }
    ));
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn supervisor_isolates_failing_stream() {
    let exchange = Arc::new(ScriptedExchange::default());
    *exchange.fail_balances.lock() = true;
    let sink = Arc::new(InMemorySink::new());
    let status = Arc::new(StatusRegistry::new());

    let factory_exchange: Arc<dyn ExchangePort> = Arc::clone(&exchange) as Arc<dyn ExchangePort>;
    let factory_sink: Arc<dyn RecordSink> = Arc::clone(&sink) as Arc<dyn RecordSink>;
    let factory: WorkerFactory = Box::new(move || {
        StreamWorker::for_all_streams(&factory_exchange, &factory_sink, WorkerConfig::default())
    });
    let supervisor =
        CollectorSupervisor::new(factory, SupervisorConfig::default(), Arc::clone(&status));

    let workers = StreamWorker::for_all_streams(
        &(Arc::clone(&exchange) as Arc<dyn ExchangePort>),
        &(Arc::clone(&sink) as Arc<dyn RecordSink>),
        WorkerConfig::default(),
    );
    let workers = supervisor.tick(workers).await.unwrap();
    let workers = supervisor.tick(workers).await.unwrap();

    assert_eq!(workers.len(), 4);
    let balances = status.stream(StreamKind::Balances).unwrap();
    assert_eq!(balances.cycles_failed, 2);
    assert_eq!(balances.consecutive_failures, 2);
    let error = balances.last_error.unwrap();
    assert!(error.contains("connection reset by peer"));

    assert_eq!(
        status.stream(StreamKind::Fills).unwrap().cycles_succeeded,
        2
    );
    assert_eq!(
        status.stream(StreamKind::Account).unwrap().cycles_succeeded,
        2
    );
    assert!(sink.measurement("balances").is_empty());
    assert_eq!(sink.measurement("fills").len(), 2);
}

#[tokio::test]
async fn supervisor_stops_on_cancel() {
    let exchange = Arc::new(ScriptedExchange::default());
    let sink = Arc::new(InMemorySink::new());
    let status = Arc::new(StatusRegistry::new());

    let factory_exchange: Arc<dyn ExchangePort> = Arc::clone(&exchange) as Arc<dyn ExchangePort>;
    let factory_sink: Arc<dyn RecordSink> = Arc::clone(&sink) as Arc<dyn RecordSink>;
    let factory: WorkerFactory = Box::new(move || {
        StreamWorker::for_all_streams(&factory_exchange, &factory_sink, WorkerConfig::default())
    });
    let supervisor = CollectorSupervisor::new(
        factory,
        SupervisorConfig {
            tick_interval: Duration::from_millis(20),
            restart_delay: Duration::from_millis(20),
        },
        Arc::clone(&status),
    );

    let cancel = tokio_util::sync::CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), supervisor.run(cancel))
        .await
        .expect("supervisor should stop once cancelled");

    assert!(status.stream(StreamKind::Account).unwrap().cycles_succeeded >= 2);
    assert_eq!(status.restarts(), 0);
}
