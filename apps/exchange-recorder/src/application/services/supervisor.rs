//! Collector Supervisor
//!
//! Runs every stream worker once per tick, concurrently, and waits for all of
//! them before sleeping until the next tick. Per-stream errors are logged and
//! recorded without affecting siblings. A panicked worker aborts the tick and
//! the whole collection loop is rebuilt from fresh workers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::status::StatusRegistry;
use super::worker::{CycleReport, StreamError, StreamKind, StreamWorker};

/// Builds a fresh set of workers for each collection loop.
pub type WorkerFactory = Box<dyn Fn() -> Vec<StreamWorker> + Send + Sync>;

/// Supervisor cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Delay between the end of one tick and the start of the next.
    pub tick_interval: Duration,
    /// Delay before rebuilding the loop after an escaped fault.
    pub restart_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            restart_delay: Duration::from_secs(1),
        }
    }
}

/// A fault that escaped a worker.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A worker task panicked or was cancelled.
    #[error("{} worker aborted: {reason}", .stream.map_or("unknown", StreamKind::as_str))]
    WorkerAborted {
        /// Stream of the aborted worker, if known.
        stream: Option<StreamKind>,
        /// Join failure description.
        reason: String,
    },
}

/// Owns the polling workers and drives them on a fixed cadence.
pub struct CollectorSupervisor {
    factory: WorkerFactory,
    config: SupervisorConfig,
    status: Arc<StatusRegistry>,
}

impl fmt::Debug for CollectorSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorSupervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CollectorSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        factory: WorkerFactory,
        config: SupervisorConfig,
        status: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            factory,
            config,
            status,
        }
    }

    /// Run until cancelled, restarting the loop after escaped faults.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let workers = (self.factory)();
            tracing::info!(streams = workers.len(), "Collection loop started");

            match self.run_loop(workers, &cancel).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Collection loop aborted, restarting");
                    self.status.record_restart();

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.config.restart_delay) => {}
                    }
                }
            }
        }
        tracing::info!("Collection loop stopped");
    }

    async fn run_loop(
        &self,
        mut workers: Vec<StreamWorker>,
        cancel: &CancellationToken,
    ) -> Result<(), SupervisorError> {
        loop {
            workers = self.tick(workers).await?;

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(self.config.tick_interval) => {}
            }
        }
    }

    /// Run every worker once, concurrently, and hand the workers back.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::WorkerAborted`] if any worker task panicked.
    /// The remaining workers still run to completion first.
    pub async fn tick(
        &self,
        workers: Vec<StreamWorker>,
    ) -> Result<Vec<StreamWorker>, SupervisorError> {
        let mut tasks = JoinSet::new();
        let mut streams = HashMap::with_capacity(workers.len());

        for mut worker in workers {
            let kind = worker.kind();
            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let outcome = worker.run_cycle().await;
                (worker, outcome, started.elapsed())
            });
            streams.insert(handle.id(), kind);
        }

        let mut survivors = Vec::with_capacity(streams.len());
        let mut aborted = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((worker, outcome, elapsed)) => {
                    self.observe(outcome, elapsed);
                    survivors.push(worker);
                }
                Err(e) => {
                    let stream = streams.get(&e.id()).copied();
                    tracing::error!(
                        stream = stream.map_or("unknown", StreamKind::as_str),
                        error = %e,
                        "Worker task aborted"
                    );
                    aborted.get_or_insert(SupervisorError::WorkerAborted {
                        stream,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(error) = aborted {
            return Err(error);
        }
        survivors.sort_by_key(StreamWorker::kind);
        Ok(survivors)
    }

    fn observe(&self, outcome: Result<CycleReport, StreamError>, elapsed: Duration) {
        match outcome {
            Ok(report) => {
                tracing::debug!(
                    stream = %report.stream,
                    records = report.records_written,
                    window_start = ?report.window_start,
                    elapsed_ms = elapsed.as_millis(),
                    "Cycle complete"
                );
                self.status.record_success(&report, elapsed);
            }
            Err(e) => {
                tracing::warn!(stream = %e.stream(), error = %e, "Cycle failed");
                self.status.record_failure(&e, elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::ports::{
        ExchangePort, MockRecordSink, RawResponse, RecordSink, SourceError, SourceRequest,
    };
    use crate::application::services::WorkerConfig;

    #[derive(Default)]
    struct ScriptedExchange {
        panic_fills_once: AtomicBool,
        fail_balances: bool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ExchangePort for ScriptedExchange {
        async fn fetch(&self, request: SourceRequest) -> Result<RawResponse, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match request {
                SourceRequest::Balances if self.fail_balances => Err(SourceError::Network {
                    message: "unreachable".into(),
                }),
                SourceRequest::Fills { .. }
                    if self.panic_fills_once.swap(false, Ordering::SeqCst) =>
                {
                    panic!("unexpected fills payload")
                }
                SourceRequest::Account => Ok(json!({"result": {"collateral": 10}})),
                _ => Ok(json!({"result": [{
                    "coin": "USD",
                    "free": 1,
                    "time": "2021-01-01T00:00:00+00:00",
                    "createdAt": "2021-01-01T00:00:00+00:00"
                }]})),
            }
        }

        async fn load_markets(&self) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn supervisor(
        exchange: Arc<ScriptedExchange>,
        sink: Arc<dyn RecordSink>,
        status: Arc<StatusRegistry>,
    ) -> CollectorSupervisor {
        let exchange: Arc<dyn ExchangePort> = exchange;
        let factory: WorkerFactory = Box::new(move || {
            StreamWorker::for_all_streams(&exchange, &sink, WorkerConfig::default())
        });
        CollectorSupervisor::new(
            factory,
            SupervisorConfig {
                tick_interval: Duration::from_millis(10),
                restart_delay: Duration::from_millis(10),
            },
            status,
        )
    }

    fn accepting_sink() -> Arc<dyn RecordSink> {
        let mut sink = MockRecordSink::new();
        sink.expect_write_batch().returning(|_| Ok(()));
        Arc::new(sink)
    }

    #[tokio::test]
    async fn failing_stream_does_not_block_siblings() {
        let exchange = Arc::new(ScriptedExchange {
            fail_balances: true,
            ..Default::default()
        });
        let status = Arc::new(StatusRegistry::new());
        let supervisor = supervisor(exchange, accepting_sink(), Arc::clone(&status));

        let workers = supervisor.tick((supervisor.factory)()).await.unwrap();

        assert_eq!(workers.len(), 4);
        assert_eq!(
            status.stream(StreamKind::Balances).unwrap().cycles_failed,
            1
        );
        for kind in [StreamKind::Account, StreamKind::Orders, StreamKind::Fills] {
            assert_eq!(status.stream(kind).unwrap().cycles_succeeded, 1, "{kind}");
        }
    }

    #[tokio::test]
    async fn tick_hands_workers_back_in_order() {
        let exchange = Arc::new(ScriptedExchange::default());
        let status = Arc::new(StatusRegistry::new());
        let supervisor = supervisor(exchange, accepting_sink(), status);

        let workers = supervisor.tick((supervisor.factory)()).await.unwrap();
        let kinds: Vec<_> = workers.iter().map(StreamWorker::kind).collect();

        assert_eq!(kinds, StreamKind::ALL);
        assert!(!workers[2].window().unwrap().state().is_first_run);
    }

    #[tokio::test]
    async fn panicking_worker_aborts_tick() {
        let exchange = Arc::new(ScriptedExchange {
            panic_fills_once: AtomicBool::new(true),
            ..Default::default()
        });
        let status = Arc::new(StatusRegistry::new());
        let supervisor = supervisor(exchange, accepting_sink(), Arc::clone(&status));

        let err = supervisor.tick((supervisor.factory)()).await.unwrap_err();

        assert!(matches!(
            err,
            SupervisorError::WorkerAborted {
                stream: Some(StreamKind::Fills),
                ..
            }
        ));
        assert_eq!(
            status.stream(StreamKind::Account).unwrap().cycles_succeeded,
            1
        );
    }

    #[tokio::test]
    async fn run_restarts_after_panic_and_stops_on_cancel() {
        let exchange = Arc::new(ScriptedExchange {
            panic_fills_once: AtomicBool::new(true),
            ..Default::default()
        });
        let status = Arc::new(StatusRegistry::new());
        let supervisor = supervisor(Arc::clone(&exchange), accepting_sink(), Arc::clone(&status));
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });
        supervisor.run(cancel).await;

        assert_eq!(status.restarts(), 1);
        assert!(status.stream(StreamKind::Fills).unwrap().cycles_succeeded >= 1);
        assert!(exchange.fetches.load(Ordering::SeqCst) > 8);
    }
}
