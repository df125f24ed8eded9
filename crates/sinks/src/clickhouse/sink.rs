//! ClickHouse output
//!
//! Wires the pieces together and owns the tasks:
//!
//! ```text
//! [producers] --submit--> [FlushController] --Batch--> [dispatch channel]
//!                              ^                          |  (bound = concurrency)
//!                        [flush timer]                    v
//!                                                  [worker 1..N] --> BatchWriter --> replica
//! ```

use std::sync::Arc;
use std::time::Duration;

use crossfire::{MAsyncRx, MAsyncTx};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::buffer::{Batch, FlushController};
use super::config::ClickHouseOutputConfig;
use super::error::ClickHouseSinkError;
use super::http::HttpReplica;
use super::metrics::{MetricsSnapshot, OutputMetrics, OutputMetricsHandle};
use super::replica::Replica;
use super::schema::SchemaCache;
use super::selector::HostSelector;
use super::value::Record;
use super::writer::BatchWriter;

// =============================================================================
// Producer Handle
// =============================================================================

/// Cloneable submit handle for producer tasks
#[derive(Clone)]
pub struct OutputHandle {
    controller: Arc<FlushController>,
}

impl OutputHandle {
    /// Buffer a record
    ///
    /// Waits only when every worker is busy and the dispatch channel is full.
    /// After shutdown the record is logged and dropped.
    pub async fn submit(&self, record: Record) {
        self.controller.submit(record).await;
    }
}

// =============================================================================
// ClickHouse Output
// =============================================================================

/// Batched, replica-aware ClickHouse output
pub struct ClickHouseOutput {
    table: String,
    controller: Arc<FlushController>,
    writer: Arc<BatchWriter>,
    batches: MAsyncRx<Batch>,
    close: MAsyncTx<()>,
    workers: JoinSet<()>,
    concurrency: usize,
    timer: JoinHandle<()>,
    timer_cancel: CancellationToken,
    shutdown_timeout: Duration,
    metrics: Arc<OutputMetrics>,
}

impl ClickHouseOutput {
    /// Connect to every configured host over HTTP and start the output
    ///
    /// Hosts that do not answer are logged and left out. Fails with
    /// [`ClickHouseSinkError::NoAvailableHost`] when none answer.
    pub async fn connect(config: ClickHouseOutputConfig) -> Result<Self, ClickHouseSinkError> {
        config.validate()?;

        let mut replicas: Vec<Arc<dyn Replica>> = Vec::with_capacity(config.hosts.len());
        for host in &config.hosts {
            match HttpReplica::connect(&config, host).await {
                Ok(replica) => {
                    tracing::info!(replica = %host, "connected to replica");
                    replicas.push(Arc::new(replica));
                }
                Err(e) => {
                    tracing::error!(replica = %host, error = %e, "replica unreachable, skipping");
                }
            }
        }

        Self::start(config, replicas).await
    }

    /// Start the output over already-open replicas
    ///
    /// Describes the table, builds the insert statement, then spawns the
    /// workers and the flush timer. Must be called within a tokio runtime.
    pub async fn start(
        config: ClickHouseOutputConfig,
        replicas: Vec<Arc<dyn Replica>>,
    ) -> Result<Self, ClickHouseSinkError> {
        config.validate()?;

        let selector = HostSelector::new(replicas, config.host_retries)?;
        let schema = SchemaCache::fetch(&selector, &config.table).await?;
        let statement = schema.insert_statement(&config.table);
        tracing::debug!(sql = %statement.sql(), "insert statement");

        let metrics = Arc::new(OutputMetrics::new());
        let writer = Arc::new(BatchWriter::new(
            selector,
            schema,
            statement,
            config.on_coercion_error,
            Arc::clone(&metrics),
        ));

        let (dispatch_tx, batches) = crossfire::mpmc::bounded_async::<Batch>(config.concurrency);
        let (close, close_rx) = crossfire::mpmc::bounded_async::<()>(config.concurrency);
        let controller = Arc::new(FlushController::new(
            config.batch_size,
            dispatch_tx,
            Arc::clone(&metrics),
        ));

        let mut workers = JoinSet::new();
        for id in 0..config.concurrency {
            workers.spawn(run_worker(
                id,
                Arc::clone(&writer),
                batches.clone(),
                close_rx.clone(),
            ));
        }

        let timer_cancel = CancellationToken::new();
        let timer = tokio::spawn(run_flush_timer(
            Arc::clone(&controller),
            config.flush_interval,
            timer_cancel.clone(),
        ));

        tracing::info!(
            table = %config.table,
            batch_size = config.batch_size,
            flush_interval = ?config.flush_interval,
            concurrency = config.concurrency,
            "clickhouse output started"
        );

        Ok(Self {
            table: config.table,
            controller,
            writer,
            batches,
            close,
            workers,
            concurrency: config.concurrency,
            timer,
            timer_cancel,
            shutdown_timeout: config.shutdown_timeout,
            metrics,
        })
    }

    /// Buffer a record
    pub async fn submit(&self, record: Record) {
        self.controller.submit(record).await;
    }

    /// Cloneable handle for producer tasks
    pub fn handle(&self) -> OutputHandle {
        OutputHandle {
            controller: Arc::clone(&self.controller),
        }
    }

    /// Metrics handle that stays valid after shutdown
    pub fn metrics_handle(&self) -> OutputMetricsHandle {
        OutputMetricsHandle::new(self.table.clone(), Arc::clone(&self.metrics))
    }

    /// Target table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stop workers, drain buffered and queued batches, and wait for writes
    ///
    /// Bounded by the configured shutdown timeout. Writes still running at the
    /// deadline are left to finish in the background; anything they have not
    /// committed by process exit is lost.
    pub async fn shutdown(mut self) -> MetricsSnapshot {
        tracing::info!(table = %self.table, "clickhouse output shutting down");
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        // Stop the timer and give every worker its close token
        self.timer_cancel.cancel();
        for _ in 0..self.concurrency {
            if self.close.send(()).await.is_err() {
                break;
            }
        }

        let drained = tokio::time::timeout_at(deadline, async {
            self.drain().await;
            while let Some(result) = self.workers.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "write task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            self.metrics.record_drain_timeout();
            tracing::warn!(
                table = %self.table,
                timeout = ?self.shutdown_timeout,
                pending = self.workers.len(),
                "shutdown timed out, unfinished writes may be lost"
            );
            self.workers.detach_all();
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            records = snapshot.records_submitted,
            batches_committed = snapshot.batches_committed,
            batches_failed = snapshot.batches_failed,
            rows_written = snapshot.rows_written,
            rows_skipped = snapshot.rows_skipped,
            drained_batches = snapshot.drained_batches,
            "clickhouse output stopped"
        );
        snapshot
    }

    /// Write everything still queued or buffered directly, outside the workers
    async fn drain(&mut self) {
        // The timer may be blocked on a full channel; keep draining until it exits
        loop {
            tokio::select! {
                _ = &mut self.timer => break,
                batch = self.batches.recv() => match batch {
                    Ok(batch) => self.spawn_drain_write(batch),
                    Err(_) => break,
                },
            }
        }

        if let Some(batch) = self.controller.close() {
            tracing::debug!(records = batch.len(), "draining buffer");
            self.spawn_drain_write(batch);
        }

        while let Ok(batch) = self.batches.try_recv() {
            self.spawn_drain_write(batch);
        }
    }

    fn spawn_drain_write(&mut self, batch: Batch) {
        self.metrics.record_drained();
        let writer = Arc::clone(&self.writer);
        self.workers.spawn(async move { writer.write(batch).await });
    }
}

impl Drop for ClickHouseOutput {
    fn drop(&mut self) {
        self.timer_cancel.cancel();
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Write dispatched batches until a close token arrives
async fn run_worker(
    id: usize,
    writer: Arc<BatchWriter>,
    batches: MAsyncRx<Batch>,
    close: MAsyncRx<()>,
) {
    tracing::debug!(worker = id, "worker started");
    loop {
        tokio::select! {
            batch = batches.recv() => match batch {
                Ok(batch) => writer.write(batch).await,
                Err(_) => break,
            },
            _ = close.recv() => break,
        }
    }
    tracing::debug!(worker = id, "worker stopped");
}

/// Flush the buffer on every interval tick until cancelled
async fn run_flush_timer(
    controller: Arc<FlushController>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => controller.flush().await,
        }
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
