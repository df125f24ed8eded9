//! Transactional batch writes
//!
//! One batch, one transaction, one replica. Every dispatched batch ends either
//! fully committed or fully discarded; nothing is retried or requeued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::buffer::Batch;
use super::config::CoercionFailurePolicy;
use super::error::{ClickHouseSinkError, CoercionError};
use super::metrics::OutputMetrics;
use super::replica::{Replica, Transaction};
use super::schema::{InsertStatement, SchemaCache};
use super::selector::HostSelector;

/// Writes batches against the replica set
pub(crate) struct BatchWriter {
    selector: HostSelector<Arc<dyn Replica>>,
    schema: SchemaCache,
    statement: InsertStatement,
    policy: CoercionFailurePolicy,
    execution_id: AtomicU64,
    metrics: Arc<OutputMetrics>,
}

impl BatchWriter {
    pub(crate) fn new(
        selector: HostSelector<Arc<dyn Replica>>,
        schema: SchemaCache,
        statement: InsertStatement,
        policy: CoercionFailurePolicy,
        metrics: Arc<OutputMetrics>,
    ) -> Self {
        Self {
            selector,
            schema,
            statement,
            policy,
            execution_id: AtomicU64::new(0),
            metrics,
        }
    }

    /// Write one batch, logging the outcome
    pub(crate) async fn write(&self, batch: Batch) {
        let execution_id = self
            .execution_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);
        let records = batch.len();
        tracing::info!(
            execution_id,
            records,
            table = %self.statement.table(),
            "writing batch"
        );

        match self.write_batch(execution_id, &batch).await {
            Ok(rows) => {
                self.metrics.record_committed(rows as u64);
                tracing::info!(execution_id, rows, "batch committed");
            }
            Err(e) => {
                self.metrics.record_failed();
                tracing::error!(
                    execution_id,
                    records,
                    error = %e,
                    "batch discarded"
                );
            }
        }
    }

    async fn write_batch(
        &self,
        execution_id: u64,
        batch: &Batch,
    ) -> Result<usize, ClickHouseSinkError> {
        let mut tx = self.begin(execution_id).await?;

        if let Err(e) = tx.prepare(&self.statement).await {
            tx.rollback().await;
            return Err(e.into());
        }

        let mut rows = 0;
        for record in batch.records() {
            let row = match self.schema.build_row(record) {
                Ok(row) => row,
                Err(e) => match self.policy {
                    CoercionFailurePolicy::SkipRecord => {
                        self.metrics.record_skipped();
                        tracing::warn!(execution_id, error = %e, "skipping record");
                        continue;
                    }
                    CoercionFailurePolicy::Fatal => {
                        tx.rollback().await;
                        exit_on_coercion_failure(execution_id, &e);
                    }
                },
            };

            if let Err(e) = tx.execute(row).await {
                tx.rollback().await;
                return Err(e.into());
            }
            rows += 1;
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Open a transaction, moving to the next replica when one refuses
    async fn begin(
        &self,
        execution_id: u64,
    ) -> Result<Box<dyn Transaction>, ClickHouseSinkError> {
        let mut last_error = None;

        for attempt in 1..=self.selector.retries() {
            let replica = self.selector.next();
            match replica.begin().await {
                Ok(tx) => {
                    tracing::debug!(
                        execution_id,
                        replica = %replica.endpoint(),
                        "transaction opened"
                    );
                    return Ok(tx);
                }
                Err(e) => {
                    tracing::error!(
                        execution_id,
                        attempt,
                        replica = %replica.endpoint(),
                        error = %e,
                        "failed to open transaction"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map_or(ClickHouseSinkError::NoAvailableHost, Into::into))
    }
}

fn exit_on_coercion_failure(execution_id: u64, error: &CoercionError) -> ! {
    tracing::error!(
        execution_id,
        store_type = %error.store_type,
        value = %error.value,
        error = %error,
        "record cannot be coerced, terminating"
    );
    std::process::exit(1)
}
