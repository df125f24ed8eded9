//! Event buffer and flush controller
//!
//! Records accumulate in a mutex-guarded buffer. Two triggers swap the buffer
//! for an empty one and hand the swapped-out records to the dispatch channel:
//! the buffer reaching capacity (on submit) and the periodic timer (on flush).
//! Both take the same lock, so every record lands in exactly one batch.
//!
//! The lock only covers the in-memory swap. Sending to the bounded dispatch
//! channel happens after it is released and may wait for a free worker, which
//! is how a slow store throttles producers.

use std::sync::Arc;

use crossfire::MAsyncTx;
use parking_lot::Mutex;

use super::metrics::OutputMetrics;
use super::value::Record;

// =============================================================================
// Batch
// =============================================================================

/// Records handed off together; never mutated after dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in submission order
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

// =============================================================================
// Flush Controller
// =============================================================================

struct BufferState {
    records: Vec<Record>,
    closed: bool,
}

/// Owns the buffer and the sending side of the dispatch channel
pub(crate) struct FlushController {
    state: Mutex<BufferState>,
    capacity: usize,
    dispatch: MAsyncTx<Batch>,
    metrics: Arc<OutputMetrics>,
}

impl FlushController {
    pub(crate) fn new(
        capacity: usize,
        dispatch: MAsyncTx<Batch>,
        metrics: Arc<OutputMetrics>,
    ) -> Self {
        Self {
            state: Mutex::new(BufferState {
                records: Vec::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            dispatch,
            metrics,
        }
    }

    /// Append a record, dispatching the buffer if it reached capacity
    ///
    /// Records submitted after [`close`](Self::close) are logged and dropped.
    pub(crate) async fn submit(&self, record: Record) {
        let batch = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                self.metrics.record_rejected();
                tracing::warn!("record submitted after shutdown, dropping");
                return;
            }

            state.records.push(record);
            self.metrics.record_submitted();
            if state.records.len() < self.capacity {
                return;
            }
            self.swap(&mut state)
        };

        self.dispatch(batch).await;
    }

    /// Dispatch whatever is buffered; a no-op when the buffer is empty
    pub(crate) async fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            if state.closed || state.records.is_empty() {
                return;
            }
            self.swap(&mut state)
        };
        self.dispatch(batch).await;
    }

    /// Reject further records and return what is still buffered
    pub(crate) fn close(&self) -> Option<Batch> {
        let mut state = self.state.lock();
        state.closed = true;
        if state.records.is_empty() {
            None
        } else {
            Some(Batch::new(std::mem::take(&mut state.records)))
        }
    }

    fn swap(&self, state: &mut BufferState) -> Batch {
        Batch::new(std::mem::replace(
            &mut state.records,
            Vec::with_capacity(self.capacity),
        ))
    }

    async fn dispatch(&self, batch: Batch) {
        let records = batch.len();
        match self.dispatch.send(batch).await {
            Ok(()) => {
                self.metrics.record_dispatched();
                tracing::debug!(records, "batch dispatched");
            }
            Err(_) => {
                tracing::error!(records, "dispatch channel closed, batch lost");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossfire::MAsyncRx;

    use super::*;
    use crate::clickhouse::value::Value;

    fn controller(
        capacity: usize,
        bound: usize,
    ) -> (FlushController, MAsyncRx<Batch>, Arc<OutputMetrics>) {
        let (tx, rx) = crossfire::mpmc::bounded_async::<Batch>(bound);
        let metrics = Arc::new(OutputMetrics::new());
        (FlushController::new(capacity, tx, Arc::clone(&metrics)), rx, metrics)
    }

    fn record(id: i64) -> Record {
        Record::from([("id".to_string(), Value::from(id))])
    }

    #[tokio::test]
    async fn test_dispatch_at_capacity() {
        let (controller, rx, metrics) = controller(3, 4);

        controller.submit(record(1)).await;
        controller.submit(record(2)).await;
        assert!(rx.try_recv().is_err());

        controller.submit(record(3)).await;
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.records(), &[record(1), record(2), record(3)]);
        assert_eq!(metrics.snapshot().batches_dispatched, 1);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let (controller, rx, metrics) = controller(3, 4);
        controller.flush().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().batches_dispatched, 0);
    }

    #[tokio::test]
    async fn test_flush_partial_buffer() {
        let (controller, rx, _metrics) = controller(10, 4);
        controller.submit(record(1)).await;
        controller.flush().await;

        assert_eq!(rx.try_recv().unwrap().len(), 1);
        controller.flush().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_every_record_in_exactly_one_batch() {
        let (controller, rx, _metrics) = controller(4, 64);
        let controller = Arc::new(controller);

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    for i in 0..25 {
                        controller.submit(record(p * 100 + i)).await;
                        if i % 7 == 0 {
                            controller.flush().await;
                        }
                    }
                })
            })
            .collect();
        for p in producers {
            p.await.unwrap();
        }
        let leftover = controller.close();

        let mut seen: Vec<i64> = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            assert!(!batch.is_empty());
            assert!(batch.len() <= 4);
            for r in batch.records() {
                seen.push(r["id"].to_string().parse().unwrap());
            }
        }
        for r in leftover.iter().flat_map(Batch::records) {
            seen.push(r["id"].to_string().parse().unwrap());
        }

        seen.sort_unstable();
        let expected: Vec<i64> = (0..4).flat_map(|p| (0..25).map(move |i| p * 100 + i)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_close_rejects_later_records() {
        let (controller, rx, metrics) = controller(10, 4);
        controller.submit(record(1)).await;

        let leftover = controller.close().unwrap();
        assert_eq!(leftover.len(), 1);

        controller.submit(record(2)).await;
        controller.flush().await;
        assert!(rx.try_recv().is_err());
        assert!(controller.close().is_none());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_submitted, 1);
        assert_eq!(snapshot.records_rejected, 1);
    }
}
