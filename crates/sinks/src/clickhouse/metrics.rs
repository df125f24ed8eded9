//! ClickHouse output metrics
//!
//! Atomic counters for tracking output throughput and health.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Metrics
// =============================================================================

/// Metrics for the ClickHouse output
#[derive(Debug, Default)]
pub struct OutputMetrics {
    /// Records accepted into the buffer
    pub records_submitted: AtomicU64,

    /// Records rejected because the output was shutting down
    pub records_rejected: AtomicU64,

    /// Batches handed to the dispatch channel
    pub batches_dispatched: AtomicU64,

    /// Batches fully committed
    pub batches_committed: AtomicU64,

    /// Batches discarded after a failed begin, execute or commit
    pub batches_failed: AtomicU64,

    /// Rows made durable
    pub rows_written: AtomicU64,

    /// Rows skipped by the coercion policy
    pub rows_skipped: AtomicU64,

    /// Batches written directly by the drain
    pub drained_batches: AtomicU64,

    /// Drains that hit the shutdown deadline
    pub drain_timeouts: AtomicU64,
}

impl OutputMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            records_submitted: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            batches_committed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            drained_batches: AtomicU64::new(0),
            drain_timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_submitted(&self) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed batch of `rows` rows
    #[inline]
    pub fn record_committed(&self, rows: u64) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped(&self) {
        self.rows_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drained(&self) {
        self.drained_batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_drain_timeout(&self) {
        self.drain_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_submitted: self.records_submitted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            drained_batches: self.drained_batches.load(Ordering::Relaxed),
            drain_timeouts: self.drain_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_submitted: u64,
    pub records_rejected: u64,
    pub batches_dispatched: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub drained_batches: u64,
    pub drain_timeouts: u64,
}

// =============================================================================
// Metrics Handle
// =============================================================================

/// Handle for reading output metrics
///
/// Holds an Arc to the counters, so it remains valid after the output has
/// been shut down.
#[derive(Debug, Clone)]
pub struct OutputMetricsHandle {
    table: String,
    metrics: Arc<OutputMetrics>,
}

impl OutputMetricsHandle {
    pub(crate) fn new(table: impl Into<String>, metrics: Arc<OutputMetrics>) -> Self {
        Self {
            table: table.into(),
            metrics,
        }
    }

    /// Target table these metrics belong to
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
