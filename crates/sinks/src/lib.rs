//! Sluice - Sinks
//!
//! Output sinks that decouple a stream of records from the latency and
//! availability of the store they are written to.
//!
//! # Architecture
//!
//! Producers hand records to the sink one at a time. The sink buffers them,
//! cuts batches by size or time, and writes each batch on one of several
//! interchangeable replicas from a bounded pool of workers.
//!
//! ```text
//! [Producer] --Record--> [Buffer] --Batch--> [Dispatch Channel] --> [Worker] --> [Replica]
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose |
//! |------|---------|
//! | `clickhouse` | Batched, replica-aware ClickHouse inserts |
//!
//! # Example
//!
//! ```ignore
//! use sluice_sinks::clickhouse::{ClickHouseOutput, ClickHouseOutputConfig};
//!
//! let config = ClickHouseOutputConfig::new("logs.app", ["http://localhost:8123"]);
//! let output = ClickHouseOutput::connect(config).await?;
//! output.submit(record).await;
//! output.shutdown().await;
//! ```

/// ClickHouse output - batched, replica-aware inserts
pub mod clickhouse;

// =============================================================================
// Public re-exports
// =============================================================================

pub use clickhouse::{
    ClickHouseOutput, ClickHouseOutputConfig, ClickHouseSinkError, MetricsSnapshot, OutputHandle,
    Record, Value,
};
