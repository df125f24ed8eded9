//! ClickHouse Output - Batched, Replica-Aware Inserts
//!
//! Accepts loosely-typed records one at a time and writes them to a ClickHouse
//! table in transactional batches spread over interchangeable replicas.
//!
//! # Features
//!
//! - **Dual-trigger flushing**: a batch leaves the buffer when it is full or
//!   when the flush interval elapses, whichever comes first
//! - **Bounded backpressure**: the dispatch channel holds one batch per
//!   worker; producers wait when every worker is busy
//! - **Schema-driven inserts**: column order, defaults and types come from
//!   `DESCRIBE TABLE` at startup
//! - **Strict coercion**: numeric strings and booleans are parsed at the
//!   column's exact width, never clamped
//! - **All-or-nothing batches**: each batch is committed whole or discarded
//! - **Bounded drain**: shutdown writes out buffered and queued batches
//!   within a deadline
//!
//! # Example
//!
//! ```ignore
//! use sluice_sinks::clickhouse::{ClickHouseOutput, ClickHouseOutputConfig};
//!
//! let config: ClickHouseOutputConfig = std::fs::read_to_string("output.toml")?.parse()?;
//! let output = ClickHouseOutput::connect(config).await?;
//!
//! let handle = output.handle();
//! tokio::spawn(async move {
//!     handle.submit(record).await;
//! });
//!
//! let metrics = output.shutdown().await;
//! ```

mod buffer;
mod coerce;
mod config;
mod error;
mod http;
mod metrics;
mod replica;
mod schema;
mod selector;
mod sink;
mod types;
mod value;
mod writer;

// Re-export public API
pub use buffer::Batch;
pub use coerce::{coerce, parse_literal};
pub use config::{
    ClickHouseOutputConfig, CoercionFailurePolicy, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY,
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_DATABASE, DEFAULT_FLUSH_INTERVAL, DEFAULT_HOST_RETRIES,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::{ClickHouseSinkError, CoercionError, ConfigError, StoreError};
pub use http::HttpReplica;
pub use metrics::{MetricsSnapshot, OutputMetrics, OutputMetricsHandle};
pub use replica::{DescribeRow, Replica, Transaction};
pub use schema::{ColumnDescriptor, DefaultKind, InsertStatement, SchemaCache};
pub use selector::HostSelector;
pub use sink::{ClickHouseOutput, OutputHandle};
pub use types::StoreType;
pub use value::{ColumnValue, Record, Value, record_from_json};

#[cfg(test)]
mod test_utils;
