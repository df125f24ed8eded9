//! ClickHouse output configuration
//!
//! # Example
//!
//! ```toml
//! table = "logs.app_events"
//! hosts = ["http://ch-1:8123", "http://ch-2:8123"]
//! username = "writer"
//! password = "secret"
//! batch_size = 5000
//! flush_interval = "10s"
//! concurrency = 4
//! conn_max_lifetime = "5m"
//! shutdown_timeout = "30s"
//! on_coercion_error = "skip_record"
//! ```

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;

// =============================================================================
// Constants
// =============================================================================

/// Default buffer capacity in records
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default periodic flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default worker count
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default per-request timeout
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default drain deadline
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of replicas tried when opening a transaction
pub const DEFAULT_HOST_RETRIES: usize = 3;

/// Database used when the table identifier has no `db.` prefix
pub const DEFAULT_DATABASE: &str = "default";

// =============================================================================
// Configuration
// =============================================================================

/// What to do with a record whose value cannot be coerced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionFailurePolicy {
    /// Log and terminate the process
    #[default]
    Fatal,
    /// Log, drop the record, keep writing the rest of the batch
    SkipRecord,
}

/// Configuration for the ClickHouse output
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseOutputConfig {
    /// Target table, `db.table` or `table`
    /// Required
    pub table: String,

    /// Replica HTTP endpoints (e.g., "http://localhost:8123")
    /// Required, non-empty
    pub hosts: Vec<String>,

    /// Username for authentication (optional)
    pub username: Option<String>,

    /// Password for authentication (optional)
    pub password: Option<String>,

    /// Records buffered before a flush
    /// Default: 1000
    pub batch_size: usize,

    /// Periodic flush interval
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Concurrent writers, also the dispatch channel bound
    /// Default: 1
    pub concurrency: usize,

    /// Maximum lifetime of an idle pooled connection, zero for unbounded
    /// Default: 0s
    #[serde(with = "humantime_serde")]
    pub conn_max_lifetime: Duration,

    /// Per-request timeout
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Deadline for draining buffered and in-flight batches
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Replicas tried when opening a transaction fails
    /// Default: 3
    pub host_retries: usize,

    /// Behaviour on a value that cannot be coerced
    /// Default: fatal
    pub on_coercion_error: CoercionFailurePolicy,
}

impl Default for ClickHouseOutputConfig {
    fn default() -> Self {
        Self {
            table: String::new(),
            hosts: Vec::new(),
            username: None,
            password: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
            conn_max_lifetime: Duration::ZERO,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            host_retries: DEFAULT_HOST_RETRIES,
            on_coercion_error: CoercionFailurePolicy::Fatal,
        }
    }
}

impl FromStr for ClickHouseOutputConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl ClickHouseOutputConfig {
    /// Create a config for `table` on `hosts`, everything else default
    pub fn new<S: Into<String>>(
        table: impl Into<String>,
        hosts: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            table: table.into(),
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set authentication credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the flush interval
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the worker count
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the drain deadline
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the number of replicas tried when opening a transaction
    pub fn with_host_retries(mut self, retries: usize) -> Self {
        self.host_retries = retries;
        self
    }

    /// Set the coercion failure policy
    pub fn with_coercion_policy(mut self, policy: CoercionFailurePolicy) -> Self {
        self.on_coercion_error = policy;
        self
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::MissingField("table"));
        }
        if self.hosts.is_empty() {
            return Err(ConfigError::MissingField("hosts"));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::invalid_value("hosts", "empty host entry"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value("batch_size", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid_value("concurrency", "must be at least 1"));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "flush_interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Database part of `table`, or `default` when unqualified
    pub fn database(&self) -> &str {
        match self.table.split_once('.') {
            Some((db, _)) if !db.is_empty() => db,
            _ => DEFAULT_DATABASE,
        }
    }
}
