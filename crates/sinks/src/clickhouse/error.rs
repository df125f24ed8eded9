//! ClickHouse output errors

/// Errors from the ClickHouse output
#[derive(Debug, thiserror::Error)]
pub enum ClickHouseSinkError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No configured replica answered the connection check
    #[error("no available host")]
    NoAvailableHost,

    /// Schema introspection failed on every replica
    #[error("describe table {table} failed on all {attempts} replicas")]
    SchemaUnavailable {
        /// Target table
        table: String,
        /// Replicas tried
        attempts: usize,
    },

    /// Column uses a default kind that cannot be evaluated client-side
    #[error("column {column}: {kind} expression not supported")]
    UnsupportedDefault {
        /// Column name
        column: String,
        /// `MATERIALIZED` or `ALIAS`
        kind: &'static str,
    },

    /// Default kind reported by the store is not recognised
    #[error("column {column}: unknown default kind {kind:?}, only DEFAULT is supported")]
    UnknownDefaultKind {
        /// Column name
        column: String,
        /// Raw default kind
        kind: String,
    },

    /// Literal default could not be parsed for the column type
    #[error("column {column}: parse default value {expression:?}: {source}")]
    InvalidDefault {
        /// Column name
        column: String,
        /// Raw default expression
        expression: String,
        /// Underlying parse failure
        #[source]
        source: CoercionError,
    },

    /// Replica error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Coercion error
    #[error(transparent)]
    Coercion(#[from] CoercionError),
}

/// Errors from a single replica
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or transport failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// Query rejected by the server
    #[error("query failed: {0}")]
    Query(String),

    /// Insert rejected by the server
    #[error("insert failed: {0}")]
    Insert(String),

    /// Transaction used out of order (e.g. execute before prepare)
    #[error("transaction misuse: {0}")]
    Transaction(String),

    /// Response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// A value that cannot be represented in its column type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot convert {value} to {store_type}: {reason}")]
pub struct CoercionError {
    /// Target column type
    pub store_type: String,
    /// Offending input, rendered
    pub value: String,
    /// Why parsing failed
    pub reason: String,
}

impl CoercionError {
    pub(crate) fn new(
        store_type: impl ToString,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self {
            store_type: store_type.to_string(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that can occur when loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required field missing
    #[error("clickhouse output is missing required field '{0}'")]
    MissingField(&'static str),

    /// Invalid value
    #[error("clickhouse output has invalid {field}: {message}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Error message
        message: String,
    },
}

impl ConfigError {
    /// Create an InvalidValue error
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}
