//! Replica abstraction
//!
//! A replica is one interchangeable store endpoint. The output only needs two
//! things from it: the table description, and a transaction that accepts
//! positional rows for a prepared insert.

use async_trait::async_trait;
use serde::Deserialize;

use super::error::StoreError;
use super::schema::InsertStatement;
use super::value::ColumnValue;

/// One row of `DESCRIBE TABLE` output
///
/// Extra columns (comment, codec, ttl) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DescribeRow {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub default_type: String,
    #[serde(default)]
    pub default_expression: String,
}

impl DescribeRow {
    /// Row without a default
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Attach a default kind and expression
    pub fn with_default(mut self, kind: impl Into<String>, expression: impl Into<String>) -> Self {
        self.default_type = kind.into();
        self.default_expression = expression.into();
        self
    }
}

/// A live store endpoint
#[async_trait]
pub trait Replica: Send + Sync {
    /// Endpoint identifier for logs
    fn endpoint(&self) -> &str;

    /// Describe the columns of `table`
    async fn describe_table(&self, table: &str) -> Result<Vec<DescribeRow>, StoreError>;

    /// Open a transaction
    ///
    /// The HTTP replica buffers rows client-side and never fails here, but a
    /// replica that opens a server-side session can; the writer then moves
    /// on to the next replica.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// A write transaction
///
/// Rows executed before `commit` are not visible; `rollback` discards them.
#[async_trait]
pub trait Transaction: Send {
    /// Prepare the insert statement every following row is bound to
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), StoreError>;

    /// Execute the prepared statement with one positional row
    async fn execute(&mut self, row: Vec<ColumnValue>) -> Result<(), StoreError>;

    /// Make all executed rows durable
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard all executed rows
    async fn rollback(self: Box<Self>);
}
