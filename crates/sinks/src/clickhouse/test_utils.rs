//! In-memory replica for tests
//!
//! Records every committed batch and rollback, and can be told to fail at
//! each step of the write path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::StoreError;
use super::replica::{DescribeRow, Replica, Transaction};
use super::schema::InsertStatement;
use super::value::ColumnValue;

/// Failure injection switches
#[derive(Debug, Clone, Default)]
struct Faults {
    describe: bool,
    begin: bool,
    execute_at: Option<usize>,
    commit: bool,
    commit_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    committed: Vec<Vec<Vec<ColumnValue>>>,
    statements: Vec<InsertStatement>,
    rollbacks: usize,
    begins: usize,
    describes: usize,
}

/// Replica backed by memory; clones share state
#[derive(Debug, Clone)]
pub(crate) struct MemoryReplica {
    endpoint: String,
    columns: Vec<DescribeRow>,
    faults: Faults,
    state: Arc<Mutex<State>>,
}

impl MemoryReplica {
    pub(crate) fn new(endpoint: &str, columns: Vec<DescribeRow>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            columns,
            faults: Faults::default(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub(crate) fn failing_describe(mut self) -> Self {
        self.faults.describe = true;
        self
    }

    pub(crate) fn failing_begin(mut self) -> Self {
        self.faults.begin = true;
        self
    }

    /// Fail the execute call for the row at `index` (0-based) of every batch
    pub(crate) fn failing_execute_at(mut self, index: usize) -> Self {
        self.faults.execute_at = Some(index);
        self
    }

    pub(crate) fn failing_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    pub(crate) fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.faults.commit_delay = Some(delay);
        self
    }

    pub(crate) fn as_replica(&self) -> Arc<dyn Replica> {
        Arc::new(self.clone())
    }

    /// Committed batches, each a list of positional rows
    pub(crate) fn committed(&self) -> Vec<Vec<Vec<ColumnValue>>> {
        self.state.lock().committed.clone()
    }

    /// Sizes of committed batches, in commit order
    pub(crate) fn committed_sizes(&self) -> Vec<usize> {
        self.state.lock().committed.iter().map(Vec::len).collect()
    }

    pub(crate) fn committed_rows(&self) -> usize {
        self.state.lock().committed.iter().map(Vec::len).sum()
    }

    pub(crate) fn statements(&self) -> Vec<InsertStatement> {
        self.state.lock().statements.clone()
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    pub(crate) fn begins(&self) -> usize {
        self.state.lock().begins
    }

    pub(crate) fn describes(&self) -> usize {
        self.state.lock().describes
    }
}

#[async_trait]
impl Replica for MemoryReplica {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<DescribeRow>, StoreError> {
        self.state.lock().describes += 1;
        if self.faults.describe {
            return Err(StoreError::Query(format!("table {table} unavailable")));
        }
        Ok(self.columns.clone())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.state.lock().begins += 1;
        if self.faults.begin {
            return Err(StoreError::Connection(format!("{} refused", self.endpoint)));
        }
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            faults: self.faults.clone(),
            prepared: false,
            rows: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    faults: Faults,
    prepared: bool,
    rows: Vec<Vec<ColumnValue>>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), StoreError> {
        self.state.lock().statements.push(statement.clone());
        self.prepared = true;
        Ok(())
    }

    async fn execute(&mut self, row: Vec<ColumnValue>) -> Result<(), StoreError> {
        if !self.prepared {
            return Err(StoreError::Transaction("execute before prepare".into()));
        }
        if self.faults.execute_at == Some(self.rows.len()) {
            return Err(StoreError::Insert("injected execute failure".into()));
        }
        self.rows.push(row);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(delay) = self.faults.commit_delay {
            tokio::time::sleep(delay).await;
        }
        if self.faults.commit {
            return Err(StoreError::Insert("injected commit failure".into()));
        }
        let this = *self;
        this.state.lock().committed.push(this.rows);
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        self.state.lock().rollbacks += 1;
    }
}

/// Two-column table used across tests: `id UInt32`, `name String`
pub(crate) fn id_name_columns() -> Vec<DescribeRow> {
    vec![DescribeRow::new("id", "UInt32"), DescribeRow::new("name", "String")]
}
