//! HTTP replica
//!
//! Talks to one ClickHouse server over its HTTP interface. Transactions are
//! client-side: rows are buffered as `JSONCompactEachRow` lines and sent in a
//! single insert on commit, so the server sees either the whole batch or
//! nothing.

use async_trait::async_trait;

use super::config::ClickHouseOutputConfig;
use super::error::StoreError;
use super::replica::{DescribeRow, Replica, Transaction};
use super::schema::InsertStatement;
use super::value::ColumnValue;

// =============================================================================
// Replica
// =============================================================================

/// Connection settings shared by a replica and its transactions
#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl Endpoint {
    async fn request(&self, query: &str, body: String) -> Result<String, StoreError> {
        let mut request = self
            .client
            .post(&self.url)
            .query(&[("database", self.database.as_str()), ("query", query)]);

        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.body(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Query(format!("HTTP {status}: {}", body.trim())));
        }

        Ok(response.text().await?)
    }
}

/// One ClickHouse server reached over HTTP
#[derive(Clone)]
pub struct HttpReplica {
    endpoint: Endpoint,
}

impl std::fmt::Debug for HttpReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReplica")
            .field("url", &self.endpoint.url)
            .field("database", &self.endpoint.database)
            .finish()
    }
}

impl HttpReplica {
    /// Build a replica for `url` without contacting it
    ///
    /// `conn_max_lifetime` bounds how long an idle pooled connection is kept.
    pub fn new(config: &ClickHouseOutputConfig, url: &str) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder().timeout(config.connection_timeout);
        if !config.conn_max_lifetime.is_zero() {
            builder = builder.pool_idle_timeout(config.conn_max_lifetime);
        }

        Ok(Self {
            endpoint: Endpoint {
                client: builder.build()?,
                url: url.trim_end_matches('/').to_string(),
                database: config.database().to_string(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
        })
    }

    /// Build a replica for `url` and check that it answers
    pub async fn connect(config: &ClickHouseOutputConfig, url: &str) -> Result<Self, StoreError> {
        let replica = Self::new(config, url)?;
        replica.ping().await?;
        Ok(replica)
    }

    /// Run `SELECT 1`
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.endpoint.request("SELECT 1", String::new()).await?;
        Ok(())
    }
}

#[async_trait]
impl Replica for HttpReplica {
    fn endpoint(&self) -> &str {
        &self.endpoint.url
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<DescribeRow>, StoreError> {
        let query = format!("DESCRIBE TABLE {table} FORMAT JSONEachRow");
        let text = self.endpoint.request(&query, String::new()).await?;
        parse_describe(&text)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(HttpTransaction {
            endpoint: self.endpoint.clone(),
            statement: None,
            body: String::new(),
            rows: 0,
        }))
    }
}

/// Parse `JSONEachRow` describe output, one object per line
fn parse_describe(text: &str) -> Result<Vec<DescribeRow>, StoreError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StoreError::from))
        .collect()
}

// =============================================================================
// Transaction
// =============================================================================

/// Client-side transaction; nothing reaches the server before commit
struct HttpTransaction {
    endpoint: Endpoint,
    statement: Option<InsertStatement>,
    body: String,
    rows: usize,
}

impl HttpTransaction {
    fn append(&mut self, row: &[ColumnValue]) -> Result<(), StoreError> {
        let Some(ref statement) = self.statement else {
            return Err(StoreError::Transaction("execute before prepare".into()));
        };
        if row.len() != statement.columns().len() {
            return Err(StoreError::Transaction(format!(
                "row has {} values, statement has {} columns",
                row.len(),
                statement.columns().len()
            )));
        }

        let line = serde_json::Value::Array(row.iter().map(ColumnValue::to_json).collect());
        self.body.push_str(&serde_json::to_string(&line)?);
        self.body.push('\n');
        self.rows += 1;
        Ok(())
    }
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), StoreError> {
        tracing::debug!(sql = %statement.sql(), "prepare insert");
        self.statement = Some(statement.clone());
        Ok(())
    }

    async fn execute(&mut self, row: Vec<ColumnValue>) -> Result<(), StoreError> {
        self.append(&row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let Some(statement) = this.statement else {
            return Err(StoreError::Transaction("commit before prepare".into()));
        };
        if this.rows == 0 {
            return Ok(());
        }

        let query = format!(
            "INSERT INTO {} ({}) FORMAT JSONCompactEachRow",
            statement.table(),
            statement.column_list()
        );
        this.endpoint
            .request(&query, this.body)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Insert(e.to_string()))
    }

    async fn rollback(self: Box<Self>) {
        tracing::debug!(rows = self.rows, "rollback, discarding buffered rows");
    }
}
