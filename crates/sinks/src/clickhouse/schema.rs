//! Schema cache and default resolution
//!
//! The target table is described once at startup. From that description the
//! output derives, together and never again:
//!
//! - the column descriptors, in the order `DESCRIBE TABLE` returned them
//! - the field order, which fixes both the insert statement's column list
//!   and the positional layout of every argument row
//! - the default value used when a record lacks a column
//!
//! Everything here is read-only after construction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::coerce::{coerce, parse_literal};
use super::error::{ClickHouseSinkError, CoercionError};
use super::replica::{DescribeRow, Replica};
use super::selector::HostSelector;
use super::types::StoreType;
use super::value::{ColumnValue, Record};

// =============================================================================
// Column Descriptors
// =============================================================================

/// How a column's default is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultKind {
    None,
    /// `DEFAULT <expr>`
    Literal,
    /// `MATERIALIZED <expr>`
    Materialized,
    /// `ALIAS <expr>`
    Alias,
}

impl DefaultKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" => Some(Self::None),
            "DEFAULT" => Some(Self::Literal),
            "MATERIALIZED" => Some(Self::Materialized),
            "ALIAS" => Some(Self::Alias),
            _ => None,
        }
    }
}

/// One column of the target table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub store_type: StoreType,
    pub default_kind: DefaultKind,
    pub default_expression: String,
}

impl ColumnDescriptor {
    /// Build from a describe row, normalizing the type
    pub fn from_row(row: DescribeRow) -> Result<Self, ClickHouseSinkError> {
        let default_kind = DefaultKind::parse(&row.default_type).ok_or_else(|| {
            ClickHouseSinkError::UnknownDefaultKind {
                column: row.name.clone(),
                kind: row.default_type.clone(),
            }
        })?;

        Ok(Self {
            store_type: StoreType::parse(&row.type_name),
            name: row.name,
            default_kind,
            default_expression: row.default_expression,
        })
    }

    /// Resolve the value substituted when a record lacks this column
    ///
    /// `Ok(None)` means the type has no known default.
    pub fn resolve_default(&self) -> Result<Option<ColumnValue>, ClickHouseSinkError> {
        let literal = match self.default_kind {
            DefaultKind::None => None,
            DefaultKind::Literal => Some(self.default_expression.as_str()),
            DefaultKind::Materialized => {
                return Err(ClickHouseSinkError::UnsupportedDefault {
                    column: self.name.clone(),
                    kind: "MATERIALIZED",
                });
            }
            DefaultKind::Alias => {
                return Err(ClickHouseSinkError::UnsupportedDefault {
                    column: self.name.clone(),
                    kind: "ALIAS",
                });
            }
        };

        default_for_type(&self.store_type, literal).map_err(|source| {
            ClickHouseSinkError::InvalidDefault {
                column: self.name.clone(),
                expression: self.default_expression.clone(),
                source,
            }
        })
    }
}

/// Type-family default, honouring a literal where the family parses one
///
/// Enum columns default to the empty string, which requires the enum to
/// declare `''` as its smallest value.
fn default_for_type(
    store_type: &StoreType,
    literal: Option<&str>,
) -> Result<Option<ColumnValue>, CoercionError> {
    let value = match store_type {
        StoreType::String => ColumnValue::String(literal.map(unquote).unwrap_or_default()),
        StoreType::Date | StoreType::DateTime | StoreType::DateTime64 => {
            ColumnValue::DateTime(DateTime::<Utc>::UNIX_EPOCH)
        }
        StoreType::Int8 | StoreType::Int16 | StoreType::Int32 | StoreType::Int64 => match literal {
            Some(lit) => parse_literal(store_type, lit)?,
            None => ColumnValue::Int(0),
        },
        StoreType::UInt8 | StoreType::UInt16 | StoreType::UInt32 | StoreType::UInt64 => {
            match literal {
                Some(lit) => parse_literal(store_type, lit)?,
                None => ColumnValue::UInt(0),
            }
        }
        StoreType::Float32 => match literal {
            Some(lit) => parse_literal(store_type, lit)?,
            None => ColumnValue::Float32(0.0),
        },
        StoreType::Float64 => match literal {
            Some(lit) => parse_literal(store_type, lit)?,
            None => ColumnValue::Float64(0.0),
        },
        StoreType::IPv4 => ColumnValue::String("0.0.0.0".into()),
        StoreType::IPv6 => ColumnValue::String("::".into()),
        StoreType::Enum8 | StoreType::Enum16 => ColumnValue::empty_string(),
        StoreType::Array(element) => {
            if default_for_type(element, None)?.is_none() {
                return Ok(None);
            }
            ColumnValue::Array {
                element: (**element).clone(),
                values: Vec::new(),
            }
        }
        StoreType::Decimal32
        | StoreType::Decimal64
        | StoreType::Int256
        | StoreType::UInt256
        | StoreType::Other(_) => return Ok(None),
    };
    Ok(Some(value))
}

/// Strip SQL string quoting from a default expression like `'abc'`
fn unquote(expr: &str) -> String {
    match expr
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
    {
        Some(inner) => inner.replace("\\'", "'").replace("\\\\", "\\"),
        None => expr.to_string(),
    }
}

// =============================================================================
// Insert Statement
// =============================================================================

/// Parameterized insert over the fixed field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
    columns: Vec<String>,
}

impl InsertStatement {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Quoted, comma-separated column list
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `INSERT INTO <table> (<columns>) VALUES (<placeholders>)`
    pub fn sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(",");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.column_list(),
            placeholders
        )
    }
}

// =============================================================================
// Schema Cache
// =============================================================================

/// Column metadata and defaults for the target table
#[derive(Debug, Clone)]
pub struct SchemaCache {
    columns: Vec<ColumnDescriptor>,
    defaults: HashMap<String, ColumnValue>,
}

impl SchemaCache {
    /// Describe `table`, trying each replica once in selector order
    pub async fn fetch(
        selector: &HostSelector<Arc<dyn Replica>>,
        table: &str,
    ) -> Result<Self, ClickHouseSinkError> {
        tracing::debug!(table = %table, "describe table");

        for _ in 0..selector.size() {
            let replica = selector.next();
            match replica.describe_table(table).await {
                Ok(rows) if rows.is_empty() => {
                    tracing::error!(
                        replica = %replica.endpoint(),
                        table = %table,
                        "describe table returned no columns"
                    );
                }
                Ok(rows) => return Self::from_describe(rows),
                Err(e) => {
                    tracing::error!(
                        replica = %replica.endpoint(),
                        table = %table,
                        error = %e,
                        "describe table failed"
                    );
                }
            }
        }

        Err(ClickHouseSinkError::SchemaUnavailable {
            table: table.to_string(),
            attempts: selector.size(),
        })
    }

    /// Build from describe rows; field order follows row order
    pub fn from_describe(rows: Vec<DescribeRow>) -> Result<Self, ClickHouseSinkError> {
        let columns = rows
            .into_iter()
            .map(ColumnDescriptor::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut defaults = HashMap::with_capacity(columns.len());
        for column in &columns {
            tracing::debug!(
                column = %column.name,
                store_type = %column.store_type,
                default_kind = ?column.default_kind,
                "column description"
            );
            match column.resolve_default()? {
                Some(value) => {
                    defaults.insert(column.name.clone(), value);
                }
                None => {
                    tracing::error!(
                        column = %column.name,
                        store_type = %column.store_type,
                        "unsupported column type, no default registered"
                    );
                }
            }
        }

        Ok(Self { columns, defaults })
    }

    /// Column descriptors in field order
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Column names in field order
    pub fn field_order(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Registered default for a column
    pub fn default_for(&self, column: &str) -> Option<&ColumnValue> {
        self.defaults.get(column)
    }

    /// Insert statement over the field order
    pub fn insert_statement(&self, table: &str) -> InsertStatement {
        InsertStatement::new(table, self.field_order())
    }

    /// Build the positional argument row for one record
    ///
    /// Missing or null fields take the column default (empty string when none
    /// is registered); present fields are coerced to the column type.
    pub fn build_row(&self, record: &Record) -> Result<Vec<ColumnValue>, CoercionError> {
        self.columns
            .iter()
            .map(|column| match record.get(&column.name) {
                Some(value) if !value.is_null() => coerce(&column.store_type, value),
                _ => Ok(self
                    .default_for(&column.name)
                    .cloned()
                    .unwrap_or_else(ColumnValue::empty_string)),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
