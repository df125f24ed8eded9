//! Tests for the schema cache

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::*;
use crate::clickhouse::test_utils::{MemoryReplica, id_name_columns};
use crate::clickhouse::value::Value;

fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// =============================================================================
// Descriptor Parsing
// =============================================================================

#[test]
fn test_descriptor_normalizes_enum() {
    let row = DescribeRow::new("level", "Enum8('' = 0, 'info' = 1, 'error' = 2)");
    let column = ColumnDescriptor::from_row(row).unwrap();
    assert_eq!(column.store_type, StoreType::Enum8);
    assert_eq!(column.default_kind, DefaultKind::None);
}

#[test]
fn test_descriptor_unknown_default_kind() {
    let row = DescribeRow::new("x", "String").with_default("EPHEMERAL", "");
    let err = ColumnDescriptor::from_row(row).unwrap_err();
    assert!(matches!(err, ClickHouseSinkError::UnknownDefaultKind { .. }));
}

// =============================================================================
// Default Resolution
// =============================================================================

#[test]
fn test_type_family_zero_values() {
    let cache = SchemaCache::from_describe(vec![
        DescribeRow::new("s", "LowCardinality(String)"),
        DescribeRow::new("ts", "DateTime"),
        DescribeRow::new("i", "Int16"),
        DescribeRow::new("u", "UInt64"),
        DescribeRow::new("f", "Float32"),
        DescribeRow::new("v4", "IPv4"),
        DescribeRow::new("v6", "IPv6"),
        DescribeRow::new("tags", "Array(String)"),
        DescribeRow::new("nums", "Array(UInt16)"),
        DescribeRow::new("e", "Enum16('' = 0, 'x' = 1)"),
    ])
    .unwrap();

    assert_eq!(cache.default_for("s"), Some(&ColumnValue::String(String::new())));
    assert_eq!(
        cache.default_for("ts"),
        Some(&ColumnValue::DateTime(DateTime::<Utc>::UNIX_EPOCH))
    );
    assert_eq!(cache.default_for("i"), Some(&ColumnValue::Int(0)));
    assert_eq!(cache.default_for("u"), Some(&ColumnValue::UInt(0)));
    assert_eq!(cache.default_for("f"), Some(&ColumnValue::Float32(0.0)));
    assert_eq!(cache.default_for("v4"), Some(&ColumnValue::String("0.0.0.0".into())));
    assert_eq!(cache.default_for("v6"), Some(&ColumnValue::String("::".into())));
    assert_eq!(
        cache.default_for("tags"),
        Some(&ColumnValue::Array {
            element: StoreType::String,
            values: vec![]
        })
    );
    assert_eq!(
        cache.default_for("nums"),
        Some(&ColumnValue::Array {
            element: StoreType::UInt16,
            values: vec![]
        })
    );
    assert_eq!(cache.default_for("e"), Some(&ColumnValue::String(String::new())));
}

#[test]
fn test_literal_defaults_parsed_per_type() {
    let cache = SchemaCache::from_describe(vec![
        DescribeRow::new("n", "UInt8").with_default("DEFAULT", "7"),
        DescribeRow::new("d", "Float64").with_default("DEFAULT", "0.25"),
        DescribeRow::new("s", "String").with_default("DEFAULT", "'unknown'"),
        DescribeRow::new("ts", "DateTime64(3)").with_default("DEFAULT", "now64()"),
    ])
    .unwrap();

    assert_eq!(cache.default_for("n"), Some(&ColumnValue::UInt(7)));
    assert_eq!(cache.default_for("d"), Some(&ColumnValue::Float64(0.25)));
    assert_eq!(cache.default_for("s"), Some(&ColumnValue::String("unknown".into())));
    assert_eq!(
        cache.default_for("ts"),
        Some(&ColumnValue::DateTime(DateTime::<Utc>::UNIX_EPOCH))
    );
}

#[test]
fn test_literal_default_parse_failure_is_fatal() {
    let err = SchemaCache::from_describe(vec![
        DescribeRow::new("n", "UInt8").with_default("DEFAULT", "300"),
    ])
    .unwrap_err();

    match err {
        ClickHouseSinkError::InvalidDefault { column, expression, .. } => {
            assert_eq!(column, "n");
            assert_eq!(expression, "300");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_materialized_and_alias_are_fatal() {
    let err = SchemaCache::from_describe(vec![
        DescribeRow::new("day", "Date").with_default("MATERIALIZED", "toDate(ts)"),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        ClickHouseSinkError::UnsupportedDefault { kind: "MATERIALIZED", .. }
    ));

    let err = SchemaCache::from_describe(vec![
        DescribeRow::new("alias", "String").with_default("ALIAS", "name"),
    ])
    .unwrap_err();
    assert!(matches!(
        err,
        ClickHouseSinkError::UnsupportedDefault { kind: "ALIAS", .. }
    ));
}

#[test]
fn test_unsupported_type_has_no_default_but_keeps_position() {
    let cache = SchemaCache::from_describe(vec![
        DescribeRow::new("id", "UUID"),
        DescribeRow::new("amount", "Decimal64(2)"),
        DescribeRow::new("name", "String"),
    ])
    .unwrap();

    assert!(cache.default_for("id").is_none());
    assert!(cache.default_for("amount").is_none());
    assert_eq!(cache.field_order(), vec!["id", "amount", "name"]);
}

// =============================================================================
// Field Order and Statement
// =============================================================================

#[test]
fn test_field_order_follows_describe_order() {
    let cache = SchemaCache::from_describe(vec![
        DescribeRow::new("z", "String"),
        DescribeRow::new("a", "UInt8"),
        DescribeRow::new("m", "Float64"),
    ])
    .unwrap();

    assert_eq!(cache.field_order(), vec!["z", "a", "m"]);
    let statement = cache.insert_statement("logs.app");
    assert_eq!(statement.columns(), &["z", "a", "m"]);
    assert_eq!(
        statement.sql(),
        r#"INSERT INTO logs.app ("z","a","m") VALUES (?,?,?)"#
    );
}

// =============================================================================
// Row Building
// =============================================================================

#[test]
fn test_build_row_coerces_in_field_order() {
    let cache = SchemaCache::from_describe(id_name_columns()).unwrap();
    let row = cache
        .build_row(&record(&[
            ("name", Value::from("alice")),
            ("id", Value::from("42")),
            ("extra", Value::Bool(true)),
        ]))
        .unwrap();

    assert_eq!(
        row,
        vec![
            ColumnValue::UInt(42),
            ColumnValue::Raw(Value::from("alice")),
        ]
    );
}

#[test]
fn test_build_row_substitutes_defaults_for_missing_and_null() {
    let cache = SchemaCache::from_describe(vec![
        DescribeRow::new("id", "UInt32").with_default("DEFAULT", "9"),
        DescribeRow::new("name", "String"),
        DescribeRow::new("uid", "UUID"),
    ])
    .unwrap();

    let row = cache
        .build_row(&record(&[("name", Value::Null)]))
        .unwrap();

    assert_eq!(
        row,
        vec![
            ColumnValue::UInt(9),
            ColumnValue::String(String::new()),
            ColumnValue::String(String::new()),
        ]
    );
}

#[test]
fn test_build_row_propagates_coercion_failure() {
    let cache = SchemaCache::from_describe(vec![DescribeRow::new("small", "Int8")]).unwrap();
    let err = cache
        .build_row(&record(&[("small", Value::from("999"))]))
        .unwrap_err();
    assert_eq!(err.store_type, "Int8");
}

// =============================================================================
// Fetching
// =============================================================================

#[tokio::test]
async fn test_fetch_falls_back_to_next_replica() {
    let broken = MemoryReplica::new("r0", id_name_columns()).failing_describe();
    let healthy = MemoryReplica::new("r1", id_name_columns());
    let selector = HostSelector::new(vec![broken.as_replica(), healthy.as_replica()], 3).unwrap();

    let cache = SchemaCache::fetch(&selector, "events").await.unwrap();

    assert_eq!(cache.field_order(), vec!["id", "name"]);
    assert_eq!(broken.describes(), 1);
    assert_eq!(healthy.describes(), 1);
}

#[tokio::test]
async fn test_fetch_fails_when_every_replica_fails() {
    let replicas: Vec<Arc<dyn Replica>> = (0..3)
        .map(|i| {
            MemoryReplica::new(&format!("r{i}"), id_name_columns())
                .failing_describe()
                .as_replica()
        })
        .collect();
    let selector = HostSelector::new(replicas, 3).unwrap();

    let err = SchemaCache::fetch(&selector, "events").await.unwrap_err();
    assert!(matches!(
        err,
        ClickHouseSinkError::SchemaUnavailable { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn test_fetch_rejects_empty_description() {
    let empty = MemoryReplica::new("r0", Vec::new());
    let selector = HostSelector::new(vec![empty.as_replica()], 3).unwrap();

    let err = SchemaCache::fetch(&selector, "events").await.unwrap_err();
    assert!(matches!(err, ClickHouseSinkError::SchemaUnavailable { .. }));
}
