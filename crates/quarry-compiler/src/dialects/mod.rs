//! Dialect implementations
//!
//! One stateless unit struct per backend, registered in
//! [`crate::dialect::dialect`].

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod redshift;
mod sqlite;


pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use redshift::RedshiftDialect;
pub use sqlite::SqliteDialect;

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{ColumnDescriptor, Output, QueryOutcome, Row, Value};

/// Result-row field names of an information_schema.columns query; the
/// standard lowercases them, MSSQL and MySQL report them uppercased.
pub(crate) struct InfoSchemaNames {
    pub name: &'static str,
    pub data_type: &'static str,
    pub max_length: &'static str,
    pub nullable: &'static str,
    pub default: &'static str,
}

pub(crate) const INFO_SCHEMA_LOWER: InfoSchemaNames = InfoSchemaNames {
    name: "column_name",
    data_type: "data_type",
    max_length: "character_maximum_length",
    nullable: "is_nullable",
    default: "column_default",
};

pub(crate) const INFO_SCHEMA_UPPER: InfoSchemaNames = InfoSchemaNames {
    name: "COLUMN_NAME",
    data_type: "DATA_TYPE",
    max_length: "CHARACTER_MAXIMUM_LENGTH",
    nullable: "IS_NULLABLE",
    default: "COLUMN_DEFAULT",
};

pub(crate) fn text_of(row: &Row, name: &str) -> Option<String> {
    row.get_by_name(name).and_then(|v| match v {
        Value::Text(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

/// Response shaper for information_schema-style columnInfo queries: maps
/// raw rows to descriptors keyed by column name, optionally filtered down
/// to one requested column.
pub(crate) fn information_schema_output(
    column: Option<String>,
    names: &'static InfoSchemaNames,
) -> Output {
    Arc::new(move |resp| {
        let mut out = BTreeMap::new();
        for row in &resp.rows {
            let Some(name) = text_of(row, names.name) else {
                continue;
            };
            out.insert(
                name,
                ColumnDescriptor {
                    type_name: text_of(row, names.data_type).unwrap_or_default(),
                    max_length: row.get_by_name(names.max_length).and_then(|v| v.as_i64()),
                    nullable: text_of(row, names.nullable).as_deref() == Some("YES"),
                    default_value: text_of(row, names.default),
                },
            );
        }
        if let Some(column) = &column {
            out.retain(|name, _| name == column);
        }
        Ok(QueryOutcome::ColumnInfo(out))
    })
}
