//! SQLite dialect
//!
//! Multi-row inserts compile to a `select … union all select …` chain, the
//! offset-only pagination case uses the `limit -1` sentinel, and truncate is
//! emulated with `delete from` plus a sequence reset.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{ColumnDescriptor, Method, QueryOutcome, Result, Statement, Value};

use crate::dialect::SqlDialect;
use crate::dialects::text_of;
use crate::formatter::Formatter;

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite3"
    }

    fn driver_name(&self) -> &'static str {
        "sqlite3"
    }

    fn supports_multi_row_insert(&self) -> bool {
        false
    }

    fn requires_explicit_insert_values(&self) -> bool {
        true
    }

    fn for_update(&self) -> String {
        tracing::warn!("row locks are not applicable in sqlite3");
        String::new()
    }

    fn for_share(&self) -> String {
        tracing::warn!("row locks are not applicable in sqlite3");
        String::new()
    }

    // Offset without a limit needs the -1 sentinel; sqlite refuses a bare
    // offset clause.
    fn limit_clause(
        &self,
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        match (limit, offset) {
            (Some(limit), _) => Some(format!("limit {}", fmt.parameter_value(Value::Int(limit)))),
            (None, Some(_)) => Some(format!("limit {}", fmt.parameter_value(Value::Int(-1)))),
            (None, None) => None,
        }
    }

    // primary and foreign keys live inside the create parentheses; there is
    // no alter form for them
    fn ddl_inline_constraints(&self) -> bool {
        true
    }

    fn ddl_supports_drop_column(&self) -> bool {
        false
    }

    fn add_unique_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!("create unique index {} on {} ({})", index, table, columns)
    }

    fn truncate(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<Vec<Statement>> {
        let delete = Statement::new(
            format!("delete from {}", fmt.wrap(table)),
            Vec::new(),
            Method::Truncate,
        )?;
        // tables without autoincrement have no sqlite_sequence row; the
        // reset is best-effort and its failure is ignored at run time
        let reset = Statement::new(
            "delete from sqlite_sequence where name = ?",
            vec![Value::Text(table.to_string())],
            Method::Truncate,
        )?
        .with_options(serde_json::json!({ "ignore_errors": true }));
        Ok(vec![delete, reset])
    }

    fn column_info(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        _schema: Option<&str>,
        _database: &str,
        column: Option<String>,
    ) -> Result<Statement> {
        let table = fmt.policy().apply_wrap_hook(table);
        Ok(
            Statement::new(format!("PRAGMA table_info(`{}`)", table), Vec::new(), Method::ColumnInfo)?
                .with_output(Arc::new(move |resp| {
                    let mut out = BTreeMap::new();
                    for row in &resp.rows {
                        let Some(name) = text_of(row, "name") else {
                            continue;
                        };
                        let declared = text_of(row, "type").unwrap_or_default();
                        let (type_name, max_length) = split_declared_type(&declared);
                        out.insert(
                            name,
                            ColumnDescriptor {
                                type_name,
                                max_length,
                                nullable: row
                                    .get_by_name("notnull")
                                    .and_then(|v| v.as_i64())
                                    .unwrap_or(0)
                                    == 0,
                                default_value: text_of(row, "dflt_value"),
                            },
                        );
                    }
                    if let Some(column) = &column {
                        out.retain(|name, _| name == column);
                    }
                    Ok(QueryOutcome::ColumnInfo(out))
                })),
        )
    }
}

/// Split a declared type like `varchar(255)` into the bare type name and
/// its length.
fn split_declared_type(declared: &str) -> (String, Option<i64>) {
    if let (Some(open), Some(close)) = (declared.find('('), declared.rfind(')')) {
        if open < close {
            let length = declared[open + 1..close].parse::<i64>().ok();
            if length.is_some() {
                return (declared[..open].to_lowercase(), length);
            }
        }
    }
    (declared.to_lowercase(), None)
}
