//! Oracle dialect
//!
//! Transactions are driven through the driver's autocommit flag rather than
//! an explicit BEGIN; pagination nests the assembled select inside rownum
//! filters because the server predates `offset … fetch`.

use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_core::{
    ColumnDescriptor, DriverError, Method, QueryOutcome, Result, Statement, Value,
};

use crate::dialect::{SqlDialect, TransactionStyle, qualified_table};
use crate::dialects::text_of;
use crate::formatter::Formatter;
use crate::schema::column::quoted_list;
use crate::schema::{ColumnKind, base_column_type};

/// Driver error prefixes that mean the connection itself is gone.
const CONNECTION_ERROR_PREFIXES: &[&str] = &["ORA-12514", "NJS-040", "NJS-024", "NJS-003"];

pub struct OracleDialect;

impl SqlDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn driver_name(&self) -> &'static str {
        "oracledb"
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!(":{}", index))
    }

    fn alias(&self, first: &str, second: &str) -> String {
        format!("{} {}", first, second)
    }

    fn prepare_binding(&self, value: Value) -> Value {
        match value {
            Value::Bool(b) => Value::Int(i64::from(b)),
            other => other,
        }
    }

    fn limit_clause(
        &self,
        _fmt: &mut Formatter<'_>,
        _limit: Option<i64>,
        _offset: Option<i64>,
    ) -> Option<String> {
        None
    }

    fn offset_clause(
        &self,
        _fmt: &mut Formatter<'_>,
        _limit: Option<i64>,
        _offset: Option<i64>,
    ) -> Option<String> {
        None
    }

    fn wrap_pagination(
        &self,
        fmt: &mut Formatter<'_>,
        sql: String,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> String {
        match (limit, offset) {
            (Some(limit), None) => format!(
                "select * from ({}) where rownum <= {}",
                sql,
                fmt.parameter_value(Value::Int(limit))
            ),
            (Some(limit), Some(offset)) => format!(
                "select * from (select row_.*, ROWNUM rownum_ from ({}) row_ where rownum <= {}) where rownum_ > {}",
                sql,
                fmt.parameter_value(Value::Int(offset + limit)),
                fmt.parameter_value(Value::Int(offset))
            ),
            (None, Some(offset)) => format!(
                "select * from (select row_.*, ROWNUM rownum_ from ({}) row_) where rownum_ > {}",
                sql,
                fmt.parameter_value(Value::Int(offset))
            ),
            (None, None) => sql,
        }
    }

    // auto-increment relies on a sequence plus trigger created out of band;
    // the column itself is a plain integer key
    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        match kind {
            ColumnKind::Increments | ColumnKind::BigIncrements => {
                "integer not null primary key".to_string()
            }
            ColumnKind::BigInteger => "number(20, 0)".to_string(),
            ColumnKind::SmallInt | ColumnKind::TinyInt => "smallint".to_string(),
            ColumnKind::VarChar(length) => format!("varchar2({})", length.unwrap_or(255)),
            ColumnKind::Text => "clob".to_string(),
            ColumnKind::Float => "float".to_string(),
            ColumnKind::Double => "number(8, 2)".to_string(),
            ColumnKind::Bool => "number(1, 0)".to_string(),
            ColumnKind::DateTime | ColumnKind::Timestamp => {
                "timestamp with local time zone".to_string()
            }
            ColumnKind::Binary => "blob".to_string(),
            ColumnKind::Enum(allowed) => format!(
                "varchar2(100) check ({} in ({}))",
                fmt.wrap(column),
                quoted_list(allowed)
            ),
            ColumnKind::Json | ColumnKind::Jsonb => "clob".to_string(),
            ColumnKind::Uuid => "char(36)".to_string(),
            _ => base_column_type(fmt, column, kind),
        }
    }

    fn truncate(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<Statement>> {
        Ok(vec![Statement::new(
            format!("truncate table {}", fmt.wrap(&qualified_table(table, schema))),
            Vec::new(),
            Method::Truncate,
        )?])
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
        Ok(Statement::new(
            "select COLUMN_NAME, DATA_TYPE, DATA_LENGTH, NULLABLE from USER_TAB_COLUMNS where TABLE_NAME = ?",
            vec![Value::Text(table)],
            Method::ColumnInfo,
        )?
        .with_output(Arc::new(move |resp| {
            let mut out = BTreeMap::new();
            for row in &resp.rows {
                let Some(name) = text_of(row, "COLUMN_NAME") else {
                    continue;
                };
                out.insert(
                    name,
                    ColumnDescriptor {
                        type_name: text_of(row, "DATA_TYPE").unwrap_or_default(),
                        max_length: row.get_by_name("DATA_LENGTH").and_then(|v| v.as_i64()),
                        nullable: text_of(row, "NULLABLE").as_deref() == Some("Y"),
                        default_value: None,
                    },
                );
            }
            if let Some(column) = &column {
                out.retain(|name, _| name == column);
            }
            Ok(QueryOutcome::ColumnInfo(out))
        })))
    }

    fn transaction_style(&self) -> TransactionStyle {
        TransactionStyle::DriverAutocommit
    }

    fn begin_sql(&self) -> Option<&'static str> {
        None
    }

    fn is_connection_error(&self, err: &DriverError) -> bool {
        CONNECTION_ERROR_PREFIXES
            .iter()
            .any(|prefix| err.message.starts_with(prefix))
    }
}
