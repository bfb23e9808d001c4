//! PostgreSQL dialect

use quarry_core::{Method, Result, Returning, Statement, Value};

use crate::dialects::{INFO_SCHEMA_LOWER, information_schema_output};
use crate::dialect::{SqlDialect, qualified_table};
use crate::formatter::Formatter;
use crate::schema::column::quoted_list;
use crate::schema::{ColumnKind, base_column_type};

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn driver_name(&self) -> &'static str {
        "pg"
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("${}", index))
    }

    // Backslashes are escape characters in Postgres string literals under
    // the E'' form; quotes and backslashes are both doubled and the prefix
    // is added only when a backslash was present.
    fn escape_string(&self, s: &str) -> String {
        let mut escaped = String::with_capacity(s.len() + 2);
        let mut has_backslash = false;
        escaped.push('\'');
        for c in s.chars() {
            match c {
                '\'' => escaped.push_str("''"),
                '\\' => {
                    escaped.push_str("\\\\");
                    has_backslash = true;
                }
                _ => escaped.push(c),
            }
        }
        escaped.push('\'');
        if has_backslash {
            format!("E{}", escaped)
        } else {
            escaped
        }
    }

    fn escape_array(&self, values: &[Value]) -> String {
        self.escape_string(&array_literal(values))
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn returning_clause(
        &self,
        fmt: &mut Formatter<'_>,
        _method: &Method,
        returning: &Returning,
    ) -> String {
        format!("returning {}", fmt.columnize(&returning.column_names()))
    }

    fn truncate(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<Statement>> {
        Ok(vec![Statement::new(
            format!(
                "truncate {} restart identity",
                fmt.wrap(&qualified_table(table, schema))
            ),
            Vec::new(),
            Method::Truncate,
        )?])
    }

    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        match kind {
            ColumnKind::Increments => "serial primary key".to_string(),
            ColumnKind::BigIncrements => "bigserial primary key".to_string(),
            ColumnKind::TinyInt => "smallint".to_string(),
            ColumnKind::Float => "real".to_string(),
            ColumnKind::Double => "double precision".to_string(),
            ColumnKind::DateTime | ColumnKind::Timestamp => "timestamptz".to_string(),
            ColumnKind::Binary => "bytea".to_string(),
            ColumnKind::Enum(allowed) => format!(
                "text check ({} in ({}))",
                fmt.wrap(column),
                quoted_list(allowed)
            ),
            ColumnKind::Json => "json".to_string(),
            ColumnKind::Jsonb => "jsonb".to_string(),
            ColumnKind::Uuid => "uuid".to_string(),
            ColumnKind::Bit(length) => match length {
                Some(n) => format!("bit({})", n),
                None => "bit".to_string(),
            },
            _ => base_column_type(fmt, column, kind),
        }
    }

    fn column_info(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
        database: &str,
        column: Option<String>,
    ) -> Result<Statement> {
        let table = fmt.policy().apply_wrap_hook(table);
        let mut sql =
            "select * from information_schema.columns where table_name = ? and table_catalog = ?"
                .to_string();
        let mut bindings = vec![Value::Text(table), Value::Text(database.to_string())];
        match schema {
            Some(schema) => {
                sql.push_str(" and table_schema = ?");
                bindings.push(Value::Text(fmt.policy().apply_wrap_hook(schema)));
            }
            None => sql.push_str(" and table_schema = current_schema()"),
        }
        Ok(Statement::new(sql, bindings, Method::ColumnInfo)?
            .with_output(information_schema_output(column, &INFO_SCHEMA_LOWER)))
    }
}

/// Render a Postgres array literal body, strings JSON-quoted, nested arrays
/// recursed.
fn array_literal(values: &[Value]) -> String {
    let mut out = String::from("{");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match v {
            Value::Null => out.push_str("NULL"),
            Value::Array(inner) => out.push_str(&array_literal(inner)),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&f.to_string()),
            Value::Bool(b) => out.push_str(&b.to_string()),
            other => out.push_str(&serde_json::Value::String(other.to_string()).to_string()),
        }
    }
    out.push('}');
    out
}
