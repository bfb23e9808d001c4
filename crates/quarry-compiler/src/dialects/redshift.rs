//! Redshift dialect
//!
//! Postgres-derived wire behavior with a narrower feature set: identifiers
//! fold to lowercase, row-return and row locks warn and no-op, and
//! savepoints are unsupported.

use quarry_core::{
    DriverResponse, Method, QueryOutcome, Result, Statement, Value,
};

use crate::dialects::{INFO_SCHEMA_LOWER, PostgresDialect, information_schema_output};
use crate::dialect::{SqlDialect, base_process_response, qualified_table};
use crate::formatter::Formatter;
use crate::schema::ColumnKind;

pub struct RedshiftDialect;

impl SqlDialect for RedshiftDialect {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn driver_name(&self) -> &'static str {
        "pg-redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.to_lowercase().replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("${}", index))
    }

    fn escape_string(&self, s: &str) -> String {
        PostgresDialect.escape_string(s)
    }

    fn escape_array(&self, values: &[Value]) -> String {
        PostgresDialect.escape_array(values)
    }

    fn for_update(&self) -> String {
        tracing::warn!("table lock is not supported by redshift dialect");
        String::new()
    }

    fn for_share(&self) -> String {
        tracing::warn!("lock for share is not supported by redshift dialect");
        String::new()
    }

    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        match kind {
            ColumnKind::Increments => "integer identity(1,1) primary key not null".to_string(),
            ColumnKind::BigIncrements => "bigint identity(1,1) primary key not null".to_string(),
            ColumnKind::Binary => {
                tracing::warn!("binary columns are not supported by redshift, substituting varchar(max)");
                "varchar(max)".to_string()
            }
            ColumnKind::Json | ColumnKind::Jsonb => "varchar(max)".to_string(),
            _ => PostgresDialect.ddl_column_type(fmt, column, kind),
        }
    }

    fn truncate(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<Statement>> {
        Ok(vec![Statement::new(
            format!("truncate {}", fmt.wrap(&qualified_table(table, schema))),
            Vec::new(),
            Method::Truncate,
        )?])
    }

    fn column_info(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
        database: &str,
        column: Option<String>,
    ) -> Result<Statement> {
        let table = fmt.policy().apply_wrap_hook(table).to_lowercase();
        let mut sql =
            "select * from information_schema.columns where table_name = ? and table_catalog = ?"
                .to_string();
        let mut bindings = vec![Value::Text(table), Value::Text(database.to_lowercase())];
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

    fn supports_savepoints(&self) -> bool {
        false
    }

    fn process_response(&self, stmt: &Statement, resp: DriverResponse) -> Result<QueryOutcome> {
        if stmt.output.is_none() {
            // row-return never reaches the server, every DML statement
            // reports a count
            if let Method::Insert | Method::Update | Method::Del | Method::Counter = stmt.method {
                return Ok(QueryOutcome::Affected(resp.affected_rows));
            }
        }
        base_process_response(false, stmt, resp)
    }
}
