//! MSSQL dialect
//!
//! Divergences from the shared assembly: `@pN` placeholders (0-based),
//! bracket identifiers, `top`/`offset … fetch` pagination, `output`
//! row-return interleaved after the statement target, and a
//! `;select @@rowcount` suffix standing in for driver affected-counts.

use quarry_core::{
    DriverResponse, Method, QueryOutcome, Result, Returning, Statement, Value,
};

use crate::dialects::{INFO_SCHEMA_UPPER, information_schema_output};
use crate::dialect::{
    ReturningPosition, SelectComponent, SqlDialect, base_process_response, qualified_table,
    returning_outcome,
};
use crate::formatter::Formatter;
use crate::schema::{ColumnKind, base_column_type};

const SELECT_COMPONENTS: &[SelectComponent] = &[
    SelectComponent::Columns,
    SelectComponent::Join,
    SelectComponent::Lock,
    SelectComponent::Where,
    SelectComponent::Union,
    SelectComponent::Group,
    SelectComponent::Having,
    SelectComponent::Order,
    SelectComponent::Limit,
    SelectComponent::Offset,
];

pub struct MssqlDialect;

impl SqlDialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn driver_name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> Option<String> {
        Some(format!("@p{}", index - 1))
    }

    fn select_components(&self) -> &'static [SelectComponent] {
        SELECT_COMPONENTS
    }

    // `top` replaces `limit` whenever no offset is present; with an offset
    // the pagination moves entirely into the offset/fetch clause.
    fn top_clause(
        &self,
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        match (limit, offset) {
            (Some(limit), None) => Some(format!("top ({})", fmt.parameter_value(Value::Int(limit)))),
            _ => None,
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
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        let offset = offset?;
        let mut clause = format!("offset {} rows", fmt.parameter_value(Value::Int(offset)));
        if let Some(limit) = limit {
            clause.push_str(&format!(
                " fetch next {} rows only",
                fmt.parameter_value(Value::Int(limit))
            ));
        }
        Some(clause)
    }

    fn for_update(&self) -> String {
        "with (READCOMMITTEDLOCK)".to_string()
    }

    fn for_share(&self) -> String {
        "with (NOLOCK)".to_string()
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn returning_position(&self) -> ReturningPosition {
        ReturningPosition::AfterTarget
    }

    fn returning_clause(
        &self,
        fmt: &mut Formatter<'_>,
        method: &Method,
        returning: &Returning,
    ) -> String {
        let prefix = match method {
            Method::Del => "deleted.",
            _ => "inserted.",
        };
        format!(
            "output {}",
            fmt.columnize_with_prefix(prefix, &returning.column_names())
        )
    }

    fn rowcount_suffix(&self) -> Option<&'static str> {
        Some(";select @@rowcount")
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
            None => sql.push_str(" and table_schema = 'dbo'"),
        }
        Ok(Statement::new(sql, bindings, Method::ColumnInfo)?
            .with_output(information_schema_output(column, &INFO_SCHEMA_UPPER)))
    }

    fn ddl_uppercase(&self) -> bool {
        true
    }

    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        match kind {
            ColumnKind::Increments => "int identity(1,1) not null primary key".to_string(),
            ColumnKind::BigIncrements => "bigint identity(1,1) not null primary key".to_string(),
            ColumnKind::Integer => "int".to_string(),
            ColumnKind::Float | ColumnKind::Double => "decimal(8, 2)".to_string(),
            ColumnKind::VarChar(length) => format!("nvarchar({})", length.unwrap_or(255)),
            ColumnKind::Text => "nvarchar(max)".to_string(),
            ColumnKind::Enum(_) => "nvarchar(100)".to_string(),
            ColumnKind::Uuid => "uniqueidentifier".to_string(),
            ColumnKind::DateTime | ColumnKind::Timestamp => "datetime".to_string(),
            ColumnKind::Bool | ColumnKind::Bit(_) => "bit".to_string(),
            ColumnKind::Binary => "varbinary(max)".to_string(),
            ColumnKind::Json | ColumnKind::Jsonb => "nvarchar(max)".to_string(),
            _ => base_column_type(fmt, column, kind),
        }
    }

    fn ddl_skips_default_for(&self, type_name: &str) -> bool {
        type_name == "nvarchar(max)"
    }

    fn drop_table_sql(&self, wrapped: &str) -> String {
        format!("DROP TABLE {}", wrapped)
    }

    // there is no `if exists` form before SQL Server 2016, the object_id
    // probe covers every supported version
    fn drop_table_if_exists_sql(&self, wrapped: &str) -> String {
        format!(
            "if object_id('{}', 'U') is not null DROP TABLE {}",
            wrapped, wrapped
        )
    }

    fn rename_table_statement(
        &self,
        _fmt: &Formatter<'_>,
        from: &str,
        to: &str,
    ) -> Result<Statement> {
        Statement::new(
            "exec sp_rename ?, ?",
            vec![Value::Text(from.to_string()), Value::Text(to.to_string())],
            Method::Ddl,
        )
    }

    fn add_primary_key_sql(&self, table: &str, constraint: &str, columns: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            table, constraint, columns
        )
    }

    fn add_unique_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!("CREATE UNIQUE INDEX {} ON {} ({})", index, table, columns)
    }

    fn create_index_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!("CREATE INDEX {} ON {} ({})", index, table, columns)
    }

    fn begin_sql(&self) -> Option<&'static str> {
        Some("BEGIN TRANSACTION;")
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVE TRANSACTION {};", name)
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TRANSACTION {}", name)
    }

    fn process_response(&self, stmt: &Statement, resp: DriverResponse) -> Result<QueryOutcome> {
        if let Some(output) = &stmt.output {
            return output(&resp);
        }
        match &stmt.method {
            Method::Update | Method::Del | Method::Counter => match &stmt.returning {
                Some(returning) => Ok(returning_outcome(returning, resp)),
                // the `;select @@rowcount` suffix surfaces the count as the
                // single cell of the trailing result row
                None => Ok(QueryOutcome::Affected(
                    resp.rows
                        .first()
                        .and_then(|row| row.get(0))
                        .and_then(|v| v.as_i64())
                        .unwrap_or(resp.affected_rows as i64) as u64,
                )),
            },
            Method::Insert => match &stmt.returning {
                Some(returning) => Ok(returning_outcome(returning, resp)),
                None => Ok(QueryOutcome::Inserted(
                    resp.last_insert_id.map(Value::Int).into_iter().collect(),
                )),
            },
            _ => base_process_response(true, stmt, resp),
        }
    }
}
