//! Dialect capability trait and registry
//!
//! One trait with default implementations for the shared majority of SQL
//! assembly; each backend overrides only the fragments where it diverges.
//! Dialect selection is a registry lookup by name, never a hierarchy walk.

use quarry_core::{
    Command, DriverError, DriverResponse, Method, QuarryError, QueryOutcome, Result, Returning,
    Statement, Value,
};

use crate::formatter::Formatter;
use crate::schema::{ColumnKind, TableDef, base_column_type};

/// Ordered pieces of a compiled select. Dialects reorder these (MSSQL puts
/// the lock hint right after the projection) without touching assembly logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectComponent {
    Columns,
    Join,
    Where,
    Union,
    Group,
    Having,
    Order,
    Limit,
    Offset,
    Lock,
}

pub const DEFAULT_SELECT_COMPONENTS: &[SelectComponent] = &[
    SelectComponent::Columns,
    SelectComponent::Join,
    SelectComponent::Where,
    SelectComponent::Union,
    SelectComponent::Group,
    SelectComponent::Having,
    SelectComponent::Order,
    SelectComponent::Limit,
    SelectComponent::Offset,
    SelectComponent::Lock,
];

/// Where a dialect's row-return clause sits in a DML statement. Postgres
/// appends `returning` at the end; MSSQL interleaves `output` right after
/// the statement target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturningPosition {
    End,
    AfterTarget,
}

/// How a dialect starts and finishes transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStyle {
    /// Explicit BEGIN/COMMIT/ROLLBACK statements.
    Sql,
    /// No BEGIN; the driver's autocommit flag is toggled off for the span of
    /// the transaction and driver-level commit/rollback finish it (Oracle).
    DriverAutocommit,
}

/// Per-backend capability table.
///
/// Implementations are stateless unit structs; every method takes `&self`
/// and any per-compilation state travels through the `Formatter`.
pub trait SqlDialect: Send + Sync {
    /// Dialect identifier used for registry lookup (e.g. "postgresql").
    fn name(&self) -> &'static str;

    /// Native driver identifier (e.g. "pg", "sqlite3").
    fn driver_name(&self) -> &'static str;

    // ------------------------------------------------------------------
    // Identifiers and placeholders
    // ------------------------------------------------------------------

    /// Quote one identifier segment. The wildcard `*` never reaches here.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Native positional placeholder for the 1-based `index`, or `None` when
    /// the dialect keeps `?` markers as-is.
    fn placeholder(&self, index: usize) -> Option<String> {
        let _ = index;
        None
    }

    /// Rewrite sequential `?` markers into the dialect's native positional
    /// syntax. `\?` is an escaped literal and is unescaped without consuming
    /// a position.
    fn position_bindings(&self, sql: &str) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut escapes = 0usize;
        let mut index = 0usize;
        for c in sql.chars() {
            match c {
                '\\' => {
                    escapes += 1;
                    continue;
                }
                '?' => {
                    // a backslash run before `?` only escapes, it is never
                    // emitted; odd runs yield a literal question mark
                    if escapes % 2 == 1 {
                        out.push('?');
                    } else {
                        index += 1;
                        match self.placeholder(index) {
                            Some(p) => out.push_str(&p),
                            None => out.push('?'),
                        }
                    }
                    escapes = 0;
                    continue;
                }
                _ => {
                    for _ in 0..escapes {
                        out.push('\\');
                    }
                    escapes = 0;
                }
            }
            out.push(c);
        }
        for _ in 0..escapes {
            out.push('\\');
        }
        out
    }

    /// How `first as second` aliases render.
    fn alias(&self, first: &str, second: &str) -> String {
        format!("{} as {}", first, second)
    }

    /// Normalize a binding before it is recorded (Oracle coerces booleans
    /// to 0/1).
    fn prepare_binding(&self, value: Value) -> Value {
        value
    }

    // ------------------------------------------------------------------
    // Inline value escaping (error decoration only, never sent to drivers)
    // ------------------------------------------------------------------

    fn escape_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn escape_array(&self, values: &[Value]) -> String {
        let parts: Vec<String> = values.iter().map(|v| self.escape_value(v)).collect();
        format!("[{}]", parts.join(", "))
    }

    fn escape_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.clone(),
            Value::Text(s) => self.escape_string(s),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("X'{}'", hex)
            }
            Value::Uuid(u) => self.escape_string(&u.to_string()),
            Value::Date(d) => self.escape_string(&d.to_string()),
            Value::Time(t) => self.escape_string(&t.to_string()),
            Value::DateTime(dt) => self.escape_string(&dt.to_string()),
            Value::DateTimeUtc(dt) => self.escape_string(&dt.to_rfc3339()),
            Value::Json(j) => self.escape_string(&j.to_string()),
            Value::Array(items) => self.escape_array(items),
        }
    }

    // ------------------------------------------------------------------
    // Select assembly
    // ------------------------------------------------------------------

    fn select_components(&self) -> &'static [SelectComponent] {
        DEFAULT_SELECT_COMPONENTS
    }

    /// Projection-level row cap (`top (?)`), emitted inside the column list.
    fn top_clause(
        &self,
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        let _ = (fmt, limit, offset);
        None
    }

    fn limit_clause(
        &self,
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        let _ = offset;
        limit.map(|l| format!("limit {}", fmt.parameter_value(Value::Int(l))))
    }

    fn offset_clause(
        &self,
        fmt: &mut Formatter<'_>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Option<String> {
        let _ = limit;
        offset.map(|o| format!("offset {}", fmt.parameter_value(Value::Int(o))))
    }

    /// Wrap an assembled select for dialects that paginate by nesting
    /// (Oracle's rownum scheme). Default is a pass-through.
    fn wrap_pagination(
        &self,
        fmt: &mut Formatter<'_>,
        sql: String,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> String {
        let _ = (fmt, limit, offset);
        sql
    }

    /// `for update` clause, or empty with a warning when unsupported.
    fn for_update(&self) -> String {
        "for update".to_string()
    }

    /// `for share` clause, or empty with a warning when unsupported.
    fn for_share(&self) -> String {
        "for share".to_string()
    }

    // ------------------------------------------------------------------
    // Row-return (RETURNING / OUTPUT)
    // ------------------------------------------------------------------

    fn supports_returning(&self) -> bool {
        false
    }

    fn returning_position(&self) -> ReturningPosition {
        ReturningPosition::End
    }

    /// Render the row-return clause for a DML statement, or empty (with a
    /// warning) when the dialect cannot return rows.
    fn returning_clause(
        &self,
        fmt: &mut Formatter<'_>,
        method: &Method,
        returning: &Returning,
    ) -> String {
        let _ = (fmt, method, returning);
        tracing::warn!(
            dialect = self.name(),
            "returning is not supported by this dialect and will not have any effect"
        );
        String::new()
    }

    /// Statement suffix that surfaces the affected-row count when no
    /// row-return clause was requested (MSSQL's `;select @@rowcount`).
    fn rowcount_suffix(&self) -> Option<&'static str> {
        None
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Whether multi-row inserts compile to a single VALUES list. Dialects
    /// without it get the union-all select chain instead.
    fn supports_multi_row_insert(&self) -> bool {
        true
    }

    /// SQL keyword substituted for a cell the caller did not provide, under
    /// the default (non-null) policy.
    fn default_insert_value(&self) -> &'static str {
        "default"
    }

    /// What to emit when inserting a single value-less row.
    fn empty_insert_sentinel(&self) -> &'static str {
        "default values"
    }

    /// Dialects that cannot express per-cell defaults reject unprovided
    /// cells at compile time unless the null-as-default policy is active.
    fn requires_explicit_insert_values(&self) -> bool {
        false
    }

    // ------------------------------------------------------------------
    // Truncate and column metadata
    // ------------------------------------------------------------------

    /// Compile a truncate into one or more statements (SQLite needs a
    /// sequence-reset side statement).
    fn truncate(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
    ) -> Result<Vec<Statement>> {
        let wrapped = fmt.wrap(&qualified_table(table, schema));
        Ok(vec![Statement::new(
            format!("truncate {}", wrapped),
            Vec::new(),
            Method::Truncate,
        )?])
    }

    /// Compile the column-metadata query plus its response-shaping hook.
    fn column_info(
        &self,
        fmt: &mut Formatter<'_>,
        table: &str,
        schema: Option<&str>,
        database: &str,
        column: Option<String>,
    ) -> Result<Statement>;

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    /// Whether DDL keywords render uppercase (MSSQL keeps the T-SQL
    /// convention).
    fn ddl_uppercase(&self) -> bool {
        false
    }

    /// Map an abstract column kind to this dialect's type name. Enum check
    /// constraints need the column name for wrapping.
    fn ddl_column_type(&self, fmt: &Formatter<'_>, column: &str, kind: &ColumnKind) -> String {
        base_column_type(fmt, column, kind)
    }

    /// Column types that reject default-value modifiers (MySQL and MSSQL
    /// drop defaults on text and blob columns).
    fn ddl_skips_default_for(&self, type_name: &str) -> bool {
        let _ = type_name;
        false
    }

    fn ddl_supports_unsigned(&self) -> bool {
        false
    }

    /// Primary and foreign keys render inside the create parentheses instead
    /// of as follow-up alter statements (SQLite).
    fn ddl_inline_constraints(&self) -> bool {
        false
    }

    fn ddl_supports_drop_column(&self) -> bool {
        true
    }

    /// Trailing storage options on `create table` (MySQL engine, charset,
    /// collation).
    fn create_table_suffix(&self, table: &TableDef) -> String {
        let _ = table;
        String::new()
    }

    fn drop_table_sql(&self, wrapped: &str) -> String {
        format!("drop table {}", wrapped)
    }

    fn drop_table_if_exists_sql(&self, wrapped: &str) -> String {
        format!("drop table if exists {}", wrapped)
    }

    fn rename_table_statement(
        &self,
        fmt: &Formatter<'_>,
        from: &str,
        to: &str,
    ) -> Result<Statement> {
        Statement::new(
            format!("alter table {} rename to {}", fmt.wrap(from), fmt.wrap(to)),
            Vec::new(),
            Method::Ddl,
        )
    }

    /// All identifier arguments arrive pre-wrapped.
    fn add_primary_key_sql(&self, table: &str, constraint: &str, columns: &str) -> String {
        format!(
            "alter table {} add constraint {} primary key ({})",
            table, constraint, columns
        )
    }

    fn add_unique_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!(
            "alter table {} add constraint {} unique ({})",
            table, index, columns
        )
    }

    fn create_index_sql(&self, table: &str, index: &str, columns: &str) -> String {
        format!("create index {} on {} ({})", index, table, columns)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    fn transaction_style(&self) -> TransactionStyle {
        TransactionStyle::Sql
    }

    fn begin_sql(&self) -> Option<&'static str> {
        Some("BEGIN;")
    }

    fn commit_sql(&self) -> &'static str {
        "COMMIT;"
    }

    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }

    fn supports_savepoints(&self) -> bool {
        true
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVEPOINT {};", name)
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", name)
    }

    /// Whether this driver error means a statement inside the transaction
    /// already committed it implicitly (MySQL DDL).
    fn is_implicit_commit_error(&self, err: &DriverError) -> bool {
        let _ = err;
        false
    }

    /// Whether this driver error means the connection itself is broken and
    /// must be evicted rather than reused.
    fn is_connection_error(&self, err: &DriverError) -> bool {
        let _ = err;
        false
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    fn can_cancel_query(&self) -> bool {
        false
    }

    /// Side-channel kill command issued from a second connection against
    /// the target connection's session.
    fn kill_query_statement(&self, session_id: i64) -> Result<Option<Statement>> {
        let _ = session_id;
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Response shaping
    // ------------------------------------------------------------------

    /// Map the raw driver response to a normalized outcome.
    fn process_response(&self, stmt: &Statement, resp: DriverResponse) -> Result<QueryOutcome> {
        base_process_response(self.supports_returning(), stmt, resp)
    }
}

/// Dialect-independent response mapping; the trait default and most
/// overrides fall back to this.
pub fn base_process_response(
    supports_returning: bool,
    stmt: &Statement,
    resp: DriverResponse,
) -> Result<QueryOutcome> {
    if let Some(output) = &stmt.output {
        return output(&resp);
    }
    match &stmt.method {
        Method::Raw => Ok(QueryOutcome::Raw(resp)),
        Method::Select => Ok(QueryOutcome::Rows(resp.rows)),
        Method::First => Ok(QueryOutcome::Row(resp.rows.into_iter().next())),
        Method::Pluck(column) => Ok(QueryOutcome::Plucked(
            resp.rows
                .iter()
                .map(|row| row.get_by_name(column).cloned().unwrap_or(Value::Null))
                .collect(),
        )),
        Method::Insert | Method::Update | Method::Del | Method::Counter => {
            if let Some(returning) = &stmt.returning {
                if supports_returning {
                    return Ok(returning_outcome(returning, resp));
                }
            }
            match stmt.method {
                Method::Insert => Ok(QueryOutcome::Inserted(
                    resp.last_insert_id.map(Value::Int).into_iter().collect(),
                )),
                _ => Ok(QueryOutcome::Affected(resp.affected_rows)),
            }
        }
        Method::Truncate | Method::Ddl => Ok(QueryOutcome::Affected(resp.affected_rows)),
        Method::ColumnInfo => Err(QuarryError::Compile(
            "columnInfo statement compiled without a response shaper".to_string(),
        )),
    }
}

/// Dot-join a table reference with its schema prefix, for wrapping as one
/// identifier path.
pub fn qualified_table(table: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!("{}.{}", schema, table),
        None => table.to_string(),
    }
}

/// Shared returning-row shaping: a single named column flattens to its
/// values; `*` or multiple columns keep whole rows.
pub fn returning_outcome(returning: &Returning, resp: DriverResponse) -> QueryOutcome {
    match returning {
        Returning::Columns(cols) if cols.len() == 1 && cols[0] != "*" => QueryOutcome::Inserted(
            resp.rows
                .iter()
                .map(|row| row.get_by_name(&cols[0]).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        _ => QueryOutcome::Rows(resp.rows),
    }
}

/// Affected-count fallback for drivers that report command tags: update and
/// delete tags carry the row count even without an explicit method hint.
pub fn affected_from_command(resp: &DriverResponse) -> Option<u64> {
    match resp.command {
        Command::Update | Command::Delete => Some(resp.affected_rows),
        _ => None,
    }
}

/// Look up a dialect implementation by name. Accepts the canonical dialect
/// names plus the common driver aliases.
pub fn dialect(name: &str) -> Option<&'static dyn SqlDialect> {
    match name {
        "postgresql" | "postgres" | "pg" => Some(&crate::dialects::PostgresDialect),
        "mysql" | "mysql2" | "maria" | "mariadb" | "mariasql" => Some(&crate::dialects::MysqlDialect),
        "mssql" => Some(&crate::dialects::MssqlDialect),
        "oracle" | "oracledb" => Some(&crate::dialects::OracleDialect),
        "sqlite" | "sqlite3" => Some(&crate::dialects::SqliteDialect),
        "redshift" => Some(&crate::dialects::RedshiftDialect),
        _ => None,
    }
}
