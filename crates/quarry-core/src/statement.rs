//! Compiled statement descriptors and normalized execution outcomes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{DriverResponse, QuarryError, Result, Row, Value};

/// What kind of operation a compiled statement represents. Drives the
/// dialect's response post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Select,
    /// Select expecting at most one row
    First,
    /// Select projecting a single column into a flat value list
    Pluck(String),
    Insert,
    Update,
    Del,
    /// Increment/decrement update; reported as an affected-row count
    Counter,
    Truncate,
    ColumnInfo,
    /// Schema/DDL statement
    Ddl,
    Raw,
}

/// Requested row-return columns for insert/update/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Returning {
    All,
    Columns(Vec<String>),
}

impl Returning {
    pub fn column_names(&self) -> Vec<String> {
        match self {
            Returning::All => vec!["*".to_string()],
            Returning::Columns(cols) => cols.clone(),
        }
    }
}

/// Response-shaping hook attached to a statement at compile time.
///
/// Used where the raw driver rows need dialect-specific massaging that the
/// generic post-processing cannot do (e.g. columnInfo result shaping).
pub type Output = Arc<dyn Fn(&DriverResponse) -> Result<QueryOutcome> + Send + Sync>;

/// A compiled `{sql, bindings}` unit ready for execution.
///
/// Immutable once produced; consumed exactly once by the runner. A schema
/// builder AST may compile to a sequence of these.
#[derive(Clone)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub method: Method,
    pub returning: Option<Returning>,
    pub output: Option<Output>,
    pub timeout: Option<Duration>,
    pub cancel_on_timeout: bool,
    /// Driver-specific execution options, passed through opaquely.
    pub options: Option<serde_json::Value>,
}

impl Statement {
    /// Create a statement, checking the placeholder/binding invariant:
    /// the bindings sequence length must exactly match the number of
    /// unescaped `?` markers in the SQL.
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>, method: Method) -> Result<Self> {
        let sql = sql.into();
        let placeholders = count_placeholders(&sql);
        if placeholders != bindings.len() {
            return Err(QuarryError::Compile(format!(
                "expected {} bindings for {} placeholder(s) in `{}`, got {}",
                placeholders,
                placeholders,
                sql,
                bindings.len()
            )));
        }
        Ok(Self {
            sql,
            bindings,
            method,
            returning: None,
            output: None,
            timeout: None,
            cancel_on_timeout: false,
            options: None,
        })
    }

    /// An empty statement: the no-op result of compiling a zero-row insert.
    /// Callers must tolerate it and skip execution.
    pub fn empty(method: Method) -> Self {
        Self {
            sql: String::new(),
            bindings: Vec::new(),
            method,
            returning: None,
            output: None,
            timeout: None,
            cancel_on_timeout: false,
            options: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn with_returning(mut self, returning: Option<Returning>) -> Self {
        self.returning = returning;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>, cancel_on_timeout: bool) -> Self {
        self.timeout = timeout;
        self.cancel_on_timeout = cancel_on_timeout;
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Whether driver errors from this statement are swallowed (best-effort
    /// side statements like sqlite's sequence reset).
    pub fn ignores_errors(&self) -> bool {
        self.options
            .as_ref()
            .and_then(|o| o.get("ignore_errors"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("bindings", &self.bindings)
            .field("method", &self.method)
            .field("returning", &self.returning)
            .field("output", &self.output.as_ref().map(|_| "<fn>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.sql == other.sql && self.bindings == other.bindings && self.method == other.method
    }
}

/// Count unescaped `?` placeholders. `\?` is an escaped literal question
/// mark and does not consume a binding.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut escapes = 0;
    for c in sql.chars() {
        match c {
            '\\' => escapes += 1,
            '?' => {
                if escapes % 2 == 0 {
                    count += 1;
                }
                escapes = 0;
            }
            _ => escapes = 0,
        }
    }
    count
}

/// Column metadata record produced by a columnInfo query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnDescriptor {
    pub type_name: String,
    pub max_length: Option<i64>,
    pub nullable: bool,
    pub default_value: Option<String>,
}

/// Normalized result of executing one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Row set (select)
    Rows(Vec<Row>),
    /// At most one row (first)
    Row(Option<Row>),
    /// Flat single-column projection (pluck)
    Plucked(Vec<Value>),
    /// Generated ids or returned rows from an insert
    Inserted(Vec<Value>),
    /// Affected-row count (update/delete/counter)
    Affected(u64),
    /// Column metadata keyed by column name
    ColumnInfo(BTreeMap<String, ColumnDescriptor>),
    /// Unprocessed driver response (raw statements)
    Raw(DriverResponse),
}

impl QueryOutcome {
    /// Row set, if this outcome carries one.
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryOutcome::Rows(rows) => Some(rows),
            QueryOutcome::Raw(resp) => Some(&resp.rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            QueryOutcome::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_placeholders() {
        assert_eq!(count_placeholders("select * from t"), 0);
        assert_eq!(count_placeholders("select ? where x = ?"), 2);
        assert_eq!(count_placeholders(r"select '\?'"), 0);
        assert_eq!(count_placeholders(r"select '\\?'"), 1);
    }

    #[test]
    fn test_statement_binding_invariant() {
        let ok = Statement::new("select * from t where id = ?", vec![Value::Int(1)], Method::Select);
        assert!(ok.is_ok());

        let err = Statement::new("select * from t where id = ?", vec![], Method::Select);
        assert!(matches!(err, Err(QuarryError::Compile(_))));

        let err = Statement::new(
            "select 1",
            vec![Value::Int(1)],
            Method::Select,
        );
        assert!(matches!(err, Err(QuarryError::Compile(_))));
    }

    #[test]
    fn test_empty_statement() {
        let stmt = Statement::empty(Method::Insert);
        assert!(stmt.is_empty());
        assert!(stmt.bindings.is_empty());
    }
}
