//! Builder AST value types
//!
//! The fluent builder surface lives outside this crate; what crosses the
//! boundary is plain data. Compiling the same AST twice yields byte-identical
//! statements, and nothing here executes anything.

use std::collections::BTreeMap;
use std::time::Duration;

use quarry_core::{Method, Returning, Value};

/// A raw SQL fragment with its own positional bindings. Inlined verbatim by
/// the formatter; its `?` markers are accounted against `bindings`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub sql: String,
    pub bindings: Vec<Value>,
}

impl Raw {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_bindings(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }
}

/// Either a concrete binding value or a raw fragment to inline.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Value(Value),
    Raw(Raw),
}

impl<T: Into<Value>> From<T> for SqlValue {
    fn from(v: T) -> Self {
        SqlValue::Value(v.into())
    }
}

impl From<Raw> for SqlValue {
    fn from(r: Raw) -> Self {
        SqlValue::Raw(r)
    }
}

/// One entry of a select projection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// Plain column reference, `table.column` and `column as alias` forms
    /// included.
    Column(String),
    /// Aggregate call, e.g. `count(distinct "id") as "total"`.
    Aggregate {
        function: String,
        column: String,
        alias: Option<String>,
        distinct: bool,
    },
    /// Raw projection fragment.
    Raw(Raw),
}

/// Row-locking request on a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    ForUpdate,
    ForShare,
}

/// A common-table-expression attached to the statement head.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub body: Raw,
}

/// One insert row: column name to provided cell. A `None` cell means the
/// caller did not supply the column for this row, which is distinct from an
/// explicit NULL and is filled by the client's default-value policy.
pub type InsertRow = BTreeMap<String, Option<SqlValue>>;

/// The compiled-from shape of one query. Predicates, joins, grouping and
/// ordering arrive already tokenized as raw fragments; this crate assembles
/// and parameterizes, it does not parse.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    pub method: Method,
    pub table: Option<String>,
    pub schema: Option<String>,
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub ctes: Vec<Cte>,
    pub joins: Vec<Raw>,
    pub wheres: Vec<Raw>,
    pub unions: Vec<Raw>,
    pub group: Vec<Raw>,
    pub having: Vec<Raw>,
    pub order: Vec<Raw>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub lock: Option<Lock>,
    pub insert_rows: Vec<InsertRow>,
    pub update_set: Vec<(String, SqlValue)>,
    /// Increment (positive) or decrement (negative) amounts per column.
    pub counters: Vec<(String, i64)>,
    pub returning: Option<Returning>,
    /// For `Method::ColumnInfo`: restrict the result to one column.
    pub info_column: Option<String>,
    /// For `Method::Raw`: the raw statement to pass through.
    pub raw: Option<Raw>,
    pub timeout: Option<Duration>,
    pub cancel_on_timeout: bool,
    pub options: Option<serde_json::Value>,
}

impl QueryAst {
    pub fn new(method: Method, table: impl Into<String>) -> Self {
        Self {
            method,
            table: Some(table.into()),
            ..Self::empty(Method::Select)
        }
    }

    fn empty(method: Method) -> Self {
        Self {
            method,
            table: None,
            schema: None,
            distinct: false,
            columns: Vec::new(),
            ctes: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            unions: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            insert_rows: Vec::new(),
            update_set: Vec::new(),
            counters: Vec::new(),
            returning: None,
            info_column: None,
            raw: None,
            timeout: None,
            cancel_on_timeout: false,
            options: None,
        }
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::new(Method::Select, table)
    }

    pub fn insert_into(table: impl Into<String>) -> Self {
        Self::new(Method::Insert, table)
    }

    pub fn update_table(table: impl Into<String>) -> Self {
        Self::new(Method::Update, table)
    }

    pub fn delete_from(table: impl Into<String>) -> Self {
        Self::new(Method::Del, table)
    }

    pub fn truncate(table: impl Into<String>) -> Self {
        Self::new(Method::Truncate, table)
    }

    pub fn column_info(table: impl Into<String>) -> Self {
        Self::new(Method::ColumnInfo, table)
    }

    pub fn raw_statement(raw: Raw) -> Self {
        Self {
            raw: Some(raw),
            ..Self::empty(Method::Raw)
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| SelectColumn::Column(c.into())));
        self
    }

    pub fn with_where(mut self, fragment: Raw) -> Self {
        self.wheres.push(fragment);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_returning(mut self, returning: Returning) -> Self {
        self.returning = Some(returning);
        self
    }

    pub fn with_lock(mut self, lock: Lock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_row(mut self, row: InsertRow) -> Self {
        self.insert_rows.push(row);
        self
    }

    pub fn with_set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.update_set.push((column.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, cancel_on_timeout: bool) -> Self {
        self.timeout = Some(timeout);
        self.cancel_on_timeout = cancel_on_timeout;
        self
    }
}

/// Build an insert row from `(column, value)` pairs.
pub fn insert_row<I, S, V>(cells: I) -> InsertRow
where
    I: IntoIterator<Item = (S, V)>,
    S: Into<String>,
    V: Into<SqlValue>,
{
    cells
        .into_iter()
        .map(|(c, v)| (c.into(), Some(v.into())))
        .collect()
}
