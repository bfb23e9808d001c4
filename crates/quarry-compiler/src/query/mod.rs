//! Query compiler
//!
//! Walks a `QueryAst` and assembles dialect-correct SQL through the
//! formatter. Every statement gets a fresh formatter so bindings never leak
//! across a compiled sequence.

use std::collections::BTreeSet;

use quarry_core::{Method, QuarryError, Result, Statement};

use crate::ast::{QueryAst, SelectColumn, SqlValue};
use crate::dialect::{ReturningPosition, SelectComponent, SqlDialect, qualified_table};
use crate::formatter::{FormatPolicy, Formatter};

#[cfg(test)]
mod tests;

/// Compiles one builder AST into one or more executable statements.
pub struct QueryCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    policy: &'a FormatPolicy,
    ast: &'a QueryAst,
    database: &'a str,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, policy: &'a FormatPolicy, ast: &'a QueryAst) -> Self {
        Self {
            dialect,
            policy,
            ast,
            database: "",
        }
    }

    /// Database name used by columnInfo queries; supplied by the client
    /// from its connection settings.
    pub fn with_database(mut self, database: &'a str) -> Self {
        self.database = database;
        self
    }

    pub fn compile(&self) -> Result<Vec<Statement>> {
        let statements = match &self.ast.method {
            Method::Select | Method::First | Method::Pluck(_) => vec![self.select()?],
            Method::Insert => vec![self.insert()?],
            Method::Update | Method::Counter => vec![self.update()?],
            Method::Del => vec![self.del()?],
            Method::Truncate => self.truncate()?,
            Method::ColumnInfo => vec![self.column_info()?],
            Method::Raw => vec![self.raw()?],
            Method::Ddl => {
                return Err(QuarryError::Compile(
                    "DDL compiles through the schema compiler".to_string(),
                ));
            }
        };
        Ok(statements
            .into_iter()
            .map(|stmt| self.attach_execution_hints(stmt))
            .collect())
    }

    fn attach_execution_hints(&self, mut stmt: Statement) -> Statement {
        stmt.timeout = self.ast.timeout;
        stmt.cancel_on_timeout = self.ast.cancel_on_timeout;
        if stmt.options.is_none() {
            stmt.options = self.ast.options.clone();
        }
        stmt
    }

    fn formatter(&self) -> Formatter<'a> {
        Formatter::new(self.dialect, self.policy)
    }

    fn table(&self) -> Result<&str> {
        self.ast
            .table
            .as_deref()
            .ok_or_else(|| QuarryError::Compile("statement has no target table".to_string()))
    }

    fn table_name(&self, fmt: &Formatter<'_>) -> Result<String> {
        Ok(fmt.wrap(&qualified_table(
            self.table()?,
            self.ast.schema.as_deref(),
        )))
    }

    // ------------------------------------------------------------------
    // select
    // ------------------------------------------------------------------

    fn select(&self) -> Result<Statement> {
        let mut fmt = self.formatter();
        let with = self.with_clause(&mut fmt);
        let mut parts: Vec<String> = Vec::new();
        for component in self.dialect.select_components() {
            if let Some(fragment) = self.select_component(&mut fmt, *component)? {
                parts.push(fragment);
            }
        }
        let sql = self.dialect.wrap_pagination(
            &mut fmt,
            format!("{}{}", with, parts.join(" ")),
            self.ast.limit,
            self.ast.offset,
        );
        Statement::new(sql, fmt.into_bindings(), self.ast.method.clone())
    }

    fn select_component(
        &self,
        fmt: &mut Formatter<'_>,
        component: SelectComponent,
    ) -> Result<Option<String>> {
        let ast = self.ast;
        Ok(match component {
            SelectComponent::Columns => self.columns(fmt)?,
            SelectComponent::Join => join_fragments(fmt, &ast.joins, "", " "),
            SelectComponent::Where => join_fragments(fmt, &ast.wheres, "where ", " and "),
            SelectComponent::Union => join_fragments(fmt, &ast.unions, "", " "),
            SelectComponent::Group => join_fragments(fmt, &ast.group, "group by ", ", "),
            SelectComponent::Having => join_fragments(fmt, &ast.having, "having ", " and "),
            SelectComponent::Order => join_fragments(fmt, &ast.order, "order by ", ", "),
            SelectComponent::Limit => self.dialect.limit_clause(fmt, ast.limit, ast.offset),
            SelectComponent::Offset => self.dialect.offset_clause(fmt, ast.limit, ast.offset),
            SelectComponent::Lock => self.lock_clause(),
        })
    }

    fn columns(&self, fmt: &mut Formatter<'_>) -> Result<Option<String>> {
        let ast = self.ast;
        // a pure union chain supplies its own head statement
        if ast.columns.is_empty() && !ast.unions.is_empty() {
            return Ok(None);
        }
        let top = self.dialect.top_clause(fmt, ast.limit, ast.offset);
        let mut rendered: Vec<String> = Vec::new();
        for column in &ast.columns {
            rendered.push(match column {
                SelectColumn::Column(name) => fmt.wrap(name),
                SelectColumn::Raw(raw) => fmt.raw(raw),
                SelectColumn::Aggregate {
                    function,
                    column,
                    alias,
                    distinct,
                } => {
                    let inner = if column == "*" {
                        column.clone()
                    } else {
                        fmt.wrap(column)
                    };
                    let body = format!(
                        "{}({}{})",
                        function,
                        if *distinct { "distinct " } else { "" },
                        inner
                    );
                    match alias {
                        Some(alias) => fmt.alias(&body, &fmt.wrap(alias)),
                        None => body,
                    }
                }
            });
        }
        if rendered.is_empty() {
            rendered.push("*".to_string());
        }
        let mut sql = format!(
            "select {}{}{}",
            if ast.distinct { "distinct " } else { "" },
            top.map(|t| format!("{} ", t)).unwrap_or_default(),
            rendered.join(", ")
        );
        if self.ast.table.is_some() {
            sql.push_str(&format!(" from {}", self.table_name(fmt)?));
        }
        Ok(Some(sql))
    }

    fn lock_clause(&self) -> Option<String> {
        let clause = match self.ast.lock? {
            crate::ast::Lock::ForUpdate => self.dialect.for_update(),
            crate::ast::Lock::ForShare => self.dialect.for_share(),
        };
        if clause.is_empty() { None } else { Some(clause) }
    }

    fn with_clause(&self, fmt: &mut Formatter<'_>) -> String {
        if self.ast.ctes.is_empty() {
            return String::new();
        }
        let ctes: Vec<String> = self
            .ast
            .ctes
            .iter()
            .map(|cte| format!("{} as ({})", fmt.wrap(&cte.name), fmt.raw(&cte.body)))
            .collect();
        format!("with {} ", ctes.join(", "))
    }

    // ------------------------------------------------------------------
    // insert
    // ------------------------------------------------------------------

    fn insert(&self) -> Result<Statement> {
        let ast = self.ast;
        if ast.insert_rows.is_empty() {
            return Ok(Statement::empty(Method::Insert));
        }

        let mut fmt = self.formatter();
        let with = self.with_clause(&mut fmt);
        let head = format!("{}insert into {} ", with, self.table_name(&fmt)?);

        let returning_sql = match &ast.returning {
            Some(returning) => {
                let clause = self
                    .dialect
                    .returning_clause(&mut fmt, &Method::Insert, returning);
                if clause.is_empty() { None } else { Some(clause) }
            }
            None => None,
        };
        let after_target = self.dialect.returning_position() == ReturningPosition::AfterTarget;

        // the column set is the union over all rows, in stable order
        let columns: Vec<String> = ast
            .insert_rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if columns.is_empty() {
            if ast.insert_rows.len() == 1 {
                let mut sql = head;
                if let (true, Some(returning)) = (after_target, &returning_sql) {
                    sql.push_str(returning);
                    sql.push(' ');
                }
                sql.push_str(self.dialect.empty_insert_sentinel());
                if let (false, Some(returning)) = (after_target, &returning_sql) {
                    sql.push(' ');
                    sql.push_str(returning);
                }
                return Statement::new(sql, fmt.into_bindings(), Method::Insert)
                    .map(|s| s.with_returning(ast.returning.clone()));
            }
            return Ok(Statement::empty(Method::Insert));
        }

        // cell matrix parallel to the column order; a missing cell falls to
        // the default-value policy
        let rows: Vec<Vec<Option<SqlValue>>> = ast
            .insert_rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get(col).cloned().flatten())
                    .collect()
            })
            .collect();

        if self.dialect.requires_explicit_insert_values()
            && fmt.inlines_undefined()
            && rows.iter().any(|row| row.iter().any(|cell| cell.is_none()))
        {
            return Err(QuarryError::Compile(format!(
                "`{}` does not support inserting default values. Specify values explicitly \
                 or configure the null-as-default policy",
                self.dialect.name()
            )));
        }

        let mut sql = format!("{}({})", head, fmt.columnize(&columns));
        if let (true, Some(returning)) = (after_target, &returning_sql) {
            sql.push_str(&format!(" {}", returning));
        }

        if self.dialect.supports_multi_row_insert() || rows.len() == 1 {
            let value_lists: Vec<String> = rows
                .iter()
                .map(|row| format!("({})", fmt.parameterize(row)))
                .collect();
            sql.push_str(&format!(" values {}", value_lists.join(", ")));
        } else {
            // union-all chain, each cell aliased to its column
            let blocks: Vec<String> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(i, cell)| {
                            let parameter = match cell {
                                Some(value) => fmt.parameter(value),
                                None => fmt.undefined_parameter(),
                            };
                            fmt.alias(&parameter, &fmt.wrap(&columns[i]))
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            sql.push_str(&format!(" select {}", blocks.join(" union all select ")));
        }

        if let (false, Some(returning)) = (after_target, &returning_sql) {
            sql.push_str(&format!(" {}", returning));
        }

        Statement::new(sql, fmt.into_bindings(), Method::Insert)
            .map(|s| s.with_returning(ast.returning.clone()))
    }

    // ------------------------------------------------------------------
    // update / counter
    // ------------------------------------------------------------------

    fn update(&self) -> Result<Statement> {
        let ast = self.ast;
        let mut fmt = self.formatter();
        let with = self.with_clause(&mut fmt);
        let table = self.table_name(&fmt)?;
        let method = if ast.method == Method::Counter {
            Method::Counter
        } else {
            Method::Update
        };

        let after_target = self.dialect.returning_position() == ReturningPosition::AfterTarget;
        // bindings must land in textual order, and `top (?)` precedes the
        // assignment placeholders
        let top = if after_target {
            self.dialect.top_clause(&mut fmt, ast.limit, ast.offset)
        } else {
            None
        };

        let mut assignments: Vec<String> = Vec::new();
        for (column, value) in &ast.update_set {
            let parameter = fmt.parameter(value);
            assignments.push(format!("{} = {}", fmt.wrap(column), parameter));
        }
        for (column, amount) in &ast.counters {
            let wrapped = fmt.wrap(column);
            let op = if *amount < 0 { '-' } else { '+' };
            assignments.push(format!(
                "{} = {} {} {}",
                wrapped,
                wrapped,
                op,
                amount.abs()
            ));
        }
        if assignments.is_empty() {
            return Err(QuarryError::Compile(
                "update requires at least one assignment".to_string(),
            ));
        }

        let returning_sql = match &ast.returning {
            Some(returning) => {
                let clause = self.dialect.returning_clause(&mut fmt, &method, returning);
                if clause.is_empty() { None } else { Some(clause) }
            }
            None => None,
        };

        let mut sql = format!(
            "{}update {}{} set {}",
            with,
            top.map(|t| format!("{} ", t)).unwrap_or_default(),
            table,
            assignments.join(", ")
        );
        if after_target {
            if let Some(returning) = &returning_sql {
                sql.push_str(&format!(" {}", returning));
            }
            if let Some(joins) = join_fragments(&mut fmt, &ast.joins, "", " ") {
                sql.push_str(&format!(" from {} {}", table, joins));
            }
        }
        if let Some(wheres) = join_fragments(&mut fmt, &ast.wheres, "where ", " and ") {
            sql.push_str(&format!(" {}", wheres));
        }
        if after_target {
            if let Some(order) = join_fragments(&mut fmt, &ast.order, "order by ", ", ") {
                sql.push_str(&format!(" {}", order));
            }
        }
        if !after_target {
            if let Some(returning) = &returning_sql {
                sql.push_str(&format!(" {}", returning));
            }
        }
        if returning_sql.is_none() {
            if let Some(suffix) = self.dialect.rowcount_suffix() {
                sql.push_str(suffix);
            }
        }

        Statement::new(sql, fmt.into_bindings(), method)
            .map(|s| s.with_returning(ast.returning.clone()))
    }

    // ------------------------------------------------------------------
    // delete
    // ------------------------------------------------------------------

    fn del(&self) -> Result<Statement> {
        let ast = self.ast;
        let mut fmt = self.formatter();
        let with = self.with_clause(&mut fmt);
        let table = self.table_name(&fmt)?;

        let after_target = self.dialect.returning_position() == ReturningPosition::AfterTarget;
        let returning_sql = match &ast.returning {
            Some(returning) => {
                let clause = self
                    .dialect
                    .returning_clause(&mut fmt, &Method::Del, returning);
                if clause.is_empty() { None } else { Some(clause) }
            }
            None => None,
        };

        let mut sql = format!("{}delete from {}", with, table);
        if let (true, Some(returning)) = (after_target, &returning_sql) {
            sql.push_str(&format!(" {}", returning));
        }
        if let Some(wheres) = join_fragments(&mut fmt, &ast.wheres, "where ", " and ") {
            sql.push_str(&format!(" {}", wheres));
        }
        if let (false, Some(returning)) = (after_target, &returning_sql) {
            sql.push_str(&format!(" {}", returning));
        }
        if returning_sql.is_none() {
            if let Some(suffix) = self.dialect.rowcount_suffix() {
                sql.push_str(suffix);
            }
        }

        Statement::new(sql, fmt.into_bindings(), Method::Del)
            .map(|s| s.with_returning(ast.returning.clone()))
    }

    // ------------------------------------------------------------------
    // truncate / columnInfo / raw
    // ------------------------------------------------------------------

    fn truncate(&self) -> Result<Vec<Statement>> {
        let mut fmt = self.formatter();
        self.dialect
            .truncate(&mut fmt, self.table()?, self.ast.schema.as_deref())
    }

    fn column_info(&self) -> Result<Statement> {
        let mut fmt = self.formatter();
        self.dialect.column_info(
            &mut fmt,
            self.table()?,
            self.ast.schema.as_deref(),
            self.database,
            self.ast.info_column.clone(),
        )
    }

    fn raw(&self) -> Result<Statement> {
        let raw = self
            .ast
            .raw
            .as_ref()
            .ok_or_else(|| QuarryError::Compile("raw statement without a fragment".to_string()))?;
        Statement::new(raw.sql.clone(), raw.bindings.clone(), Method::Raw)
    }
}

/// Render a fragment list with a clause keyword, absorbing fragment
/// bindings. Empty lists produce no clause.
fn join_fragments(
    fmt: &mut Formatter<'_>,
    fragments: &[crate::ast::Raw],
    keyword: &str,
    separator: &str,
) -> Option<String> {
    if fragments.is_empty() {
        return None;
    }
    let rendered: Vec<String> = fragments.iter().map(|f| fmt.raw(f)).collect();
    Some(format!("{}{}", keyword, rendered.join(separator)))
}
