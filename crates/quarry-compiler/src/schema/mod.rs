//! Schema compiler
//!
//! Consumes a `SchemaAst` (an ordered sequence of DDL operations) and
//! produces the statements that carry them out, in order. Table-level
//! operations delegate to `TableCompiler`; everything compiles to
//! `Method::Ddl` statements so the runner executes them sequentially on one
//! connection.

use quarry_core::{Method, Result, Statement};

use crate::ast::Raw;
use crate::dialect::{SqlDialect, qualified_table};
use crate::formatter::{FormatPolicy, Formatter};

pub mod column;
pub mod table;

pub use column::{ColumnCompiler, ColumnDef, ColumnKind, base_column_type};
pub use table::{ForeignKey, KeySpec, TableCompiler, TableDef};

#[cfg(test)]
mod tests;

/// One DDL operation.
#[derive(Debug, Clone)]
pub enum SchemaOp {
    CreateTable(TableDef),
    CreateTableIfNotExists(TableDef),
    AlterTable(TableDef),
    DropTable(String),
    DropTableIfExists(String),
    RenameTable { from: String, to: String },
    Raw(Raw),
}

/// Ordered sequence of DDL operations, optionally scoped to a schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaAst {
    pub schema: Option<String>,
    pub ops: Vec<SchemaOp>,
}

impl SchemaAst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn op(mut self, op: SchemaOp) -> Self {
        self.ops.push(op);
        self
    }
}

pub struct SchemaCompiler<'a> {
    dialect: &'a dyn SqlDialect,
    policy: &'a FormatPolicy,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, policy: &'a FormatPolicy) -> Self {
        Self { dialect, policy }
    }

    pub fn compile(&self, ast: &SchemaAst) -> Result<Vec<Statement>> {
        let schema = ast.schema.as_deref();
        let mut sequence = Vec::new();
        for op in &ast.ops {
            match op {
                SchemaOp::CreateTable(table) => sequence.extend(
                    TableCompiler::new(self.dialect, self.policy, schema, table).create(false)?,
                ),
                SchemaOp::CreateTableIfNotExists(table) => sequence.extend(
                    TableCompiler::new(self.dialect, self.policy, schema, table).create(true)?,
                ),
                SchemaOp::AlterTable(table) => sequence.extend(
                    TableCompiler::new(self.dialect, self.policy, schema, table).alter()?,
                ),
                SchemaOp::DropTable(name) => {
                    let wrapped = self.wrap_table(name, schema);
                    push_ddl(&mut sequence, self.dialect.drop_table_sql(&wrapped))?;
                }
                SchemaOp::DropTableIfExists(name) => {
                    let wrapped = self.wrap_table(name, schema);
                    push_ddl(&mut sequence, self.dialect.drop_table_if_exists_sql(&wrapped))?;
                }
                SchemaOp::RenameTable { from, to } => {
                    let fmt = Formatter::new(self.dialect, self.policy);
                    sequence.push(self.dialect.rename_table_statement(&fmt, from, to)?);
                }
                SchemaOp::Raw(raw) => {
                    sequence.push(Statement::new(
                        raw.sql.clone(),
                        raw.bindings.clone(),
                        Method::Ddl,
                    )?);
                }
            }
        }
        Ok(sequence)
    }

    fn wrap_table(&self, table: &str, schema: Option<&str>) -> String {
        Formatter::new(self.dialect, self.policy).wrap(&qualified_table(table, schema))
    }
}

pub(crate) fn push_ddl(sequence: &mut Vec<Statement>, sql: String) -> Result<()> {
    sequence.push(Statement::new(sql, Vec::new(), Method::Ddl)?);
    Ok(())
}

/// DDL keyword casing helper; MSSQL keeps the T-SQL uppercase convention.
pub(crate) fn kw(dialect: &dyn SqlDialect, lower: &str) -> String {
    if dialect.ddl_uppercase() {
        lower.to_uppercase()
    } else {
        lower.to_string()
    }
}
