//! Quarry Compiler - dialect-aware SQL statement compilation
//!
//! Turns builder ASTs into executable `Statement` descriptors:
//!
//! - `QueryAst` / `SchemaAst` - plain-data descriptions of a query or a DDL
//!   change, produced by whatever builder surface sits above this crate
//! - `Formatter` - identifier quoting, parameter placement and binding
//!   collection, scoped to a single statement
//! - `SqlDialect` - the per-backend capability trait, with one registered
//!   implementation per supported dialect
//! - `QueryCompiler` / `SchemaCompiler` - the assembly engines that walk an
//!   AST and push compiled statements

mod ast;
mod dialect;
mod dialects;
mod formatter;
pub mod query;
pub mod schema;

pub use ast::*;
pub use dialect::*;
pub use dialects::*;
pub use formatter::*;
pub use query::QueryCompiler;
pub use schema::{
    ColumnCompiler, ColumnDef, ColumnKind, ForeignKey, KeySpec, SchemaAst, SchemaCompiler,
    SchemaOp, TableCompiler, TableDef,
};
