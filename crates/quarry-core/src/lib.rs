//! Quarry Core - shared types for the quarry SQL toolkit
//!
//! This crate provides the fundamental traits and types that the compiler
//! and connection crates depend on. It defines:
//!
//! - `Driver` / `DriverConnection` - the boundary to a native database driver
//! - `Statement` - a compiled `{sql, bindings}` descriptor ready for execution
//! - `QueryOutcome` - the normalized result of running a statement
//! - `EventSink` - the structured lifecycle-event port
//! - Common types like `Value` and `Row`

mod driver;
mod error;
mod events;
mod statement;
mod types;

pub use driver::*;
pub use error::*;
pub use events::*;
pub use statement::*;
pub use types::*;
