//! Quarry Connection - pooling and execution engine
//!
//! Everything between a compiled statement and a database wire protocol:
//!
//! - `ConnectionPool` / `ConnectionLease` - bounded pooling over the driver
//!   boundary, with disposal markers for connections that must not be reused
//! - `Client` - one per connection profile; owns the pool, the dialect, the
//!   formatting policy and the event sink
//! - `Runner` - compiles an AST and executes its statements strictly in
//!   order on one leased connection
//! - `Transaction` - scoped transactions with savepoint nesting, driven
//!   through `Client::transaction`
//! - `testing` - an in-memory scriptable driver

pub mod client;
pub mod pool;
pub mod runner;
pub mod testing;
pub mod transaction;

pub use client::{Client, ClientConfig, PostProcessHook};
pub use pool::{
    AfterCreateHook, ConnectionFactory, ConnectionLease, ConnectionPool, DriverFactory,
    PoolConfig, PoolStats,
};
pub use runner::Runner;
pub use transaction::{Transaction, TxState};
