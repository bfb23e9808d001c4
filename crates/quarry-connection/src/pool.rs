//! Connection pooling over the driver boundary
//!
//! The pool hands out `ConnectionLease`s, each tagged with a fresh lease id.
//! A lease returns its connection to the idle queue on release unless it was
//! marked disposed, in which case the connection is closed and evicted.
//!
//! # Example
//!
//! ```ignore
//! use quarry_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10).with_acquire_timeout_ms(5000);
//! let pool = ConnectionPool::new(config, acquire_timeout, factory);
//! let lease = pool.acquire().await?;
//! // Use connection...
//! lease.release().await;
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{AfterCreateHook, ConnectionFactory, ConnectionLease, ConnectionPool, DriverFactory};
pub use stats::PoolStats;
