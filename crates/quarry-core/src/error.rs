//! Error types for quarry

use std::time::Duration;

use thiserror::Error;

use crate::Value;

/// Core error type for quarry operations
#[derive(Error, Debug)]
pub enum QuarryError {
    /// Malformed statement input, caught before any connection is touched.
    /// Never retried - these are caller bugs.
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The pool could not hand out a connection within the acquire timeout.
    #[error(
        "Timeout acquiring a connection. The pool is probably full. \
         Are you missing a transaction handle on a query inside a transaction?"
    )]
    PoolTimeout,

    /// A raw driver error, decorated with the interpolated SQL for diagnosability.
    #[error("Query error: {message} - {sql}")]
    Query {
        message: String,
        sql: String,
        bindings: Vec<Value>,
    },

    /// A statement exceeded its configured timeout.
    #[error("Defined query timeout of {timeout:?} exceeded when running query: {sql}")]
    QueryTimeout {
        sql: String,
        bindings: Vec<Value>,
        timeout: Duration,
        /// Whether the in-flight query was successfully cancelled.
        cancelled: bool,
    },

    /// Cancelling a timed-out query itself failed; carries both outcomes.
    #[error("After query timeout of {timeout:?} exceeded, cancelling of query failed: {cause}")]
    CancelFailed { timeout: Duration, cause: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A query was issued against a transaction that already committed or
    /// rolled back.
    #[error("Transaction query already complete, attach an event sink to the client for more info")]
    TransactionCompleted,

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Fails immediately and loudly at client-construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for quarry operations
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Error reported by a native driver across the driver boundary.
///
/// Carries the driver's own error code (e.g. a MySQL errno or an ORA- prefix)
/// so dialects can classify it without parsing message text.
#[derive(Debug, Clone)]
pub struct DriverError {
    pub message: String,
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}
