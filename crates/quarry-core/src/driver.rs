//! Driver capability boundary
//!
//! Quarry never speaks a database wire protocol itself. Each dialect supplies
//! a `Driver` implementation that can open connections; everything else goes
//! through the `DriverConnection` trait on the opened handle.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DriverError, Row};

/// Settings for opening connections to one database profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Host address (empty for file-based databases)
    #[serde(default)]
    pub host: String,
    /// Port number (0 for default or file-based)
    #[serde(default)]
    pub port: u16,
    /// Database name or file path
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Additional driver parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionSettings {
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }
}

/// Command classification of a driver response, where the driver reports one
/// (Postgres-style command tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// Raw response shape handed back across the driver boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverResponse {
    pub command: Command,
    pub rows: Vec<Row>,
    pub affected_rows: u64,
    pub last_insert_id: Option<i64>,
}

impl DriverResponse {
    pub fn empty(command: Command) -> Self {
        Self {
            command,
            rows: Vec::new(),
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            command: Command::Select,
            rows,
            affected_rows: 0,
            last_insert_id: None,
        }
    }
}

/// Push-style sink that a streamed query feeds rows into.
#[async_trait]
pub trait RowSink: Send {
    async fn send(&mut self, row: Row) -> std::result::Result<(), DriverError>;
}

#[async_trait]
impl RowSink for tokio::sync::mpsc::Sender<Row> {
    async fn send(&mut self, row: Row) -> std::result::Result<(), DriverError> {
        tokio::sync::mpsc::Sender::send(self, row)
            .await
            .map_err(|_| DriverError::new("row sink closed"))
    }
}

/// A connection opened by a driver.
///
/// The pool exclusively owns a connection between leases; whichever runner or
/// transaction leased it owns it for the loan's duration.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Execute SQL with positional bindings already rewritten into the
    /// dialect's native placeholder syntax.
    async fn query(
        &self,
        sql: &str,
        bindings: &[crate::Value],
    ) -> std::result::Result<DriverResponse, DriverError>;

    /// Stream a result set into `sink`, resolving when the stream ends.
    async fn stream(
        &self,
        _sql: &str,
        _bindings: &[crate::Value],
        _sink: &mut dyn RowSink,
    ) -> std::result::Result<(), DriverError> {
        Err(DriverError::new("streaming not supported by this driver"))
    }

    /// Close the connection. Must tolerate an already-broken connection.
    async fn close(&self) -> std::result::Result<(), DriverError>;

    /// Dialect-specific liveness check used by pool validation.
    fn is_alive(&self) -> bool;

    /// Driver-side session identifier, used by dialects that cancel queries
    /// through a side-channel kill command (e.g. MySQL's thread id).
    fn session_id(&self) -> Option<i64> {
        None
    }

    /// Toggle driver-level autocommit. Only meaningful for dialects whose
    /// transactions are driven this way (Oracle) rather than by BEGIN.
    async fn set_auto_commit(&self, _enabled: bool) -> std::result::Result<(), DriverError> {
        Err(DriverError::new("autocommit toggling not supported by this driver"))
    }

    /// Driver-level commit, for autocommit-toggle dialects.
    async fn commit(&self) -> std::result::Result<(), DriverError> {
        Err(DriverError::new("driver-level commit not supported"))
    }

    /// Driver-level rollback, for autocommit-toggle dialects.
    async fn rollback(&self) -> std::result::Result<(), DriverError> {
        Err(DriverError::new("driver-level rollback not supported"))
    }
}

/// Factory side of the driver boundary: opens raw connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver identifier (e.g. "pg", "mysql", "sqlite3")
    fn name(&self) -> &'static str;

    /// Open a raw connection.
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> std::result::Result<Box<dyn DriverConnection>, DriverError>;
}
