//! Dialect client
//!
//! One `Client` per connection profile: it owns the pool, the dialect
//! reference, the formatting policy and the event sink, and carries every
//! statement across the driver boundary. Compilation and execution planning
//! live in the runner; the client is the single place where driver errors
//! are decorated and lifecycle events are emitted.

use std::sync::Arc;
use std::time::Duration;

use quarry_compiler::{FormatPolicy, SqlDialect, WrapIdentifierHook, dialect, format_query};
use quarry_core::{
    ConnectionSettings, Driver, DriverError, DriverResponse, EventSink, NullSink, QuarryError,
    QueryEvent, QueryOutcome, Result, RowSink, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pool::{AfterCreateHook, ConnectionLease, ConnectionPool, DriverFactory, PoolConfig};


/// Budget for opening the side connection that carries a kill command.
const CANCEL_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

fn default_acquire_timeout_ms() -> u64 {
    60_000
}

/// Post-processing hook applied to every normalized outcome before it is
/// handed back to the caller.
pub type PostProcessHook = Arc<dyn Fn(QueryOutcome) -> QueryOutcome + Send + Sync>;

/// Declarative client configuration for one connection profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Registered dialect name ("pg", "mysql", "sqlite3", ...)
    pub dialect: String,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub pool: PoolConfig,
    /// Client-level acquire timeout; the pool override can only tighten it.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_connection_timeout_ms: u64,
    /// Bind NULL for insert cells the caller did not provide, instead of
    /// the DEFAULT keyword.
    #[serde(default)]
    pub use_null_as_default: bool,
}

impl ClientConfig {
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            connection: ConnectionSettings::default(),
            pool: PoolConfig::default(),
            acquire_connection_timeout_ms: default_acquire_timeout_ms(),
            use_null_as_default: false,
        }
    }

    pub fn with_connection(mut self, settings: ConnectionSettings) -> Self {
        self.connection = settings;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// The execution side of one connection profile.
pub struct Client {
    dialect: &'static dyn SqlDialect,
    driver: Arc<dyn Driver>,
    settings: ConnectionSettings,
    policy: FormatPolicy,
    pool: ConnectionPool,
    acquire_timeout: Duration,
    post_process: Option<PostProcessHook>,
    events: Arc<dyn EventSink>,
}

impl Client {
    /// Build a client for a registered dialect. Unknown dialect names fail
    /// here, before any connection is attempted.
    pub fn new(config: ClientConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        let dialect = dialect(&config.dialect).ok_or_else(|| {
            QuarryError::Configuration(format!("unknown dialect `{}`", config.dialect))
        })?;
        let policy = if config.use_null_as_default {
            FormatPolicy::use_null_as_default()
        } else {
            FormatPolicy::default()
        };
        let acquire_timeout = Duration::from_millis(config.acquire_connection_timeout_ms);
        let factory = DriverFactory::new(driver.clone(), config.connection.clone());
        let pool = ConnectionPool::new(config.pool, acquire_timeout, factory);
        Ok(Self {
            dialect,
            driver,
            settings: config.connection,
            policy,
            pool,
            acquire_timeout,
            post_process: None,
            events: Arc::new(NullSink),
        })
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_wrap_identifier(mut self, hook: WrapIdentifierHook) -> Self {
        self.policy.wrap_identifier = Some(hook);
        self
    }

    pub fn with_post_process(mut self, hook: PostProcessHook) -> Self {
        self.post_process = Some(hook);
        self
    }

    /// Install a hook run against every freshly opened pooled connection.
    /// Rebuilds the pool, so call this before any acquire.
    pub fn with_after_create(mut self, hook: AfterCreateHook) -> Self {
        let factory = DriverFactory::new(self.driver.clone(), self.settings.clone())
            .with_after_create(hook);
        self.pool = ConnectionPool::new(self.pool.config().clone(), self.acquire_timeout, factory);
        self
    }

    pub fn dialect(&self) -> &'static dyn SqlDialect {
        self.dialect
    }

    pub fn policy(&self) -> &FormatPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) fn emit(&self, event: QueryEvent) {
        self.events.on_event(&event);
    }

    /// Lease a connection from the pool.
    pub async fn acquire(&self) -> Result<ConnectionLease> {
        self.pool.acquire().await
    }

    /// Open connections ahead of demand until the pool holds `pool.min`.
    ///
    /// Construction opens no connections and the pool otherwise grows only
    /// as leases are acquired; call this once after building the client to
    /// honor the configured minimum up front.
    pub async fn warm_up(&self) -> Result<()> {
        self.pool.warm_up().await
    }

    /// Execute one compiled statement on a leased connection.
    ///
    /// Bindings are rewritten into the dialect's native placeholder syntax
    /// on the way out. Driver errors come back decorated with the
    /// interpolated SQL; errors the dialect recognizes as fatal to the
    /// connection additionally mark the lease disposed.
    pub async fn query(
        &self,
        lease: &ConnectionLease,
        stmt: &Statement,
        tx_id: Option<Uuid>,
    ) -> Result<DriverResponse> {
        self.emit(QueryEvent::Query {
            lease_id: lease.lease_id(),
            tx_id,
            sql: stmt.sql.clone(),
            bindings: stmt.bindings.clone(),
        });
        let sql = self.dialect.position_bindings(&stmt.sql);
        tracing::debug!(dialect = self.dialect.name(), sql = %sql, "executing statement");
        match lease.connection().query(&sql, &stmt.bindings).await {
            Ok(resp) => Ok(resp),
            Err(err) => Err(self.decorate_error(lease, stmt, tx_id, err)),
        }
    }

    /// Stream one compiled statement's result set into `sink`.
    pub async fn stream(
        &self,
        lease: &ConnectionLease,
        stmt: &Statement,
        sink: &mut dyn RowSink,
        tx_id: Option<Uuid>,
    ) -> Result<()> {
        self.emit(QueryEvent::Query {
            lease_id: lease.lease_id(),
            tx_id,
            sql: stmt.sql.clone(),
            bindings: stmt.bindings.clone(),
        });
        let sql = self.dialect.position_bindings(&stmt.sql);
        match lease.connection().stream(&sql, &stmt.bindings, sink).await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.decorate_error(lease, stmt, tx_id, err)),
        }
    }

    fn decorate_error(
        &self,
        lease: &ConnectionLease,
        stmt: &Statement,
        tx_id: Option<Uuid>,
        err: DriverError,
    ) -> QuarryError {
        if self.dialect.is_connection_error(&err) {
            tracing::warn!(
                dialect = self.dialect.name(),
                error = %err,
                "connection-fatal driver error, disposing lease"
            );
            lease.dispose();
        }
        self.emit(QueryEvent::QueryError {
            lease_id: lease.lease_id(),
            tx_id,
            sql: stmt.sql.clone(),
            message: err.to_string(),
        });
        QuarryError::Query {
            message: err.to_string(),
            sql: format_query(self.dialect, &stmt.sql, &stmt.bindings),
            bindings: stmt.bindings.clone(),
        }
    }

    /// Normalize a raw driver response through the dialect and the optional
    /// client-level post-processing hook.
    pub fn process_response(&self, stmt: &Statement, resp: DriverResponse) -> Result<QueryOutcome> {
        let outcome = self.dialect.process_response(stmt, resp)?;
        Ok(match &self.post_process {
            Some(hook) => hook(outcome),
            None => outcome,
        })
    }

    /// Cancel the query currently running on `lease`.
    ///
    /// The leased connection is mid-query and cannot carry the kill command
    /// itself, so a short-lived side connection is opened for it and always
    /// closed again, whether or not the kill succeeds.
    pub async fn cancel_query(&self, lease: &ConnectionLease) -> Result<()> {
        if !self.dialect.can_cancel_query() {
            return Err(QuarryError::NotSupported(format!(
                "query cancelling is not supported by the {} dialect",
                self.dialect.name()
            )));
        }
        let session_id = lease.connection().session_id().ok_or_else(|| {
            QuarryError::Connection("connection reports no session id to cancel".into())
        })?;
        let kill = self
            .dialect
            .kill_query_statement(session_id)?
            .ok_or_else(|| {
                QuarryError::NotSupported(format!(
                    "the {} dialect has no kill statement",
                    self.dialect.name()
                ))
            })?;

        let side = tokio::time::timeout(CANCEL_CONNECT_TIMEOUT, self.driver.connect(&self.settings))
            .await
            .map_err(|_| {
                QuarryError::Connection("timed out opening cancellation connection".into())
            })?
            .map_err(|err| QuarryError::Connection(err.to_string()))?;

        let sql = self.dialect.position_bindings(&kill.sql);
        let result = side.query(&sql, &kill.bindings).await;
        if let Err(err) = side.close().await {
            tracing::warn!(error = %err, "error closing cancellation connection");
        }
        result
            .map(|_| ())
            .map_err(|err| QuarryError::Connection(err.to_string()))
    }

    /// Tear the client down: close every idle connection and refuse further
    /// acquires.
    pub async fn destroy(&self) {
        self.pool.destroy().await;
    }
}
