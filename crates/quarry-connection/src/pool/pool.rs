//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{
    ConnectionSettings, Driver, DriverConnection, QuarryError, Result,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Delay between creation retries when `propagate_create_error` is off.
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Hook run against every freshly opened connection before it enters
/// circulation (session variables, search path, pragmas).
pub type AfterCreateHook = Arc<dyn Fn(&dyn DriverConnection) -> Result<()> + Send + Sync>;

/// Factory trait for creating and retiring pooled connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection.
    async fn create(&self) -> Result<Arc<dyn DriverConnection>>;

    /// Check that an idle connection is still usable before handing it out.
    async fn validate(&self, conn: &dyn DriverConnection) -> bool {
        conn.is_alive()
    }

    /// Close a connection leaving the pool. Must tolerate a connection that
    /// is already broken.
    async fn destroy(&self, conn: Arc<dyn DriverConnection>) {
        if let Err(err) = conn.close().await {
            tracing::warn!(error = %err, "error closing connection evicted from pool");
        }
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn DriverConnection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn DriverConnection) -> bool {
        (**self).validate(conn).await
    }

    async fn destroy(&self, conn: Arc<dyn DriverConnection>) {
        (**self).destroy(conn).await
    }
}

/// Factory that opens connections through a dialect driver, with an optional
/// post-creation hook.
pub struct DriverFactory {
    driver: Arc<dyn Driver>,
    settings: ConnectionSettings,
    after_create: Option<AfterCreateHook>,
}

impl DriverFactory {
    pub fn new(driver: Arc<dyn Driver>, settings: ConnectionSettings) -> Self {
        Self {
            driver,
            settings,
            after_create: None,
        }
    }

    pub fn with_after_create(mut self, hook: AfterCreateHook) -> Self {
        self.after_create = Some(hook);
        self
    }
}

#[async_trait]
impl ConnectionFactory for DriverFactory {
    async fn create(&self) -> Result<Arc<dyn DriverConnection>> {
        let connection: Arc<dyn DriverConnection> = Arc::from(
            self.driver
                .connect(&self.settings)
                .await
                .map_err(|err| QuarryError::Connection(err.to_string()))?,
        );
        if let Some(hook) = &self.after_create {
            hook(connection.as_ref())?;
        }
        Ok(connection)
    }
}

struct PoolShared {
    config: PoolConfig,
    /// Effective acquire timeout, already reduced against the client-level
    /// default.
    acquire_timeout: Duration,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<Arc<dyn DriverConnection>>>,
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    closed: AtomicBool,
}

/// A pool of driver connections.
///
/// Acquisition hands out a `ConnectionLease` carrying a fresh lease id; a
/// semaphore caps the number of outstanding leases at `config.max`, so a
/// connection is never leased to two holders at once.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    pub fn new<F: ConnectionFactory>(
        config: PoolConfig,
        client_acquire_timeout: Duration,
        factory: F,
    ) -> Self {
        let acquire_timeout = config.acquire_timeout(client_acquire_timeout);
        let semaphore = Arc::new(Semaphore::new(config.max));
        Self {
            shared: Arc::new(PoolShared {
                config,
                acquire_timeout,
                factory: Arc::new(factory),
                idle: Mutex::new(VecDeque::new()),
                semaphore,
                active_count: AtomicUsize::new(0),
                waiting_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Lease a connection from the pool.
    ///
    /// Idle connections are validated and reused; otherwise a new one is
    /// created, up to `config.max` outstanding. When the pool is exhausted
    /// the acquirer waits, and a wait longer than the effective acquire
    /// timeout fails with `QuarryError::PoolTimeout`.
    pub async fn acquire(&self) -> Result<ConnectionLease> {
        if self.shared.config.max == 0 {
            return Err(QuarryError::Connection(
                "pool is disabled (max = 0), no connections can be acquired".into(),
            ));
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(QuarryError::Connection("pool has been destroyed".into()));
        }

        self.shared.waiting_count.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(self.shared.acquire_timeout, self.acquire_inner()).await;
        self.shared.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(lease) => lease,
            Err(_) => Err(QuarryError::PoolTimeout),
        }
    }

    async fn acquire_inner(&self) -> Result<ConnectionLease> {
        let permit = self
            .shared
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QuarryError::Connection("pool semaphore closed".into()))?;

        let connection = match self.try_get_idle().await {
            Some(conn) => conn,
            None => self.create_connection().await?,
        };

        self.shared.active_count.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionLease {
            connection: Some(connection),
            lease_id: Uuid::new_v4(),
            disposed: AtomicBool::new(false),
            pool: Some(self.shared.clone()),
            _permit: Some(permit),
        })
    }

    /// Pop idle connections until one validates; failures are destroyed.
    async fn try_get_idle(&self) -> Option<Arc<dyn DriverConnection>> {
        loop {
            let connection = { self.shared.idle.lock().pop_front() };
            match connection {
                Some(conn) => {
                    if self.shared.factory.validate(conn.as_ref()).await {
                        return Some(conn);
                    }
                    tracing::debug!("evicting idle connection that failed validation");
                    self.shared.factory.destroy(conn).await;
                }
                None => return None,
            }
        }
    }

    async fn create_connection(&self) -> Result<Arc<dyn DriverConnection>> {
        loop {
            match self.shared.factory.create().await {
                Ok(conn) => return Ok(conn),
                Err(err) if self.shared.config.propagate_create_error => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "connection creation failed, retrying");
                    tokio::time::sleep(CREATE_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Pre-open connections until the pool holds `config.min` of them.
    pub async fn warm_up(&self) -> Result<()> {
        let target = self.shared.config.min.min(self.shared.config.max);
        loop {
            if self.stats().total() >= target {
                return Ok(());
            }
            let connection = self.create_connection().await?;
            self.shared.idle.lock().push_back(connection);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.idle.lock().len();
        let active = self.shared.active_count.load(Ordering::SeqCst);
        let waiting = self.shared.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle + active, idle, active, waiting)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Close every idle connection and refuse all further acquires.
    /// Outstanding leases are closed as they come back.
    pub async fn destroy(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let connections: Vec<_> = { self.shared.idle.lock().drain(..).collect() };
        for conn in connections {
            self.shared.factory.destroy(conn).await;
        }
    }
}

/// A connection leased from the pool, or an externally supplied connection
/// wrapped in the same guard.
///
/// Prefer `release().await` when done: it closes disposed connections
/// properly. Dropping the lease instead still returns a healthy connection
/// to the pool but lets a disposed one fall out of scope unclosed.
pub struct ConnectionLease {
    connection: Option<Arc<dyn DriverConnection>>,
    lease_id: Uuid,
    disposed: AtomicBool,
    pool: Option<Arc<PoolShared>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionLease {
    /// Wrap a caller-owned connection. It is never returned to any pool;
    /// custody stays with the caller after release.
    pub fn external(connection: Arc<dyn DriverConnection>) -> Self {
        Self {
            connection: Some(connection),
            lease_id: Uuid::new_v4(),
            disposed: AtomicBool::new(false),
            pool: None,
            _permit: None,
        }
    }

    pub fn lease_id(&self) -> Uuid {
        self.lease_id
    }

    pub fn connection(&self) -> &(dyn DriverConnection + 'static) {
        self.connection.as_deref().expect("connection taken")
    }

    /// Shared handle to the underlying connection, for work that must
    /// outlive the lease (rollback of an abandoned transaction).
    pub(crate) fn connection_handle(&self) -> Option<Arc<dyn DriverConnection>> {
        self.connection.clone()
    }

    /// Mark the connection as unfit for reuse; on release it is closed and
    /// evicted instead of returning to the idle queue.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_external(&self) -> bool {
        self.pool.is_none()
    }

    /// Return the connection to its pool, or close it if it was disposed,
    /// broken, or the pool has since been destroyed. External connections
    /// are handed back to their owner untouched.
    pub async fn release(mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };
        let Some(pool) = self.pool.take() else {
            return;
        };
        pool.active_count.fetch_sub(1, Ordering::SeqCst);
        if self.disposed.load(Ordering::SeqCst)
            || pool.closed.load(Ordering::SeqCst)
            || !conn.is_alive()
        {
            pool.factory.destroy(conn).await;
        } else {
            pool.idle.lock().push_back(conn);
        }
        // permit drops with self, freeing the slot
    }
}

impl Deref for ConnectionLease {
    type Target = dyn DriverConnection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };
        let Some(pool) = self.pool.take() else {
            return;
        };
        pool.active_count.fetch_sub(1, Ordering::SeqCst);
        // close() is async and unavailable here; only healthy connections
        // go back to the idle queue
        if !self.disposed.load(Ordering::SeqCst)
            && !pool.closed.load(Ordering::SeqCst)
            && conn.is_alive()
        {
            pool.idle.lock().push_back(conn);
        }
    }
}
