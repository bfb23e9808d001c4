//! Transaction engine
//!
//! A transaction owns one connection lease for its whole lifetime; every
//! statement issued through it runs on that connection. Completion happens
//! exactly once: committing or rolling back a finished transaction, or
//! querying through it, fails rather than touching the connection again.
//!
//! Nested transactions reuse the outermost connection through savepoints.
//! Dialects whose transactions ride the driver's autocommit flag (Oracle)
//! get the flag toggled off at begin and restored at completion.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use quarry_compiler::{QueryAst, SchemaAst, TransactionStyle};
use quarry_core::{
    DriverConnection, DriverError, QuarryError, QueryOutcome, Result, RowSink,
};
use uuid::Uuid;

use crate::client::Client;
use crate::pool::ConnectionLease;
use crate::runner::Runner;

#[cfg(test)]
mod tests;

/// Lifecycle of a transaction. Transitions run strictly forward; the two
/// terminal states are `Committed` and `RolledBack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Created,
    Connecting,
    Active,
    Completing,
    Committed,
    RolledBack,
}

/// Which connection a transaction runs on.
enum TxConnection {
    /// Root transaction holding its own lease (pooled or external).
    Own(ConnectionLease),
    /// Nested transaction sharing the outer transaction's connection.
    Parent(Arc<Transaction>),
}

pub struct Transaction {
    client: Arc<Client>,
    id: Uuid,
    connection: TxConnection,
    /// Savepoint name for nested transactions; `None` for roots and for
    /// nested transactions on dialects without savepoint support.
    savepoint: Option<String>,
    state: Mutex<TxState>,
    completed: AtomicBool,
}

impl Transaction {
    pub(crate) async fn begin(
        client: Arc<Client>,
        parent: Option<Arc<Transaction>>,
        external: Option<Arc<dyn DriverConnection>>,
    ) -> Result<Arc<Self>> {
        let id = Uuid::new_v4();
        let dialect = client.dialect();

        let savepoint = match &parent {
            Some(_) if dialect.supports_savepoints() => {
                Some(format!("trx_{}", &id.simple().to_string()[..8]))
            }
            Some(_) => {
                tracing::warn!(
                    dialect = dialect.name(),
                    "savepoints are not supported by this dialect, nested transaction is a no-op"
                );
                None
            }
            None => None,
        };

        let connection = match (parent, external) {
            (Some(parent), _) => TxConnection::Parent(parent),
            (None, Some(conn)) => TxConnection::Own(ConnectionLease::external(conn)),
            (None, None) => TxConnection::Own(client.acquire().await?),
        };

        let trx = Arc::new(Self {
            client,
            id,
            connection,
            savepoint,
            state: Mutex::new(TxState::Created),
            completed: AtomicBool::new(false),
        });

        *trx.state.lock() = TxState::Connecting;
        if let Err(err) = trx.start().await {
            // never half-open: a failed begin retires the transaction and
            // its connection immediately
            trx.completed.store(true, Ordering::SeqCst);
            *trx.state.lock() = TxState::RolledBack;
            trx.lease().dispose();
            return Err(err);
        }
        *trx.state.lock() = TxState::Active;
        Ok(trx)
    }

    /// Issue the opening statement: SAVEPOINT for nested transactions,
    /// BEGIN (or the autocommit toggle) for roots.
    async fn start(&self) -> Result<()> {
        let dialect = self.client.dialect();
        if self.is_nested() {
            return match &self.savepoint {
                Some(name) => self
                    .execute_control(&dialect.savepoint_sql(name))
                    .await
                    .map_err(|err| QuarryError::Transaction(err.to_string())),
                None => Ok(()),
            };
        }
        match dialect.transaction_style() {
            TransactionStyle::Sql => match dialect.begin_sql() {
                Some(sql) => self
                    .execute_control(sql)
                    .await
                    .map_err(|err| QuarryError::Transaction(err.to_string())),
                None => Ok(()),
            },
            TransactionStyle::DriverAutocommit => self
                .lease()
                .connection()
                .set_auto_commit(false)
                .await
                .map_err(|err| QuarryError::Transaction(err.to_string())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    fn is_nested(&self) -> bool {
        matches!(self.connection, TxConnection::Parent(_))
    }

    /// The connection every statement of this transaction runs on: nested
    /// transactions delegate to the outermost holder.
    pub(crate) fn lease(&self) -> &ConnectionLease {
        match &self.connection {
            TxConnection::Own(lease) => lease,
            TxConnection::Parent(parent) => parent.lease(),
        }
    }

    pub fn runner(&self) -> Runner<'_> {
        Runner::for_transaction(&self.client, self)
    }

    /// Compile and run a query AST on this transaction's connection.
    pub async fn query(&self, ast: &QueryAst) -> Result<Vec<QueryOutcome>> {
        self.runner().run(ast).await
    }

    /// Compile and run a schema AST on this transaction's connection.
    pub async fn run_schema(&self, ast: &SchemaAst) -> Result<Vec<QueryOutcome>> {
        self.runner().run_schema(ast).await
    }

    /// Stream a query's rows from this transaction's connection.
    pub async fn stream(&self, ast: &QueryAst, sink: &mut dyn RowSink) -> Result<()> {
        self.runner().stream(ast, sink).await
    }

    /// Open a nested transaction on this transaction's connection.
    pub async fn transaction<T, F, Fut>(self: &Arc<Self>, scope: F) -> Result<T>
    where
        F: FnOnce(Arc<Transaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_completed() {
            return Err(QuarryError::TransactionCompleted);
        }
        let inner = Transaction::begin(self.client.clone(), Some(self.clone()), None).await?;
        Transaction::scope(inner, scope).await
    }

    /// Run `scope` and complete the transaction from its outcome: `Ok`
    /// commits, `Err` rolls back and re-throws. A transaction the scope
    /// already completed itself is left alone.
    pub(crate) async fn scope<T, F, Fut>(trx: Arc<Transaction>, scope: F) -> Result<T>
    where
        F: FnOnce(Arc<Transaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match scope(trx.clone()).await {
            Ok(value) => {
                if !trx.is_completed() {
                    trx.commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                if !trx.is_completed() {
                    if let Err(rollback_err) = trx.rollback().await {
                        return Err(QuarryError::Transaction(format!(
                            "{err}; rollback also failed: {rollback_err}"
                        )));
                    }
                }
                Err(err)
            }
        }
    }

    /// Commit the transaction's work.
    ///
    /// A nested transaction commits without touching the connection; its
    /// writes stay pending until the outermost transaction commits.
    pub async fn commit(&self) -> Result<()> {
        self.begin_completion()?;
        let dialect = self.client.dialect();
        if !self.is_nested() {
            match dialect.transaction_style() {
                TransactionStyle::Sql => {
                    if let Err(err) = self.execute_control(dialect.commit_sql()).await {
                        self.finish(TxState::RolledBack);
                        return Err(QuarryError::Transaction(err.to_string()));
                    }
                }
                TransactionStyle::DriverAutocommit => {
                    let result = self.lease().connection().commit().await;
                    self.restore_autocommit().await;
                    if let Err(err) = result {
                        self.finish(TxState::RolledBack);
                        return Err(QuarryError::Transaction(err.to_string()));
                    }
                }
            }
        }
        self.finish(TxState::Committed);
        tracing::debug!(id = %self.id, "transaction committed");
        Ok(())
    }

    /// Roll the transaction's work back: ROLLBACK TO SAVEPOINT for nested
    /// transactions, ROLLBACK (or the driver-level rollback) for roots.
    pub async fn rollback(&self) -> Result<()> {
        self.begin_completion()?;
        let dialect = self.client.dialect();

        let result = if self.is_nested() {
            match &self.savepoint {
                Some(name) => {
                    self.execute_control(&dialect.rollback_to_savepoint_sql(name))
                        .await
                }
                None => Ok(()),
            }
        } else {
            match dialect.transaction_style() {
                TransactionStyle::Sql => self.execute_control(dialect.rollback_sql()).await,
                TransactionStyle::DriverAutocommit => {
                    let result = self.lease().connection().rollback().await;
                    self.restore_autocommit().await;
                    result.map(|_| ())
                }
            }
        };

        match result {
            Ok(()) => {
                self.finish(TxState::RolledBack);
                tracing::debug!(id = %self.id, "transaction rolled back");
                Ok(())
            }
            Err(err) if dialect.is_implicit_commit_error(&err) => {
                // a statement inside the transaction (MySQL DDL) already
                // committed it; there is nothing left to roll back
                tracing::warn!(
                    id = %self.id,
                    "transaction was implicitly committed by an earlier statement, rollback skipped"
                );
                self.finish(TxState::Committed);
                Ok(())
            }
            Err(err) => {
                self.lease().dispose();
                self.finish(TxState::RolledBack);
                Err(QuarryError::Transaction(err.to_string()))
            }
        }
    }

    /// Flip the one-shot completion flag, rejecting a second completion.
    fn begin_completion(&self) -> Result<()> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Err(QuarryError::TransactionCompleted);
        }
        *self.state.lock() = TxState::Completing;
        Ok(())
    }

    fn finish(&self, state: TxState) {
        *self.state.lock() = state;
    }

    /// Run a transaction-control statement on the transaction's connection.
    /// Returns the raw driver error so callers can consult the dialect's
    /// error classification.
    async fn execute_control(&self, sql: &str) -> std::result::Result<(), DriverError> {
        tracing::debug!(id = %self.id, sql, "transaction control");
        match self.lease().connection().query(sql, &[]).await {
            Ok(_) => Ok(()),
            Err(err) => {
                if self.client.dialect().is_connection_error(&err) {
                    self.lease().dispose();
                }
                Err(err)
            }
        }
    }

    async fn restore_autocommit(&self) {
        if let Err(err) = self.lease().connection().set_auto_commit(true).await {
            tracing::warn!(error = %err, "failed to restore autocommit after transaction");
        }
    }
}

impl Drop for Transaction {
    /// A transaction abandoned without commit or rollback (scope future
    /// dropped mid-flight) still has an open transaction on the server.
    /// The connection is retired from the pool immediately and a detached
    /// task rolls the work back and closes it.
    fn drop(&mut self) {
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(
            id = %self.id,
            "transaction dropped without commit or rollback, rolling back"
        );
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.lease().dispose();
            return;
        };
        match &self.connection {
            TxConnection::Own(lease) => {
                lease.dispose();
                let Some(conn) = lease.connection_handle() else {
                    return;
                };
                let external = lease.is_external();
                let style = self.client.dialect().transaction_style();
                let rollback_sql = self.client.dialect().rollback_sql().to_string();
                handle.spawn(async move {
                    let result = match style {
                        TransactionStyle::Sql => {
                            conn.query(&rollback_sql, &[]).await.map(|_| ())
                        }
                        TransactionStyle::DriverAutocommit => conn.rollback().await,
                    };
                    if let Err(err) = result {
                        tracing::warn!(error = %err, "rollback of abandoned transaction failed");
                    }
                    // external connections stay in caller custody
                    if !external {
                        if let Err(err) = conn.close().await {
                            tracing::warn!(error = %err, "error closing abandoned transaction connection");
                        }
                    }
                });
            }
            TxConnection::Parent(parent) => {
                let Some(name) = &self.savepoint else {
                    return;
                };
                let Some(conn) = parent.lease().connection_handle() else {
                    return;
                };
                let sql = self.client.dialect().rollback_to_savepoint_sql(name);
                handle.spawn(async move {
                    if let Err(err) = conn.query(&sql, &[]).await {
                        tracing::warn!(error = %err, "rollback of abandoned savepoint failed");
                    }
                });
            }
        }
    }
}

impl Client {
    /// Run `scope` inside a transaction on a pooled connection. The scope's
    /// `Ok` commits and resolves to its value; its `Err` rolls back and is
    /// re-thrown.
    pub async fn transaction<T, F, Fut>(self: &Arc<Self>, scope: F) -> Result<T>
    where
        F: FnOnce(Arc<Transaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trx = Transaction::begin(self.clone(), None, None).await?;
        Transaction::scope(trx, scope).await
    }

    /// Run `scope` inside a transaction on a caller-supplied connection.
    /// The connection never enters the pool; custody returns to the caller
    /// when the transaction completes.
    pub async fn transaction_with_connection<T, F, Fut>(
        self: &Arc<Self>,
        connection: Arc<dyn DriverConnection>,
        scope: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<Transaction>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trx = Transaction::begin(self.clone(), None, Some(connection)).await?;
        Transaction::scope(trx, scope).await
    }
}
