//! Statement runner
//!
//! Bridges compilation and execution: compiles a builder AST into its
//! statement sequence, leases a connection (or borrows the transaction's),
//! runs the statements strictly in order on that one connection, and
//! releases the lease on every exit path.

use std::time::Duration;

use quarry_compiler::{QueryAst, QueryCompiler, SchemaAst, SchemaCompiler};
use quarry_core::{
    Method, QuarryError, QueryEvent, QueryOutcome, Result, RowSink, Statement,
};
use uuid::Uuid;

use crate::client::Client;
use crate::pool::ConnectionLease;
use crate::transaction::Transaction;


/// Connection custody for one run: leased from the pool, or borrowed from
/// the enclosing transaction.
enum Loan<'a> {
    Pooled(ConnectionLease),
    Borrowed(&'a ConnectionLease),
}

impl Loan<'_> {
    fn lease(&self) -> &ConnectionLease {
        match self {
            Loan::Pooled(lease) => lease,
            Loan::Borrowed(lease) => lease,
        }
    }
}

/// Executes one compiled target against one connection.
pub struct Runner<'a> {
    client: &'a Client,
    tx: Option<&'a Transaction>,
}

impl<'a> Runner<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client, tx: None }
    }

    /// A runner whose statements go out on the transaction's connection and
    /// carry its transaction id.
    pub fn for_transaction(client: &'a Client, tx: &'a Transaction) -> Self {
        Self {
            client,
            tx: Some(tx),
        }
    }

    /// Compile and run a query AST, returning one normalized outcome per
    /// compiled statement.
    pub async fn run(&self, ast: &QueryAst) -> Result<Vec<QueryOutcome>> {
        let statements = QueryCompiler::new(self.client.dialect(), self.client.policy(), ast)
            .with_database(self.client.settings().database())
            .compile()?;
        self.run_statements(statements).await
    }

    /// Compile and run a schema AST.
    pub async fn run_schema(&self, ast: &SchemaAst) -> Result<Vec<QueryOutcome>> {
        let statements =
            SchemaCompiler::new(self.client.dialect(), self.client.policy()).compile(ast)?;
        self.run_statements(statements).await
    }

    /// Compile a query AST and stream its rows into `sink`. Only targets
    /// that compile to exactly one statement can stream.
    pub async fn stream(&self, ast: &QueryAst, sink: &mut dyn RowSink) -> Result<()> {
        let statements = QueryCompiler::new(self.client.dialect(), self.client.policy(), ast)
            .with_database(self.client.settings().database())
            .compile()?;
        let [stmt] = statements.as_slice() else {
            return Err(QuarryError::NotSupported(
                "streaming requires the target to compile to exactly one statement".into(),
            ));
        };

        let loan = self.loan().await?;
        let result = self
            .client
            .stream(loan.lease(), stmt, sink, self.tx_id())
            .await;
        if let Loan::Pooled(lease) = loan {
            lease.release().await;
        }
        result
    }

    async fn run_statements(&self, statements: Vec<Statement>) -> Result<Vec<QueryOutcome>> {
        let loan = self.loan().await?;
        let result = self.execute_all(loan.lease(), &statements).await;
        if let Loan::Pooled(lease) = loan {
            lease.release().await;
        }
        result
    }

    async fn loan(&self) -> Result<Loan<'a>> {
        match self.tx {
            Some(tx) => {
                if tx.is_completed() {
                    return Err(QuarryError::TransactionCompleted);
                }
                Ok(Loan::Borrowed(tx.lease()))
            }
            None => Ok(Loan::Pooled(self.client.acquire().await?)),
        }
    }

    fn tx_id(&self) -> Option<Uuid> {
        self.tx.map(Transaction::id)
    }

    async fn execute_all(
        &self,
        lease: &ConnectionLease,
        statements: &[Statement],
    ) -> Result<Vec<QueryOutcome>> {
        let tx_id = self.tx_id();
        self.client.emit(QueryEvent::Start {
            lease_id: lease.lease_id(),
            tx_id,
        });

        let mut outcomes = Vec::with_capacity(statements.len());
        for stmt in statements {
            if stmt.is_empty() {
                // zero-row insert sentinel, nothing reaches the driver
                outcomes.push(match stmt.method {
                    Method::Insert => QueryOutcome::Inserted(Vec::new()),
                    _ => QueryOutcome::Affected(0),
                });
                continue;
            }
            match self.execute_one(lease, stmt, tx_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) if stmt.ignores_errors() => {
                    tracing::warn!(error = %err, sql = %stmt.sql, "ignoring failed side statement");
                    outcomes.push(QueryOutcome::Affected(0));
                }
                Err(err) => return Err(err),
            }
        }

        self.client.emit(QueryEvent::End {
            lease_id: lease.lease_id(),
            tx_id,
        });
        Ok(outcomes)
    }

    async fn execute_one(
        &self,
        lease: &ConnectionLease,
        stmt: &Statement,
        tx_id: Option<Uuid>,
    ) -> Result<QueryOutcome> {
        let resp = match stmt.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.client.query(lease, stmt, tx_id)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(self.handle_timeout(lease, stmt, timeout).await),
                }
            }
            None => self.client.query(lease, stmt, tx_id).await?,
        };
        let outcome = self.client.process_response(stmt, resp)?;
        self.client.emit(QueryEvent::QueryResponse {
            lease_id: lease.lease_id(),
            tx_id,
            sql: stmt.sql.clone(),
        });
        Ok(outcome)
    }

    /// A statement overran its timeout. The connection has an abandoned
    /// query in flight and must never return to the pool; when the caller
    /// opted in and the dialect supports it, the query is additionally
    /// killed through a side connection.
    async fn handle_timeout(
        &self,
        lease: &ConnectionLease,
        stmt: &Statement,
        timeout: Duration,
    ) -> QuarryError {
        lease.dispose();
        if stmt.cancel_on_timeout && self.client.dialect().can_cancel_query() {
            match self.client.cancel_query(lease).await {
                Ok(()) => QuarryError::QueryTimeout {
                    sql: stmt.sql.clone(),
                    bindings: stmt.bindings.clone(),
                    timeout,
                    cancelled: true,
                },
                Err(cause) => QuarryError::CancelFailed {
                    timeout,
                    cause: cause.to_string(),
                },
            }
        } else {
            QuarryError::QueryTimeout {
                sql: stmt.sql.clone(),
                bindings: stmt.bindings.clone(),
                timeout,
                cancelled: false,
            }
        }
    }
}
