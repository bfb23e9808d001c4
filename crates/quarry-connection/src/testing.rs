//! In-memory driver for exercising the pool, runner and transaction engine
//! without a real database.
//!
//! Replies are scripted per driver and consumed in order across all of the
//! driver's connections; an exhausted script answers every query with an
//! empty response. Every executed statement is recorded for assertion.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{
    Command, ConnectionSettings, Driver, DriverConnection, DriverError, DriverResponse, Row,
    RowSink, Value,
};

/// One scripted reply for a mock query.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(DriverResponse),
    Fail(DriverError),
    /// Sleep before answering; used to trip statement timeouts.
    Hang(Duration),
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<MockReply>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
    connect_count: AtomicUsize,
    closed_count: AtomicUsize,
    fail_connects: AtomicUsize,
    dead_sessions: Mutex<HashSet<i64>>,
    next_session: AtomicI64,
}

/// Driver whose connections answer from a shared scripted reply queue.
#[derive(Default)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for the next unanswered query.
    pub fn push(&self, reply: MockReply) {
        self.state.replies.lock().push_back(reply);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push(MockReply::Respond(DriverResponse::rows(rows)));
    }

    pub fn push_error(&self, error: DriverError) {
        self.push(MockReply::Fail(error));
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make an idle connection report itself dead.
    pub fn kill_session(&self, session_id: i64) {
        self.state.dead_sessions.lock().insert(session_id);
    }

    /// Every statement executed so far, across all connections, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn executed_with_bindings(&self) -> Vec<(String, Vec<Value>)> {
        self.state.executed.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.state.closed_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(
        &self,
        _settings: &ConnectionSettings,
    ) -> std::result::Result<Box<dyn DriverConnection>, DriverError> {
        let remaining = self.state.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::new("scripted connect failure"));
        }
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            session_id: self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1,
            alive: AtomicBool::new(true),
        }))
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
    session_id: i64,
    alive: AtomicBool,
}

impl MockConnection {
    fn record(&self, sql: &str, bindings: &[Value]) {
        self.state
            .executed
            .lock()
            .push((sql.to_string(), bindings.to_vec()));
    }

    fn next_reply(&self) -> Option<MockReply> {
        self.state.replies.lock().pop_front()
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn query(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> std::result::Result<DriverResponse, DriverError> {
        self.record(sql, bindings);
        match self.next_reply() {
            Some(MockReply::Respond(resp)) => Ok(resp),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(DriverResponse::empty(Command::Other))
            }
            None => Ok(DriverResponse::empty(Command::Other)),
        }
    }

    async fn stream(
        &self,
        sql: &str,
        bindings: &[Value],
        sink: &mut dyn RowSink,
    ) -> std::result::Result<(), DriverError> {
        self.record(sql, bindings);
        match self.next_reply() {
            Some(MockReply::Respond(resp)) => {
                for row in resp.rows {
                    sink.send(row).await?;
                }
                Ok(())
            }
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn close(&self) -> std::result::Result<(), DriverError> {
        self.alive.store(false, Ordering::SeqCst);
        self.state.closed_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
            && !self.state.dead_sessions.lock().contains(&self.session_id)
    }

    fn session_id(&self) -> Option<i64> {
        Some(self.session_id)
    }

    async fn set_auto_commit(&self, enabled: bool) -> std::result::Result<(), DriverError> {
        self.record(&format!("#autocommit={}", enabled), &[]);
        Ok(())
    }

    async fn commit(&self) -> std::result::Result<(), DriverError> {
        self.record("#commit", &[]);
        Ok(())
    }

    async fn rollback(&self) -> std::result::Result<(), DriverError> {
        self.record("#rollback", &[]);
        Ok(())
    }
}
