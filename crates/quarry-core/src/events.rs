//! Structured lifecycle events
//!
//! The client and runner emit these through an injected sink instead of a
//! process-wide logger, so embedders can route query telemetry wherever they
//! want. The default sink drops everything.

use std::sync::Arc;

use uuid::Uuid;

use crate::Value;

/// A lifecycle event emitted while running compiled statements.
///
/// Every payload carries the connection's lease id and, when the statement
/// runs inside a transaction, the transaction id.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// A runner began executing a compiled target.
    Start { lease_id: Uuid, tx_id: Option<Uuid> },
    /// A statement is about to be handed to the driver.
    Query {
        lease_id: Uuid,
        tx_id: Option<Uuid>,
        sql: String,
        bindings: Vec<Value>,
    },
    /// A statement completed and its response was post-processed.
    QueryResponse {
        lease_id: Uuid,
        tx_id: Option<Uuid>,
        sql: String,
    },
    /// A statement failed; emitted before the error is re-thrown.
    QueryError {
        lease_id: Uuid,
        tx_id: Option<Uuid>,
        sql: String,
        message: String,
    },
    /// All statements of one compiled target completed successfully.
    End { lease_id: Uuid, tx_id: Option<Uuid> },
}

/// Observability port for lifecycle events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &QueryEvent);
}

/// Sink that discards all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &QueryEvent) {}
}

/// Sink that retains every event, for tests and debugging.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: parking_lot::Mutex<Vec<QueryEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn on_event(&self, event: &QueryEvent) {
        self.events.lock().push(event.clone());
    }
}
