//! Pool configuration

use std::time::Duration;

use quarry_core::Result;
use serde::{Deserialize, Serialize};

/// Options accepted by older pooling layers that this pool does not honor.
/// They are flagged loudly when found in a deserialized configuration.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "maxWaitingClients",
    "testOnBorrow",
    "fifo",
    "priorityRange",
    "autostart",
    "evictionRunIntervalMillis",
    "numTestsPerRun",
    "softIdleTimeoutMillis",
];

/// Configuration for a connection pool.
///
/// `max == 0` disables pooling entirely: every acquire fails immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connections an explicit warm-up opens ahead of demand.
    /// The pool itself fills lazily; nothing is opened until the first
    /// acquire or a `warm_up` call.
    #[serde(default = "default_min")]
    pub min: usize,
    /// Maximum number of connections handed out at once
    #[serde(default = "default_max")]
    pub max: usize,
    /// Per-pool acquire timeout override in milliseconds. The effective
    /// timeout is the smaller of this and the client-level acquire timeout.
    #[serde(
        default,
        alias = "acquireTimeoutMillis",
        skip_serializing_if = "Option::is_none"
    )]
    pub acquire_timeout_ms: Option<u64>,
    /// Surface connection-creation failures to the waiting acquirer instead
    /// of retrying until the acquire timeout fires. On by default so a
    /// misconfigured database fails fast.
    #[serde(
        default = "default_propagate_create_error",
        alias = "propagateCreateError"
    )]
    pub propagate_create_error: bool,
}

fn default_min() -> usize {
    2
}

fn default_max() -> usize {
    10
}

fn default_propagate_create_error() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
            acquire_timeout_ms: None,
            propagate_create_error: true,
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration with the given bounds.
    ///
    /// # Panics
    ///
    /// Panics if `min` exceeds `max`.
    pub fn new(min: usize, max: usize) -> Self {
        assert!(min <= max, "pool min must not exceed max");
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = Some(ms);
        self
    }

    pub fn with_propagate_create_error(mut self, propagate: bool) -> Self {
        self.propagate_create_error = propagate;
        self
    }

    /// Effective acquire timeout given the client-level default. The pool
    /// override can only tighten it, never extend it.
    pub fn acquire_timeout(&self, client_timeout: Duration) -> Duration {
        match self.acquire_timeout_ms {
            Some(ms) => client_timeout.min(Duration::from_millis(ms)),
            None => client_timeout,
        }
    }

    /// Deserialize a configuration, warning about options from older pooling
    /// layers that are silently meaningless here.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if let Some(object) = value.as_object() {
            for option in UNSUPPORTED_OPTIONS {
                if object.contains_key(*option) {
                    tracing::warn!(
                        option,
                        "pool configuration option is not supported and will be ignored"
                    );
                }
            }
        }
        Ok(serde_json::from_value(value.clone())?)
    }
}
