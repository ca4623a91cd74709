//! HBase pool error types.

use std::time::Duration;
use thiserror::Error;

use crate::entity::ConnectionId;

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, HBaseError>;

/// Pool errors.
#[derive(Debug, Error)]
pub enum HBaseError {
    /// The pool has been shut down.
    #[error("Connection pool is shut down")]
    Shutdown,

    /// Internal bookkeeping observed more active connections than allowed.
    #[error("Capacity exceeded: {active} active connections, max {max}")]
    CapacityExceeded {
        /// Observed active count.
        active: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The connection id is not checked out from this pool.
    #[error("Connection not found in active registry: {0}")]
    NotFound(ConnectionId),

    /// The factory could not produce a connection within its retry budget.
    #[error("Connection factory failed after {attempts} attempt(s): {source}")]
    Factory {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last error reported by the factory.
        #[source]
        source: FactoryError,
    },

    /// No connection became available before the deadline.
    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HBaseError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Factory { .. })
    }

    /// Check if this error means the pool can no longer be used.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

/// Errors reported by a [`ConnectionFactory`](crate::ConnectionFactory).
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Opening a connection failed.
    #[error("Connect error: {0}")]
    Connect(String),

    /// Closing a connection failed.
    #[error("Close error: {0}")]
    Close(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
