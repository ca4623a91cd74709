//! Pooled connection entities.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::connection::Connection;

/// Process-unique identifier of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which registry bucket an entity currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Available for checkout.
    Idle,
    /// Checked out by a caller.
    Active,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Active => write!(f, "active"),
        }
    }
}

/// A connection handle tracked by the pool.
///
/// The handle is shared with the caller while the entity is active, but the
/// entity itself only ever lives in one registry bucket.
#[derive(Debug)]
pub struct ConnectionEntity<C> {
    id: ConnectionId,
    handle: Arc<C>,
    status: ConnectionStatus,
    created_at: Instant,
}

impl<C: Connection> ConnectionEntity<C> {
    /// Wrap a freshly created handle.
    pub fn new(handle: C, status: ConnectionStatus) -> Self {
        Self {
            id: ConnectionId::new(),
            handle: Arc::new(handle),
            status,
            created_at: Instant::now(),
        }
    }

    /// Entity id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Shared reference to the handle.
    pub fn handle(&self) -> &Arc<C> {
        &self.handle
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Time since the handle was created.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Liveness probe of the underlying handle.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub(crate) fn into_handle(self) -> Arc<C> {
        self.handle
    }
}
