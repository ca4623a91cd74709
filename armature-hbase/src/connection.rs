//! Connection and factory traits.
//!
//! The pool never talks to HBase itself. It is handed a [`ConnectionFactory`]
//! that knows how to open and close handles, and it only ever asks a handle
//! whether it is still alive.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::entity::ConnectionId;
use crate::error::{FactoryError, HBaseError, Result};

/// An opaque, closeable connection handle.
pub trait Connection: Send + Sync + 'static {
    /// Liveness probe. A closed handle is never handed out by the pool.
    fn is_closed(&self) -> bool;
}

/// Creates and closes connection handles.
///
/// Implementations must be safe to call from many tasks at once; the pool
/// does not serialize factory calls.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type produced by this factory.
    type Connection: Connection;

    /// Make a single attempt at opening a connection.
    async fn connect(&self) -> std::result::Result<Self::Connection, FactoryError>;

    /// Close a connection and any private resources it owns.
    async fn close(&self, conn: &Self::Connection) -> std::result::Result<(), FactoryError>;
}

/// Open a connection, retrying up to `attempts` times with a fixed delay.
pub async fn connect_with_retry<F>(
    factory: &F,
    attempts: u32,
    delay: Duration,
) -> Result<F::Connection>
where
    F: ConnectionFactory + ?Sized,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match factory.connect().await {
            Ok(conn) => {
                if attempt > 1 {
                    debug!(attempt, "Connection established after retry");
                }
                return Ok(conn);
            }
            Err(source) if attempt >= attempts => {
                return Err(HBaseError::Factory { attempts, source });
            }
            Err(e) => {
                debug!(attempt, attempts, error = %e, "Connection attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Close a handle, logging instead of propagating failures.
pub(crate) async fn close_quietly<F>(factory: &F, id: ConnectionId, conn: &F::Connection)
where
    F: ConnectionFactory + ?Sized,
{
    match factory.close(conn).await {
        Ok(()) => debug!(connection_id = %id, "Connection closed"),
        Err(e) => warn!(connection_id = %id, error = %e, "Failed to close connection"),
    }
}
