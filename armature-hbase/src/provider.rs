//! Lazily built, shared pool for dependency injection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::connection::ConnectionFactory;
use crate::error::{HBaseError, Result};
use crate::pool::ConnectionPool;

/// Owns at most one [`ConnectionPool`] for an application.
///
/// The first call to [`get_instance`](Self::get_instance) builds the pool
/// with its configuration; later calls return the same pool and ignore
/// their configuration. Once shut down, the provider never builds another
/// pool.
///
/// Register the provider (or the pool it returns) in the DI container rather
/// than reaching for a global.
pub struct PoolProvider<F: ConnectionFactory> {
    factory: Arc<F>,
    pool: OnceCell<Arc<ConnectionPool<F>>>,
    shutdown: AtomicBool,
}

impl<F: ConnectionFactory> PoolProvider<F> {
    /// Create a provider around a connection factory.
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            pool: OnceCell::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Get the pool, building it with `config` on first use.
    pub async fn get_instance(&self, config: PoolConfig) -> Result<Arc<ConnectionPool<F>>> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(HBaseError::Shutdown);
        }

        let pool = self
            .pool
            .get_or_try_init(|| {
                debug!(
                    initial_size = config.initial_size,
                    max_size = config.max_size,
                    "Building shared connection pool"
                );
                ConnectionPool::with_shared_factory(config.clone(), Arc::clone(&self.factory))
            })
            .await?;

        // A shutdown that raced with construction still wins.
        if self.shutdown.load(Ordering::SeqCst) || pool.is_shutdown() {
            pool.shutdown().await;
            return Err(HBaseError::Shutdown);
        }

        if pool.config().max_size != config.max_size
            || pool.config().initial_size != config.initial_size.min(config.max_size)
        {
            debug!(
                requested_initial = config.initial_size,
                requested_max = config.max_size,
                initial_size = pool.config().initial_size,
                max_size = pool.config().max_size,
                "Pool already built, ignoring requested configuration"
            );
        }

        Ok(Arc::clone(pool))
    }

    /// Get the pool, building it with [`PoolConfig::default`] on first use.
    pub async fn get_default(&self) -> Result<Arc<ConnectionPool<F>>> {
        match self.pool.get() {
            Some(pool) if !self.shutdown.load(Ordering::SeqCst) && !pool.is_shutdown() => {
                Ok(Arc::clone(pool))
            }
            _ => self.get_instance(PoolConfig::default()).await,
        }
    }

    /// Whether the pool has been built.
    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }

    /// Shut down the pool, if built, and refuse to build another.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pool) = self.pool.get() {
            pool.shutdown().await;
        }
        info!("Connection pool provider shut down");
    }
}
