//! Bounded HBase connection pool.
//!
//! All registry mutation happens under one `parking_lot` mutex that is never
//! held across an `.await`. Factory calls run outside the lock; a creation
//! reserves its slot first so concurrent callers cannot overshoot `max_size`.

use parking_lot::Mutex;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::connection::{close_quietly, connect_with_retry, ConnectionFactory};
use crate::entity::{ConnectionEntity, ConnectionId, ConnectionStatus};
use crate::error::{HBaseError, Result};
use crate::health::HealthDetector;
use crate::registry::{ConnectionRegistry, RegistryCounts, Released, Removed};
use crate::stats::{AtomicPoolStats, PoolStats, PoolStatus};

/// A connection checked out from the pool.
///
/// Dropping it does not return it; call [`ConnectionPool::release`] with its
/// id, or use [`ConnectionPool::with_connection`].
#[derive(Debug)]
pub struct PooledConnection<C> {
    id: ConnectionId,
    conn: Arc<C>,
}

impl<C> PooledConnection<C> {
    /// Id to pass back to [`ConnectionPool::release`].
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Shared handle to the underlying connection.
    pub fn handle(&self) -> Arc<C> {
        Arc::clone(&self.conn)
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

/// Bounded pool of connections produced by a [`ConnectionFactory`].
///
/// Call [`shutdown`](Self::shutdown) to close every connection through the
/// factory. A pool dropped without it hands its remaining connections to a
/// background close task if a Tokio runtime is available, and otherwise
/// only logs them.
pub struct ConnectionPool<F: ConnectionFactory> {
    config: PoolConfig,
    factory: Arc<F>,
    registry: Mutex<ConnectionRegistry<F::Connection>>,
    counts: Arc<RegistryCounts>,
    available: Notify,
    shutdown: AtomicBool,
    waiting: AtomicUsize,
    stats: AtomicPoolStats,
    detector: Mutex<Option<HealthDetector>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool, open its initial connections and start health detection.
    pub async fn new(config: PoolConfig, factory: F) -> Result<Arc<Self>> {
        Self::with_shared_factory(config, Arc::new(factory)).await
    }

    /// Create a pool around a factory that is shared with other components.
    pub async fn with_shared_factory(config: PoolConfig, factory: Arc<F>) -> Result<Arc<Self>> {
        let config = config.validated()?;
        let registry = ConnectionRegistry::new(config.max_size);
        let counts = registry.counts();

        let pool = Arc::new(Self {
            config,
            factory,
            registry: Mutex::new(registry),
            counts,
            available: Notify::new(),
            shutdown: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
            stats: AtomicPoolStats::default(),
            detector: Mutex::new(None),
        });

        pool.open_initial().await;

        let detector = HealthDetector::spawn(Arc::downgrade(&pool), pool.config.health_check_interval);
        *pool.detector.lock() = Some(detector);

        info!(
            initial_size = pool.config.initial_size,
            max_size = pool.config.max_size,
            max_idle = pool.config.idle_ceiling(),
            idle = pool.idle_count(),
            "HBase connection pool created"
        );

        Ok(pool)
    }

    async fn open_initial(&self) {
        for _ in 0..self.config.initial_size {
            match connect_with_retry(
                &*self.factory,
                self.config.create_attempts,
                self.config.create_retry_delay,
            )
            .await
            {
                Ok(conn) => {
                    let id = self.registry.lock().insert_idle(conn);
                    self.stats.record_created();
                    debug!(connection_id = %id, "Initial connection opened");
                }
                Err(e) => warn!(error = %e, "Skipping initial connection"),
            }
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the connection factory.
    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// Number of idle connections.
    pub fn idle_count(&self) -> usize {
        self.counts.idle()
    }

    /// Number of checked-out connections.
    pub fn active_count(&self) -> usize {
        self.counts.active()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Snapshot of current pool occupancy.
    pub fn status(&self) -> PoolStatus {
        let registry = self.registry.lock();
        PoolStatus {
            idle: registry.idle_len(),
            active: registry.active_len(),
            pending: registry.pending(),
            waiting: self.waiting.load(Ordering::SeqCst),
            max_size: self.config.max_size,
        }
    }

    /// Lifetime counters.
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    /// Check out a connection, waiting up to the configured
    /// `acquire_timeout` when the pool is saturated.
    pub async fn acquire(&self) -> Result<PooledConnection<F::Connection>> {
        let deadline = self.config.acquire_timeout.map(|t| (Instant::now() + t, t));
        self.acquire_until(deadline).await
    }

    /// Check out a connection with an explicit deadline.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F::Connection>> {
        self.acquire_until(Some((Instant::now() + timeout, timeout))).await
    }

    async fn acquire_until(
        &self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<PooledConnection<F::Connection>> {
        let mut waited = false;

        loop {
            // Register interest before looking at the registry so a release
            // between the check and the wait is not lost.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_checkout()? {
                Checkout::Ready(id, conn) => {
                    self.stats.record_acquisition();
                    debug!(connection_id = %id, "Connection acquired from idle pool");
                    return Ok(PooledConnection { id, conn });
                }
                Checkout::Create(reservation) => return self.open_reserved(reservation).await,
                Checkout::Discard(dead) => {
                    for entry in &dead {
                        warn!(connection_id = %entry.id, "Discarding closed idle connection");
                        self.stats.record_eviction();
                    }
                    self.stats.record_closed(dead.len() as u64);
                    self.available.notify_one();
                    self.close_removed(dead).await;
                    continue;
                }
                Checkout::Saturated => {}
            }

            if !waited {
                waited = true;
                self.stats.record_exhausted();
                debug!(max_size = self.config.max_size, "Pool saturated, waiting for a connection");
            }

            let _waiting = WaitingGuard::enter(&self.waiting);
            match deadline {
                Some((at, timeout)) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        self.stats.record_timeout();
                        warn!(timeout = ?timeout, "Timed out waiting for a connection");
                        return Err(HBaseError::Timeout(timeout));
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Decide how to satisfy an acquire.
    ///
    /// Dead idle entries are taken out of the registry first and handed back
    /// for closing without committing to a checkout, so the caller never
    /// awaits while holding an activated entity or a bare reservation.
    fn try_checkout(&self) -> Result<Checkout<'_, F>> {
        let mut registry = self.registry.lock();
        if self.is_shutdown() {
            return Err(HBaseError::Shutdown);
        }

        let dead = registry.evict_closed_idle();
        if !dead.is_empty() {
            return Ok(Checkout::Discard(dead));
        }

        match registry.pop_idle() {
            Some(entity) if entity.is_closed() => Ok(Checkout::Discard(vec![entity.into()])),
            Some(entity) => {
                let (id, conn) = registry.activate(entity);
                Ok(Checkout::Ready(id, conn))
            }
            None if registry.reserve() => Ok(Checkout::Create(Reservation {
                pool: self,
                armed: true,
            })),
            None => Ok(Checkout::Saturated),
        }
    }

    /// Open a connection for a slot reserved by `try_checkout`.
    async fn open_reserved(
        &self,
        mut reservation: Reservation<'_, F>,
    ) -> Result<PooledConnection<F::Connection>> {
        let conn = connect_with_retry(
            &*self.factory,
            self.config.create_attempts,
            self.config.create_retry_delay,
        )
        .await?;

        let outcome = {
            let mut registry = self.registry.lock();
            if self.is_shutdown() {
                Err((conn, HBaseError::Shutdown))
            } else {
                match registry.complete_reservation(conn) {
                    Ok((id, conn)) => {
                        reservation.armed = false;
                        Ok((id, conn))
                    }
                    Err(conn) => Err((
                        conn,
                        HBaseError::CapacityExceeded {
                            active: registry.active_len() + 1,
                            max: self.config.max_size,
                        },
                    )),
                }
            }
        };

        match outcome {
            Ok((id, conn)) => {
                self.stats.record_created();
                self.stats.record_acquisition();
                debug!(connection_id = %id, active = self.active_count(), "New connection opened");
                Ok(PooledConnection { id, conn })
            }
            Err((conn, err)) => {
                warn!(error = %err, "Discarding newly opened connection");
                drop(reservation);
                let entity = ConnectionEntity::new(conn, ConnectionStatus::Active);
                self.close_removed(vec![entity.into()]).await;
                Err(err)
            }
        }
    }

    /// Close connections that have already left the registry.
    ///
    /// The factory calls run on their own task: a caller that is cancelled
    /// while waiting here still gets its handles closed.
    fn spawn_close(&self, removed: Vec<Removed<F::Connection>>) -> JoinHandle<()> {
        let factory = Arc::clone(&self.factory);
        tokio::spawn(async move {
            for entry in removed {
                close_quietly(&*factory, entry.id, &entry.handle).await;
            }
        })
    }

    async fn close_removed(&self, removed: Vec<Removed<F::Connection>>) {
        if removed.is_empty() {
            return;
        }
        if let Err(e) = self.spawn_close(removed).await {
            warn!(error = %e, "Connection close task failed");
        }
    }

    /// Return a checked-out connection.
    ///
    /// The connection is parked as idle unless the idle ceiling is reached,
    /// in which case it is closed. Either way one waiting acquirer is woken.
    pub async fn release(&self, id: ConnectionId) -> Result<()> {
        let released = {
            let mut registry = self.registry.lock();
            if self.is_shutdown() {
                return Err(HBaseError::Shutdown);
            }
            registry.release(id, self.config.idle_ceiling())?
        };

        self.available.notify_one();

        match released {
            Released::Idle => debug!(connection_id = %id, "Connection returned to idle pool"),
            Released::Dropped(handle) => {
                debug!(connection_id = %id, "Idle ceiling reached, closing connection");
                self.stats.record_closed(1);
                let removed = Removed {
                    id,
                    status: ConnectionStatus::Active,
                    handle,
                };
                self.close_removed(vec![removed]).await;
            }
        }

        Ok(())
    }

    /// Return a connection by value.
    pub async fn release_connection(&self, conn: PooledConnection<F::Connection>) -> Result<()> {
        self.release(conn.id).await
    }

    /// Run `f` with a checked-out connection and release it afterwards.
    ///
    /// A release failure (the connection was evicted while in use, or the
    /// pool shut down) is logged and does not replace `f`'s output.
    pub async fn with_connection<T, Func, Fut>(&self, f: Func) -> Result<T>
    where
        Func: FnOnce(Arc<F::Connection>) -> Fut,
        Fut: Future<Output = T>,
    {
        let conn = self.acquire().await?;
        let id = conn.id();
        let output = f(conn.handle()).await;

        if let Err(e) = self.release(id).await {
            warn!(connection_id = %id, error = %e, "Failed to release connection");
        }

        Ok(output)
    }

    /// Evict every tracked connection whose handle reports closed.
    ///
    /// Returns the number evicted. Runs periodically in the background; an
    /// active connection found dead is only logged, its holder will fail on
    /// next use.
    pub async fn check_health(&self) -> usize {
        let removed = {
            let mut registry = self.registry.lock();
            if self.is_shutdown() {
                return 0;
            }
            registry.evict_closed()
        };

        let evicted = removed.len();
        for entry in &removed {
            match entry.status {
                ConnectionStatus::Idle => {
                    debug!(connection_id = %entry.id, "Evicting dead idle connection")
                }
                ConnectionStatus::Active => {
                    warn!(connection_id = %entry.id, "Checked-out connection is dead, evicting")
                }
            }
            self.stats.record_eviction();
            self.available.notify_one();
        }
        self.stats.record_closed(evicted as u64);
        self.close_removed(removed).await;

        evicted
    }

    /// Shut the pool down.
    ///
    /// Wakes every waiting acquirer, stops health detection and closes all
    /// tracked connections. When it returns the detector task has exited.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let removed = {
            let mut registry = self.registry.lock();
            if self.shutdown.swap(true, Ordering::SeqCst) {
                return;
            }
            registry.drain()
        };

        self.available.notify_waiters();

        let closed = removed.len();
        self.stats.record_closed(closed as u64);
        let closing = self.spawn_close(removed);

        let detector = self.detector.lock().take();
        if let Some(detector) = detector {
            detector.shutdown().await;
        }

        if let Err(e) = closing.await {
            warn!(error = %e, "Connection close task failed");
        }

        info!(closed, "HBase connection pool shut down");
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        if let Some(detector) = self.detector.get_mut().take() {
            detector.stop();
        }

        if *self.shutdown.get_mut() {
            return;
        }

        let removed = self.registry.get_mut().drain();
        if removed.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(_) => {
                warn!(open = removed.len(), "Pool dropped without shutdown, closing connections");
                self.stats.record_closed(removed.len() as u64);
                drop(self.spawn_close(removed));
            }
            Err(_) => warn!(
                open = removed.len(),
                "Pool dropped outside a runtime, connections were not closed"
            ),
        }
    }
}

enum Checkout<'a, F: ConnectionFactory> {
    Ready(ConnectionId, Arc<F::Connection>),
    Create(Reservation<'a, F>),
    Discard(Vec<Removed<F::Connection>>),
    Saturated,
}

/// A capacity slot held while a connection is being opened. Released on
/// drop unless the connection made it into the registry, which covers both
/// factory failure and a cancelled `acquire`.
struct Reservation<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    armed: bool,
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.registry.lock().cancel_reservation();
            self.pool.available.notify_one();
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
