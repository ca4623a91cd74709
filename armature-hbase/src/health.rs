//! Background dead-connection detection.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::connection::ConnectionFactory;
use crate::pool::ConnectionPool;

/// Periodic task that evicts connections whose handles report closed.
///
/// Holds only a weak reference to the pool, so it never keeps a pool alive
/// and exits on its own once the pool is dropped.
pub(crate) struct HealthDetector {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl HealthDetector {
    pub(crate) fn spawn<F: ConnectionFactory>(pool: Weak<ConnectionPool<F>>, interval: Duration) -> Self {
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        if pool.is_shutdown() {
                            break;
                        }
                        let evicted = pool.check_health().await;
                        if evicted > 0 {
                            debug!(evicted, "Health check evicted dead connections");
                        }
                    }
                }
            }

            debug!("Health detector stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task to stop. A scan already in progress is allowed to
    /// finish.
    pub(crate) fn stop(&self) {
        self.stop.notify_one();
    }

    /// Signal the task and wait for it to exit.
    pub(crate) async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Health detector task failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
