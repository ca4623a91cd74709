//! Pool statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for a pool.
///
/// At any quiescent point `idle + active == connections_created - connections_closed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened through the factory.
    pub connections_created: u64,
    /// Connections closed and dropped by the pool.
    pub connections_closed: u64,
    /// Successful checkouts.
    pub acquisitions: u64,
    /// Checkouts that had to wait on a saturated pool.
    pub exhausted_count: u64,
    /// Checkouts that gave up at their deadline.
    pub timeouts: u64,
    /// Dead connections removed by health detection or on checkout.
    pub evictions: u64,
}

#[derive(Debug, Default)]
pub(crate) struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    acquisitions: AtomicU64,
    exhausted_count: AtomicU64,
    timeouts: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicPoolStats {
    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self, count: u64) {
        self.connections_closed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle connections.
    pub idle: usize,
    /// Checked-out connections.
    pub active: usize,
    /// Connections being opened right now.
    pub pending: usize,
    /// Tasks waiting for a connection.
    pub waiting: usize,
    /// Maximum pool size.
    pub max_size: usize,
}

impl PoolStatus {
    /// Total connections tracked, including those being opened.
    pub fn size(&self) -> usize {
        self.idle + self.active + self.pending
    }

    /// Get the utilization percentage.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.active as f64 / self.max_size as f64) * 100.0
        }
    }

    /// Check if the pool is under pressure.
    pub fn is_under_pressure(&self) -> bool {
        self.waiting > 0 || self.utilization() > 80.0
    }
}
