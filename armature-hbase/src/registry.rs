//! Idle and active connection bookkeeping.
//!
//! The registry is not synchronized on its own; the pool keeps it behind a
//! single mutex. The counters are atomics so they can be read without taking
//! that lock, but they are only ever written together with the map they
//! mirror.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::connection::Connection;
use crate::entity::{ConnectionEntity, ConnectionId, ConnectionStatus};
use crate::error::{HBaseError, Result};

/// Lock-free view of the registry sizes.
#[derive(Debug, Default)]
pub(crate) struct RegistryCounts {
    idle: AtomicUsize,
    active: AtomicUsize,
}

impl RegistryCounts {
    pub(crate) fn idle(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Outcome of returning a connection.
pub(crate) enum Released<C> {
    /// Parked in the idle registry.
    Idle,
    /// Idle ceiling reached; the handle must be closed by the caller.
    Dropped(Arc<C>),
}

/// A connection removed from the registry, waiting to be closed.
pub(crate) struct Removed<C> {
    pub(crate) id: ConnectionId,
    pub(crate) status: ConnectionStatus,
    pub(crate) handle: Arc<C>,
}

impl<C: Connection> From<ConnectionEntity<C>> for Removed<C> {
    fn from(entity: ConnectionEntity<C>) -> Self {
        Self {
            id: entity.id(),
            status: entity.status(),
            handle: entity.into_handle(),
        }
    }
}

fn take_closed<C: Connection>(map: &mut HashMap<ConnectionId, ConnectionEntity<C>>) -> Vec<Removed<C>> {
    let dead: Vec<ConnectionId> = map
        .iter()
        .filter(|(_, entity)| entity.is_closed())
        .map(|(id, _)| *id)
        .collect();

    dead.into_iter()
        .filter_map(|id| map.remove(&id))
        .map(Removed::from)
        .collect()
}

pub(crate) struct ConnectionRegistry<C> {
    idle: HashMap<ConnectionId, ConnectionEntity<C>>,
    active: HashMap<ConnectionId, ConnectionEntity<C>>,
    pending: usize,
    max_size: usize,
    counts: Arc<RegistryCounts>,
}

impl<C: Connection> ConnectionRegistry<C> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            idle: HashMap::new(),
            active: HashMap::new(),
            pending: 0,
            max_size,
            counts: Arc::new(RegistryCounts::default()),
        }
    }

    pub(crate) fn counts(&self) -> Arc<RegistryCounts> {
        Arc::clone(&self.counts)
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending
    }

    /// Add a newly created connection to the idle registry.
    pub(crate) fn insert_idle(&mut self, handle: C) -> ConnectionId {
        let entity = ConnectionEntity::new(handle, ConnectionStatus::Idle);
        let id = entity.id();
        self.idle.insert(id, entity);
        self.sync_counts();
        id
    }

    /// Remove an arbitrary idle entity. The caller decides whether it is
    /// still usable.
    pub(crate) fn pop_idle(&mut self) -> Option<ConnectionEntity<C>> {
        let id = *self.idle.keys().next()?;
        let entity = self.idle.remove(&id);
        self.sync_counts();
        entity
    }

    /// Move an entity taken from idle into the active registry.
    pub(crate) fn activate(&mut self, mut entity: ConnectionEntity<C>) -> (ConnectionId, Arc<C>) {
        entity.set_status(ConnectionStatus::Active);
        let id = entity.id();
        let handle = Arc::clone(entity.handle());
        self.active.insert(id, entity);
        self.sync_counts();
        (id, handle)
    }

    /// Reserve a slot for a connection about to be created.
    ///
    /// Returns `false` when the pool is at capacity. Reserved slots count
    /// against `max_size` until completed or cancelled.
    pub(crate) fn reserve(&mut self) -> bool {
        if self.idle.len() + self.active.len() + self.pending < self.max_size {
            self.pending += 1;
            true
        } else {
            false
        }
    }

    /// Give back a reservation whose creation failed.
    pub(crate) fn cancel_reservation(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Turn a reservation into an active entity.
    ///
    /// Hands the connection back if the active registry is already full,
    /// leaving the reservation for the caller to cancel.
    pub(crate) fn complete_reservation(
        &mut self,
        handle: C,
    ) -> std::result::Result<(ConnectionId, Arc<C>), C> {
        if self.active.len() >= self.max_size {
            return Err(handle);
        }
        self.pending = self.pending.saturating_sub(1);
        let entity = ConnectionEntity::new(handle, ConnectionStatus::Active);
        Ok(self.activate(entity))
    }

    /// Return an active entity, parking it as idle if there is room under
    /// `idle_ceiling`.
    pub(crate) fn release(&mut self, id: ConnectionId, idle_ceiling: usize) -> Result<Released<C>> {
        let mut entity = self.active.remove(&id).ok_or(HBaseError::NotFound(id))?;

        let released = if self.idle.len() < idle_ceiling {
            entity.set_status(ConnectionStatus::Idle);
            self.idle.insert(id, entity);
            Released::Idle
        } else {
            Released::Dropped(entity.into_handle())
        };

        self.sync_counts();
        Ok(released)
    }

    /// Remove every entity whose handle reports closed, from both registries.
    pub(crate) fn evict_closed(&mut self) -> Vec<Removed<C>> {
        let mut removed = take_closed(&mut self.idle);
        removed.extend(take_closed(&mut self.active));
        self.sync_counts();
        removed
    }

    /// Remove idle entities whose handles report closed.
    pub(crate) fn evict_closed_idle(&mut self) -> Vec<Removed<C>> {
        let removed = take_closed(&mut self.idle);
        self.sync_counts();
        removed
    }

    /// Empty both registries, returning everything that was tracked.
    pub(crate) fn drain(&mut self) -> Vec<Removed<C>> {
        let removed: Vec<Removed<C>> = self
            .idle
            .drain()
            .chain(self.active.drain())
            .map(|(_, entity)| Removed::from(entity))
            .collect();
        self.pending = 0;
        self.sync_counts();
        removed
    }

    fn sync_counts(&self) {
        self.counts.idle.store(self.idle.len(), Ordering::SeqCst);
        self.counts.active.store(self.active.len(), Ordering::SeqCst);
    }
}
