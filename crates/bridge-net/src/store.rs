//! Concurrency-safe mirror of remote entity state.
//!
//! The session worker is the only writer. Readers take a [`EntityStore::snapshot`],
//! an owned copy, so rendering never holds the lock. The lock guards map
//! operations only and is never held across socket I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use rand::Rng;

use crate::codec::{CarStatus, Direction, EntityState};

/// An RGB display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Fixed palette handed out in first-seen order.
pub const PALETTE: [Rgb; 15] = [
    Rgb(255, 99, 71),
    Rgb(60, 179, 113),
    Rgb(255, 215, 0),
    Rgb(138, 43, 226),
    Rgb(0, 191, 255),
    Rgb(255, 165, 0),
    Rgb(218, 112, 214),
    Rgb(0, 128, 0),
    Rgb(128, 0, 0),
    Rgb(70, 130, 180),
    Rgb(255, 20, 147),
    Rgb(0, 255, 255),
    Rgb(255, 140, 0),
    Rgb(124, 252, 0),
    Rgb(75, 0, 130),
];

/// Last-known status of one remote entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStatus {
    /// Entity identifier.
    pub id: String,
    /// Position in `[0, PATH_LENGTH]`.
    pub position: u32,
    /// Travel direction, `None` when unset.
    pub direction: Option<Direction>,
    /// Lifecycle state.
    pub state: EntityState,
    /// Whether the entity is on the path.
    pub is_crossing: bool,
}

impl From<CarStatus> for EntityStatus {
    fn from(status: CarStatus) -> Self {
        Self {
            id: status.client_id,
            position: status.position,
            direction: status.direction,
            state: status.state,
            is_crossing: status.is_crossing,
        }
    }
}

/// A snapshot entry: status plus its cosmetic color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntity {
    /// Status as last reported.
    pub status: EntityStatus,
    /// Display color assigned on first sight.
    pub color: Rgb,
}

/// Deterministic first-seen color assignment.
#[derive(Debug, Default)]
struct ColorAssigner {
    assigned: HashMap<String, Rgb>,
    next_index: usize,
}

impl ColorAssigner {
    fn assign(&mut self, id: &str) -> Rgb {
        if let Some(color) = self.assigned.get(id) {
            return *color;
        }
        let color = match PALETTE.get(self.next_index) {
            Some(color) => *color,
            None => {
                let mut rng = rand::rng();
                Rgb(rng.random(), rng.random(), rng.random())
            }
        };
        self.next_index += 1;
        self.assigned.insert(id.to_string(), color);
        color
    }

    fn release(&mut self, id: &str) {
        self.assigned.remove(id);
    }

    fn reset(&mut self) {
        self.assigned.clear();
        self.next_index = 0;
    }
}

#[derive(Debug, Default)]
struct Inner {
    entities: BTreeMap<String, TrackedEntity>,
    colors: ColorAssigner,
    active: Option<String>,
}

/// Mapping from entity identifier to last-known status, behind one lock.
#[derive(Debug, Default)]
pub struct EntityStore {
    inner: Mutex<Inner>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are single map operations; a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or wholesale replace the status for `status.id`.
    pub fn upsert(&self, status: EntityStatus) {
        let mut inner = self.lock();
        let color = inner.colors.assign(&status.id);
        inner
            .entities
            .insert(status.id.clone(), TrackedEntity { status, color });
    }

    /// Remove an entity. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.lock();
        inner.colors.release(id);
        if inner.active.as_deref() == Some(id) {
            inner.active = None;
        }
        inner.entities.remove(id).is_some()
    }

    /// Drop every entity, color and the active marker.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entities.clear();
        inner.colors.reset();
        inner.active = None;
    }

    /// Point-in-time copy of all entries, ordered by identifier.
    pub fn snapshot(&self) -> Vec<TrackedEntity> {
        self.lock().entities.values().cloned().collect()
    }

    /// Status of one entity, if present.
    pub fn get(&self, id: &str) -> Option<EntityStatus> {
        self.lock().entities.get(id).map(|e| e.status.clone())
    }

    /// Record the entity that currently holds the path.
    pub fn set_active(&self, id: &str) {
        self.lock().active = Some(id.to_string());
    }

    /// Entity that most recently started a traversal and has not ended it.
    pub fn active_entity(&self) -> Option<String> {
        self.lock().active.clone()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.lock().entities.len()
    }

    /// Whether no entities are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().entities.is_empty()
    }
}
