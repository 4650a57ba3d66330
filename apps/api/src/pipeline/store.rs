//! In-memory application store.
//!
//! Applications live only as long as the process. A run checks its
//! application out (the slot is marked in flight) and checks it back in when
//! done, so the map lock is never held across an await and a second run of the
//! same application is refused instead of interleaved. While in flight the slot
//! keeps a read-only snapshot that the run may refresh after each stage.
//!
//! The store is bounded: once full, the oldest finished applications are
//! evicted to make room. Unfinished ones are never evicted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::pipeline::application::Application;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("application {0} not found")]
    NotFound(Uuid),

    #[error("application {0} is already being processed")]
    InFlight(Uuid),
}

enum Slot {
    Idle(Box<Application>),
    InFlight(Box<Application>),
}

/// What `get` returns: a copy of the application and whether a run holds it.
#[derive(Debug, Clone)]
pub struct StoredApplication {
    pub application: Application,
    pub in_flight: bool,
}

pub struct ApplicationStore {
    slots: Mutex<HashMap<Uuid, Slot>>,
    capacity: usize,
}

impl Default for ApplicationStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, app: Application) -> Uuid {
        let id = app.id;
        let mut slots = self.lock();
        if slots.len() >= self.capacity {
            let excess = slots.len() + 1 - self.capacity;
            evict_finished(&mut slots, excess);
        }
        slots.insert(id, Slot::Idle(Box::new(app)));
        id
    }

    /// A copy of the application as of its last check-in, or of the last
    /// snapshot published by the run holding it.
    pub fn get(&self, id: Uuid) -> Result<StoredApplication, StoreError> {
        match self.lock().get(&id) {
            Some(Slot::Idle(app)) => Ok(StoredApplication {
                application: app.as_ref().clone(),
                in_flight: false,
            }),
            Some(Slot::InFlight(snapshot)) => Ok(StoredApplication {
                application: snapshot.as_ref().clone(),
                in_flight: true,
            }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Takes exclusive ownership of the application until `check_in`.
    pub fn check_out(&self, id: Uuid) -> Result<Application, StoreError> {
        let mut slots = self.lock();
        let app = match slots.get(&id) {
            Some(Slot::Idle(app)) => app.as_ref().clone(),
            Some(Slot::InFlight(_)) => return Err(StoreError::InFlight(id)),
            None => return Err(StoreError::NotFound(id)),
        };
        slots.insert(id, Slot::InFlight(Box::new(app.clone())));
        Ok(app)
    }

    /// Refreshes the snapshot readers see while `app` is checked out.
    pub fn publish(&self, app: &Application) {
        if let Some(Slot::InFlight(snapshot)) = self.lock().get_mut(&app.id) {
            *snapshot = Box::new(app.clone());
        }
    }

    pub fn check_in(&self, app: Application) {
        self.lock().insert(app.id, Slot::Idle(Box::new(app)));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_finished(slots: &mut HashMap<Uuid, Slot>, count: usize) {
    let mut finished: Vec<_> = slots
        .iter()
        .filter_map(|(id, slot)| match slot {
            Slot::Idle(app) if app.is_terminal() => Some((app.created_at, *id)),
            _ => None,
        })
        .collect();
    finished.sort();
    for (_, id) in finished.into_iter().take(count) {
        slots.remove(&id);
        debug!(application = %id, "evicted finished application");
    }
}
