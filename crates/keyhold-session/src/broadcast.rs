// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of session state updates to observers.
//!
//! Each observer owns a `watch` receiver holding the latest update. Delivery
//! never blocks the session, and a slow observer skips intermediate states
//! but always sees the newest one. A dropped receiver unregisters the
//! observer on the next publish.

use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use keyhold_core::StateUpdate;

/// Handle returned by [`StateBroadcaster::subscribe`].
pub type ObserverId = Uuid;

pub struct StateBroadcaster {
    observers: DashMap<ObserverId, watch::Sender<StateUpdate>>,
    latest: Mutex<StateUpdate>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self {
            observers: DashMap::new(),
            latest: Mutex::new(StateUpdate {
                shell: None,
                is_locked: true,
            }),
        }
    }

    /// Register an observer. The receiver starts at the latest published
    /// update; `changed()` resolves on the next one.
    pub fn subscribe(&self) -> (ObserverId, watch::Receiver<StateUpdate>) {
        let latest = self.latest();
        let (tx, rx) = watch::channel(latest.clone());
        let id = Uuid::new_v4();
        self.observers.insert(id, tx);
        drop(latest);
        debug!(observer = %id, observers = self.observers.len(), "observer subscribed");
        (id, rx)
    }

    /// Drop the observer's sender; its `changed()` then returns an error.
    pub fn unsubscribe(&self, id: &ObserverId) {
        self.observers.remove(id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver `update` to every observer without waiting.
    pub fn publish(&self, update: StateUpdate) {
        let mut latest = self.latest();
        let mut closed = Vec::new();

        for entry in self.observers.iter() {
            if entry.value().send(update.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        *latest = update;
        drop(latest);

        // Removal happens after iteration; DashMap shards are still read-locked inside it.
        for id in closed {
            self.observers.remove(&id);
            debug!(observer = %id, "observer gone, unsubscribed");
        }
    }

    // Held across subscribe and publish so no observer misses an update.
    fn latest(&self) -> MutexGuard<'_, StateUpdate> {
        match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
