//! Change notification fan-out
//!
//! Observers are plain callbacks invoked with no arguments whenever the
//! estimator state changes; they read what they need from the published
//! status. Delivery iterates over a snapshot of the registry, so observers may
//! subscribe or unsubscribe (themselves included) from inside a callback.

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Change callback
pub type Observer = Arc<dyn Fn() -> Result<()> + Send + Sync>;

type Registry = Arc<Mutex<BTreeMap<u64, Observer>>>;

/// Registry of change observers
pub struct Observers {
    registry: Registry,
    next_id: AtomicU64,
    logger: StructuredLogger,
}

/// Handle returned by [`Observers::subscribe`]
///
/// Dropping the handle keeps the observer registered; call
/// [`Subscription::unsubscribe`] to detach it.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    registry: Registry,
}

impl Observers {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
            logger: get_logger("observers"),
        }
    }

    /// Register an observer and invoke it once so it starts synchronized
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer = Arc::new(observer);
        lock(&self.registry).insert(id, Arc::clone(&observer));
        self.invoke(id, &observer);
        Subscription {
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Invoke every registered observer once
    pub fn notify(&self) {
        let snapshot: Vec<(u64, Observer)> = lock(&self.registry)
            .iter()
            .map(|(id, obs)| (*id, Arc::clone(obs)))
            .collect();
        for (id, observer) in snapshot {
            self.invoke(id, &observer);
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every observer (teardown)
    pub fn clear(&self) {
        lock(&self.registry).clear();
    }

    fn invoke(&self, id: u64, observer: &Observer) {
        match catch_unwind(AssertUnwindSafe(|| observer())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self
                .logger
                .error(&format!("Error calling update observer {}: {}", id, e)),
            Err(_) => self
                .logger
                .error(&format!("Update observer {} panicked", id)),
        }
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Remove the observer; safe to call repeatedly and from inside a callback
    pub fn unsubscribe(&self) {
        lock(&self.registry).remove(&self.id);
    }

    pub fn is_active(&self) -> bool {
        lock(&self.registry).contains_key(&self.id)
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, BTreeMap<u64, Observer>> {
    // A panicking observer never holds the lock, so poisoning is recoverable
    registry
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
