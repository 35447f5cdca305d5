//! Key-ready observer registry.
//!
//! Observers are called synchronously, on the task that ingested the
//! frame, before the next inbound message is read. A slow observer
//! therefore delays ingestion of later frames; observers that need to do
//! real work should hand the key off to their own task or channel.
//!
//! # Example
//!
//! ```
//! use buffered_websocket::observer::ObserverRegistry;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! let registry = ObserverRegistry::new();
//! let last = Arc::new(AtomicU64::new(0));
//! let seen = last.clone();
//! let id = registry.subscribe(move |key| seen.store(key, Ordering::SeqCst));
//!
//! registry.notify(42);
//! assert_eq!(last.load(Ordering::SeqCst), 42);
//!
//! assert!(registry.unsubscribe(id));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Callback invoked with the key of a newly ready slot.
pub type KeyObserver = Arc<dyn Fn(u64) + Send + Sync>;

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Ordered list of key-ready observers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, KeyObserver)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers run in registration order.
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Call every observer with `key`.
    ///
    /// The list is copied before calling out, so an observer may
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, key: u64) {
        let observers: Vec<KeyObserver> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(key);
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
