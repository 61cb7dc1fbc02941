//! Observer registrations with explicit cancellation handles.
//!
//! Platform callbacks (torch mode changes, network availability) are exposed
//! as `watch_*` methods that return a [`Subscription`]. Dropping the
//! subscription unregisters the callback.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle for an active observer registration
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Registry<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

/// A thread-safe list of callbacks, notified in registration order
pub struct Observers<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Observers<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry { next_id: 0, callbacks: BTreeMap::new() })),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let id = registry.next_id;
            registry.next_id += 1;
            registry.callbacks.insert(id, Arc::new(callback));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut registry = inner.lock().unwrap_or_else(|e| e.into_inner());
                registry.callbacks.remove(&id);
            }
        })
    }

    /// Invoke every registered callback; callbacks run outside the registry lock
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = {
            let registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            registry.callbacks.values().cloned().collect()
        };
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
