//! Lifecycle adapters — remove a request's entry once its processing ends.
//!
//! Everything here is built on [`ClearGuard`], which removes the entry in
//! `Drop`. Processing runs outside the registry lock; the lock is taken again
//! only for the final removal.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::registry::ContextRegistry;

/// Removes the entry for one handle when dropped.
///
/// Covers every exit path of the scope that owns it: normal return, early
/// return through `?`, panic unwinding, and a future dropped mid-flight.
#[must_use = "the entry is removed as soon as the guard is dropped"]
pub struct ClearGuard<K, V>
where
    K: Eq + Hash,
{
    registry: Arc<ContextRegistry<K, V>>,
    handle: K,
}

impl<K, V> ClearGuard<K, V>
where
    K: Eq + Hash,
{
    pub fn new(registry: Arc<ContextRegistry<K, V>>, handle: K) -> Self {
        Self { registry, handle }
    }

    pub fn handle(&self) -> &K {
        &self.handle
    }
}

impl<K, V> Drop for ClearGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("Clearing request entry during panic unwind");
        }
        self.registry.remove(&self.handle);
        trace!("Request entry cleared (live entries: {})", self.registry.len());
    }
}

/// A processing function wrapped so its handle's entry is removed after it
/// returns. Built by [`ContextRegistry::wrap`].
pub struct ClearHandler<K, V, F> {
    registry: Arc<ContextRegistry<K, V>>,
    processing: F,
}

impl<K, V, F> ClearHandler<K, V, F>
where
    K: Eq + Hash,
{
    pub fn new(registry: Arc<ContextRegistry<K, V>>, processing: F) -> Self {
        Self {
            registry,
            processing,
        }
    }

    /// Run the wrapped function for `handle`, then remove its entry.
    ///
    /// Takes the same arguments as the wrapped function. Removal happens
    /// exactly once, after the function has returned or unwound.
    pub fn call<C, R>(&self, handle: &K, ctx: C) -> R
    where
        K: Clone,
        F: Fn(&K, C) -> R,
    {
        let _guard = ClearGuard::new(Arc::clone(&self.registry), handle.clone());
        (self.processing)(handle, ctx)
    }
}

impl<K, V, F: Clone> Clone for ClearHandler<K, V, F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            processing: self.processing.clone(),
        }
    }
}

/// Drive `fut` to completion, then remove the entry for `handle`.
///
/// The guard is armed when this is called, so dropping the returned future
/// (polled or not) also removes the entry.
pub fn clear_after<K, V, Fut>(
    registry: Arc<ContextRegistry<K, V>>,
    handle: K,
    fut: Fut,
) -> impl Future<Output = Fut::Output>
where
    K: Eq + Hash,
    Fut: Future,
{
    let guard = ClearGuard::new(registry, handle);
    async move {
        let out = fut.await;
        drop(guard);
        out
    }
}
