//! ContextRegistry — request handle → attached value, behind one RwLock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clear::ClearHandler;

/// Maps request handles to the value attached to each in-flight request.
///
/// Lookups share the read lock and may run in parallel; `insert` and `remove`
/// take the write lock. A lookup racing with a mutation of the same handle
/// sees either the state before or the state after it.
///
/// The registry never inspects the stored value. To store an "absent" value
/// as a real entry, use an `Option<T>` value type: [`lookup_entry`] then
/// returns `Some(None)` for an entry holding `None` and `None` when there is
/// no entry at all.
///
/// Uses parking_lot::RwLock, which does not poison, so a request that panics
/// while the registry is in use cannot wedge it for everyone else.
///
/// [`lookup_entry`]: ContextRegistry::lookup_entry
pub struct ContextRegistry<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> ContextRegistry<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store `value` under `handle`, replacing any existing entry.
    pub fn insert(&self, handle: K, value: V) {
        // The displaced value is dropped after the write guard is released.
        let previous = self.entries.write().insert(handle, value);
        drop(previous);
    }

    /// Value stored for `handle`, or `V::default()` when there is no entry.
    ///
    /// Does not tell "no entry" apart from "entry holding the default value";
    /// use [`lookup_entry`](Self::lookup_entry) for that.
    pub fn lookup<Q>(&self, handle: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone + Default,
    {
        self.lookup_entry(handle).unwrap_or_default()
    }

    /// Value stored for `handle`, or `None` when there is no entry.
    pub fn lookup_entry<Q>(&self, handle: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.entries.read().get(handle).cloned()
    }

    /// Stored value (or `V::default()`) together with whether an entry exists.
    pub fn lookup_with_presence<Q>(&self, handle: &Q) -> (V, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone + Default,
    {
        match self.lookup_entry(handle) {
            Some(value) => (value, true),
            None => (V::default(), false),
        }
    }

    /// Delete the entry for `handle`. No-op when there is none.
    pub fn remove<Q>(&self, handle: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.write().remove(handle);
        drop(removed);
    }

    pub fn contains<Q>(&self, handle: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.read().contains_key(handle)
    }

    /// Number of live entries. A count that keeps growing means some caller
    /// bypasses the lifecycle adapters.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Wrap a processing function so the entry for its handle is removed once
    /// it returns, whatever the exit path.
    pub fn wrap<F>(self: &Arc<Self>, processing: F) -> ClearHandler<K, V, F> {
        ClearHandler::new(Arc::clone(self), processing)
    }
}

impl<K, V> Default for ContextRegistry<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ContextRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_handle_is_absent() {
        let reg: ContextRegistry<u32, Option<&str>> = ContextRegistry::new();
        assert_eq!(reg.lookup(&1), None);
        assert_eq!(reg.lookup_entry(&1), None);
        assert_eq!(reg.lookup_with_presence(&1), (None, false));
        assert!(reg.is_empty());
    }

    #[test]
    fn stored_none_is_distinct_from_missing() {
        let reg: ContextRegistry<u32, Option<&str>> = ContextRegistry::new();
        reg.insert(7, None);
        assert_eq!(reg.lookup(&7), None);
        assert_eq!(reg.lookup_entry(&7), Some(None));
        assert_eq!(reg.lookup_with_presence(&7), (None, true));
        assert!(reg.contains(&7));
    }

    #[test]
    fn borrowed_key_lookup() {
        let reg: ContextRegistry<String, u8> = ContextRegistry::new();
        reg.insert("alpha".to_string(), 3);
        assert_eq!(reg.lookup("alpha"), 3);
        reg.remove("alpha");
        assert!(!reg.contains("alpha"));
    }

    #[test]
    fn overwrite_drops_previous_value() {
        let reg: ContextRegistry<u32, Arc<&str>> = ContextRegistry::new();
        let first = Arc::new("first");
        reg.insert(1, first.clone());
        assert_eq!(Arc::strong_count(&first), 2);

        reg.insert(1, Arc::new("second"));
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(*reg.lookup_entry(&1).unwrap(), "second");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn debug_reports_entry_count() {
        let reg: ContextRegistry<u32, u32> = ContextRegistry::new();
        reg.insert(1, 1);
        assert_eq!(format!("{reg:?}"), "ContextRegistry { entries: 1 }");
    }
}
