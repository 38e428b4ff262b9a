//! Type-indexed registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Holds at most one shared value per type.
///
/// Entries are keyed by the `TypeId` of the stored value itself, so a lookup
/// for `V` can only ever find a `V`.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the stored `V`, creating it with `make` on first use.
    pub(crate) fn get_or_insert_with<V, F>(&self, make: F) -> Arc<V>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> V,
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = TypeId::of::<V>();
        if let Some(existing) = entries.get(&key) {
            if let Ok(value) = Arc::clone(existing).downcast::<V>() {
                return value;
            }
        }
        let value = Arc::new(make());
        entries.insert(key, Arc::clone(&value) as Arc<dyn Any + Send + Sync>);
        value
    }

    pub(crate) fn get<V: Any + Send + Sync>(&self) -> Option<Arc<V>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&TypeId::of::<V>())
            .and_then(|existing| Arc::clone(existing).downcast::<V>().ok())
    }

    pub(crate) fn remove<V: Any + Send + Sync>(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<V>())
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
