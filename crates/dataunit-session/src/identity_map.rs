//! Identity Map pattern for tracking unique entity instances per identifier.
//!
//! The identity map guarantees that, within one session, each database record
//! corresponds to exactly one in-memory instance. While an identifier is
//! present every reader gets the same `Arc<RwLock<T>>`, so changes made
//! through one handle are visible through all of them.
//!
//! # Example
//!
//! ```ignore
//! let map = IdentityMap::<User>::new();
//!
//! let user_ref = map.insert(user);
//! let again = map.get(&id).unwrap();
//! assert!(Arc::ptr_eq(&user_ref, &again));
//!
//! user_ref.write().unwrap().name = "Changed".to_string();
//! assert_eq!(again.read().unwrap().name, "Changed");
//! ```

use dataunit_core::{Entity, EntityRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// Per-type cache of loaded instances keyed by identifier.
///
/// All operations are serialized by one mutex. Entries are never evicted
/// implicitly.
pub struct IdentityMap<T: Entity> {
    entries: Mutex<HashMap<T::Id, EntityRef<T>>>,
}

impl<T: Entity> IdentityMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an instance by identifier.
    pub fn get(&self, id: &T::Id) -> Option<EntityRef<T>> {
        self.lock().get(id).cloned()
    }

    /// Register an instance under its current identifier.
    ///
    /// An existing entry for the same identifier is replaced.
    pub fn add(&self, entity: &EntityRef<T>) {
        let id = entity.read().unwrap_or_else(|e| e.into_inner()).id();
        tracing::trace!(entity = T::NAME, id = ?id, "Identity map add");
        self.lock().insert(id, Arc::clone(entity));
    }

    /// Wrap a plain value and register it.
    pub fn insert(&self, entity: T) -> EntityRef<T> {
        let entity = Arc::new(RwLock::new(entity));
        self.add(&entity);
        entity
    }

    /// Return the registered instance for `entity`'s identifier, or register
    /// `entity` if there is none.
    ///
    /// The flag is `true` when `entity` itself was registered.
    pub fn get_or_add(&self, entity: T) -> (EntityRef<T>, bool) {
        let id = entity.id();
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&id) {
            return (Arc::clone(existing), false);
        }
        let entity = Arc::new(RwLock::new(entity));
        entries.insert(id, Arc::clone(&entity));
        (entity, true)
    }

    /// Remove an entry. Removing an absent identifier is a no-op.
    pub fn remove(&self, id: &T::Id) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<T::Id, EntityRef<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Entity> Default for IdentityMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> fmt::Debug for IdentityMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("entity", &T::NAME)
            .field("len", &self.len())
            .finish()
    }
}
