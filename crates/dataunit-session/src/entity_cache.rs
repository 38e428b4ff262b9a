//! Per-session registry of identity maps.

use crate::identity_map::IdentityMap;
use crate::registry::TypeRegistry;
use dataunit_core::Entity;
use std::fmt;
use std::sync::Arc;

/// Hands out one [`IdentityMap`] per entity type.
///
/// A session owns its cache. To let several sessions share identity, build
/// them with the same `Arc<EntityCache>`.
#[derive(Default)]
pub struct EntityCache {
    maps: TypeRegistry,
}

impl EntityCache {
    pub fn new() -> Self {
        Self {
            maps: TypeRegistry::new(),
        }
    }

    /// The identity map for `T`, created on first request.
    ///
    /// Every call on the same cache returns the same map.
    pub fn map<T: Entity>(&self) -> Arc<IdentityMap<T>> {
        self.maps.get_or_insert_with(IdentityMap::<T>::new)
    }

    /// Whether a map for `T` has been created.
    pub fn contains<T: Entity>(&self) -> bool {
        self.maps.get::<IdentityMap<T>>().is_some()
    }

    /// Drop the map for `T`. Handles obtained earlier keep working but are
    /// no longer shared with later callers.
    pub fn evict<T: Entity>(&self) -> bool {
        self.maps.remove::<IdentityMap<T>>()
    }

    /// Number of entity types with a map.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.maps.clear();
    }
}

impl fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("types", &self.len())
            .finish()
    }
}
