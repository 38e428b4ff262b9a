//! Wiring of deferred relationship slots.

use crate::{EntityCache, Session, SessionInner, SessionSeed};
use dataunit_core::{Entity, EntityRef, Error, RelationLoader, Result, Value};
use std::sync::{Arc, Weak};

/// Loads related entities through a session's repositories.
///
/// Holds the session weakly so cached entities don't keep their session
/// alive. Once that session is gone, loads run through a fresh session over
/// the same cache, which works for as long as another session shares it. A
/// thunk that runs after the cache is gone too fails with
/// [`Error::SessionClosed`].
#[derive(Clone)]
pub struct SessionLoader {
    session: Weak<SessionInner>,
    seed: Arc<SessionSeed>,
    cache: Weak<EntityCache>,
}

impl SessionLoader {
    pub(crate) fn new(session: &Arc<SessionInner>) -> Self {
        Self {
            session: Arc::downgrade(session),
            seed: Arc::clone(session.seed()),
            cache: Arc::downgrade(&session.cache),
        }
    }

    fn session(&self) -> Result<Session> {
        if let Some(inner) = self.session.upgrade() {
            return Ok(Session::from_inner(inner));
        }
        let cache = self.cache.upgrade().ok_or(Error::SessionClosed)?;
        tracing::debug!("Wiring session dropped, loading through the shared cache");
        Ok(self.seed.revive(cache))
    }
}

impl RelationLoader for SessionLoader {
    fn load_one<U: Entity>(&self, id: &U::Id) -> Result<Option<EntityRef<U>>> {
        tracing::debug!(entity = U::NAME, id = ?id, "Lazy load (single)");
        self.session()?.repo::<U>().find_by_id(id)
    }

    fn load_many<U: Entity>(
        &self,
        filter: &str,
        params: &[(&str, Value)],
    ) -> Result<Vec<EntityRef<U>>> {
        tracing::debug!(entity = U::NAME, filter, "Lazy load (collection)");
        self.session()?.repo::<U>().filter(filter, params, None)
    }
}

/// Installs load-on-first-access thunks on freshly materialized entities.
#[derive(Clone)]
pub struct LazyLoader {
    loader: SessionLoader,
}

impl LazyLoader {
    pub fn new(session: &Session) -> Self {
        Self {
            loader: SessionLoader::new(&session.inner),
        }
    }

    /// Wire every declared relationship slot of `entity`.
    ///
    /// Slots that are already loaded or wired are left alone. Returns the
    /// number of slots wired by this call.
    pub fn init<T: Entity>(&self, entity: &T) -> Result<usize> {
        let mut wired = 0;
        for relationship in T::relationships::<SessionLoader>() {
            if relationship.install(entity, &self.loader)? {
                tracing::trace!(
                    entity = T::NAME,
                    slot = relationship.name(),
                    target = relationship.target(),
                    "Wired lazy relationship"
                );
                wired += 1;
            }
        }
        Ok(wired)
    }
}

impl std::fmt::Debug for LazyLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyLoader")
            .field("session_alive", &(self.loader.session.strong_count() > 0))
            .field("cache_alive", &(self.loader.cache.strong_count() > 0))
            .finish()
    }
}
