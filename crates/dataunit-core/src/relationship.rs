//! Deferred relationship slots and their registry.
//!
//! An entity declares its relationship slots as [`Lazy`] fields and lists
//! them in [`Entity::relationships`]. A loader (the session's lazy loader)
//! walks that list after an entity is materialized and wires each slot to a
//! thunk that resolves the related records on first access.
//!
//! ```ignore
//! struct Book {
//!     id: Uuid,
//!     author_id: Option<Uuid>,
//!     author: LazyOne<Author>,
//! }
//!
//! // in `impl Entity for Book`
//! fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
//!     vec![Relationship::single("author", |b: &Book| &b.author)]
//! }
//!
//! let author = book.author.get()?; // loads once, then memoized
//! ```

use crate::entity::{Entity, EntityRef};
use crate::error::{ConfigErrorKind, Error, Result};
use crate::row::FromValue;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

type Thunk<V> = Arc<dyn Fn() -> Result<V> + Send + Sync>;

/// A value resolved on first access and memoized afterwards.
///
/// A slot is either loaded, wired to a loader, or neither. Once loaded it
/// never changes. A load that fails is not memoized and the next `get`
/// retries it.
pub struct Lazy<V> {
    value: OnceLock<V>,
    loader: Mutex<Option<Thunk<V>>>,
}

/// Slot for a single related entity.
pub type LazyOne<U> = Lazy<Option<EntityRef<U>>>;

/// Slot for a collection of related entities.
pub type LazyMany<U> = Lazy<Vec<EntityRef<U>>>;

impl<V> Lazy<V> {
    /// Create an empty, unwired slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            loader: Mutex::new(None),
        }
    }

    /// Create an already-populated slot.
    #[must_use]
    pub fn loaded(value: V) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(value);
        Self {
            value: cell,
            loader: Mutex::new(None),
        }
    }

    /// Create a slot wired to `load`.
    #[must_use]
    pub fn deferred<F>(load: F) -> Self
    where
        F: Fn() -> Result<V> + Send + Sync + 'static,
    {
        Self {
            value: OnceLock::new(),
            loader: Mutex::new(Some(Arc::new(load))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some()
    }

    /// Whether a loader is installed and has not run successfully yet.
    pub fn is_wired(&self) -> bool {
        self.loader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Install a loader.
    ///
    /// Returns `false` and leaves the slot untouched when it is already
    /// loaded or wired.
    pub fn set_loader<F>(&self, load: F) -> bool
    where
        F: Fn() -> Result<V> + Send + Sync + 'static,
    {
        if self.is_loaded() {
            return false;
        }
        let mut guard = self.loader.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() || self.is_loaded() {
            return false;
        }
        *guard = Some(Arc::new(load));
        true
    }

    /// Populate the slot directly. Returns `false` if it was already loaded.
    pub fn set(&self, value: V) -> bool {
        let mut guard = self.loader.lock().unwrap_or_else(|e| e.into_inner());
        if self.value.set(value).is_err() {
            return false;
        }
        *guard = None;
        true
    }

    /// Get the value, running the loader the first time.
    ///
    /// Concurrent callers block on the slot while a load is in flight, so the
    /// loader runs at most once per successful resolution.
    pub fn get(&self) -> Result<&V> {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }

        let mut guard = self.loader.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let Some(load) = guard.clone() else {
            return Err(Error::config(
                ConfigErrorKind::Relationship,
                "relationship slot is neither loaded nor wired to a loader",
            ));
        };

        let value = load()?;
        *guard = None;
        Ok(self.value.get_or_init(|| value))
    }

    /// Get the value only if it has already been loaded.
    pub fn try_get(&self) -> Option<&V> {
        self.value.get()
    }
}

impl<V> Default for Lazy<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Clone for Lazy<V> {
    fn clone(&self) -> Self {
        match self.value.get() {
            Some(value) => Self::loaded(value.clone()),
            None => Self {
                value: OnceLock::new(),
                loader: Mutex::new(
                    self.loader
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .clone(),
                ),
            },
        }
    }
}

impl<V> fmt::Debug for Lazy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_loaded() {
            "loaded"
        } else if self.is_wired() {
            "wired"
        } else {
            "empty"
        };
        f.debug_struct("Lazy").field("state", &state).finish()
    }
}

// ============================================================================
// Relationship registry
// ============================================================================

/// Resolves related entities for wired slots.
///
/// Implemented by the session layer; defined here so entity declarations
/// don't depend on it.
pub trait RelationLoader: Clone + Send + Sync + 'static {
    /// Load one entity by identifier.
    fn load_one<U: Entity>(&self, id: &U::Id) -> Result<Option<EntityRef<U>>>;

    /// Load every entity matching a `{field}` filter template.
    fn load_many<U: Entity>(&self, filter: &str, params: &[(&str, Value)])
    -> Result<Vec<EntityRef<U>>>;
}

/// Kind of relationship slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Owner holds the foreign key; resolves to zero or one entity.
    Single,
    /// Targets hold a foreign key to the owner; resolves to a list.
    Collection,
}

type Installer<E, L> = Arc<dyn Fn(&E, &str, &L) -> Result<bool> + Send + Sync>;

/// Declaration of one deferred relationship slot on entity `E`.
pub struct Relationship<E, L> {
    name: &'static str,
    kind: RelationshipKind,
    target: &'static str,
    foreign_key: String,
    install: Installer<E, L>,
}

impl<E: Entity, L: RelationLoader> Relationship<E, L> {
    /// A single-entity slot.
    ///
    /// The foreign key is read from the owner's `{name}_id` field, captured
    /// when the slot is wired. A NULL foreign key resolves to `None`.
    pub fn single<U: Entity>(name: &'static str, slot: fn(&E) -> &LazyOne<U>) -> Self {
        let install = move |owner: &E, fk: &str, loader: &L| -> Result<bool> {
            let cell = slot(owner);
            if cell.is_loaded() || cell.is_wired() {
                return Ok(false);
            }
            let fk_value = owner
                .to_row()
                .into_iter()
                .find_map(|(field, value)| (field == fk).then_some(value))
                .ok_or_else(|| {
                    Error::config(
                        ConfigErrorKind::Relationship,
                        format!(
                            "{} has no field '{}' for relationship '{}'",
                            E::NAME,
                            fk,
                            name
                        ),
                    )
                })?;
            let loader = loader.clone();
            Ok(cell.set_loader(move || {
                if fk_value.is_null() {
                    return Ok(None);
                }
                let id = <U::Id as FromValue>::from_value(&fk_value)?;
                loader.load_one::<U>(&id)
            }))
        };
        Self {
            name,
            kind: RelationshipKind::Single,
            target: U::NAME,
            foreign_key: format!("{name}_id"),
            install: Arc::new(install),
        }
    }

    /// A collection slot.
    ///
    /// Loads every `U` whose `{owner NAME}_id` field equals the owner's id.
    pub fn many<U: Entity>(name: &'static str, slot: fn(&E) -> &LazyMany<U>) -> Self {
        let install = move |owner: &E, fk: &str, loader: &L| -> Result<bool> {
            let cell = slot(owner);
            if cell.is_loaded() || cell.is_wired() {
                return Ok(false);
            }
            if !U::fields().contains(&fk) {
                return Err(Error::config(
                    ConfigErrorKind::Relationship,
                    format!(
                        "{} has no field '{}' for relationship '{}' on {}",
                        U::NAME,
                        fk,
                        name,
                        E::NAME
                    ),
                ));
            }
            let filter = format!("{{{fk}}} = @id");
            let owner_id: Value = owner.id().into();
            let loader = loader.clone();
            Ok(cell.set_loader(move || {
                loader.load_many::<U>(&filter, &[("id", owner_id.clone())])
            }))
        };
        Self {
            name,
            kind: RelationshipKind::Collection,
            target: U::NAME,
            foreign_key: format!("{}_id", E::NAME),
            install: Arc::new(install),
        }
    }

    /// Override the foreign key field.
    #[must_use]
    pub fn foreign_key(mut self, field: impl Into<String>) -> Self {
        self.foreign_key = field.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    /// `NAME` of the related entity type.
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn foreign_key_field(&self) -> &str {
        &self.foreign_key
    }

    /// Wire this slot on `owner`. Returns `false` if it was already wired or
    /// loaded.
    pub fn install(&self, owner: &E, loader: &L) -> Result<bool> {
        (self.install)(owner, &self.foreign_key, loader)
    }
}

impl<E, L> fmt::Debug for Relationship<E, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("foreign_key", &self.foreign_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lazy_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: Lazy<i64> = Lazy::deferred(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });
        assert!(lazy.is_wired());
        assert_eq!(*lazy.get().unwrap(), 42);
        assert_eq!(*lazy.get().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lazy.is_loaded());
        assert!(!lazy.is_wired());
    }

    #[test]
    fn failed_load_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: Lazy<i64> = Lazy::deferred(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Custom("transient".into()))
            } else {
                Ok(7)
            }
        });
        assert!(lazy.get().is_err());
        assert!(!lazy.is_loaded());
        assert_eq!(*lazy.get().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn populated_slot_refuses_loader() {
        let lazy = Lazy::loaded(1_i64);
        assert!(!lazy.set_loader(|| Ok(2)));
        assert_eq!(*lazy.get().unwrap(), 1);

        let wired: Lazy<i64> = Lazy::deferred(|| Ok(3));
        assert!(!wired.set_loader(|| Ok(4)));
        assert_eq!(*wired.get().unwrap(), 3);
    }

    #[test]
    fn unwired_slot_is_config_error() {
        let lazy: Lazy<i64> = Lazy::new();
        let err = lazy.get().unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::Relationship));
        assert!(lazy.try_get().is_none());
    }

    #[test]
    fn clone_keeps_loaded_value() {
        let lazy = Lazy::loaded(vec![1, 2]);
        let copy = lazy.clone();
        assert_eq!(copy.try_get(), Some(&vec![1, 2]));
        assert_eq!(format!("{copy:?}"), "Lazy { state: \"loaded\" }");
    }

    // ---- relationship installers ----

    struct Author {
        id: i64,
        books: LazyMany<Book>,
    }

    struct Book {
        id: i64,
        author_id: Option<i64>,
        author: LazyOne<Author>,
    }

    impl Entity for Author {
        type Id = i64;
        const NAME: &'static str = "author";

        fn fields() -> &'static [&'static str] {
            &["id"]
        }

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                books: LazyMany::new(),
            })
        }

        fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
            vec![Relationship::many("books", |a: &Author| &a.books)]
        }
    }

    impl Entity for Book {
        type Id = i64;
        const NAME: &'static str = "book";

        fn fields() -> &'static [&'static str] {
            &["id", "author_id"]
        }

        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.into()), ("author_id", self.author_id.into())]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                author_id: row.get_named("author_id")?,
                author: LazyOne::new(),
            })
        }

        fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
            vec![Relationship::single("author", |b: &Book| &b.author)]
        }
    }

    #[derive(Clone, Default)]
    struct Fake {
        one_calls: Arc<AtomicUsize>,
        filters: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    }

    impl RelationLoader for Fake {
        fn load_one<U: Entity>(&self, id: &U::Id) -> Result<Option<EntityRef<U>>> {
            self.one_calls.fetch_add(1, Ordering::SeqCst);
            let row = Row::new(vec!["id".into()], vec![id.clone().into()]);
            U::from_row(&row).map(|u| Some(Arc::new(RwLock::new(u))))
        }

        fn load_many<U: Entity>(
            &self,
            filter: &str,
            params: &[(&str, Value)],
        ) -> Result<Vec<EntityRef<U>>> {
            self.filters.lock().unwrap().push((
                filter.to_string(),
                params.iter().map(|(_, v)| v.clone()).collect(),
            ));
            Ok(Vec::new())
        }
    }

    #[test]
    fn single_slot_loads_by_foreign_key() {
        let loader = Fake::default();
        let book = Book {
            id: 1,
            author_id: Some(9),
            author: LazyOne::new(),
        };
        let rels = Book::relationships::<Fake>();
        assert_eq!(rels[0].foreign_key_field(), "author_id");
        assert_eq!(rels[0].kind(), RelationshipKind::Single);
        assert_eq!(rels[0].target(), "author");
        assert!(rels[0].install(&book, &loader).unwrap());
        assert!(!rels[0].install(&book, &loader).unwrap());

        let author = book.author.get().unwrap().as_ref().unwrap();
        assert_eq!(author.read().unwrap().id, 9);
        book.author.get().unwrap();
        assert_eq!(loader.one_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_foreign_key_resolves_to_none() {
        let loader = Fake::default();
        let book = Book {
            id: 1,
            author_id: None,
            author: LazyOne::new(),
        };
        Book::relationships::<Fake>()[0].install(&book, &loader).unwrap();
        assert!(book.author.get().unwrap().is_none());
        assert_eq!(loader.one_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn collection_slot_filters_on_owner_id() {
        let loader = Fake::default();
        let author = Author {
            id: 5,
            books: LazyMany::new(),
        };
        let rels = Author::relationships::<Fake>();
        assert_eq!(rels[0].foreign_key_field(), "author_id");
        rels[0].install(&author, &loader).unwrap();
        assert!(author.books.get().unwrap().is_empty());

        let filters = loader.filters.lock().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].0, "{author_id} = @id");
        assert_eq!(filters[0].1, vec![Value::BigInt(5)]);
    }

    #[test]
    fn unknown_foreign_key_is_config_error() {
        let loader = Fake::default();
        let author = Author {
            id: 5,
            books: LazyMany::new(),
        };
        let rel = Relationship::<Author, Fake>::many("books", |a: &Author| &a.books)
            .foreign_key("writer_id");
        let err = rel.install(&author, &loader).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::Relationship));
        assert!(!author.books.is_wired());
    }
}
