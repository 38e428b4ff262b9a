//! Entity and identifier traits.

use crate::error::Result;
use crate::relationship::{RelationLoader, Relationship};
use crate::row::{FromValue, Row};
use crate::value::Value;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A loaded entity shared by everything in one session.
///
/// Two handles are "the same instance" exactly when `Arc::ptr_eq` holds.
pub type EntityRef<T> = Arc<RwLock<T>>;

/// Identifier type of an entity.
pub trait EntityId:
    Clone + Eq + Hash + Debug + Send + Sync + Into<Value> + FromValue + 'static
{
    /// Whether this identifier still has its "not assigned yet" value.
    fn is_unset(&self) -> bool;

    /// Produce a fresh identifier for a new entity, if the type can.
    fn generate() -> Option<Self> {
        None
    }
}

impl EntityId for Uuid {
    fn is_unset(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }
}

impl EntityId for i64 {
    fn is_unset(&self) -> bool {
        *self == 0
    }
}

impl EntityId for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

/// A record type with a single identifying attribute.
///
/// `fields()` lists every mapped attribute, the key included. `to_row` and
/// `from_row` work in terms of those field names; translating them to column
/// names is the mapping layer's job.
///
/// # Example
///
/// ```ignore
/// struct Author {
///     id: Uuid,
///     name: String,
///     books: LazyMany<Book>,
/// }
///
/// impl Entity for Author {
///     type Id = Uuid;
///     const NAME: &'static str = "author";
///
///     fn fields() -> &'static [&'static str] {
///         &["id", "name"]
///     }
///     // ...
///     fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
///         vec![Relationship::many("books", |a: &Author| &a.books)]
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// Identifier type.
    type Id: EntityId;

    /// Logical type name. Default table name and base of foreign key names.
    const NAME: &'static str;

    /// Field holding the identifier.
    const KEY: &'static str = "id";

    /// Mapped field names, the key field included.
    fn fields() -> &'static [&'static str];

    fn id(&self) -> Self::Id;

    fn set_id(&mut self, id: Self::Id);

    /// Field values in `fields()` order.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Build an instance from a row keyed by field name.
    fn from_row(row: &Row) -> Result<Self>;

    /// Deferred relationship slots of this type.
    fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
        Vec::new()
    }
}
