//! dataunit: unit of work, identity map and lazy relationships over SQL.
//!
//! Each [`Session`] is one logical unit of work. Within a session a record
//! is materialized at most once, transactions are opened one at a time, and
//! related records load on first access.
//!
//! # Example
//!
//! ```ignore
//! use dataunit::prelude::*;
//!
//! struct Author {
//!     id: Uuid,
//!     name: String,
//!     books: LazyMany<Book>,
//! }
//!
//! impl Entity for Author {
//!     type Id = Uuid;
//!     const NAME: &'static str = "author";
//!
//!     fn fields() -> &'static [&'static str] {
//!         &["id", "name"]
//!     }
//!     fn id(&self) -> Uuid { self.id }
//!     fn set_id(&mut self, id: Uuid) { self.id = id; }
//!     fn to_row(&self) -> Vec<(&'static str, Value)> {
//!         vec![("id", self.id.into()), ("name", self.name.clone().into())]
//!     }
//!     fn from_row(row: &Row) -> Result<Self> {
//!         Ok(Self { id: row.get_named("id")?, name: row.get_named("name")?, books: LazyMany::new() })
//!     }
//!     fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
//!         vec![Relationship::many("books", |a: &Author| &a.books)]
//!     }
//! }
//!
//! let session = Session::new("Data Source=library.db", "sqlite")?;
//! session.map_with_table::<Author>("authors")?;
//!
//! let tx = session.begin_transaction()?;
//! let le_guin = session.repo::<Author>().add(Author::new("Ursula K. Le Guin"))?;
//! tx.commit()?;
//! drop(tx);
//!
//! let books = le_guin.read().unwrap().books.get()?.len();
//! ```

pub use dataunit_core::{
    ColumnInfo, ConfigError, ConfigErrorKind, Connection, ConnectionError, ConnectionErrorKind,
    Entity, EntityId, EntityRef, Error, FromValue, IsolationLevel, Lazy, LazyMany, LazyOne,
    PagedResult, Provider, QueryError, QueryErrorKind, RelationLoader, Relationship,
    RelationshipKind, Result, Row, SqlTransaction, Transaction, TransactionError,
    TransactionErrorKind, TypeError, Value, same_connection,
};
pub use dataunit_session::{
    DomainTransaction, EntityCache, EntityMap, EntityMapContainer, IdentityMap, LazyLoader,
    Parser, Repository, Session, SessionBuilder, SessionConfig, SessionLoader, TransactionState,
    TransactionStatus, known_providers, resolve_provider,
};
#[cfg(feature = "sqlite")]
pub use dataunit_sqlite::{SqliteConfig, SqliteConnection, SqliteProvider};

pub use uuid::Uuid;

/// Everything needed to declare entities and work with a session.
///
/// ```ignore
/// use dataunit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        DomainTransaction, Entity, EntityId, EntityRef, Error, IsolationLevel, Lazy, LazyMany,
        LazyOne, PagedResult, RelationLoader, Relationship, Repository, Result, Row, Session,
        SessionConfig, TransactionState, Uuid, Value,
    };
}
