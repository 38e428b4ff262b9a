//! Core types and traits for dataunit.
//!
//! This crate provides the abstractions the session layer and the database
//! providers share:
//!
//! - `Entity` and `EntityId` for records with a single identifier
//! - `Connection`, `Transaction` and `Provider` for database engines
//! - `Lazy` slots and the `Relationship` registry for deferred loading
//! - `Value` and `Row` for dynamically typed results
//! - `PagedResult` for paged queries

pub mod connection;
pub mod entity;
pub mod error;
pub mod paging;
pub mod relationship;
pub mod row;
pub mod value;

pub use connection::{
    Connection, IsolationLevel, Provider, SqlTransaction, Transaction, same_connection,
};
pub use entity::{Entity, EntityId, EntityRef};
pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
};
pub use paging::PagedResult;
pub use relationship::{
    Lazy, LazyMany, LazyOne, RelationLoader, Relationship, RelationshipKind,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
