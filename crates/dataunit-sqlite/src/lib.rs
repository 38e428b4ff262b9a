//! SQLite provider for dataunit.
//!
//! Backed by `rusqlite` with the bundled SQLite amalgamation. Implements the
//! `Connection` and `Provider` traits from dataunit-core.
//!
//! # Example
//!
//! ```rust,ignore
//! use dataunit_core::{Connection, Provider, Value};
//! use dataunit_sqlite::SqliteProvider;
//!
//! let provider = SqliteProvider::new();
//! let conn = provider.open_connection("Data Source=app.db;Busy Timeout=2000")?;
//! conn.execute("CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, name TEXT)", &[])?;
//! conn.execute(
//!     "INSERT INTO users (id, name) VALUES (@id, @name)",
//!     &[("id", Value::Uuid(uuid::Uuid::new_v4())), ("name", "Alice".into())],
//! )?;
//! ```
//!
//! Each `:memory:` connection is its own private database, so sessions that
//! open a connection per query should point at a file.

pub mod config;
pub mod connection;
pub mod provider;
mod types;

pub use config::SqliteConfig;
pub use connection::SqliteConnection;
pub use provider::SqliteProvider;
