//! Database connection, transaction and provider traits.
//!
//! This module defines the seams every database engine plugs into:
//!
//! - [`Connection`] - an open, blocking connection
//! - [`Transaction`] - an open transaction bound to one connection
//! - [`Provider`] - engine-specific connection and transaction factory
//! - [`IsolationLevel`] - SQL transaction isolation levels
//!
//! Parameters are always named. Placeholders in SQL are written `@name` and
//! the matching value is passed as `("name", value)`.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read uncommitted: dirty reads are possible.
    ReadUncommitted,

    /// Read committed: only committed changes from others are visible.
    #[default]
    ReadCommitted,

    /// Repeatable read: a consistent snapshot for the whole transaction.
    RepeatableRead,

    /// Serializable: transactions appear to execute sequentially.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL syntax for this isolation level.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// An open database connection.
///
/// Connections are shared as `Arc<dyn Connection>`. Two handles refer to the
/// same connection exactly when [`same_connection`] says so.
pub trait Connection: Send + Sync {
    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[(&str, Value)]) -> Result<u64>;

    /// Close the connection. Closing twice is not an error.
    fn close(&self) -> Result<()>;

    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;
}

/// An open transaction on one connection.
pub trait Transaction: Send + Sync {
    fn isolation(&self) -> IsolationLevel;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

/// Engine-specific factory for connections and transactions.
pub trait Provider: Send + Sync {
    /// Name this provider is registered under.
    fn name(&self) -> &str;

    /// Open a new connection.
    fn open_connection(&self, connection_string: &str) -> Result<Arc<dyn Connection>>;

    /// Start a transaction on an open connection.
    fn begin_transaction(
        &self,
        connection: &Arc<dyn Connection>,
        isolation: IsolationLevel,
    ) -> Result<Arc<dyn Transaction>>;

    /// SQL appended to a query to fetch one page of rows.
    fn page_clause(&self, offset: i64, limit: i64) -> String {
        format!("LIMIT {limit} OFFSET {offset}")
    }
}

/// Identity comparison for connection handles.
pub fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// Statement-driven transaction
// ============================================================================

/// A transaction driven by plain `BEGIN`/`COMMIT`/`ROLLBACK` statements.
///
/// Providers whose engines have no native transaction handle build on this.
pub struct SqlTransaction {
    connection: Arc<dyn Connection>,
    isolation: IsolationLevel,
    finished: AtomicBool,
}

impl SqlTransaction {
    /// Run `begin_sql` on the connection and return the open transaction.
    pub fn begin(
        connection: Arc<dyn Connection>,
        begin_sql: &str,
        isolation: IsolationLevel,
    ) -> Result<Self> {
        connection.execute(begin_sql, &[])?;
        tracing::debug!(isolation = isolation.as_sql(), "Transaction started");
        Ok(Self {
            connection,
            isolation,
            finished: AtomicBool::new(false),
        })
    }

    /// Whether COMMIT or ROLLBACK has already been issued.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Transaction for SqlTransaction {
    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(&self) -> Result<()> {
        self.connection.execute("COMMIT", &[])?;
        self.finished.store(true, Ordering::Release);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.finished.store(true, Ordering::Release);
        self.connection.execute("ROLLBACK", &[])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        statements: Mutex<Vec<String>>,
    }

    impl Connection for Recording {
        fn query(&self, _sql: &str, _params: &[(&str, Value)]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn execute(&self, sql: &str, _params: &[(&str, Value)]) -> Result<u64> {
            self.statements.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    #[test]
    fn isolation_default_and_sql() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        let parsed: IsolationLevel = serde_json::from_str("\"repeatable_read\"").unwrap();
        assert_eq!(parsed, IsolationLevel::RepeatableRead);
    }

    #[test]
    fn sql_transaction_issues_statements() {
        let rec = Arc::new(Recording::default());
        let conn: Arc<dyn Connection> = rec.clone();
        let tx = SqlTransaction::begin(conn, "BEGIN", IsolationLevel::ReadCommitted).unwrap();
        assert!(!tx.is_finished());
        tx.commit().unwrap();
        assert!(tx.is_finished());
        assert_eq!(*rec.statements.lock().unwrap(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn connection_identity() {
        let a: Arc<dyn Connection> = Arc::new(Recording::default());
        let b: Arc<dyn Connection> = Arc::new(Recording::default());
        let a2 = Arc::clone(&a);
        assert!(same_connection(&a, &a2));
        assert!(!same_connection(&a, &b));
    }
}
