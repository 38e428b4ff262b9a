//! SQLite provider.

use crate::config::SqliteConfig;
use crate::connection::SqliteConnection;
use dataunit_core::{Connection, IsolationLevel, Provider, Result, SqlTransaction, Transaction};
use std::sync::Arc;

/// Opens [`SqliteConnection`]s and statement-driven transactions.
///
/// SQLite transactions are always serializable. `Serializable` maps to
/// `BEGIN IMMEDIATE`, which takes the write lock up front; every other level
/// maps to `BEGIN DEFERRED`.
///
/// Foreign key checks are deferred to commit inside every transaction, so a
/// violation surfaces as a failed commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    pub const NAME: &'static str = "sqlite";

    pub fn new() -> Self {
        Self
    }

    fn begin_sql(isolation: IsolationLevel) -> &'static str {
        match isolation {
            IsolationLevel::Serializable => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        }
    }
}

impl Provider for SqliteProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open_connection(&self, connection_string: &str) -> Result<Arc<dyn Connection>> {
        let config = SqliteConfig::parse(connection_string)?;
        Ok(Arc::new(SqliteConnection::open(&config)?))
    }

    fn begin_transaction(
        &self,
        connection: &Arc<dyn Connection>,
        isolation: IsolationLevel,
    ) -> Result<Arc<dyn Transaction>> {
        let tx = SqlTransaction::begin(
            Arc::clone(connection),
            Self::begin_sql(isolation),
            isolation,
        )?;
        if let Err(err) = connection.execute("PRAGMA defer_foreign_keys = ON", &[]) {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(error = %rollback_err, "Rollback after failed transaction setup failed");
            }
            return Err(err);
        }
        Ok(Arc::new(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataunit_core::Value;

    #[test]
    fn commit_and_rollback_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.db");
        let cs = format!("Data Source={}", path.display());
        let provider = SqliteProvider::new();

        let setup = provider.open_connection(&cs).unwrap();
        setup
            .execute("CREATE TABLE t (v INTEGER)", &[])
            .unwrap();
        setup.close().unwrap();

        let conn = provider.open_connection(&cs).unwrap();
        let tx = provider
            .begin_transaction(&conn, IsolationLevel::ReadCommitted)
            .unwrap();
        conn.execute("INSERT INTO t (v) VALUES (@v)", &[("v", Value::BigInt(1))])
            .unwrap();
        tx.commit().unwrap();

        let tx = provider
            .begin_transaction(&conn, IsolationLevel::Serializable)
            .unwrap();
        assert_eq!(tx.isolation(), IsolationLevel::Serializable);
        conn.execute("INSERT INTO t (v) VALUES (@v)", &[("v", Value::BigInt(2))])
            .unwrap();
        tx.rollback().unwrap();

        let rows = conn.query("SELECT COUNT(*) AS n FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_named::<i64>("n").unwrap(), 1);
    }

    #[test]
    fn foreign_keys_are_checked_at_commit() {
        let dir = tempfile::tempdir().unwrap();
        let cs = dir.path().join("fk.db").display().to_string();
        let provider = SqliteProvider::new();

        let conn = provider.open_connection(&cs).unwrap();
        conn.execute("CREATE TABLE parent (id INTEGER PRIMARY KEY)", &[])
            .unwrap();
        conn.execute(
            "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))",
            &[],
        )
        .unwrap();

        let tx = provider
            .begin_transaction(&conn, IsolationLevel::default())
            .unwrap();
        let rows = conn.query("PRAGMA defer_foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get(0).and_then(Value::as_i64), Some(1));

        // Accepted now, rejected when the transaction commits.
        conn.execute("INSERT INTO child (id, parent_id) VALUES (1, 42)", &[])
            .unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, dataunit_core::Error::Query(_)), "{err}");
        tx.rollback().unwrap();

        let rows = conn.query("SELECT COUNT(*) AS n FROM child", &[]).unwrap();
        assert_eq!(rows[0].get_named::<i64>("n").unwrap(), 0);
    }

    #[test]
    fn close_abandons_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let cs = dir.path().join("abandon.db").display().to_string();
        let provider = SqliteProvider::new();

        let conn = provider.open_connection(&cs).unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)", &[]).unwrap();
        let _tx = provider
            .begin_transaction(&conn, IsolationLevel::default())
            .unwrap();
        conn.execute("INSERT INTO t (v) VALUES (1)", &[]).unwrap();
        conn.close().unwrap();

        let check = provider.open_connection(&cs).unwrap();
        let rows = check.query("SELECT COUNT(*) AS n FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_named::<i64>("n").unwrap(), 0);
    }
}
