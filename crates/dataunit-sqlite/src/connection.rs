//! SQLite connection.

use crate::config::SqliteConfig;
use crate::types::{from_sqlite, to_sqlite};
use dataunit_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use dataunit_core::{ColumnInfo, Connection, Error, Result, Row, Value};
use rusqlite::OpenFlags;
use std::sync::{Arc, Mutex};

/// A blocking SQLite connection.
///
/// The rusqlite handle sits behind a mutex so the connection can be shared
/// as `Arc<dyn Connection>`. Closing drops the handle; SQLite rolls back any
/// transaction left open at that point.
pub struct SqliteConnection {
    inner: Mutex<Option<rusqlite::Connection>>,
    path: String,
}

impl SqliteConnection {
    /// Open a database with the given settings.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI
        } else {
            OpenFlags::default()
        };
        let conn = rusqlite::Connection::open_with_flags(&config.path, flags)
            .map_err(|e| connect_error(&config.path, e))?;
        conn.busy_timeout(config.busy_timeout())
            .map_err(|e| connect_error(&config.path, e))?;
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
                .map_err(|e| connect_error(&config.path, e))?;
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");
        Ok(Self {
            inner: Mutex::new(Some(conn)),
            path: config.path.clone(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::default())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run one or more statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(|e| query_error(sql, e)))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Closed,
                message: format!("SQLite connection to '{}' is closed", self.path),
                source: None,
            })),
        }
    }
}

/// Bind named parameters to a prepared statement.
///
/// Parameters the statement doesn't reference are skipped, so one parameter
/// list can serve both a query and its count.
fn bind(stmt: &mut rusqlite::Statement<'_>, sql: &str, params: &[(&str, Value)]) -> Result<()> {
    for (name, value) in params {
        let placeholder = format!("@{}", name.trim_start_matches(['@', ':', '$']));
        let index = stmt
            .parameter_index(&placeholder)
            .map_err(|e| query_error(sql, e))?;
        if let Some(index) = index {
            stmt.raw_bind_parameter(index, to_sqlite(value))
                .map_err(|e| query_error(sql, e))?;
        }
    }
    Ok(())
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<Row>> {
        tracing::trace!(sql, "SQLite query");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| query_error(sql, e))?;
            bind(&mut stmt, sql, params)?;

            let names: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let width = names.len();
            let columns = Arc::new(ColumnInfo::new(names));

            let mut out = Vec::new();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next().map_err(|e| query_error(sql, e))? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    let value = row.get_ref(i).map_err(|e| query_error(sql, e))?;
                    values.push(from_sqlite(value));
                }
                out.push(Row::with_columns(Arc::clone(&columns), values));
            }
            Ok(out)
        })
    }

    fn execute(&self, sql: &str, params: &[(&str, Value)]) -> Result<u64> {
        tracing::trace!(sql, "SQLite execute");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| query_error(sql, e))?;
            bind(&mut stmt, sql, params)?;
            let affected = stmt.raw_execute().map_err(|e| query_error(sql, e))?;
            Ok(affected as u64)
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(conn) = guard.take() else {
            return Ok(());
        };
        match conn.close() {
            Ok(()) => {
                tracing::debug!(path = %self.path, "Closed SQLite connection");
                Ok(())
            }
            Err((conn, e)) => {
                *guard = Some(conn);
                Err(Error::Connection(ConnectionError {
                    kind: ConnectionErrorKind::Close,
                    message: format!("failed to close '{}': {}", self.path, e),
                    source: Some(Box::new(e)),
                }))
            }
        }
    }

    fn is_open(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

fn connect_error(path: &str, e: rusqlite::Error) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message: format!("failed to open SQLite database '{}': {}", path, e),
        source: Some(Box::new(e)),
    })
}

fn query_error(sql: &str, e: rusqlite::Error) -> Error {
    let kind = match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => QueryErrorKind::Constraint,
        _ if e.to_string().contains("syntax error") => QueryErrorKind::Syntax,
        _ if e.to_string().contains("no such") => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    };
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}
