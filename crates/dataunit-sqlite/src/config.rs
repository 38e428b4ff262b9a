//! SQLite connection-string parsing.

use dataunit_core::{ConfigErrorKind, Error, Result};
use std::time::Duration;

/// Settings for opening a SQLite database.
///
/// Parsed from either a bare path (`app.db`, `:memory:`) or a
/// `key=value;` list:
///
/// ```text
/// Data Source=app.db;Busy Timeout=2500;Foreign Keys=true;Read Only=false
/// ```
///
/// Keys are case-insensitive and ignore spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:".
    pub path: String,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Enforce foreign key constraints.
    pub foreign_keys: bool,
    pub read_only: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
            read_only: false,
        }
    }
}

impl SqliteConfig {
    /// Config for a database file with default settings.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse a connection string.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::EmptyConnectionString,
                "SQLite connection string is empty",
            ));
        }
        if !trimmed.contains('=') {
            return Ok(Self::file(trimmed));
        }

        let mut config = Self {
            path: String::new(),
            ..Default::default()
        };
        for pair in trimmed.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                invalid(format!("malformed connection string segment '{}'", pair))
            })?;
            let key: String = key
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "datasource" | "filename" | "path" => config.path = value.to_string(),
                "busytimeout" => {
                    config.busy_timeout_ms = value
                        .parse()
                        .map_err(|_| invalid(format!("invalid busy timeout '{}'", value)))?;
                }
                "foreignkeys" => config.foreign_keys = parse_bool(&key, value)?,
                "readonly" => config.read_only = parse_bool(&key, value)?,
                _ => return Err(invalid(format!("unknown SQLite setting '{}'", key))),
            }
        }

        if config.path.is_empty() {
            return Err(invalid("SQLite connection string has no Data Source"));
        }
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.busy_timeout_ms))
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(format!("invalid value '{}' for {}", value, key))),
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::config(ConfigErrorKind::Invalid, message)
}
