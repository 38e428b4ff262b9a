//! Unit of work for dataunit.
//!
//! A [`Session`] is one logical unit of work against a database. It
//! coordinates:
//!
//! - **Connections**: inside a transaction every caller shares the
//!   transaction's connection; outside one each call gets a fresh connection
//!   that the caller hands back through [`Session::close`].
//! - **Transactions**: at most one [`DomainTransaction`] is open per session.
//! - **Identity**: every loaded record goes through the session's
//!   [`EntityCache`], so one identifier maps to one instance.
//! - **Lazy relationships**: freshly loaded entities get their relationship
//!   slots wired by a [`LazyLoader`].
//!
//! # Example
//!
//! ```ignore
//! use dataunit_session::Session;
//!
//! let session = Session::new("Data Source=app.db", "sqlite")?;
//! let people = session.repo::<Person>();
//!
//! let tx = session.begin_transaction()?;
//! people.add(Person::new("Ada"))?;
//! tx.commit()?;
//! drop(tx); // back to NoTransaction
//!
//! let ada = people.single("{name} = @name", &[("name", "Ada".into())])?;
//! ```

pub mod entity_cache;
pub mod entity_map;
pub mod identity_map;
pub mod lazy_loader;
pub mod parser;
pub mod provider;
mod registry;
pub mod repository;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use entity_cache::EntityCache;
pub use entity_map::{EntityMap, EntityMapContainer};
pub use identity_map::IdentityMap;
pub use lazy_loader::{LazyLoader, SessionLoader};
pub use parser::Parser;
pub use provider::{known_providers, resolve_provider};
pub use repository::Repository;
pub use transaction::{DomainTransaction, TransactionStatus};

use dataunit_core::{
    ConfigError, ConfigErrorKind, Connection, Entity, Error, IsolationLevel, Provider, Result,
    same_connection,
};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for building a [`Session`].
///
/// Deserializable so it can live in a settings file:
///
/// ```json
/// {
///   "connection_string": "Data Source=app.db;Busy Timeout=2000",
///   "provider": "sqlite",
///   "isolation_level": "read_committed",
///   "lazy_loading": true
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection_string: String,
    /// Name looked up in the known provider table.
    pub provider: String,
    /// Isolation level for [`Session::begin_transaction`].
    pub isolation_level: IsolationLevel,
    /// Whether loaded entities get their relationship slots wired.
    pub lazy_loading: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            provider: String::new(),
            isolation_level: IsolationLevel::ReadCommitted,
            lazy_loading: true,
        }
    }
}

impl SessionConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                kind: ConfigErrorKind::Invalid,
                message: format!("invalid session configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }
}

/// Whether a session currently has an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NoTransaction,
    TransactionOpen,
}

// ============================================================================
// Session
// ============================================================================

type Undo = Box<dyn FnOnce() + Send>;

struct ActiveTransaction {
    id: u64,
    connection: Arc<dyn Connection>,
    /// Identity map entries created by inserts under this transaction.
    added: Vec<Undo>,
}

/// Everything a session is built from except its cache and transaction.
///
/// Deferred loads keep this alive so a relationship can still resolve after
/// the session that wired it is gone, as long as its cache is shared with a
/// live session.
pub(crate) struct SessionSeed {
    connection_string: String,
    provider: Arc<dyn Provider>,
    maps: EntityMapContainer,
    isolation: IsolationLevel,
    lazy_loading: bool,
}

impl SessionSeed {
    /// A fresh session over `cache`, with no transaction open.
    pub(crate) fn revive(self: &Arc<Self>, cache: Arc<EntityCache>) -> Session {
        Session::from_inner(Arc::new(SessionInner {
            seed: Arc::clone(self),
            cache,
            current: Mutex::new(None),
        }))
    }
}

pub(crate) struct SessionInner {
    seed: Arc<SessionSeed>,
    cache: Arc<EntityCache>,
    current: Mutex<Option<ActiveTransaction>>,
}

impl SessionInner {
    pub(crate) fn seed(&self) -> &Arc<SessionSeed> {
        &self.seed
    }

    /// Forget the current transaction if it is still `id`.
    pub(crate) fn clear_transaction(&self, id: u64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if current.as_ref().is_some_and(|active| active.id == id) {
            *current = None;
        }
    }

    /// Evict every entity inserted under transaction `id`.
    pub(crate) fn discard_added(&self, id: u64) {
        let undo = self.take_added(id);
        if !undo.is_empty() {
            tracing::debug!(
                transaction = id,
                evicted = undo.len(),
                "Evicting entities added by an uncommitted transaction"
            );
        }
        for evict in undo {
            evict();
        }
    }

    /// Keep the entities inserted under transaction `id`.
    pub(crate) fn keep_added(&self, id: u64) {
        drop(self.take_added(id));
    }

    fn take_added(&self, id: u64) -> Vec<Undo> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match current.as_mut() {
            Some(active) if active.id == id => std::mem::take(&mut active.added),
            _ => Vec::new(),
        }
    }
}

/// A unit of work against one database.
///
/// `Session` is a cheap handle; clones share the same connection state,
/// cache and mappings. It is meant to be driven from one thread at a time.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session for a provider from the known provider table.
    pub fn new(connection_string: &str, provider_name: &str) -> Result<Self> {
        Self::builder()
            .connection_string(connection_string)
            .provider_name(provider_name)
            .build()
    }

    /// Create a session with an injected provider.
    pub fn with_provider(connection_string: &str, provider: Arc<dyn Provider>) -> Result<Self> {
        Self::builder()
            .connection_string(connection_string)
            .provider(provider)
            .build()
    }

    /// Create a session that shares `cache` with other sessions.
    pub fn with_cache(
        connection_string: &str,
        provider: Arc<dyn Provider>,
        cache: Arc<EntityCache>,
    ) -> Result<Self> {
        Self::builder()
            .connection_string(connection_string)
            .provider(provider)
            .cache(cache)
            .build()
    }

    /// Create a session from a [`SessionConfig`].
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::builder()
            .connection_string(&config.connection_string)
            .provider_name(&config.provider)
            .isolation_level(config.isolation_level)
            .lazy_loading(config.lazy_loading)
            .build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn state(&self) -> TransactionState {
        if self.current().is_some() {
            TransactionState::TransactionOpen
        } else {
            TransactionState::NoTransaction
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.state() == TransactionState::TransactionOpen
    }

    /// Id of the open transaction, if any.
    pub fn current_transaction_id(&self) -> Option<u64> {
        self.current().map(|(id, _)| id)
    }

    /// Open a connection and start a transaction on it.
    ///
    /// Fails with a conflict error if this session already has an open
    /// transaction; the open one is left untouched. The transaction runs at
    /// the session's isolation level (read committed unless configured).
    pub fn begin_transaction(&self) -> Result<DomainTransaction> {
        let mut current = self.inner.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = current.as_ref() {
            return Err(Error::transaction(
                dataunit_core::TransactionErrorKind::AlreadyOpen,
                format!("transaction {} is already open in this session", active.id),
            ));
        }

        let connection = self
            .inner
            .seed
            .provider
            .open_connection(&self.inner.seed.connection_string)?;
        let transaction = match self
            .inner
            .seed
            .provider
            .begin_transaction(&connection, self.inner.seed.isolation)
        {
            Ok(transaction) => transaction,
            Err(err) => {
                if let Err(close_err) = connection.close() {
                    tracing::warn!(error = %close_err, "Failed to close connection after begin failed");
                }
                return Err(err);
            }
        };

        let id = transaction::next_transaction_id();
        *current = Some(ActiveTransaction {
            id,
            connection: Arc::clone(&connection),
            added: Vec::new(),
        });
        tracing::debug!(
            transaction = id,
            isolation = self.inner.seed.isolation.as_sql(),
            "Transaction begun"
        );
        Ok(DomainTransaction::attached(
            id,
            connection,
            transaction,
            Arc::downgrade(&self.inner),
        ))
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// A connection for one unit of data access.
    ///
    /// Inside a transaction this is the transaction's connection. Otherwise it
    /// is a new connection every call; hand it back with [`close`](Self::close).
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        if let Some((_, connection)) = self.current() {
            return Ok(connection);
        }
        tracing::trace!(provider = self.inner.seed.provider.name(), "Opening connection");
        self.inner
            .seed
            .provider
            .open_connection(&self.inner.seed.connection_string)
    }

    /// Close a connection obtained from [`connection`](Self::connection).
    ///
    /// The open transaction's connection is left open, so this is safe to call
    /// after every query.
    pub fn close(&self, connection: &Arc<dyn Connection>) -> Result<()> {
        if let Some((_, active)) = self.current() {
            if same_connection(&active, connection) {
                return Ok(());
            }
        }
        connection.close()
    }

    /// Run `f` on a connection and close it afterwards, even on error.
    pub fn with_connection<R>(&self, f: impl FnOnce(&dyn Connection) -> Result<R>) -> Result<R> {
        let connection = self.connection()?;
        let result = f(connection.as_ref());
        let closed = self.close(&connection);
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(error = %close_err, "Failed to close connection");
                Err(err)
            }
        }
    }

    // ========================================================================
    // Repositories, mappings and identity
    // ========================================================================

    /// Repository for `T` bound to this session.
    pub fn repo<T: Entity>(&self) -> Repository<T> {
        Repository::new(self.clone())
    }

    /// Mapping for `T`, created with default names on first request.
    pub fn map<T: Entity>(&self) -> Arc<EntityMap<T>> {
        self.inner.seed.maps.map::<T>()
    }

    /// Mapping for `T` with an explicit table, applied only when the mapping
    /// is first created.
    pub fn map_with_table<T: Entity>(&self, table: &str) -> Result<Arc<EntityMap<T>>> {
        self.inner.seed.maps.map_with_table::<T>(table)
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    /// This session's identity map for `T`.
    pub fn identity_map<T: Entity>(&self) -> Arc<IdentityMap<T>> {
        self.inner.cache.map::<T>()
    }

    pub fn lazy_loader(&self) -> LazyLoader {
        LazyLoader::new(self)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.inner.seed.provider
    }

    pub fn connection_string(&self) -> &str {
        &self.inner.seed.connection_string
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.seed.isolation
    }

    pub fn lazy_loading(&self) -> bool {
        self.inner.seed.lazy_loading
    }

    /// The settings this session runs with, provider given by its name.
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            connection_string: self.inner.seed.connection_string.clone(),
            provider: self.inner.seed.provider.name().to_string(),
            isolation_level: self.inner.seed.isolation,
            lazy_loading: self.inner.seed.lazy_loading,
        }
    }

    /// Remember that `id` was inserted under the open transaction, so it can
    /// be evicted if that transaction does not commit.
    pub(crate) fn track_added<T: Entity>(&self, id: T::Id) {
        let identity = self.identity_map::<T>();
        let mut current = self.inner.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(active) = current.as_mut() {
            active.added.push(Box::new(move || {
                identity.remove(&id);
            }));
        }
    }

    fn current(&self) -> Option<(u64, Arc<dyn Connection>)> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|active| (active.id, Arc::clone(&active.connection)))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.inner.seed.provider.name())
            .field("state", &self.state())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Step-by-step [`Session`] construction.
pub struct SessionBuilder {
    connection_string: String,
    provider_name: String,
    provider: Option<Arc<dyn Provider>>,
    cache: Option<Arc<EntityCache>>,
    isolation: IsolationLevel,
    lazy_loading: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            connection_string: String::new(),
            provider_name: String::new(),
            provider: None,
            cache: None,
            isolation: IsolationLevel::ReadCommitted,
            lazy_loading: true,
        }
    }

    #[must_use]
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    /// Provider to look up in the known provider table.
    #[must_use]
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Provider instance; takes precedence over `provider_name`.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Share an existing cache instead of creating a private one.
    #[must_use]
    pub fn cache(mut self, cache: Arc<EntityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn isolation_level(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    #[must_use]
    pub fn lazy_loading(mut self, enabled: bool) -> Self {
        self.lazy_loading = enabled;
        self
    }

    /// Validate the inputs and build the session.
    pub fn build(self) -> Result<Session> {
        if self.connection_string.trim().is_empty() {
            return Err(Error::config(
                ConfigErrorKind::EmptyConnectionString,
                "connection string cannot be empty",
            ));
        }
        let provider = match self.provider {
            Some(provider) => provider,
            None => resolve_provider(&self.provider_name)?,
        };

        tracing::debug!(provider = provider.name(), "Session created");
        Ok(Session {
            inner: Arc::new(SessionInner {
                seed: Arc::new(SessionSeed {
                    connection_string: self.connection_string,
                    provider,
                    maps: EntityMapContainer::new(),
                    isolation: self.isolation,
                    lazy_loading: self.lazy_loading,
                }),
                cache: self.cache.unwrap_or_default(),
                current: Mutex::new(None),
            }),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
