//! Provider lookup by name.
//!
//! The set of providers a session can be built from by name is closed: it is
//! exactly [`known_providers`]. Anything else must be injected as a
//! `Provider` instance.

use dataunit_core::{ConfigErrorKind, Error, Provider, Result};
use std::sync::Arc;

type ProviderFactory = fn() -> Arc<dyn Provider>;

#[cfg(feature = "sqlite")]
fn sqlite() -> Arc<dyn Provider> {
    Arc::new(dataunit_sqlite::SqliteProvider::new())
}

#[cfg(feature = "sqlite")]
const KNOWN_PROVIDERS: &[(&str, ProviderFactory)] = &[("sqlite", sqlite), ("sqlite3", sqlite)];

#[cfg(not(feature = "sqlite"))]
const KNOWN_PROVIDERS: &[(&str, ProviderFactory)] = &[];

/// Names accepted by [`resolve_provider`].
pub fn known_providers() -> Vec<&'static str> {
    KNOWN_PROVIDERS.iter().map(|(name, _)| *name).collect()
}

/// Build the provider registered under `name` (case-insensitive).
pub fn resolve_provider(name: &str) -> Result<Arc<dyn Provider>> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::config(
            ConfigErrorKind::EmptyProvider,
            "provider name cannot be empty",
        ));
    }
    KNOWN_PROVIDERS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, make)| make())
        .ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownProvider,
                format!(
                    "unknown provider '{}' (known: {})",
                    name,
                    known_providers().join(", ")
                ),
            )
        })
}
