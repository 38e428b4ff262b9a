//! Entity to table/column mapping.

use crate::registry::TypeRegistry;
use dataunit_core::{ConfigErrorKind, Entity, Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

/// Table and column names for entity type `T`.
///
/// The table defaults to `T::NAME` and every field maps to a column of the
/// same name until [`map_field`](Self::map_field) says otherwise.
pub struct EntityMap<T: Entity> {
    table: RwLock<String>,
    columns: RwLock<HashMap<&'static str, String>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityMap<T> {
    pub fn new() -> Self {
        Self::with_table(T::NAME)
    }

    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: RwLock::new(table.into()),
            columns: RwLock::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    pub fn table_name(&self) -> String {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_table_name(&self, table: &str) -> Result<()> {
        if table.trim().is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Mapping,
                format!("table name for {} cannot be empty", T::NAME),
            ));
        }
        *self.table.write().unwrap_or_else(|e| e.into_inner()) = table.to_string();
        Ok(())
    }

    /// Map `field` to `column`.
    pub fn map_field(&self, field: &str, column: &str) -> Result<()> {
        if column.trim().is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Mapping,
                format!("column name for {}.{} cannot be empty", T::NAME, field),
            ));
        }
        let field = Self::known_field(field).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::Mapping,
                format!("{} has no field '{}'", T::NAME, field),
            )
        })?;
        tracing::debug!(entity = T::NAME, field, column, "Mapped field");
        self.columns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(field, column.to_string());
        Ok(())
    }

    /// Column for `field`, or `None` if `T` has no such field.
    pub fn column_name(&self, field: &str) -> Option<String> {
        let field = Self::known_field(field)?;
        let columns = self.columns.read().unwrap_or_else(|e| e.into_inner());
        Some(
            columns
                .get(field)
                .cloned()
                .unwrap_or_else(|| field.to_string()),
        )
    }

    /// Columns for every field in declaration order, optionally qualified
    /// as `table.column`.
    pub fn column_names(&self, prepend_table: bool) -> Vec<String> {
        let table = self.table_name();
        let columns = self.columns.read().unwrap_or_else(|e| e.into_inner());
        T::fields()
            .iter()
            .map(|field| {
                let column = columns.get(field).map_or(*field, String::as_str);
                if prepend_table {
                    format!("{table}.{column}")
                } else {
                    column.to_string()
                }
            })
            .collect()
    }

    /// Column holding the identifier.
    pub fn key_column(&self) -> String {
        self.column_name(T::KEY)
            .unwrap_or_else(|| T::KEY.to_string())
    }

    fn known_field(field: &str) -> Option<&'static str> {
        T::fields().iter().copied().find(|f| *f == field)
    }
}

impl<T: Entity> Default for EntityMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> fmt::Debug for EntityMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMap")
            .field("entity", &T::NAME)
            .field("table", &self.table_name())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Container
// ============================================================================

/// One [`EntityMap`] per entity type.
#[derive(Default)]
pub struct EntityMapContainer {
    maps: TypeRegistry,
}

impl EntityMapContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map for `T`, created with default names on first request.
    pub fn map<T: Entity>(&self) -> Arc<EntityMap<T>> {
        self.maps.get_or_insert_with(EntityMap::<T>::new)
    }

    /// The map for `T`, created with `table` on first request.
    ///
    /// An existing map keeps its table name.
    pub fn map_with_table<T: Entity>(&self, table: &str) -> Result<Arc<EntityMap<T>>> {
        if table.trim().is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Mapping,
                format!("table name for {} cannot be empty", T::NAME),
            ));
        }
        Ok(self
            .maps
            .get_or_insert_with(|| EntityMap::<T>::with_table(table)))
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EntityMapContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMapContainer")
            .field("types", &self.len())
            .finish()
    }
}
