//! Generic SQL repository routed through the session's identity map.
//!
//! Every record a repository returns goes through the session's
//! [`IdentityMap`](crate::IdentityMap) first, so two queries that hit the same
//! row hand back the same instance. Records seen for the first time are also
//! passed through the [`LazyLoader`](crate::LazyLoader).
//!
//! Filters and orderings are written against field names using `{field}`
//! tokens and named `@param` placeholders:
//!
//! ```ignore
//! let repo = session.repo::<Person>();
//! let adults = repo.filter("{age} >= @min", &[("min", 18_i64.into())], Some("{name}"))?;
//! ```

use crate::entity_map::EntityMap;
use crate::parser::Parser;
use crate::{LazyLoader, Session};
use dataunit_core::{
    ConfigErrorKind, Entity, EntityId, EntityRef, Error, PagedResult, QueryErrorKind, Result,
    Row, Value,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// Data access for entity type `T` within one session.
pub struct Repository<T: Entity> {
    session: Session,
    map: Arc<EntityMap<T>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            map: Arc::clone(&self.map),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(session: Session) -> Self {
        let map = session.map::<T>();
        Self {
            session,
            map,
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn entity_map(&self) -> &EntityMap<T> {
        &self.map
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Find by identifier, consulting the identity map before the database.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME, id = ?id))]
    pub fn find_by_id(&self, id: &T::Id) -> Result<Option<EntityRef<T>>> {
        if let Some(hit) = self.session.identity_map::<T>().get(id) {
            tracing::trace!("Identity map hit");
            return Ok(Some(hit));
        }

        let sql = format!(
            "{} WHERE {}.{} = @id",
            self.select_sql(),
            self.map.table_name(),
            self.map.key_column()
        );
        let rows = self
            .session
            .with_connection(|conn| conn.query(&sql, &[("id", id.clone().into())]))?;
        match rows.first() {
            Some(row) => self.load_row(row).map(Some),
            None => Ok(None),
        }
    }

    /// The single match for `filter`, or `None`. More than one match is an
    /// error.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME, filter = filter))]
    pub fn single(&self, filter: &str, params: &[(&str, Value)]) -> Result<Option<EntityRef<T>>> {
        let sql = format!(
            "{} {}",
            self.filtered_sql(filter, None)?,
            self.session.provider().page_clause(0, 2)
        );
        let rows = self
            .session
            .with_connection(|conn| conn.query(&sql, params))?;
        match rows.as_slice() {
            [] => Ok(None),
            [row] => self.load_row(row).map(Some),
            _ => Err(Error::query(
                QueryErrorKind::TooManyRows,
                Some(&sql),
                format!("expected at most one {} but found several", T::NAME),
            )),
        }
    }

    /// Every match for `filter`, optionally ordered. An empty filter matches
    /// all rows.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME, filter = filter))]
    pub fn filter(
        &self,
        filter: &str,
        params: &[(&str, Value)],
        order_by: Option<&str>,
    ) -> Result<Vec<EntityRef<T>>> {
        let sql = self.filtered_sql(filter, order_by)?;
        let rows = self
            .session
            .with_connection(|conn| conn.query(&sql, params))?;
        self.load_rows(&rows)
    }

    /// Every row of the table.
    pub fn all(&self) -> Result<Vec<EntityRef<T>>> {
        self.filter("", &[], None)
    }

    /// One page of matches plus the total match count.
    ///
    /// `page` counts from one; lower values mean the first page. A
    /// `page_size` below one returns every match on a single page.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME, filter = filter, page = page, page_size = page_size))]
    pub fn paged(
        &self,
        filter: &str,
        params: &[(&str, Value)],
        page: i64,
        page_size: i64,
        order_by: Option<&str>,
    ) -> Result<PagedResult<EntityRef<T>>> {
        let page = page.max(1);
        let count_sql = self.count_sql(filter)?;
        let mut sql = self.filtered_sql(filter, order_by)?;
        if page_size > 0 {
            sql.push(' ');
            sql.push_str(
                &self
                    .session
                    .provider()
                    .page_clause((page - 1) * page_size, page_size),
            );
        }

        let (total, rows) = self.session.with_connection(|conn| {
            let total = read_count(&conn.query(&count_sql, params)?)?;
            Ok((total, conn.query(&sql, params)?))
        })?;
        Ok(PagedResult::new(
            self.load_rows(&rows)?,
            total,
            page,
            page_size,
        ))
    }

    /// Number of matches for `filter`.
    pub fn count(&self, filter: &str, params: &[(&str, Value)]) -> Result<i64> {
        let sql = self.count_sql(filter)?;
        let rows = self
            .session
            .with_connection(|conn| conn.query(&sql, params))?;
        read_count(&rows)
    }

    /// Run raw SQL whose result columns are named after `T`'s fields.
    ///
    /// `{field}` tokens are expanded like in filters.
    pub fn query(&self, sql: &str, params: &[(&str, Value)]) -> Result<Vec<EntityRef<T>>> {
        let sql = Parser::new(&self.map).parse(sql)?;
        let rows = self
            .session
            .with_connection(|conn| conn.query(&sql, params))?;
        self.load_rows(&rows)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a new entity and register it in the identity map.
    ///
    /// An unset identifier is generated first when the identifier type can
    /// generate one.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME))]
    pub fn add(&self, mut entity: T) -> Result<EntityRef<T>> {
        if entity.id().is_unset() {
            let id = <T::Id as EntityId>::generate().ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::Mapping,
                    format!(
                        "{} has no identifier and its identifier type cannot generate one",
                        T::NAME
                    ),
                )
            })?;
            entity.set_id(id);
        }

        let values = entity.to_row();
        let columns = self.columns_for(&values)?;
        let placeholders: Vec<String> = values.iter().map(|(field, _)| format!("@{field}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.map.table_name(),
            columns.join(", "),
            placeholders.join(", ")
        );
        self.session
            .with_connection(|conn| conn.execute(&sql, &values))?;
        let id = entity.id();
        tracing::debug!(id = ?id, "Inserted");
        let entity = self.register(entity)?;
        self.session.track_added::<T>(id);
        Ok(entity)
    }

    /// Write every field of `entity` back to its row.
    ///
    /// Returns `false` if no row has the entity's identifier.
    /// An entity with no fields besides its key is a mapping error.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME))]
    pub fn update(&self, entity: &EntityRef<T>) -> Result<bool> {
        let values = entity.read().unwrap_or_else(|e| e.into_inner()).to_row();
        let columns = self.columns_for(&values)?;
        let assignments: Vec<String> = values
            .iter()
            .zip(&columns)
            .filter(|((field, _), _)| *field != T::KEY)
            .map(|((field, _), column)| format!("{column} = @{field}"))
            .collect();
        if assignments.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::Mapping,
                format!("{} has no fields to update besides its key", T::NAME),
            ));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = @{}",
            self.map.table_name(),
            assignments.join(", "),
            self.map.key_column(),
            T::KEY
        );
        let affected = self
            .session
            .with_connection(|conn| conn.execute(&sql, &values))?;
        Ok(affected > 0)
    }

    /// Delete `entity`'s row and drop it from the identity map.
    pub fn remove(&self, entity: &EntityRef<T>) -> Result<bool> {
        let id = entity.read().unwrap_or_else(|e| e.into_inner()).id();
        self.remove_by_id(&id)
    }

    /// Delete by identifier and drop it from the identity map.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::NAME, id = ?id))]
    pub fn remove_by_id(&self, id: &T::Id) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = @id",
            self.map.table_name(),
            self.map.key_column()
        );
        let affected = self
            .session
            .with_connection(|conn| conn.execute(&sql, &[("id", id.clone().into())]))?;
        self.session.identity_map::<T>().remove(id);
        Ok(affected > 0)
    }

    // ========================================================================
    // Identity routing
    // ========================================================================

    /// Route a plain entity through the identity map.
    ///
    /// Returns the cached instance when one exists; otherwise wires the
    /// entity's lazy slots and registers it.
    pub fn register(&self, entity: T) -> Result<EntityRef<T>> {
        let identity = self.session.identity_map::<T>();
        if let Some(existing) = identity.get(&entity.id()) {
            return Ok(existing);
        }
        if self.session.lazy_loading() {
            LazyLoader::new(&self.session).init(&entity)?;
        }
        let (entity, _) = identity.get_or_add(entity);
        Ok(entity)
    }

    fn load_row(&self, row: &Row) -> Result<EntityRef<T>> {
        let id = row.get_named::<T::Id>(T::KEY)?;
        if let Some(existing) = self.session.identity_map::<T>().get(&id) {
            return Ok(existing);
        }
        self.register(T::from_row(row)?)
    }

    fn load_rows(&self, rows: &[Row]) -> Result<Vec<EntityRef<T>>> {
        rows.iter().map(|row| self.load_row(row)).collect()
    }

    // ========================================================================
    // SQL
    // ========================================================================

    fn select_sql(&self) -> String {
        let table = self.map.table_name();
        let columns: Vec<String> = T::fields()
            .iter()
            .zip(self.map.column_names(true))
            .map(|(field, column)| format!("{column} AS \"{field}\""))
            .collect();
        format!("SELECT {} FROM {}", columns.join(", "), table)
    }

    fn filtered_sql(&self, filter: &str, order_by: Option<&str>) -> Result<String> {
        let parser = Parser::new(&self.map).qualified();
        let mut sql = self.select_sql();
        if !filter.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&parser.parse(filter)?);
        }
        if let Some(order_by) = order_by.filter(|o| !o.trim().is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&parser.parse(order_by)?);
        }
        Ok(sql)
    }

    fn count_sql(&self, filter: &str) -> Result<String> {
        let mut sql = format!("SELECT COUNT(*) AS total FROM {}", self.map.table_name());
        if !filter.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&Parser::new(&self.map).qualified().parse(filter)?);
        }
        Ok(sql)
    }

    fn columns_for(&self, values: &[(&'static str, Value)]) -> Result<Vec<String>> {
        values
            .iter()
            .map(|(field, _)| {
                self.map.column_name(field).ok_or_else(|| {
                    Error::config(
                        ConfigErrorKind::Mapping,
                        format!("{}::to_row produced unknown field '{}'", T::NAME, field),
                    )
                })
            })
            .collect()
    }
}

fn read_count(rows: &[Row]) -> Result<i64> {
    match rows.first() {
        Some(row) => row.get_named::<i64>("total"),
        None => Ok(0),
    }
}

impl<T: Entity> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::NAME)
            .field("table", &self.map.table_name())
            .finish()
    }
}
