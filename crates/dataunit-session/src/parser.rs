//! `{field}` templating for filters and ordering clauses.
//!
//! Repository filters are written against field names, e.g.
//! `{name} = @name AND {age} > @age`. The parser swaps each `{field}` for the
//! mapped column so callers never spell column names themselves.

use crate::entity_map::EntityMap;
use dataunit_core::{ConfigErrorKind, Entity, Error, Result};
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn token_regex() -> Result<&'static Regex> {
    static TOKEN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    TOKEN
        .get_or_init(|| Regex::new(r"\{(.+?)\}"))
        .as_ref()
        .map_err(|e| Error::config(ConfigErrorKind::Invalid, e.to_string()))
}

/// Rewrites `{field}` tokens using an [`EntityMap`].
pub struct Parser<'a, T: Entity> {
    map: &'a EntityMap<T>,
    qualify: bool,
}

impl<'a, T: Entity> Parser<'a, T> {
    pub fn new(map: &'a EntityMap<T>) -> Self {
        Self {
            map,
            qualify: false,
        }
    }

    /// Emit `table.column` instead of bare column names.
    #[must_use]
    pub fn qualified(mut self) -> Self {
        self.qualify = true;
        self
    }

    /// Replace known `{field}` tokens with their columns.
    ///
    /// Tokens that don't name a field of `T` are left as written.
    pub fn parse(&self, template: &str) -> Result<String> {
        let regex = token_regex()?;
        let table = self.map.table_name();
        let parsed = regex.replace_all(template, |caps: &Captures<'_>| {
            match self.map.column_name(&caps[1]) {
                Some(column) if self.qualify => format!("{table}.{column}"),
                Some(column) => column,
                None => caps[0].to_string(),
            }
        });
        Ok(parsed.into_owned())
    }
}
