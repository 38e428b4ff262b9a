//! Entities and a recording provider shared by this crate's unit tests.

use dataunit_core::{
    Connection, Entity, Error, IsolationLevel, LazyMany, LazyOne, Provider, QueryErrorKind,
    RelationLoader, Relationship, Result, Row, Transaction, Value,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug)]
pub(crate) struct Person {
    pub id: Uuid,
    pub name: String,
    pub age: i64,
    pub employer_id: Option<Uuid>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            age: 0,
            employer_id: None,
        }
    }
}

impl Entity for Person {
    type Id = Uuid;
    const NAME: &'static str = "person";

    fn fields() -> &'static [&'static str] {
        &["id", "name", "age", "employer_id"]
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("age", self.age.into()),
            ("employer_id", self.employer_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            age: row.get_named("age")?,
            employer_id: row.get_named("employer_id")?,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Author {
    pub id: Uuid,
    pub name: String,
    pub books: LazyMany<Book>,
}

impl Entity for Author {
    type Id = Uuid;
    const NAME: &'static str = "author";

    fn fields() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            books: LazyMany::new(),
        })
    }

    fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
        vec![Relationship::many("books", |a: &Author| &a.books)]
    }
}

#[derive(Debug)]
pub(crate) struct Book {
    pub id: Uuid,
    pub title: String,
    pub author_id: Option<Uuid>,
    pub author: LazyOne<Author>,
}

impl Entity for Book {
    type Id = Uuid;
    const NAME: &'static str = "book";

    fn fields() -> &'static [&'static str] {
        &["id", "title", "author_id"]
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = id;
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("title", self.title.clone().into()),
            ("author_id", self.author_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            author_id: row.get_named("author_id")?,
            author: LazyOne::new(),
        })
    }

    fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
        vec![Relationship::single("author", |b: &Book| &b.author)]
    }
}

// ============================================================================
// Recording provider
// ============================================================================

/// Shared event log: "open 1", "begin 1", "commit 1", "rollback 1", "close 1".
pub(crate) type Log = Arc<Mutex<Vec<String>>>;

pub(crate) fn events(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub(crate) fn count(log: &Log, event: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| e.as_str() == event).count()
}

pub(crate) struct StubConnection {
    pub id: usize,
    log: Log,
    open: AtomicBool,
}

impl Connection for StubConnection {
    fn query(&self, _sql: &str, _params: &[(&str, Value)]) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    fn execute(&self, _sql: &str, _params: &[(&str, Value)]) -> Result<u64> {
        Ok(0)
    }

    fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.log.lock().unwrap().push(format!("close {}", self.id));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

struct StubTransaction {
    connection: usize,
    isolation: IsolationLevel,
    log: Log,
    fail_commit: bool,
    fail_rollback: bool,
}

impl Transaction for StubTransaction {
    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn commit(&self) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("commit {}", self.connection));
        if self.fail_commit {
            return Err(Error::query(
                QueryErrorKind::Constraint,
                None,
                "deferred constraint violated",
            ));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("rollback {}", self.connection));
        if self.fail_rollback {
            return Err(Error::Custom("rollback failed".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct StubProvider {
    pub log: Log,
    opened: AtomicUsize,
    pub fail_begin: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl StubProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn open_connection(&self, _connection_string: &str) -> Result<Arc<dyn Connection>> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(format!("open {id}"));
        Ok(Arc::new(StubConnection {
            id,
            log: Arc::clone(&self.log),
            open: AtomicBool::new(true),
        }))
    }

    fn begin_transaction(
        &self,
        connection: &Arc<dyn Connection>,
        isolation: IsolationLevel,
    ) -> Result<Arc<dyn Transaction>> {
        let id = self.opened.load(Ordering::SeqCst);
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(Error::Custom("cannot begin".into()));
        }
        debug_assert!(connection.is_open());
        self.log.lock().unwrap().push(format!("begin {id}"));
        Ok(Arc::new(StubTransaction {
            connection: id,
            isolation,
            log: Arc::clone(&self.log),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
            fail_rollback: self.fail_rollback.load(Ordering::SeqCst),
        }))
    }
}
