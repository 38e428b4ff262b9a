#![allow(dead_code)]

use dataunit::prelude::*;
use std::path::Path;

#[derive(Debug)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub books: LazyMany<Book>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::nil(),
            name: name.to_string(),
            books: LazyMany::new(),
        }
    }
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
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub pages: i64,
    pub author_id: Option<Uuid>,
    pub author: LazyOne<Author>,
}

impl Book {
    pub fn new(title: &str, pages: i64, author_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.to_string(),
            pages,
            author_id,
            author: LazyOne::new(),
        }
    }
}

impl Entity for Book {
    type Id = Uuid;
    const NAME: &'static str = "book";

    fn fields() -> &'static [&'static str] {
        &["id", "title", "pages", "author_id"]
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
            ("pages", self.pages.into()),
            ("author_id", self.author_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            pages: row.get_named("pages")?,
            author_id: row.get_named("author_id")?,
            author: LazyOne::new(),
        })
    }

    fn relationships<L: RelationLoader>() -> Vec<Relationship<Self, L>> {
        vec![Relationship::single("author", |b: &Book| &b.author)]
    }
}

pub fn connection_string(dir: &Path) -> String {
    format!(
        "Data Source={};Busy Timeout=2000;Foreign Keys=true",
        dir.join("library.db").display()
    )
}

/// Create the schema once per database file.
pub fn create_schema(dir: &Path) {
    let session = Session::new(&connection_string(dir), "sqlite").unwrap();
    session
        .with_connection(|conn| {
            conn.execute(
                "CREATE TABLE authors (id TEXT PRIMARY KEY, full_name TEXT NOT NULL)",
                &[],
            )?;
            conn.execute(
                "CREATE TABLE books (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    pages INTEGER NOT NULL,
                    author_id TEXT REFERENCES authors(id)
                )",
                &[],
            )
        })
        .unwrap();
}

/// A session with the library's table mappings applied.
pub fn open(dir: &Path) -> Session {
    configure(Session::new(&connection_string(dir), "sqlite").unwrap())
}

pub fn configure(session: Session) -> Session {
    session
        .map_with_table::<Author>("authors")
        .unwrap()
        .map_field("name", "full_name")
        .unwrap();
    session.map_with_table::<Book>("books").unwrap();
    session
}
