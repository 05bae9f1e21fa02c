#![allow(dead_code)]
use liteorm::{Entity, Link, Registry, Session};
use log::LevelFilter;
use std::{
    env,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use time::{macros::datetime, OffsetDateTime};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Entity, Default, Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
    pub height: f64,
    pub active: bool,
    pub nickname: Option<String>,
    pub avatar: Vec<u8>,
    pub born: Option<OffsetDateTime>,
    #[transient]
    pub visits: u32,
    pub _note: String,
}

pub fn ann() -> Person {
    Person {
        name: "Ann".to_string(),
        age: 31,
        height: 1.68,
        active: true,
        nickname: Some("annie".to_string()),
        avatar: vec![1, 2, 3],
        born: Some(datetime!(1993-05-04 10:00:00.125000042 UTC)),
        ..Default::default()
    }
}

pub fn person(name: &str, age: i32) -> Person {
    Person {
        name: name.to_string(),
        age,
        ..Default::default()
    }
}

#[derive(Entity, Default, Debug)]
pub struct Author {
    pub name: String,
}

#[derive(Entity, Default, Debug)]
pub struct Book {
    pub title: String,
    pub pages: i32,
    pub author: Link<Author>,
}

#[derive(Entity, Default, Debug)]
#[table_name("nodes")]
pub struct Node {
    pub label: String,
    pub next: Link<Node>,
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register::<Person>()
        .and_then(|r| r.register::<Author>())
        .and_then(|r| r.register::<Book>())
        .and_then(|r| r.register::<Node>())
        .unwrap();
    registry
}

////////////////////////////////////////////////////////////////////////////////

/// A database file in a temporary directory with every test entity created.
pub struct TestDb {
    dir: TempDir,
    pub session: Session,
}

impl TestDb {
    pub fn new() -> Self {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path().join("test.db")).unwrap();
        session.create_schema(&registry()).unwrap();
        TestDb { dir, session }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("test.db")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
