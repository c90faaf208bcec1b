// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Smoke tests for spread-db-engine.
//!
//! These tests run complete chains against file-backed databases.

use serde::{Deserialize, Serialize};
use spread_db_engine::{
    Assignments, Context, Db, Error, Model, OpenMode, OrderBy, SessionConfig, expr,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    age: i64,
    created_at: i64,
    updated_at: i64,
}

impl Model for User {
    const TABLE: &'static str = "users";
    const CREATED_AT: Option<&'static str> = Some("created_at");
    const UPDATED_AT: Option<&'static str> = Some("updated_at");
}

const SCHEMA: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0
)";

fn open(dir: &tempfile::TempDir) -> Db {
    let db = Db::open(dir.path().join("smoke.sqlite"), OpenMode::Create).unwrap();
    db.exec(SCHEMA).result().unwrap();
    db
}

fn user(name: &str, age: i64) -> User {
    User {
        name: name.into(),
        age,
        ..Default::default()
    }
}

/// Create then look up by name; a second lookup misses.
#[test_log::test]
fn test_create_then_first() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);

    let mut a = user("A", 30);
    let created = db.create(&mut a);
    assert!(created.error().is_none());
    assert!(a.id > 0);
    assert!(a.created_at > 0);

    let mut out = User::default();
    let found = db.filter(expr!("name = ?", "A")).first(&mut out);
    assert!(found.error().is_none());
    assert_eq!(out, a);

    let mut missing = User::default();
    let miss = db.filter(expr!("name = ?", "B")).first(&mut missing);
    assert!(miss.error().is_some_and(Error::is_record_not_found));
    assert_eq!(missing, User::default());
}

#[test_log::test]
fn test_read_only_handle_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let _writer = open(&dir);
    let reader = Db::open(dir.path().join("smoke.sqlite"), OpenMode::ReadOnly).unwrap();

    let out = reader.create(&mut user("A", 1));
    assert!(matches!(out.error(), Some(Error::Sqlite(_))));

    let mut n = 0;
    reader.table("users").count(&mut n).result().unwrap();
    assert_eq!(n, 0);
}

#[test]
fn test_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let err = Db::open(dir.path().join("absent.sqlite"), OpenMode::ReadOnly).unwrap_err();
    assert!(matches!(err, Error::DatabaseNotFound(_)));
}

#[test]
fn test_group_having_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let mut users = vec![user("a", 10), user("b", 10), user("c", 20)];
    db.create_in_batches(&mut users, 2).result().unwrap();

    #[derive(Debug, Deserialize, PartialEq)]
    struct AgeCount {
        age: i64,
        total: i64,
    }

    let mut groups: Vec<AgeCount> = Vec::new();
    db.table("users")
        .select("age, count(*) AS total")
        .group("age")
        .having(expr!("count(*) > ?", 1))
        .order(OrderBy::desc("age"))
        .scan(&mut groups)
        .result()
        .unwrap();
    assert_eq!(groups, vec![AgeCount { age: 10, total: 2 }]);
}

#[test]
fn test_or_and_not() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let mut users = vec![user("a", 10), user("b", 20), user("c", 30)];
    db.create_in_batches(&mut users, 0).result().unwrap();

    let mut names: Vec<String> = Vec::new();
    db.table("users")
        .filter(expr!("age = ?", 10))
        .or_filter(expr!("age = ?", 30))
        .order("name")
        .pluck("name", &mut names)
        .result()
        .unwrap();
    assert_eq!(names, ["a", "c"]);

    db.table("users")
        .not(expr!("name = ?", "b"))
        .order("name")
        .pluck("name", &mut names)
        .result()
        .unwrap();
    assert_eq!(names, ["a", "c"]);
}

#[test]
fn test_updates_with_map() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let mut a = user("a", 10);
    db.create(&mut a).result().unwrap();

    let out = db
        .model(&a)
        .updates(Assignments::new().set("age", 11).set("name", "aa"));
    assert_eq!(out.rows_affected(), 1);
    assert!(out.statement().sql().contains("\"updated_at\"=?"));

    let mut loaded = User::default();
    db.model(&a).take(&mut loaded).result().unwrap();
    assert_eq!((loaded.name.as_str(), loaded.age), ("aa", 11));
}

#[test]
fn test_deadline_is_checked() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let expired = Context::background().with_timeout(std::time::Duration::ZERO);
    let out = db
        .session(SessionConfig {
            context: Some(expired),
            ..Default::default()
        })
        .create(&mut user("a", 1));
    assert!(matches!(out.error(), Some(Error::DeadlineExceeded)));
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Setting {
    id: i64,
    enabled: bool,
    active: Option<bool>,
    data: Vec<u8>,
    digest: Option<Vec<u8>>,
    tags: Vec<String>,
}

impl Model for Setting {
    const TABLE: &'static str = "settings";
}

/// Booleans, byte vectors and nested data read back as they were written.
#[test_log::test]
fn test_field_types_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    db.exec(
        "CREATE TABLE settings (
            id INTEGER PRIMARY KEY,
            enabled INTEGER NOT NULL,
            active INTEGER,
            data BLOB NOT NULL,
            digest BLOB,
            tags TEXT NOT NULL
        )",
    )
    .result()
    .unwrap();

    let mut written = vec![
        Setting {
            enabled: true,
            active: Some(true),
            data: vec![1, 2, 3],
            digest: Some(vec![0, 255]),
            tags: vec!["a".into(), "b".into()],
            ..Default::default()
        },
        Setting {
            active: Some(false),
            data: vec![9],
            ..Default::default()
        },
    ];
    db.create_in_batches(&mut written, 0).result().unwrap();

    let kind: String = db
        .raw("SELECT typeof(data) FROM settings WHERE id = 1")
        .row()
        .scan()
        .unwrap();
    assert_eq!(kind, "blob");

    let mut read: Vec<Setting> = Vec::new();
    db.order("id").find(&mut read).result().unwrap();
    assert_eq!(read, written);

    let mut first = Setting::default();
    db.first(&mut first).result().unwrap();
    assert_eq!(first, written[0]);
}
