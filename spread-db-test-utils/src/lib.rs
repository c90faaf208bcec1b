// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Test utilities for spread-db.
//!
//! This crate provides file-backed test databases, sample models and
//! proptest strategies shared by the spread-db test suites.

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use spread_db::engine::{Db, Model, OpenMode, OrderBy, SessionConfig, expr};
use spread_db::{Provider, ReadOnly};
use tempfile::TempDir;

/// Tables for [`User`], [`City`] and [`Animal`].
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE users (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    age         INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL DEFAULT 0,
    updated_at  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE cities (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    deleted_at  INTEGER
);

CREATE TABLE animals (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    updated_at  INTEGER NOT NULL DEFAULT 0
);
"#;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Model for User {
    const TABLE: &'static str = "users";
    const CREATED_AT: Option<&'static str> = Some("created_at");
    const UPDATED_AT: Option<&'static str> = Some("updated_at");
}

impl User {
    pub fn new(name: &str, age: i64) -> Self {
        Self {
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            age,
            ..Default::default()
        }
    }
}

/// Soft-deleted through `deleted_at`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub deleted_at: Option<i64>,
}

impl Model for City {
    const TABLE: &'static str = "cities";
    const SOFT_DELETE: Option<&'static str> = Some("deleted_at");
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animal {
    pub id: i64,
    pub name: String,
    pub updated_at: i64,
}

impl Model for Animal {
    const TABLE: &'static str = "animals";
    const UPDATED_AT: Option<&'static str> = Some("updated_at");
}

/// A database file with [`SCHEMA_SQL`] applied, removed on drop.
pub struct TestDatabase {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("test.sqlite");
        Db::open(&path, OpenMode::Create)
            .expect("open test database")
            .exec(SCHEMA_SQL)
            .result()
            .expect("apply schema");
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_db(&self) -> Db {
        Db::open(&self.path, OpenMode::ReadWrite).expect("open write handle")
    }

    pub fn read_db(&self) -> Db {
        Db::open(&self.path, OpenMode::ReadOnly).expect("open read handle")
    }

    /// Separate read-only and read-write handles on this database.
    pub fn provider(&self) -> Provider {
        Provider::new(self.read_db(), self.write_db())
    }

    pub fn provider_with(&self, session: SessionConfig) -> Provider {
        Provider::new(
            self.read_db().session(session.clone()),
            self.write_db().session(session),
        )
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// `n` users with distinct names and emails.
pub fn users(n: usize) -> Vec<User> {
    (0..n)
        .map(|i| User::new(&format!("User {}", i + 1), 20 + i as i64))
        .collect()
}

/// A dry-run session, for inspecting compiled SQL.
pub fn dry_run() -> SessionConfig {
    SessionConfig {
        dry_run: true,
        ..Default::default()
    }
}

pub fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,15}"
}

prop_compose! {
    pub fn arb_user()(name in arb_name(), age in 0i64..120) -> User {
        User { age, ..User::new(&name, 0) }
    }
}

/// Users with unique emails.
pub fn arb_users(max: usize) -> impl Strategy<Value = Vec<User>> {
    proptest::collection::vec(arb_user(), 1..=max).prop_map(|users| {
        users
            .into_iter()
            .enumerate()
            .map(|(i, user)| User {
                email: format!("user{i}@example.com"),
                ..user
            })
            .collect()
    })
}

/// One query-building step.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOp {
    AgeAbove(i64),
    NameIs(String),
    OrderBy { column: &'static str, desc: bool },
    Limit(i64),
    Offset(i64),
    Select(Vec<&'static str>),
    Group(&'static str),
    Unscoped,
}

impl ChainOp {
    pub fn apply<H: ReadOnly>(&self, facade: &H) -> H {
        match self {
            ChainOp::AgeAbove(age) => facade.filter(expr!("age > ?", *age)),
            ChainOp::NameIs(name) => facade.or_filter(expr!("name = ?", name.as_str())),
            ChainOp::OrderBy { column, desc } => facade.order(if *desc {
                OrderBy::desc(*column)
            } else {
                OrderBy::asc(*column)
            }),
            ChainOp::Limit(limit) => facade.limit(*limit),
            ChainOp::Offset(offset) => facade.offset(*offset),
            ChainOp::Select(columns) => facade.select(columns.clone()),
            ChainOp::Group(column) => facade.group(column),
            ChainOp::Unscoped => facade.unscoped(),
        }
    }
}

const COLUMNS: &[&str] = &["id", "name", "email", "age"];

pub fn arb_column() -> impl Strategy<Value = &'static str> {
    proptest::sample::select(COLUMNS)
}

pub fn arb_chain_op() -> impl Strategy<Value = ChainOp> {
    prop_oneof![
        (0i64..100).prop_map(ChainOp::AgeAbove),
        arb_name().prop_map(ChainOp::NameIs),
        (arb_column(), any::<bool>()).prop_map(|(column, desc)| ChainOp::OrderBy { column, desc }),
        (0i64..50).prop_map(ChainOp::Limit),
        (0i64..50).prop_map(ChainOp::Offset),
        proptest::sample::subsequence(COLUMNS, 1..=COLUMNS.len()).prop_map(ChainOp::Select),
        arb_column().prop_map(ChainOp::Group),
        Just(ChainOp::Unscoped),
    ]
}

pub fn arb_chain(max: usize) -> impl Strategy<Value = Vec<ChainOp>> {
    proptest::collection::vec(arb_chain_op(), 0..=max)
}
