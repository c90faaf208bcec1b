// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Copy-on-call SQLite query builder.
//!
//! This crate provides the database handle that the `spread-db` facades wrap:
//! a cheaply cloneable [`Db`] whose builder methods each return a new handle,
//! and whose terminals run the accumulated statement and record the outcome
//! on the handle they return.
//!
//! **Architecture**: This is the engine layer below the read/write facades.
//! It owns connections, statement compilation, row mapping and transactions.
//!
//! # Key Features
//!
//! - Filters from SQL fragments, column maps or record templates
//! - Serde-based row mapping through the [`Model`] trait
//! - Soft delete, timestamps and batched inserts
//! - Explicit, managed and nested (savepoint) transactions
//! - Cancellation through [`Context`], including statements already running
//! - Pooled connections (r2d2) opened directly or from TOML [`Config`]
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use spread_db_engine::{Db, Model, expr};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for User {
//!     const TABLE: &'static str = "users";
//! }
//!
//! let db = Db::open_memory("lib_doc")?;
//! db.exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").result()?;
//!
//! let mut user = User { name: "A".into(), ..Default::default() };
//! db.create(&mut user).result()?;
//!
//! let mut found = User::default();
//! db.filter(expr!("name = ?", "A")).first(&mut found).result()?;
//! assert_eq!(found.id, user.id);
//! # Ok::<(), spread_db_engine::Error>(())
//! ```

mod clause;
mod config;
mod connection;
mod context;
mod db;
mod dialect;
mod error;
mod model;
mod query;
mod row;
mod statement;
mod transaction;
mod value;
mod write;

pub use clause::{
    Assignments, Clause, Condition, ConflictAction, Expr, OnConflict, OrderBy, OrderByColumn,
    Selection,
};
pub use config::{CONFIG_ENV, Config, ConfigError, HandleConfig};
pub use connection::{OpenMode, PoolOptions, Source};
pub use context::{Context, SessionConfig};
pub use db::Db;
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use model::{Model, ModelMeta, system_time_to_unix, unix_to_system_time};
pub use row::{Record, Row, Rows, ScanDest};
pub use statement::Statement;
pub use transaction::{TxBehavior, TxOptions};
pub use value::Value;
