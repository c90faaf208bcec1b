// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Read-only and write-capable facades over a pair of database handles.
//!
//! A [`Provider`] holds a [`ReadDb`] for the replica and a [`WriteDb`] for
//! the primary. Both chain like the engine they wrap, but only `WriteDb`
//! implements [`WriteOnly`], so a write sent to the read handle does not
//! compile.
//!
//! **Architecture**: This crate is the capability layer above
//! `spread-db-engine`. It adds no query behavior of its own.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use spread_db::prelude::*;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Model for User {
//!     const TABLE: &'static str = "users";
//! }
//!
//! let db = Db::open_memory("crate_doc")?;
//! let provider = Provider::new(db.clone(), db);
//! provider
//!     .write
//!     .exec("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
//!     .result()?;
//!
//! let mut user = User { name: "A".into(), age: 30, ..Default::default() };
//! provider.write.create(&mut user).result()?;
//!
//! let mut adults: Vec<User> = Vec::new();
//! provider
//!     .read
//!     .select(["id", "name"])
//!     .filter(expr!("age > ?", 20))
//!     .find(&mut adults)
//!     .result()?;
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), spread_db::engine::Error>(())
//! ```
//!
//! The read facade has no mutating methods:
//!
//! ```compile_fail
//! use spread_db::prelude::*;
//!
//! fn rename(read: &ReadDb) {
//!     read.table("users").update_column("name", "x");
//! }
//! ```

mod handle;
mod provider;
mod read;
mod write;

pub use provider::Provider;
pub use read::{ReadDb, ReadOnly};
pub use write::{WriteDb, WriteOnly};

/// Facade traits and the engine types their methods take.
pub mod prelude {
    pub use crate::{Provider, ReadDb, ReadOnly, WriteDb, WriteOnly};
    pub use spread_db_engine::{
        Assignments, Condition, Context, Db, Expr, Model, OnConflict, OrderBy, SessionConfig,
        TxBehavior, TxOptions, Value, expr,
    };
}

pub use spread_db_engine as engine;
