// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! The read capability.

use std::fmt;

use serde::de::DeserializeOwned;
use spread_db_engine::{
    Condition, Context, Db, Dialect, Error, Expr, Model, OrderBy, Row, Rows, ScanDest,
    SessionConfig, Selection, Statement,
};

use crate::handle::{apply_scope, derive, engine, sealed};

/// Query construction and read terminals.
///
/// Builder methods never run anything; they return a new facade of the same
/// type with the clause added. Terminals run the statement, fill the
/// destination and record any error on the facade they return, to be read
/// with [`error`](Self::error) or [`result`](Self::result).
///
/// Terminals take no inline conditions; chain them with
/// [`filter`](Self::filter) first:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use spread_db::prelude::*;
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Model for User {
///     const TABLE: &'static str = "users";
/// }
///
/// fn by_name(read: &ReadDb, name: &str) -> spread_db::engine::Result<User> {
///     let mut user = User::default();
///     read.filter(expr!("name = ?", name)).first(&mut user).result()?;
///     Ok(user)
/// }
/// ```
///
/// The same goes for [`delete`](crate::WriteOnly::delete) on the write side.
///
/// The trait is sealed: [`ReadDb`] and [`WriteDb`](crate::WriteDb) are its
/// only implementations.
pub trait ReadOnly: sealed::Handle + Clone + fmt::Debug {
    fn with_context(&self, context: Context) -> Self {
        derive(self, |db| db.with_context(context))
    }

    fn session(&self, config: SessionConfig) -> Self {
        derive(self, |db| db.session(config))
    }

    fn table(&self, name: &str) -> Self {
        derive(self, |db| db.table(name))
    }

    fn model<T: Model>(&self, record: &T) -> Self {
        derive(self, |db| db.model(record))
    }

    fn select(&self, selection: impl Into<Selection>) -> Self {
        derive(self, |db| db.select(selection))
    }

    fn filter(&self, condition: impl Into<Condition>) -> Self {
        derive(self, |db| db.filter(condition))
    }

    fn or_filter(&self, condition: impl Into<Condition>) -> Self {
        derive(self, |db| db.or_filter(condition))
    }

    fn not(&self, condition: impl Into<Condition>) -> Self {
        derive(self, |db| db.not(condition))
    }

    fn joins(&self, join: impl Into<Expr>) -> Self {
        derive(self, |db| db.joins(join))
    }

    fn group(&self, column: &str) -> Self {
        derive(self, |db| db.group(column))
    }

    fn having(&self, condition: impl Into<Expr>) -> Self {
        derive(self, |db| db.having(condition))
    }

    fn order(&self, order: impl Into<OrderBy>) -> Self {
        derive(self, |db| db.order(order))
    }

    fn limit(&self, limit: i64) -> Self {
        derive(self, |db| db.limit(limit))
    }

    fn offset(&self, offset: i64) -> Self {
        derive(self, |db| db.offset(offset))
    }

    /// Apply each scope to the result of the previous one.
    ///
    /// Scopes see and return this facade type, never a raw engine handle.
    fn scopes<I, F>(&self, scopes: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(Self) -> Self,
    {
        derive(self, |db| {
            db.scopes(
                scopes
                    .into_iter()
                    .map(|scope| move |db: Db| apply_scope::<Self, F>(db, scope)),
            )
        })
    }

    /// Include soft-deleted rows.
    fn unscoped(&self) -> Self {
        derive(self, |db| db.unscoped())
    }

    fn distinct(&self, selection: impl Into<Selection>) -> Self {
        derive(self, |db| db.distinct(selection))
    }

    fn omit<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        derive(self, |db| db.omit(columns))
    }

    fn raw(&self, sql: impl Into<Expr>) -> Self {
        derive(self, |db| db.raw(sql))
    }

    fn find<T: Model>(&self, dest: &mut Vec<T>) -> Self {
        derive(self, |db| db.find(dest))
    }

    /// First row by primary key; [`Error::RecordNotFound`] when none match.
    fn first<T: Model>(&self, dest: &mut T) -> Self {
        derive(self, |db| db.first(dest))
    }

    /// Last row by primary key; [`Error::RecordNotFound`] when none match.
    fn last<T: Model>(&self, dest: &mut T) -> Self {
        derive(self, |db| db.last(dest))
    }

    fn take<T: Model>(&self, dest: &mut T) -> Self {
        derive(self, |db| db.take(dest))
    }

    fn scan<D: ScanDest>(&self, dest: &mut D) -> Self {
        derive(self, |db| db.scan(dest))
    }

    fn pluck<V: DeserializeOwned>(&self, column: &str, dest: &mut Vec<V>) -> Self {
        derive(self, |db| db.pluck(column, dest))
    }

    fn count(&self, dest: &mut i64) -> Self {
        derive(self, |db| db.count(dest))
    }

    /// First row of the query. Errors are reported by the row itself.
    fn row(&self) -> Row {
        engine(self).row()
    }

    fn rows(&self) -> spread_db_engine::Result<Rows> {
        engine(self).rows()
    }

    fn debug(&self) -> Self {
        derive(self, |db| db.debug())
    }

    fn statement(&self) -> &Statement {
        engine(self).statement()
    }

    fn error(&self) -> Option<&Error> {
        engine(self).error()
    }

    fn result(&self) -> spread_db_engine::Result<()> {
        engine(self).result()
    }

    fn rows_affected(&self) -> u64 {
        engine(self).rows_affected()
    }

    fn dialect(&self) -> Dialect {
        engine(self).dialect()
    }
}

/// A facade that can only read.
///
/// Its handle is marked read-only, so even raw SQL passed to
/// [`raw`](ReadOnly::raw) cannot write:
///
/// ```compile_fail
/// use spread_db::prelude::*;
///
/// let read = ReadDb::new(Db::open_memory("no_exec").unwrap());
/// read.exec("DELETE FROM users");
/// ```
#[derive(Clone, Debug)]
pub struct ReadDb {
    db: Db,
}

impl ReadDb {
    pub fn new(db: Db) -> Self {
        Self {
            db: db.read_only(),
        }
    }
}

impl sealed::Handle for ReadDb {
    fn wrap(db: Db, _: sealed::Token) -> Self {
        Self { db }
    }

    fn handle(&self, _: sealed::Token) -> &Db {
        &self.db
    }

    fn into_handle(self, _: sealed::Token) -> Db {
        self.db
    }
}

impl ReadOnly for ReadDb {}
