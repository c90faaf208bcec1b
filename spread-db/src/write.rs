// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! The write capability.

use spread_db_engine::{Assignments, Clause, Db, Error, Expr, Model, TxOptions, Value};

use crate::handle::{derive, engine, sealed, unwrap, wrap};
use crate::read::ReadOnly;

/// Mutating terminals and transaction control, on top of [`ReadOnly`].
pub trait WriteOnly: ReadOnly {
    /// Insert `record`, writing the generated key back into it.
    fn create<T: Model>(&self, record: &mut T) -> Self {
        derive(self, |db| db.create(record))
    }

    /// Insert `records` in chunks of `batch_size`, one statement per chunk.
    ///
    /// All chunks share one implicit transaction unless the session skips
    /// default transactions; then each chunk commits on its own and chunks
    /// before a failure are kept.
    fn create_in_batches<T: Model>(&self, records: &mut [T], batch_size: usize) -> Self {
        derive(self, |db| db.create_in_batches(records, batch_size))
    }

    /// Update every column by primary key, or insert when the key is zero.
    fn save<T: Model>(&self, record: &mut T) -> Self {
        derive(self, |db| db.save(record))
    }

    fn update(&self, column: &str, value: impl Into<Value>) -> Self {
        derive(self, |db| db.update(column, value))
    }

    fn updates(&self, assignments: impl Into<Assignments>) -> Self {
        derive(self, |db| db.updates(assignments))
    }

    /// Like [`update`](Self::update) without refreshing the update timestamp.
    fn update_column(&self, column: &str, value: impl Into<Value>) -> Self {
        derive(self, |db| db.update_column(column, value))
    }

    /// Like [`updates`](Self::updates) without refreshing the update timestamp.
    fn update_columns(&self, assignments: impl Into<Assignments>) -> Self {
        derive(self, |db| db.update_columns(assignments))
    }

    /// Delete rows, or mark them deleted when the model has a soft-delete column.
    ///
    /// `record`'s primary key, when set, narrows the delete; other
    /// conditions come from [`filter`](ReadOnly::filter) earlier in the chain.
    fn delete<T: Model>(&self, record: &T) -> Self {
        derive(self, |db| db.delete(record))
    }

    fn exec(&self, sql: impl Into<Expr>) -> Self {
        derive(self, |db| db.exec(sql))
    }

    fn clauses(&self, clause: impl Into<Clause>) -> Self {
        derive(self, |db| db.clauses(clause))
    }

    /// Run `f` in a transaction: commit on `Ok`, roll back on `Err` or panic.
    ///
    /// Called on a facade that is already in a transaction, `f` runs in a
    /// savepoint.
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(Self) -> Result<R, E>,
        E: From<Error>,
    {
        self.transaction_with(TxOptions::default(), f)
    }

    fn transaction_with<R, E, F>(&self, options: TxOptions, f: F) -> Result<R, E>
    where
        F: FnOnce(Self) -> Result<R, E>,
        E: From<Error>,
    {
        engine(self).transaction_with(options, |tx| f(wrap(tx)))
    }

    /// Open a transaction. End it with [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback); using the facade after that is a caller
    /// error and fails with [`Error::InvalidTransaction`].
    fn begin(&self) -> Self {
        derive(self, |db| db.begin())
    }

    fn begin_with(&self, options: TxOptions) -> Self {
        derive(self, |db| db.begin_with(options))
    }

    fn commit(self) -> Result<(), Error> {
        unwrap(self).commit()
    }

    fn rollback(self) -> Result<(), Error> {
        unwrap(self).rollback()
    }

    fn in_transaction(&self) -> bool {
        engine(self).in_transaction()
    }
}

/// A facade that can read and write.
#[derive(Clone, Debug)]
pub struct WriteDb {
    db: Db,
}

impl WriteDb {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl sealed::Handle for WriteDb {
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

impl ReadOnly for WriteDb {}

impl WriteOnly for WriteDb {}
