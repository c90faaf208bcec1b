// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Explicit and managed transactions.
//!
//! A transaction owns one pooled connection until it is committed or rolled
//! back. Every handle derived from the transactional handle shares it.
//! Managed transactions nest: an inner [`Db::transaction`] runs inside a
//! savepoint of the outer one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::connection::PooledConn;
use crate::db::Db;
use crate::error::{Error, Result};

/// How `BEGIN` acquires locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxBehavior {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl TxBehavior {
    fn begin_sql(self) -> &'static str {
        match self {
            TxBehavior::Deferred => "BEGIN DEFERRED",
            TxBehavior::Immediate => "BEGIN IMMEDIATE",
            TxBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub behavior: TxBehavior,
}

/// The connection held by an open transaction.
pub(crate) struct TxConn {
    conn: Mutex<Option<PooledConn>>,
    savepoints: AtomicUsize,
}

impl TxConn {
    pub(crate) fn is_open(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_deref() {
            Some(conn) => f(conn),
            None => Err(Error::InvalidTransaction),
        }
    }

    /// Run `sql` to end the transaction and hand the connection back.
    fn finish(&self, sql: &str) -> Result<std::result::Result<(), rusqlite::Error>> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(Error::InvalidTransaction)?;
        let outcome = conn.execute_batch(sql);
        if outcome.is_err() && !conn.is_autocommit() {
            // A connection still in a transaction is dropped by the pool
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back after {sql} failed: {e}");
            }
        }
        Ok(outcome)
    }
}

impl Drop for TxConn {
    fn drop(&mut self) {
        let conn = self
            .conn
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            if !conn.is_autocommit() {
                warn!("Transaction dropped while open, rolling back");
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    warn!("Implicit rollback failed: {e}");
                }
            }
        }
    }
}

/// Rolls back when a managed callback unwinds.
struct UnwindGuard<'a> {
    db: &'a Db,
    savepoint: Option<String>,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Transaction callback panicked, rolling back");
        let result = match &self.savepoint {
            Some(name) => {
                if let Some(tx) = &self.db.tx {
                    tx.savepoints.fetch_sub(1, Ordering::SeqCst);
                }
                self.db.rollback_to(name)
            }
            None => self.db.rollback(),
        };
        if let Err(e) = result {
            warn!("Rollback after panic failed: {e}");
        }
    }
}

impl Db {
    /// Start a deferred transaction.
    pub fn begin(&self) -> Db {
        self.begin_with(TxOptions::default())
    }

    /// Start a transaction on a dedicated connection.
    ///
    /// Calling this on a handle that is in a transaction, or whose
    /// transaction has ended, records [`Error::InvalidTransaction`]; use
    /// [`Db::transaction`] to nest.
    pub fn begin_with(&self, options: TxOptions) -> Db {
        if self.error.is_some() {
            return self.clone();
        }
        // Open or already finished
        if self.tx.is_some() {
            return self.with_error(Error::InvalidTransaction);
        }
        if let Err(e) = self.context.check() {
            return self.with_error(e);
        }
        let conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => return self.with_error(e),
        };
        if let Err(e) = conn.execute_batch(options.behavior.begin_sql()) {
            return self.with_error(e.into());
        }
        debug!("Began transaction ({:?})", options.behavior);

        let mut db = self.clone();
        db.rows_affected = 0;
        db.tx = Some(Arc::new(TxConn {
            conn: Mutex::new(Some(conn)),
            savepoints: AtomicUsize::new(0),
        }));
        db
    }

    /// Commit the open transaction. A failed commit is rolled back.
    pub fn commit(&self) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::InvalidTransaction)?;
        match tx.finish("COMMIT")? {
            Ok(()) => {
                debug!("Committed transaction");
                Ok(())
            }
            Err(e) => Err(Error::Commit(Arc::new(e))),
        }
    }

    /// Roll back the open transaction.
    pub fn rollback(&self) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::InvalidTransaction)?;
        match tx.finish("ROLLBACK")? {
            Ok(()) => {
                debug!("Rolled back transaction");
                Ok(())
            }
            Err(e) => Err(Error::Rollback(Arc::new(e))),
        }
    }

    // Runs even when the context has ended
    fn rollback_to(&self, savepoint: &str) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::InvalidTransaction)?;
        tx.with_conn(|conn| {
            conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {savepoint}; RELEASE SAVEPOINT {savepoint}"
            ))
            .map_err(|e| Error::Rollback(Arc::new(e)))
        })
    }

    /// Run `f` in a deferred transaction.
    ///
    /// See [`Db::transaction_with`].
    pub fn transaction<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(Db) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        self.transaction_with(TxOptions::default(), f)
    }

    /// Run `f` in a transaction, committing when it returns `Ok` and rolling
    /// back when it returns `Err` or panics.
    ///
    /// Inside an open transaction `f` runs in a savepoint instead and
    /// `options` are ignored.
    pub fn transaction_with<R, E, F>(&self, options: TxOptions, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(Db) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        self.result()?;
        if self.in_transaction() {
            return self.savepoint(f);
        }

        let tx = self.begin_with(options);
        tx.result()?;
        let mut guard = UnwindGuard {
            db: &tx,
            savepoint: None,
            armed: true,
        };
        let outcome = f(tx.clone());
        guard.armed = false;

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("Rollback after failed transaction failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn savepoint<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(Db) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        let tx = self.tx.as_ref().ok_or(Error::InvalidTransaction)?;
        let depth = tx.savepoints.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("sp_{depth}");
        let entered = self.with_conn(|conn| Ok(conn.execute_batch(&format!("SAVEPOINT {name}"))?));
        if let Err(e) = entered {
            tx.savepoints.fetch_sub(1, Ordering::SeqCst);
            return Err(e.into());
        }
        debug!("Entered savepoint {name}");

        let mut guard = UnwindGuard {
            db: self,
            savepoint: Some(name.clone()),
            armed: true,
        };
        let outcome = f(self.clone());
        guard.armed = false;
        tx.savepoints.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(value) => {
                self.with_conn(|conn| Ok(conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_to(&name) {
                    warn!("Rollback to {name} failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Run `f` in an implicit transaction unless one is already open, the
    /// session skips default transactions, or this is a dry run.
    pub(crate) fn write_scope<R>(&self, f: impl FnOnce(&Db) -> Result<R>) -> Result<R> {
        if !self.uses_implicit_transaction() {
            return f(self);
        }
        let tx = self.begin();
        tx.result()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("Rollback of implicit transaction failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    pub(crate) fn uses_implicit_transaction(&self) -> bool {
        !(self.flags.skip_default_transaction || self.flags.dry_run || self.in_transaction())
    }
}
