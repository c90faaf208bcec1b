// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Cancellation and session settings carried by a handle.

use std::time::{Duration, Instant};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result};

/// Cancellation scope for statements run through a handle.
///
/// The engine checks the context before each statement and keeps checking
/// while it runs, interrupting it once the context is cancelled or past its
/// deadline. Waiting on a locked database is bounded by the pool's busy
/// timeout instead.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A child context that is cancelled with `self` or after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that is cancelled with `self` or at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// A child context with its own cancellation.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail if the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Virtual machine steps between cancellation checks of a running statement.
const PROGRESS_STEPS: i32 = 1000;

impl Context {
    /// Run `f` on `conn`, interrupting its statements when this context ends.
    pub(crate) fn run<R>(
        &self,
        conn: &Connection,
        f: impl FnOnce(&Connection) -> Result<R>,
    ) -> Result<R> {
        self.check()?;
        let watched = self.clone();
        conn.progress_handler(PROGRESS_STEPS, Some(move || watched.check().is_err()))?;
        let outcome = f(conn);
        if let Err(e) = conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>) {
            warn!("Failed to clear progress handler: {e}");
        }
        match outcome {
            Err(e) if e.is_interrupt() => Err(self.check().err().unwrap_or(e)),
            other => other,
        }
    }
}

/// Settings applied with `session`.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Compile statements without running them.
    pub dry_run: bool,
    /// Drop accumulated clauses and start from a fresh statement.
    pub new_db: bool,
    /// Do not wrap single writes in an implicit transaction.
    pub skip_default_transaction: bool,
    /// Permit update and delete without conditions.
    pub allow_global_update: bool,
    pub context: Option<Context>,
}

/// Behavior flags a handle carries through its chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    pub(crate) dry_run: bool,
    pub(crate) skip_default_transaction: bool,
    pub(crate) allow_global_update: bool,
    pub(crate) read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_fails() {
        assert!(Context::background().check().is_ok());
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert!(matches!(child.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(parent.check().is_ok());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    const ENDLESS: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 100000000) SELECT count(*) FROM c";

    fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row(ENDLESS, [], |row| row.get(0))?)
    }

    #[test]
    fn test_deadline_interrupts_running_statement() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        assert!(matches!(ctx.run(&conn, count), Err(Error::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The handler is cleared afterwards
        let n: i64 = Context::background()
            .run(&conn, |conn| Ok(conn.query_row("SELECT 7", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(n, 7);
    }

    #[test]
    fn test_cancel_interrupts_running_statement() {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        assert!(matches!(ctx.run(&conn, count), Err(Error::Cancelled)));
        handle.join().unwrap();
    }

    #[test]
    fn test_earlier_parent_deadline_wins() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
