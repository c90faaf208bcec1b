// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Database connection management.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    /// Read-only access (for replica handles)
    ReadOnly,
    /// Read-write access to an existing database
    ReadWrite,
    /// Create new database if it doesn't exist
    #[default]
    Create,
}

/// Where a pool's connections point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    /// Named in-memory database shared by every connection of the process.
    Memory(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Memory(name) => write!(f, "memory:{name}"),
        }
    }
}

/// Connection pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Most connections open at once, transactions included
    pub max_size: u32,
    /// Idle connections kept ready; `None` keeps `max_size`
    pub min_idle: Option<u32>,
    /// How long a checkout waits for a free connection
    pub connection_timeout: Duration,
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 8,
            min_idle: Some(1),
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens and health-checks SQLite connections for the pool.
#[derive(Debug)]
pub(crate) struct SqliteManager {
    source: Source,
    mode: OpenMode,
}

impl r2d2::ManageConnection for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> rusqlite::Result<Connection> {
        match &self.source {
            Source::File(path) => {
                let flags = match self.mode {
                    OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
                    OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
                    OpenMode::Create => {
                        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
                    }
                };
                Connection::open_with_flags(path, flags)
            }
            Source::Memory(name) => Connection::open_with_flags(
                memory_uri(name),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            ),
        }
    }

    fn is_valid(&self, conn: &mut Connection) -> rusqlite::Result<()> {
        conn.execute_batch("")
    }

    // A connection handed back inside a transaction is discarded
    fn has_broken(&self, conn: &mut Connection) -> bool {
        !conn.is_autocommit()
    }
}

/// Busy timeout and pragmas applied to every new connection.
#[derive(Debug)]
struct Pragmas {
    memory: bool,
    mode: OpenMode,
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for Pragmas {
    fn on_acquire(&self, conn: &mut Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(self.busy_timeout)?;
        match (self.memory, self.mode) {
            (false, OpenMode::ReadOnly) => conn.execute_batch("PRAGMA foreign_keys = ON;"),
            (false, _) => conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                "#,
            ),
            (true, OpenMode::ReadOnly) => conn.execute_batch(
                r#"
                PRAGMA foreign_keys = ON;
                PRAGMA query_only = ON;
                "#,
            ),
            (true, _) => conn.execute_batch("PRAGMA foreign_keys = ON;"),
        }
    }
}

/// Routes r2d2's background connection errors to tracing.
#[derive(Debug)]
struct LogErrors;

impl r2d2::HandleError<rusqlite::Error> for LogErrors {
    fn handle_error(&self, error: rusqlite::Error) {
        warn!("Pooled connection failed: {error}");
    }
}

/// A connection checked out of a [`Pool`]; dropping it hands it back.
pub(crate) type PooledConn = r2d2::PooledConnection<SqliteManager>;

/// A set of SQLite connections to one database.
///
/// Plain statements borrow a connection for their duration; transactions
/// hold one exclusively until they end.
pub(crate) struct Pool {
    source: Source,
    mode: OpenMode,
    inner: r2d2::Pool<SqliteManager>,
    // Keeps a named in-memory database alive while the pool exists
    _anchor: Option<Mutex<Connection>>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Open a pool, verifying the database is reachable.
    pub(crate) fn open(source: Source, mode: OpenMode, options: PoolOptions) -> Result<Arc<Self>> {
        if let Source::File(path) = &source {
            if mode != OpenMode::Create && !path.exists() {
                return Err(Error::DatabaseNotFound(path.to_owned()));
            }
        }

        let manager = SqliteManager {
            source: source.clone(),
            mode,
        };
        let pragmas = Pragmas {
            memory: matches!(source, Source::Memory(_)),
            mode,
            busy_timeout: options.busy_timeout,
        };

        // Open one connection up front so open errors keep their detail
        let mut first = r2d2::ManageConnection::connect(&manager).map_err(|e| {
            Error::DatabaseOpen {
                path: source.to_string(),
                source: Arc::new(e),
            }
        })?;
        r2d2::CustomizeConnection::on_acquire(&pragmas, &mut first)?;
        let anchor = match &source {
            Source::Memory(_) => Some(Mutex::new(first)),
            Source::File(_) => None,
        };

        let max_size = options.max_size.max(1);
        let inner = r2d2::Pool::builder()
            .max_size(max_size)
            .min_idle(options.min_idle.map(|n| n.min(max_size)))
            .connection_timeout(options.connection_timeout.max(Duration::from_millis(1)))
            .connection_customizer(Box::new(pragmas))
            .error_handler(Box::new(LogErrors))
            .build_unchecked(manager);

        debug!("Opened database at {} ({:?})", source, mode);
        Ok(Arc::new(Self {
            source,
            mode,
            inner,
            _anchor: anchor,
        }))
    }

    pub(crate) fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Check out a connection, waiting for one to free up when all are busy.
    pub(crate) fn get(&self) -> Result<PooledConn> {
        self.inner.get().map_err(|e| Error::Pool(Arc::new(e)))
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> r2d2::State {
        self.inner.state()
    }
}

fn memory_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}
