// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! TOML configuration for opening a read/write handle pair.
//!
//! ```toml
//! skip_default_transaction = false
//! debug = false
//!
//! [write]
//! path = "/var/lib/app/app.sqlite"
//! busy_timeout_ms = 5000
//!
//! [read]
//! path = "/var/lib/app/app.sqlite"
//! max_connections = 16
//! ```
//!
//! Without a `[read]` section the read handle opens the write handle's
//! source. The read handle is always opened read-only.

use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::connection::{OpenMode, PoolOptions, Source};
use crate::context::SessionConfig;
use crate::db::Db;
use crate::error::Result;

/// Environment variable naming the config file read by [`Config::from_env`].
pub const CONFIG_ENV: &str = "SPREAD_DB_CONFIG";

const DEFAULT_MEMORY_NAME: &str = "spread-db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    PoolOptions::default().max_size
}

fn default_write() -> HandleConfig {
    HandleConfig {
        memory: Some(DEFAULT_MEMORY_NAME.into()),
        ..HandleConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_write")]
    pub write: HandleConfig,
    #[serde(default)]
    pub read: Option<HandleConfig>,
    /// Do not wrap single writes in an implicit transaction.
    #[serde(default)]
    pub skip_default_transaction: bool,
    /// Log every statement at `info` level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write: default_write(),
            read: None,
            skip_default_transaction: false,
            debug: false,
        }
    }
}

/// Where and how one handle connects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandleConfig {
    /// Database file
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Name of a shared in-memory database
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub mode: OpenMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            path: None,
            memory: None,
            mode: OpenMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl HandleConfig {
    pub fn source(&self) -> std::result::Result<Source, ConfigError> {
        match (&self.path, &self.memory) {
            (Some(path), None) => Ok(Source::File(path.clone())),
            (None, Some(name)) => Ok(Source::Memory(name.clone())),
            (Some(_), Some(_)) => Err(ConfigError::Invalid {
                reason: "set either path or memory, not both".to_string(),
            }),
            (None, None) => Err(ConfigError::Invalid {
                reason: "one of path or memory is required".to_string(),
            }),
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            ..PoolOptions::default()
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.source()?;
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_connections must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Config {
    pub fn load(settings_file: &Path) -> std::result::Result<Config, ConfigError> {
        let contents = read_to_string(settings_file).map_err(|e| ConfigError::ReadFile {
            path: settings_file.display().to_string(),
            source: e,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> std::result::Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `SPREAD_DB_CONFIG`, or the defaults when unset.
    pub fn from_env() -> std::result::Result<Config, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(settings_file) => Self::load(Path::new(&settings_file)),
            Err(_) => Ok(Config::default()),
        }
    }

    /// The read handle's settings, falling back to the write handle's source.
    pub fn read_handle(&self) -> HandleConfig {
        let mut read = self.read.clone().unwrap_or_else(|| self.write.clone());
        read.mode = OpenMode::ReadOnly;
        read
    }

    /// Open the `(read, write)` handle pair with the configured session.
    ///
    /// The write handle is opened first so it can create the database the
    /// read handle attaches to.
    pub fn open(&self) -> Result<(Db, Db)> {
        let read_config = self.read_handle();
        let write = Db::open_config(&self.write)?;
        let read = Db::open_config(&read_config)?.read_only();

        let session = SessionConfig {
            skip_default_transaction: self.skip_default_transaction,
            ..Default::default()
        };
        let (mut read, mut write) = (read.session(session.clone()), write.session(session));
        if self.debug {
            read = read.debug();
            write = write.debug();
        }
        Ok((read, write))
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.write.validate()?;
        if let Some(read) = &self.read {
            read.validate()?;
        }
        if self.write.mode == OpenMode::ReadOnly {
            return Err(ConfigError::Invalid {
                reason: "the write handle cannot be read-only".to_string(),
            });
        }
        Ok(())
    }
}

impl Db {
    /// Open a handle from one `[read]` or `[write]` section.
    pub fn open_config(config: &HandleConfig) -> Result<Db> {
        let source = config.source()?;
        debug!("Opening {source} from configuration ({:?})", config.mode);
        Db::open_with(source, config.mode, config.pool_options())
    }
}
