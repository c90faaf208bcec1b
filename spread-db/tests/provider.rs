// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Composing a provider from configured handles.

use std::fs;

use spread_db::engine::{Config, ConfigError, Error, OpenMode};
use spread_db::prelude::*;
use spread_db_test_utils::{SCHEMA_SQL, User};

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("spread-db.toml");
    fs::write(&path, body).unwrap();
    path
}

fn provider(config: &Config) -> Provider {
    let (read, write) = config.open().unwrap();
    Provider::new(read, write)
}

#[test_log::test]
fn test_load_and_compose() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.sqlite");
    let config_path = write_config(
        &dir,
        &format!(
            r#"
skip_default_transaction = true

[write]
path = "{0}"
busy_timeout_ms = 1000

[read]
path = "{0}"
max_connections = 2
"#,
            db_path.display()
        ),
    );

    let config = Config::load(&config_path).unwrap();
    assert!(config.skip_default_transaction);
    assert_eq!(config.write.busy_timeout_ms, 1000);
    assert_eq!(config.read_handle().mode, OpenMode::ReadOnly);

    let provider = provider(&config);
    provider.write.exec(SCHEMA_SQL).result().unwrap();

    let mut user = User::new("A", 30);
    provider.write.create(&mut user).result().unwrap();

    let mut found = User::default();
    provider
        .read
        .filter(expr!("email = ?", "a@example.com"))
        .take(&mut found)
        .result()
        .unwrap();
    assert_eq!(found, user);

    let refused = provider.read.raw("DELETE FROM users").row();
    assert!(matches!(refused.err(), Some(Error::ReadOnly(_))));
}

#[test_log::test]
fn test_read_defaults_to_write_source() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.sqlite");
    let config = Config::parse(&format!("[write]\npath = \"{}\"\n", db_path.display())).unwrap();

    let read = config.read_handle();
    assert_eq!(read.path.as_deref(), Some(db_path.as_path()));
    assert_eq!(read.mode, OpenMode::ReadOnly);

    let provider = provider(&config);
    provider.write.exec(SCHEMA_SQL).result().unwrap();
    let mut n = -1;
    provider.read.table("users").count(&mut n).result().unwrap();
    assert_eq!(n, 0);
}

#[test_log::test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test_log::test]
fn test_rejected_configs() {
    let unknown = Config::parse("[write]\nmemory = \"x\"\npoolsize = 3\n").unwrap_err();
    assert!(matches!(unknown, ConfigError::TomlParse(_)));

    let both = Config::parse("[write]\nmemory = \"x\"\npath = \"/tmp/x.sqlite\"\n").unwrap_err();
    assert!(matches!(both, ConfigError::Invalid { .. }));

    let read_only_writer =
        Config::parse("[write]\nmemory = \"x\"\nmode = \"read-only\"\n").unwrap_err();
    assert!(matches!(read_only_writer, ConfigError::Invalid { .. }));
}

#[test_log::test]
fn test_open_fails_on_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("absent.sqlite");
    let config = Config::parse(&format!(
        "[write]\npath = \"{}\"\nmode = \"read-write\"\n",
        db_path.display()
    ))
    .unwrap();

    assert!(matches!(config.open(), Err(Error::DatabaseNotFound(_))));
}
