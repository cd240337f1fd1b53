//! Shared utilities for CLI commands.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;

use tk_core::TimerEngine;
use tk_db::Database;

use crate::Config;

/// Opens the configured database, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Opens the database and loads every stored session into an engine.
pub fn open_engine(config: &Config) -> Result<TimerEngine<Database>> {
    let db = open_database(config)?;
    TimerEngine::open(db, config.engine_options()).context("failed to load timer sessions")
}

/// Takes the database lock for a one-shot write.
///
/// Fails while `tk run` owns the database, since the service would overwrite
/// the change with its in-memory copy.
pub fn lock_database(config: &Config) -> Result<File> {
    acquire_lock(&config.lock_path()).with_context(|| {
        format!(
            "`tk run` is using {}; send the command on its stdin instead",
            config.database_path.display()
        )
    })
}

/// Takes an exclusive, non-blocking lock on `path`, creating it if needed.
/// The lock is released when the returned file is dropped.
pub fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let file = File::create(path).context("failed to create lock file")?;
    file.try_lock_exclusive()
        .with_context(|| format!("{} is locked", path.display()))?;
    Ok(file)
}

/// Formats milliseconds as `HH:MM:SS`, truncating partial seconds.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
