//! Import command: loads sessions from a JSON export.

use std::io::Read;

use anyhow::{Context, Result};

use crate::Config;

use super::util::{lock_database, open_database};

/// Reads a snapshot from `reader` and upserts every session in it.
///
/// Returns the number of sessions imported.
pub fn run<R: Read>(mut reader: R, config: &Config) -> Result<usize> {
    let mut json = String::new();
    reader
        .read_to_string(&mut json)
        .context("failed to read snapshot from stdin")?;

    let _lock = lock_database(config)?;
    let mut db = open_database(config)?;
    db.import_snapshot(&json).context("failed to import sessions")
}
