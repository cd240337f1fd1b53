//! Reset command: deletes every stored session.

use std::io::Write;

use anyhow::{Result, bail};

use crate::Config;

use super::util::{lock_database, open_engine};

pub fn run<W: Write>(writer: &mut W, config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("refusing to delete all sessions without --yes");
    }
    let _lock = lock_database(config)?;
    let mut engine = open_engine(config)?;
    let deleted = engine.reset();
    if engine.flush() > 0 {
        bail!("failed to clear sessions in {}", config.database_path.display());
    }
    writeln!(writer, "Deleted {deleted} session(s).")?;
    Ok(())
}
