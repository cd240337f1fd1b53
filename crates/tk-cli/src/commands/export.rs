//! Export command: writes every stored session as a JSON object keyed by ticket.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;

use super::util::open_database;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let snapshot = db.export_snapshot().context("failed to export sessions")?;
    writeln!(writer, "{snapshot}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::DateTime;
    use tk_core::{TicketId, TicketMeta, TimerAction};

    use crate::commands::util::open_engine;

    #[test]
    fn export_contains_each_session_keyed_by_ticket() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("tk.db"),
            ..Config::default()
        };
        let mut engine = open_engine(&config).unwrap();
        let start = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        engine.dispatch(
            TicketId::new("PROJ-7").unwrap(),
            TimerAction::Queue(TicketMeta::new(Some("Billing".to_string()), None)),
            start,
        );

        let mut output = Vec::new();
        run(&mut output, &config).unwrap();
        let snapshot: serde_json::Value = serde_json::from_slice(&output).unwrap();

        let session = &snapshot["PROJ-7"];
        assert_eq!(session["ticketName"], "Billing");
        assert_eq!(session["status"], "queue");
        assert_eq!(session["totalElapsed"], 0);
        assert_eq!(session["sessions"].as_array().unwrap().len(), 1);
    }
}
