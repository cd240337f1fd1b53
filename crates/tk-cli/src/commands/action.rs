//! One-shot lifecycle commands: start, queue, pause, resume, hold, complete,
//! stop, delete and rename.
//!
//! These apply a single action to the stored session and exit. They never
//! tick; elapsed time only accrues inside `tk run`, and they refuse to write
//! while `tk run` owns the database.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;

use tk_core::{IgnoreReason, Outcome, TicketId, TicketMeta, TimerAction, TimerEngine};
use tk_db::Database;

use crate::Config;

use super::util::{format_duration, lock_database, open_engine};

pub fn run<W: Write>(writer: &mut W, config: &Config, ticket: &str, action: TimerAction) -> Result<()> {
    let ticket = TicketId::new(ticket)?;
    let _lock = lock_database(config)?;
    let mut engine = open_engine(config)?;

    let outcome = engine.dispatch(ticket.clone(), action.clone(), Utc::now());
    ensure_saved(&mut engine, &ticket)?;

    writeln!(writer, "{}", describe(&engine, &ticket, &action, outcome))?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, config: &Config, ticket: &str, keep_record: bool) -> Result<()> {
    let ticket = TicketId::new(ticket)?;
    let _lock = lock_database(config)?;
    let mut engine = open_engine(config)?;

    if !engine.delete(&ticket, !keep_record, Utc::now()) {
        writeln!(writer, "{ticket}: no timer for this ticket")?;
        return Ok(());
    }
    ensure_saved(&mut engine, &ticket)?;

    if keep_record {
        writeln!(writer, "{ticket}: removed (record kept)")?;
    } else {
        writeln!(writer, "{ticket}: deleted")?;
    }
    Ok(())
}

pub fn rename<W: Write>(writer: &mut W, config: &Config, ticket: &str, meta: &TicketMeta) -> Result<()> {
    let ticket = TicketId::new(ticket)?;
    let _lock = lock_database(config)?;
    let mut engine = open_engine(config)?;

    if !engine.rename(&ticket, meta) {
        writeln!(writer, "{ticket}: no timer for this ticket")?;
        return Ok(());
    }
    ensure_saved(&mut engine, &ticket)?;

    if let Some(session) = engine.session(&ticket) {
        writeln!(writer, "{ticket}: renamed to {}", session.ticket_name)?;
    }
    Ok(())
}

/// Fails when `ticket`'s change did not reach the database. Repairs made to
/// other records while loading are written out but never fail the command.
fn ensure_saved(engine: &mut TimerEngine<Database>, ticket: &TicketId) -> Result<()> {
    engine.flush();
    if engine.is_unsaved(ticket) {
        bail!("failed to save timer session for {ticket}");
    }
    Ok(())
}

fn describe(
    engine: &TimerEngine<Database>,
    ticket: &TicketId,
    action: &TimerAction,
    outcome: Outcome,
) -> String {
    match outcome {
        Outcome::Applied(status) => {
            let total = engine
                .session(ticket)
                .map_or(0, |session| session.total_elapsed);
            format!("{ticket}: {status} (total {})", format_duration(total))
        }
        Outcome::Ignored(IgnoreReason::AlreadyApplied) => {
            let status = engine
                .session(ticket)
                .map_or_else(String::new, |session| session.status.to_string());
            format!("{ticket}: already {status}")
        }
        Outcome::Ignored(IgnoreReason::UnknownTicket) => {
            format!("{ticket}: no timer for this ticket")
        }
        Outcome::Ignored(IgnoreReason::IllegalTransition { from, .. }) => {
            format!("{ticket}: cannot {} a {from} timer", action.name())
        }
        Outcome::Ignored(IgnoreReason::Stale) => {
            format!("{ticket}: ignored, older than the timer's last change")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::DateTime;
    use insta::assert_snapshot;
    use tk_core::{Segment, TimerSession, TimerStatus};

    use crate::commands::util::acquire_lock;

    fn config(temp: &tempfile::TempDir) -> Config {
        Config {
            database_path: temp.path().join("tk.db"),
            ..Config::default()
        }
    }

    fn exec(config: &Config, ticket: &str, action: TimerAction) -> String {
        let mut output = Vec::new();
        run(&mut output, config, ticket, action).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn lifecycle_messages() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        let meta = TicketMeta::new(Some("Login page".to_string()), Some(3.0));

        let mut transcript = String::new();
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Start(meta.clone())));
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Start(meta)));
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Pause));
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Pause));
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Complete));
        transcript.push_str(&exec(&config, "PROJ-1", TimerAction::Hold));
        transcript.push_str(&exec(&config, "PROJ-2", TimerAction::Pause));

        assert_snapshot!(transcript, @r"
        PROJ-1: running (total 00:00:00)
        PROJ-1: already running
        PROJ-1: paused (total 00:00:00)
        PROJ-1: already paused
        PROJ-1: completed (total 00:00:00)
        PROJ-1: cannot hold a completed timer
        PROJ-2: no timer for this ticket
        ");
    }

    #[test]
    fn blank_ticket_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut output = Vec::new();
        let result = run(&mut output, &config(&temp), "  ", TimerAction::Pause);
        assert!(result.is_err());
    }

    #[test]
    fn delete_keeps_or_purges_the_record() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        exec(&config, "PROJ-1", TimerAction::Start(TicketMeta::default()));
        exec(&config, "PROJ-2", TimerAction::Start(TicketMeta::default()));

        let mut output = Vec::new();
        delete(&mut output, &config, "PROJ-1", true).unwrap();
        delete(&mut output, &config, "PROJ-2", false).unwrap();
        delete(&mut output, &config, "PROJ-3", false).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        PROJ-1: removed (record kept)
        PROJ-2: deleted
        PROJ-3: no timer for this ticket
        ");

        let engine = open_engine(&config).unwrap();
        assert!(engine.list_active().is_empty());
        let kept = engine.session(&TicketId::new("PROJ-1").unwrap()).unwrap();
        assert_eq!(kept.status.as_str(), "stopped");
        assert!(engine.session(&TicketId::new("PROJ-2").unwrap()).is_none());
    }

    #[test]
    fn rename_updates_stored_name() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        exec(&config, "PROJ-1", TimerAction::Queue(TicketMeta::default()));

        let mut output = Vec::new();
        let meta = TicketMeta::new(Some("Checkout flow".to_string()), None);
        rename(&mut output, &config, "PROJ-1", &meta).unwrap();
        rename(&mut output, &config, "PROJ-9", &meta).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        PROJ-1: renamed to Checkout flow
        PROJ-9: no timer for this ticket
        ");
    }

    #[test]
    fn refuses_to_write_while_the_service_runs() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);
        exec(&config, "PROJ-1", TimerAction::Start(TicketMeta::default()));

        let service = acquire_lock(&config.lock_path()).unwrap();
        let mut output = Vec::new();
        assert!(run(&mut output, &config, "PROJ-1", TimerAction::Pause).is_err());
        assert!(delete(&mut output, &config, "PROJ-1", false).is_err());
        let meta = TicketMeta::new(Some("Elsewhere".to_string()), None);
        assert!(rename(&mut output, &config, "PROJ-1", &meta).is_err());
        assert!(output.is_empty());

        let engine = open_engine(&config).unwrap();
        let session = engine.session(&TicketId::new("PROJ-1").unwrap()).unwrap();
        assert_eq!(session.status.as_str(), "running");
        assert_eq!(session.ticket_name, "PROJ-1");
        drop(engine);

        drop(service);
        assert_eq!(
            exec(&config, "PROJ-1", TimerAction::Pause),
            "PROJ-1: paused (total 00:00:00)\n"
        );
    }

    #[test]
    fn repaired_record_elsewhere_does_not_fail_the_command() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(&temp);

        let at = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        let other = TicketId::new("PROJ-7").unwrap();
        let mut damaged = TimerSession::new(other.clone(), &TicketMeta::default(), TimerStatus::Paused);
        damaged.sessions.push(Segment {
            end_time: Some(at),
            duration: 1000,
            ..Segment::open(at, TimerStatus::Paused)
        });
        damaged.total_elapsed = 999;
        let mut db = Database::open(&config.database_path).unwrap();
        db.save_session(&damaged).unwrap();
        drop(db);

        assert_eq!(
            exec(&config, "PROJ-1", TimerAction::Start(TicketMeta::default())),
            "PROJ-1: running (total 00:00:00)\n"
        );
        let engine = open_engine(&config).unwrap();
        assert_eq!(engine.session(&other).unwrap().total_elapsed, 1000);
    }
}
