//! Folding lifecycle actions into timer sessions.
//!
//! [`transition`] is a pure reducer: given the current session for a ticket
//! (if any) and a command, it returns either the next session or the reason
//! the command was ignored. User commands and background events go through the
//! same reducer, so an action that arrives twice (once from the user, once
//! echoed back by the background process) changes state only once.
//!
//! # Transition Table
//!
//! | From | Action | To | Segments |
//! |---|---|---|---|
//! | (none) | start | running | open first segment |
//! | (none) | queue | queue | open a non-accruing queued segment |
//! | queue | start | running | replace history with one fresh segment |
//! | running | pause / hold / complete / stop | paused / hold / completed / stopped | close open segment |
//! | paused, hold | resume / start | running | close prior segment if still open, open new |
//! | paused, hold | complete / stop | completed / stopped | close open segment if any |
//! | completed, stopped | start | running | append new segment, total carries over |
//!
//! Every other combination is ignored.
//!
//! Commands are ordered against the segment history. A background event
//! timestamped before the last recorded boundary arrived out of order and is
//! ignored as stale. A user command with such a timestamp (a clock that
//! stepped backwards) is applied at the boundary instead.

use chrono::{DateTime, Utc};

use crate::session::{Segment, TimerSession};
use crate::status::{ActionSource, TimerAction, TimerStatus};
use crate::types::TicketId;

/// An action addressed to one ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerCommand {
    pub ticket: TicketId,
    pub action: TimerAction,
    /// When the action happened, as reported by its source.
    pub at: DateTime<Utc>,
    pub source: ActionSource,
}

impl TimerCommand {
    pub const fn new(
        ticket: TicketId,
        action: TimerAction,
        at: DateTime<Utc>,
        source: ActionSource,
    ) -> Self {
        Self {
            ticket,
            action,
            at,
            source,
        }
    }

    /// A command issued directly by the user.
    pub const fn user(ticket: TicketId, action: TimerAction, at: DateTime<Utc>) -> Self {
        Self::new(ticket, action, at, ActionSource::User)
    }

    /// A command relayed by the background process.
    pub const fn background(ticket: TicketId, action: TimerAction, at: DateTime<Utc>) -> Self {
        Self::new(ticket, action, at, ActionSource::Background)
    }
}

/// Why a command left state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The ticket has no session and the action cannot create one.
    UnknownTicket,
    /// The session is already in the state the action would produce.
    AlreadyApplied,
    /// The action is not valid from the current status.
    IllegalTransition {
        from: TimerStatus,
        action: &'static str,
    },
    /// A background event older than the latest recorded change.
    Stale,
}

/// Result of reducing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The session to store in place of the current one.
    Next(TimerSession),
    Ignored(IgnoreReason),
}

/// Computes the session that results from applying `command` to `current`.
pub fn transition(current: Option<&TimerSession>, command: &TimerCommand) -> Transition {
    let Some(current) = current else {
        let at = command.at;
        return match &command.action {
            TimerAction::Start(meta) => {
                let mut session =
                    TimerSession::new(command.ticket.clone(), meta, TimerStatus::Running);
                session.sessions.push(Segment::open(at, TimerStatus::Running));
                Transition::Next(session)
            }
            TimerAction::Queue(meta) => {
                let mut session =
                    TimerSession::new(command.ticket.clone(), meta, TimerStatus::Queue);
                session.sessions.push(Segment::open(at, TimerStatus::Queue));
                Transition::Next(session)
            }
            TimerAction::Pause
            | TimerAction::Resume
            | TimerAction::Hold
            | TimerAction::Complete
            | TimerAction::Stop => Transition::Ignored(IgnoreReason::UnknownTicket),
        };
    };

    let (at, stale) = match current.last_boundary() {
        Some(boundary) if command.at < boundary => match command.source {
            ActionSource::Background => (command.at, true),
            ActionSource::User => (boundary, false),
        },
        _ => (command.at, false),
    };

    let mut next = current.clone();
    match (current.status, &command.action) {
        (TimerStatus::Queue, TimerAction::Start(meta)) => {
            // Time spent queued is not work time.
            next.apply_meta(meta);
            next.sessions = vec![Segment::open(at, TimerStatus::Running)];
            next.total_elapsed = 0;
            next.status = TimerStatus::Running;
        }
        (TimerStatus::Running, TimerAction::Start(_))
        | (TimerStatus::Queue, TimerAction::Queue(_))
        | (TimerStatus::Paused, TimerAction::Pause)
        | (TimerStatus::Hold, TimerAction::Hold)
        | (TimerStatus::Completed, TimerAction::Complete)
        | (TimerStatus::Stopped, TimerAction::Stop) => {
            return Transition::Ignored(IgnoreReason::AlreadyApplied);
        }
        (TimerStatus::Running, TimerAction::Pause) => close(&mut next, at, TimerStatus::Paused),
        (TimerStatus::Running, TimerAction::Hold) => close(&mut next, at, TimerStatus::Hold),
        (TimerStatus::Running, TimerAction::Complete) => {
            close(&mut next, at, TimerStatus::Completed);
        }
        (TimerStatus::Running, TimerAction::Stop) => close(&mut next, at, TimerStatus::Stopped),
        (TimerStatus::Paused | TimerStatus::Hold, TimerAction::Resume) => {
            reopen(&mut next, at);
        }
        (TimerStatus::Paused | TimerStatus::Hold, TimerAction::Start(meta)) => {
            next.apply_meta(meta);
            reopen(&mut next, at);
        }
        (TimerStatus::Paused | TimerStatus::Hold, TimerAction::Complete) => {
            close(&mut next, at, TimerStatus::Completed);
        }
        (TimerStatus::Paused | TimerStatus::Hold, TimerAction::Stop) => {
            close(&mut next, at, TimerStatus::Stopped);
        }
        (TimerStatus::Completed | TimerStatus::Stopped, TimerAction::Start(meta)) => {
            // History and total carry over; only a new segment is appended.
            next.apply_meta(meta);
            reopen(&mut next, at);
        }
        (
            from @ (TimerStatus::Queue
            | TimerStatus::Running
            | TimerStatus::Paused
            | TimerStatus::Hold
            | TimerStatus::Completed
            | TimerStatus::Stopped),
            action @ (TimerAction::Queue(_)
            | TimerAction::Pause
            | TimerAction::Resume
            | TimerAction::Hold
            | TimerAction::Complete
            | TimerAction::Stop),
        ) => {
            return Transition::Ignored(IgnoreReason::IllegalTransition {
                from,
                action: action.name(),
            });
        }
    }

    if stale {
        return Transition::Ignored(IgnoreReason::Stale);
    }

    debug_assert!(next.is_consistent(), "reducer broke accounting: {next:?}");
    Transition::Next(next)
}

/// Moves the session to `status`, closing the open segment if there is one.
fn close(session: &mut TimerSession, at: DateTime<Utc>, status: TimerStatus) {
    session.close_open_segment(at, status);
    session.status = status;
}

/// Opens a fresh running segment, first closing a prior segment left open.
fn reopen(session: &mut TimerSession, at: DateTime<Utc>) {
    if let Some(previous) = session.open_segment_mut() {
        previous.end_time = Some(at);
    }
    session.sessions.push(Segment::open(at, TimerStatus::Running));
    session.status = TimerStatus::Running;
}
