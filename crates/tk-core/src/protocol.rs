//! Messages exchanged between the interactive process and the background process.
//!
//! Messages travel as one JSON object per line. Inbound lines are either user
//! commands (`{"command": ...}`) or background lifecycle events
//! (`{"event": ...}`); the only outbound message is the running-timer count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconcile::TimerCommand;
use crate::status::TimerAction;
use crate::types::{TicketId, TicketMeta};

/// A lifecycle event emitted by the background process, e.g. from a global
/// hotkey or the tray menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BackgroundEvent {
    Started {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, rename = "storyPoints", skip_serializing_if = "Option::is_none")]
        story_points: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
    Paused {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
    Resumed {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
    Stopped {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<DateTime<Utc>>,
    },
}

impl BackgroundEvent {
    pub const fn ticket(&self) -> &TicketId {
        match self {
            Self::Started { ticket, .. }
            | Self::Paused { ticket, .. }
            | Self::Resumed { ticket, .. }
            | Self::Stopped { ticket, .. } => ticket,
        }
    }

    /// Converts the event into a background-sourced command.
    ///
    /// Events without their own timestamp are stamped with `received_at`.
    pub fn into_command(self, received_at: DateTime<Utc>) -> TimerCommand {
        let (ticket, action, at) = match self {
            Self::Started {
                ticket,
                name,
                story_points,
                at,
            } => (
                ticket,
                TimerAction::Start(TicketMeta::new(name, story_points)),
                at,
            ),
            Self::Paused { ticket, at } => (ticket, TimerAction::Pause, at),
            Self::Resumed { ticket, at } => (ticket, TimerAction::Resume, at),
            Self::Stopped { ticket, at } => (ticket, TimerAction::Stop, at),
        };
        TimerCommand::background(ticket, action, at.unwrap_or(received_at))
    }
}

/// A command from the user-facing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UserCommand {
    Start {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, rename = "storyPoints", skip_serializing_if = "Option::is_none")]
        story_points: Option<f64>,
    },
    Queue {
        ticket: TicketId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, rename = "storyPoints", skip_serializing_if = "Option::is_none")]
        story_points: Option<f64>,
    },
    Pause {
        ticket: TicketId,
    },
    Resume {
        ticket: TicketId,
    },
    Hold {
        ticket: TicketId,
    },
    Complete {
        ticket: TicketId,
    },
    Stop {
        ticket: TicketId,
    },
    Delete {
        ticket: TicketId,
        /// Also remove the persisted record.
        #[serde(default)]
        purge: bool,
    },
}

impl UserCommand {
    pub const fn ticket(&self) -> &TicketId {
        match self {
            Self::Start { ticket, .. }
            | Self::Queue { ticket, .. }
            | Self::Pause { ticket }
            | Self::Resume { ticket }
            | Self::Hold { ticket }
            | Self::Complete { ticket }
            | Self::Stop { ticket }
            | Self::Delete { ticket, .. } => ticket,
        }
    }

    /// The lifecycle action this command maps to. `None` for `delete`.
    pub fn action(&self) -> Option<TimerAction> {
        match self {
            Self::Start {
                name, story_points, ..
            } => Some(TimerAction::Start(TicketMeta::new(name.clone(), *story_points))),
            Self::Queue {
                name, story_points, ..
            } => Some(TimerAction::Queue(TicketMeta::new(name.clone(), *story_points))),
            Self::Pause { .. } => Some(TimerAction::Pause),
            Self::Resume { .. } => Some(TimerAction::Resume),
            Self::Hold { .. } => Some(TimerAction::Hold),
            Self::Complete { .. } => Some(TimerAction::Complete),
            Self::Stop { .. } => Some(TimerAction::Stop),
            Self::Delete { .. } => None,
        }
    }
}

/// A command that is not about a single ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlCommand {
    /// Drop completed and stopped timers from the active list.
    ClearFinished,
}

/// Any line the interactive process accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Command(UserCommand),
    Event(BackgroundEvent),
    Control(ControlCommand),
}

impl Inbound {
    /// The ticket the message is about, if any.
    pub const fn ticket(&self) -> Option<&TicketId> {
        match self {
            Self::Command(command) => Some(command.ticket()),
            Self::Event(event) => Some(event.ticket()),
            Self::Control(_) => None,
        }
    }
}

/// State pushed from the interactive process to the background process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum Signal {
    /// Number of timers currently running, for a tray indicator.
    ActiveCount { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ActionSource;

    use insta::assert_snapshot;

    fn received() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn started_event_carries_metadata() {
        let line = r#"{"event":"started","ticket":"PROJ-9","name":"Search","storyPoints":2}"#;
        let inbound: Inbound = serde_json::from_str(line).unwrap();
        let Inbound::Event(event) = inbound else {
            panic!("expected event, got {inbound:?}");
        };

        let command = event.into_command(received());
        assert_eq!(command.ticket.as_str(), "PROJ-9");
        assert_eq!(command.source, ActionSource::Background);
        assert_eq!(command.at, received());
        assert_eq!(
            command.action,
            TimerAction::Start(TicketMeta::new(Some("Search".to_string()), Some(2.0)))
        );
    }

    #[test]
    fn event_timestamp_wins_over_receipt_time() {
        let line = r#"{"event":"stopped","ticket":"PROJ-9","at":"2025-06-01T10:00:00Z"}"#;
        let event: BackgroundEvent = serde_json::from_str(line).unwrap();
        let command = event.into_command(received());
        assert_eq!(command.action, TimerAction::Stop);
        assert_eq!(command.at.to_rfc3339(), "2025-06-01T10:00:00+00:00");
    }

    #[test]
    fn user_commands_parse_as_commands() {
        let inbound: Inbound =
            serde_json::from_str(r#"{"command":"delete","ticket":"PROJ-3","purge":true}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Command(UserCommand::Delete {
                ticket: TicketId::new("PROJ-3").unwrap(),
                purge: true,
            })
        );

        let inbound: Inbound =
            serde_json::from_str(r#"{"command":"hold","ticket":"PROJ-3"}"#).unwrap();
        let Inbound::Command(command) = inbound else {
            panic!("expected command");
        };
        assert_eq!(command.action(), Some(TimerAction::Hold));
    }

    #[test]
    fn control_commands_need_no_ticket() {
        let inbound: Inbound = serde_json::from_str(r#"{"command":"clearFinished"}"#).unwrap();
        assert_eq!(inbound, Inbound::Control(ControlCommand::ClearFinished));
        assert_eq!(inbound.ticket(), None);
    }

    #[test]
    fn blank_ticket_is_rejected() {
        let result: Result<Inbound, _> = serde_json::from_str(r#"{"event":"paused","ticket":""}"#);
        assert!(result.is_err());
    }

    #[test]
    fn active_count_signal_shape() {
        let json = serde_json::to_string(&Signal::ActiveCount { count: 2 }).unwrap();
        assert_snapshot!(json, @r#"{"signal":"activeCount","count":2}"#);
    }
}
