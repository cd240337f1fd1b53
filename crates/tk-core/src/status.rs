//! Timer statuses and the action vocabulary that moves between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{TicketMeta, ValidationError};

/// Lifecycle status of a ticket timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerStatus {
    Queue,
    Running,
    Paused,
    Hold,
    Completed,
    Stopped,
}

impl TimerStatus {
    /// String representation used in storage and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Hold => "hold",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        }
    }

    /// Completed and stopped timers stay terminal until started again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" | "queued" => Ok(Self::Queue),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "hold" => Ok(Self::Hold),
            "completed" => Ok(Self::Completed),
            "stopped" => Ok(Self::Stopped),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for TimerStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimerStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A lifecycle action applied to one ticket's timer.
///
/// User commands and background events both reduce to this type, so the
/// reconciler handles them with a single set of rules.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerAction {
    /// Start (or restart) the timer. Metadata is only used when present.
    Start(TicketMeta),
    /// Put a never-started ticket into the queue without accruing time.
    Queue(TicketMeta),
    Pause,
    Resume,
    Hold,
    Complete,
    Stop,
}

impl TimerAction {
    /// Action name for logs and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Queue(_) => "queue",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Hold => "hold",
            Self::Complete => "complete",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an action originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSource {
    /// Direct interaction in the interactive process.
    User,
    /// Lifecycle event from the background process.
    Background,
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Background => f.write_str("background"),
        }
    }
}
