//! Durable timer records and their in-memory projection.
//!
//! A [`TimerSession`] is the persisted history for one ticket: an ordered list
//! of [`Segment`]s plus a running total. A [`TaskTimer`] is derived from a
//! session for display and is rebuilt whenever the session changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::TimerStatus;
use crate::types::{TicketId, TicketMeta};

/// One contiguous span of activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// When the segment opened.
    pub start_time: DateTime<Utc>,

    /// When the segment closed. `None` while the segment is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Accumulated milliseconds. Grows by tick quanta while open.
    pub duration: u64,

    /// The session status while this segment was accumulating, or the
    /// status it was closed with.
    pub status: TimerStatus,
}

impl Segment {
    /// Opens a new segment at `at` with zero duration.
    pub const fn open(at: DateTime<Utc>, status: TimerStatus) -> Self {
        Self {
            start_time: at,
            end_time: None,
            duration: 0,
            status,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// The durable time record for one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub ticket_number: TicketId,

    /// Display-only; may be refreshed without affecting accounting.
    pub ticket_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,

    /// Current lifecycle status.
    pub status: TimerStatus,

    /// Sum of every segment duration, in milliseconds.
    pub total_elapsed: u64,

    /// Chronological segment history. Only the last element is ever mutated.
    pub sessions: Vec<Segment>,
}

impl TimerSession {
    /// Creates an empty session for `ticket`, falling back to the ticket
    /// number as display name when `meta` carries none.
    pub fn new(ticket: TicketId, meta: &TicketMeta, status: TimerStatus) -> Self {
        let ticket_name = meta
            .display_name()
            .map_or_else(|| ticket.to_string(), ToString::to_string);
        Self {
            ticket_number: ticket,
            ticket_name,
            story_points: meta.story_points,
            status,
            total_elapsed: 0,
            sessions: Vec::new(),
        }
    }

    /// Applies whatever metadata `meta` carries. Accounting is untouched.
    pub fn apply_meta(&mut self, meta: &TicketMeta) {
        if let Some(name) = meta.display_name() {
            self.ticket_name = name.to_string();
        }
        if meta.story_points.is_some() {
            self.story_points = meta.story_points;
        }
    }

    /// The currently open segment, if any.
    pub fn open_segment(&self) -> Option<&Segment> {
        self.sessions.last().filter(|segment| segment.is_open())
    }

    pub fn open_segment_mut(&mut self) -> Option<&mut Segment> {
        self.sessions.last_mut().filter(|segment| segment.is_open())
    }

    /// The most recent instant recorded in the segment history: the last
    /// segment's end, or its start while it is still open.
    pub fn last_boundary(&self) -> Option<DateTime<Utc>> {
        self.sessions
            .last()
            .map(|segment| segment.end_time.unwrap_or(segment.start_time))
    }

    /// Closes the open segment at `at`, recording `status` on it.
    ///
    /// The duration is left as accumulated. Returns `false` when nothing was open.
    pub fn close_open_segment(&mut self, at: DateTime<Utc>, status: TimerStatus) -> bool {
        match self.open_segment_mut() {
            Some(segment) => {
                segment.end_time = Some(at);
                segment.status = status;
                true
            }
            None => false,
        }
    }

    /// Adds `quantum_ms` to the open segment and the running total.
    ///
    /// Returns `false` (and changes nothing) when no segment is open.
    pub fn advance(&mut self, quantum_ms: u64) -> bool {
        let Some(segment) = self.open_segment_mut() else {
            return false;
        };
        segment.duration = segment.duration.saturating_add(quantum_ms);
        self.total_elapsed = self.total_elapsed.saturating_add(quantum_ms);
        true
    }

    /// Milliseconds accounted for by the segment list itself.
    pub fn segment_total(&self) -> u64 {
        self.sessions.iter().map(|segment| segment.duration).sum()
    }

    pub fn open_segment_count(&self) -> usize {
        self.sessions.iter().filter(|segment| segment.is_open()).count()
    }

    /// Restores the accounting invariants on a record read from storage.
    ///
    /// Segments left open before the last one are closed at the start of their
    /// successor, and the total is recomputed from segment durations. A
    /// running session with nothing open is demoted to paused so it can be
    /// resumed. Returns `true` when anything changed.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;
        let last = self.sessions.len().saturating_sub(1);
        for index in 0..last {
            if self.sessions[index].end_time.is_none() {
                self.sessions[index].end_time = Some(self.sessions[index + 1].start_time);
                changed = true;
            }
        }
        if self.status == TimerStatus::Running && self.open_segment().is_none() {
            self.status = TimerStatus::Paused;
            changed = true;
        }
        let total = self.segment_total();
        if self.total_elapsed != total {
            self.total_elapsed = total;
            changed = true;
        }
        changed
    }

    /// Whether the accounting invariants hold: the total equals the sum of
    /// segment durations, and at most one segment is open.
    pub fn is_consistent(&self) -> bool {
        self.total_elapsed == self.segment_total() && self.open_segment_count() <= 1
    }
}

/// In-memory projection of a session with an active lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTimer {
    pub ticket_number: TicketId,
    pub ticket_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    pub is_running: bool,
    pub status: TimerStatus,
    /// Elapsed milliseconds of the current segment only.
    pub elapsed_time: u64,
    /// Mirror of the session total, for display.
    pub total_elapsed: u64,
}

impl TaskTimer {
    pub fn from_session(session: &TimerSession) -> Self {
        Self {
            ticket_number: session.ticket_number.clone(),
            ticket_name: session.ticket_name.clone(),
            story_points: session.story_points,
            is_running: session.status == TimerStatus::Running
                && session.open_segment().is_some(),
            status: session.status,
            elapsed_time: session.sessions.last().map_or(0, |segment| segment.duration),
            total_elapsed: session.total_elapsed,
        }
    }

    /// Whether the ticker should advance this timer.
    pub fn is_ticking(&self) -> bool {
        self.is_running && self.status == TimerStatus::Running
    }
}
