//! The timer engine: in-memory timers backed by a [`SessionRepository`].
//!
//! The engine owns the cached sessions and their [`TaskTimer`] projections.
//! Every mutation goes through [`TimerEngine::apply`] (or [`TimerEngine::tick`]
//! for the periodic advance) and is persisted before returning. Nothing here
//! returns an error once the engine is open: illegal or duplicate actions are
//! ignored, and failed saves and deletes are logged and retried on the next
//! tick.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::BackgroundEvent;
use crate::reconcile::{IgnoreReason, TimerCommand, Transition, transition};
use crate::repository::SessionRepository;
use crate::session::{TaskTimer, TimerSession};
use crate::status::{TimerAction, TimerStatus};
use crate::types::{TicketId, TicketMeta};

/// Engine behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Keep completed and stopped timers in the active list until
    /// [`TimerEngine::clear_terminal`] is called.
    pub retain_terminal: bool,
}

/// What a single action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The action was applied and the session now has this status.
    Applied(TimerStatus),
    /// Nothing changed.
    Ignored(IgnoreReason),
}

impl Outcome {
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub struct TimerEngine<R: SessionRepository> {
    repo: R,
    sessions: HashMap<TicketId, TimerSession>,
    active: Vec<TaskTimer>,
    /// Tickets whose latest state has not reached the repository yet.
    unsaved: BTreeSet<TicketId>,
    /// Purged tickets whose stored record is still there.
    undeleted: BTreeSet<TicketId>,
    /// A reset whose repository clear has not succeeded yet.
    uncleared: bool,
    options: EngineOptions,
}

impl<R: SessionRepository> TimerEngine<R> {
    /// Loads every stored session and rebuilds the active timers.
    ///
    /// Sessions that were running when the previous process exited resume
    /// ticking from their last saved duration. Records that violate the
    /// accounting invariants are repaired and queued for saving.
    pub fn open(repo: R, options: EngineOptions) -> Result<Self, R::Error> {
        let mut sessions = repo.load()?;
        let mut unsaved = BTreeSet::new();
        for session in sessions.values_mut() {
            if session.repair() {
                warn!(ticket = %session.ticket_number, "repaired inconsistent timer session");
                unsaved.insert(session.ticket_number.clone());
            }
        }

        let mut active: Vec<TaskTimer> = sessions
            .values()
            .filter(|session| options.retain_terminal || !session.status.is_terminal())
            .map(TaskTimer::from_session)
            .collect();
        active.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));

        debug!(
            sessions = sessions.len(),
            active = active.len(),
            "loaded timer sessions"
        );

        Ok(Self {
            repo,
            sessions,
            active,
            unsaved,
            undeleted: BTreeSet::new(),
            uncleared: false,
            options,
        })
    }

    /// Timers with an active lifecycle. Timers loaded at open are sorted by
    /// ticket; later ones follow in the order they became active.
    pub fn list_active(&self) -> &[TaskTimer] {
        &self.active
    }

    pub fn timer(&self, ticket: &TicketId) -> Option<&TaskTimer> {
        self.active.iter().find(|timer| &timer.ticket_number == ticket)
    }

    /// The durable record for `ticket`, including terminal sessions.
    pub fn session(&self, ticket: &TicketId) -> Option<&TimerSession> {
        self.sessions.get(ticket)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &TimerSession> {
        self.sessions.values()
    }

    /// Number of timers currently accruing time.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|timer| timer.is_ticking()).count()
    }

    /// Number of repository writes still outstanding: failed saves, failed
    /// deletes, and a failed clear.
    pub fn unsaved_count(&self) -> usize {
        self.unsaved.len() + self.undeleted.len() + usize::from(self.uncleared)
    }

    /// Whether the latest change to `ticket` has yet to reach the repository.
    pub fn is_unsaved(&self, ticket: &TicketId) -> bool {
        self.uncleared || self.unsaved.contains(ticket) || self.undeleted.contains(ticket)
    }

    pub const fn repository(&self) -> &R {
        &self.repo
    }

    /// Applies a user action.
    pub fn dispatch(&mut self, ticket: TicketId, action: TimerAction, at: DateTime<Utc>) -> Outcome {
        self.apply(TimerCommand::user(ticket, action, at))
    }

    /// Applies an event relayed by the background process.
    ///
    /// Uses the same rules as [`dispatch`](Self::dispatch), so an echo of an
    /// action the user already performed is absorbed.
    pub fn reconcile_external(&mut self, event: BackgroundEvent, received_at: DateTime<Utc>) -> Outcome {
        self.apply(event.into_command(received_at))
    }

    pub fn apply(&mut self, command: TimerCommand) -> Outcome {
        match transition(self.sessions.get(&command.ticket), &command) {
            Transition::Ignored(reason) => {
                debug!(
                    ticket = %command.ticket,
                    action = %command.action,
                    source = %command.source,
                    ?reason,
                    "timer action ignored"
                );
                Outcome::Ignored(reason)
            }
            Transition::Next(session) => {
                debug!(
                    ticket = %command.ticket,
                    action = %command.action,
                    source = %command.source,
                    status = %session.status,
                    "timer action applied"
                );
                let status = session.status;
                // The save replaces whatever record a failed purge left behind.
                self.undeleted.remove(&session.ticket_number);
                persist(&mut self.repo, &mut self.unsaved, &session);
                self.project(&session);
                self.sessions.insert(session.ticket_number.clone(), session);
                Outcome::Applied(status)
            }
        }
    }

    /// Refreshes display metadata. Returns `false` for unknown tickets.
    pub fn rename(&mut self, ticket: &TicketId, meta: &TicketMeta) -> bool {
        let Some(session) = self.sessions.get_mut(ticket) else {
            return false;
        };
        session.apply_meta(meta);
        persist(&mut self.repo, &mut self.unsaved, session);
        if let Some(timer) = self
            .active
            .iter_mut()
            .find(|timer| &timer.ticket_number == ticket)
        {
            timer.ticket_name.clone_from(&session.ticket_name);
            timer.story_points = session.story_points;
        }
        true
    }

    /// Removes the timer from the active list and, when `purge_record` is set,
    /// deletes the stored session as well.
    ///
    /// A kept record is stopped at `at` so it cannot resume ticking after a
    /// restart, and a later `start` carries its total over. Returns `false`
    /// when the ticket is unknown.
    pub fn delete(&mut self, ticket: &TicketId, purge_record: bool, at: DateTime<Utc>) -> bool {
        let was_active = self.remove_timer(ticket);

        if !purge_record {
            let Some(session) = self.sessions.get_mut(ticket) else {
                return was_active;
            };
            if !session.status.is_terminal() {
                session.close_open_segment(at, TimerStatus::Stopped);
                session.status = TimerStatus::Stopped;
                persist(&mut self.repo, &mut self.unsaved, session);
            }
            return true;
        }

        let existed = self.sessions.remove(ticket).is_some();
        self.unsaved.remove(ticket);
        if existed {
            self.undeleted.insert(ticket.clone());
            self.delete_pending(ticket);
        }
        was_active || existed
    }

    /// Drops completed and stopped timers from the active list.
    pub fn clear_terminal(&mut self) -> usize {
        let before = self.active.len();
        self.active.retain(|timer| !timer.status.is_terminal());
        before - self.active.len()
    }

    /// Deletes every session, in memory and in the repository.
    ///
    /// Returns the number of sessions removed from memory. A failed clear is
    /// retried on the next tick or flush.
    pub fn reset(&mut self) -> usize {
        let removed = self.sessions.len();
        self.sessions.clear();
        self.active.clear();
        self.unsaved.clear();
        self.undeleted.clear();
        self.uncleared = true;
        self.clear_pending();
        removed
    }

    /// Advances every running timer by `quantum_ms` and saves it.
    ///
    /// Also retries saves that failed before this tick. Returns how many
    /// timers advanced.
    pub fn tick(&mut self, quantum_ms: u64) -> usize {
        self.retry_removals();
        let retry: Vec<TicketId> = self.unsaved.iter().cloned().collect();
        let mut advanced = Vec::new();

        for timer in self.active.iter_mut().filter(|timer| timer.is_ticking()) {
            let Some(session) = self.sessions.get_mut(&timer.ticket_number) else {
                continue;
            };
            if !session.advance(quantum_ms) {
                continue;
            }
            timer.elapsed_time = timer.elapsed_time.saturating_add(quantum_ms);
            timer.total_elapsed = session.total_elapsed;
            debug_assert!(session.is_consistent());
            persist(&mut self.repo, &mut self.unsaved, session);
            advanced.push(timer.ticket_number.clone());
        }

        for ticket in retry {
            if advanced.contains(&ticket) {
                continue;
            }
            self.save_pending(&ticket);
        }

        advanced.len()
    }

    /// Retries every outstanding repository write.
    /// Returns how many remain outstanding.
    pub fn flush(&mut self) -> usize {
        self.retry_removals();
        let pending: Vec<TicketId> = self.unsaved.iter().cloned().collect();
        for ticket in pending {
            self.save_pending(&ticket);
        }
        self.unsaved_count()
    }

    fn retry_removals(&mut self) {
        if self.uncleared {
            self.clear_pending();
        }
        let pending: Vec<TicketId> = self.undeleted.iter().cloned().collect();
        for ticket in pending {
            self.delete_pending(&ticket);
        }
    }

    fn clear_pending(&mut self) {
        match self.repo.clear() {
            Ok(()) => {
                self.uncleared = false;
                // Sessions created since the reset were wiped with the rest.
                self.unsaved.extend(self.sessions.keys().cloned());
            }
            Err(err) => {
                warn!(error = %err, "failed to clear timer sessions; retrying on next tick");
            }
        }
    }

    fn delete_pending(&mut self, ticket: &TicketId) {
        match self.repo.delete(ticket) {
            Ok(()) => {
                self.undeleted.remove(ticket);
            }
            Err(err) => {
                warn!(
                    ticket = %ticket,
                    error = %err,
                    "failed to delete timer session; retrying on next tick"
                );
            }
        }
    }

    fn save_pending(&mut self, ticket: &TicketId) {
        match self.sessions.get(ticket) {
            Some(session) => persist(&mut self.repo, &mut self.unsaved, session),
            None => {
                self.unsaved.remove(ticket);
            }
        }
    }

    /// Brings the active list in line with `session`.
    fn project(&mut self, session: &TimerSession) {
        let keep = self.options.retain_terminal || !session.status.is_terminal();
        let position = self
            .active
            .iter()
            .position(|timer| timer.ticket_number == session.ticket_number);
        match (position, keep) {
            (Some(index), true) => self.active[index] = TaskTimer::from_session(session),
            (Some(index), false) => {
                self.active.remove(index);
            }
            (None, true) => self.active.push(TaskTimer::from_session(session)),
            (None, false) => {}
        }
    }

    fn remove_timer(&mut self, ticket: &TicketId) -> bool {
        let before = self.active.len();
        self.active.retain(|timer| &timer.ticket_number != ticket);
        before != self.active.len()
    }
}

/// Saves `session`, remembering it for a later retry if the save fails.
fn persist<R: SessionRepository>(
    repo: &mut R,
    unsaved: &mut BTreeSet<TicketId>,
    session: &TimerSession,
) {
    match repo.save(session) {
        Ok(()) => {
            unsaved.remove(&session.ticket_number);
        }
        Err(err) => {
            warn!(
                ticket = %session.ticket_number,
                error = %err,
                "failed to save timer session; retrying on next tick"
            );
            unsaved.insert(session.ticket_number.clone());
        }
    }
}
