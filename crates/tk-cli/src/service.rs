//! The long-running timer service.
//!
//! Wraps a [`TimerEngine`] shared between the ticker and the message loop.
//! Every mutation republishes the running-timer count on a watch channel so
//! the loop can forward changes to the background process.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tk_core::{ControlCommand, Inbound, Outcome, SessionRepository, TimerEngine, UserCommand};

use crate::ticker::{self, TickerHandle};

/// Result of handling one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Action(Outcome),
    Deleted { found: bool },
    Cleared { removed: usize },
}

pub struct TimerService<R: SessionRepository> {
    engine: Arc<Mutex<TimerEngine<R>>>,
    active: Arc<watch::Sender<usize>>,
    period: Duration,
    ticker: Option<TickerHandle>,
}

impl<R> TimerService<R>
where
    R: SessionRepository + Send + 'static,
{
    pub fn new(engine: TimerEngine<R>, period: Duration) -> Self {
        let (active, _) = watch::channel(engine.active_count());
        Self {
            engine: Arc::new(Mutex::new(engine)),
            active: Arc::new(active),
            period,
            ticker: None,
        }
    }

    /// Receives the running-timer count whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.active.subscribe()
    }

    /// Runs `f` against the engine, then publishes the running count.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut TimerEngine<R>) -> T) -> T {
        with_engine(&self.engine, &self.active, f)
    }

    /// Starts ticking, replacing any ticker already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_ticker(&mut self) {
        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active);
        let quantum_ms = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX);

        self.ticker = Some(ticker::start(self.period, move || {
            with_engine(&engine, &active, |engine| engine.tick(quantum_ms));
        }));
        debug!(period = ?self.period, "ticker started");
    }

    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.cancel();
            debug!("ticker stopped");
        }
    }

    pub const fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Parses and applies one JSON line. Malformed lines are logged and skipped.
    pub fn handle_line(&self, line: &str, received_at: DateTime<Utc>) -> Option<Reply> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(inbound) => Some(self.handle(inbound, received_at)),
            Err(err) => {
                warn!(error = %err, line, "ignoring malformed message");
                None
            }
        }
    }

    pub fn handle(&self, inbound: Inbound, received_at: DateTime<Utc>) -> Reply {
        let ticket = inbound.ticket().cloned();
        let reply = self.with_engine(|engine| match inbound {
            Inbound::Control(ControlCommand::ClearFinished) => Reply::Cleared {
                removed: engine.clear_terminal(),
            },
            Inbound::Event(event) => Reply::Action(engine.reconcile_external(event, received_at)),
            Inbound::Command(UserCommand::Delete { ticket, purge }) => Reply::Deleted {
                found: engine.delete(&ticket, purge, received_at),
            },
            Inbound::Command(command) => match command.action() {
                Some(action) => {
                    Reply::Action(engine.dispatch(command.ticket().clone(), action, received_at))
                }
                None => Reply::Deleted { found: false },
            },
        });

        let ticket = ticket.as_ref().map(ToString::to_string).unwrap_or_default();
        match reply {
            Reply::Action(Outcome::Applied(status)) => info!(ticket = %ticket, %status, "timer updated"),
            Reply::Deleted { found: true } => info!(ticket = %ticket, "timer deleted"),
            Reply::Cleared { removed } => info!(removed, "finished timers cleared"),
            Reply::Action(Outcome::Ignored(_)) | Reply::Deleted { found: false } => {}
        }
        reply
    }

    /// Stops ticking and writes out anything still unsaved.
    ///
    /// Returns the number of sessions that could not be saved.
    pub fn shutdown(mut self) -> usize {
        self.stop_ticker();
        let unsaved = self.with_engine(TimerEngine::flush);
        if unsaved > 0 {
            warn!(unsaved, "sessions left unsaved at shutdown");
        }
        unsaved
    }
}

fn with_engine<R, T>(
    engine: &Mutex<TimerEngine<R>>,
    active: &watch::Sender<usize>,
    f: impl FnOnce(&mut TimerEngine<R>) -> T,
) -> T
where
    R: SessionRepository,
{
    let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
    let result = f(&mut guard);
    let count = guard.active_count();
    drop(guard);

    active.send_if_modified(|current| {
        if *current == count {
            false
        } else {
            *current = count;
            true
        }
    });
    result
}
