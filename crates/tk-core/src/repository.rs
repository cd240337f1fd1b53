//! The durability boundary for timer sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::session::TimerSession;
use crate::types::TicketId;

/// Keyed snapshot storage for [`TimerSession`]s.
///
/// `save` is last-writer-wins per ticket and is called after every state
/// change and on every tick of a running timer, so implementations should
/// make a single save cheap.
pub trait SessionRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads every stored session.
    fn load(&self) -> Result<HashMap<TicketId, TimerSession>, Self::Error>;

    /// Stores `session`, replacing any previous record for its ticket.
    fn save(&mut self, session: &TimerSession) -> Result<(), Self::Error>;

    /// Removes the record for `ticket`. Removing a missing record is not an error.
    fn delete(&mut self, ticket: &TicketId) -> Result<(), Self::Error>;

    /// Removes every record.
    fn clear(&mut self) -> Result<(), Self::Error>;
}

/// Errors from [`MemoryRepository`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryRepositoryError {
    /// Writes were switched off with [`MemoryRepository::set_unavailable`].
    #[error("session store unavailable")]
    Unavailable,
}

/// In-memory [`SessionRepository`].
///
/// Clones share the same storage, so a test can drop an engine and reopen
/// another one over the same records to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    records: Arc<Mutex<HashMap<TicketId, TimerSession>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The stored record for `ticket`, as last saved.
    pub fn get(&self, ticket: &TicketId) -> Option<TimerSession> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ticket)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), MemoryRepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MemoryRepositoryError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl SessionRepository for MemoryRepository {
    type Error = MemoryRepositoryError;

    fn load(&self) -> Result<HashMap<TicketId, TimerSession>, Self::Error> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&mut self, session: &TimerSession) -> Result<(), Self::Error> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.ticket_number.clone(), session.clone());
        Ok(())
    }

    fn delete(&mut self, ticket: &TicketId) -> Result<(), Self::Error> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ticket);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
