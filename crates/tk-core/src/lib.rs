//! Core timer logic for ticket time tracking.
//!
//! This crate contains the fundamental types and logic for:
//! - Sessions: per-ticket segment history with an exact running total
//! - Reconciliation: folding user commands and background events into sessions
//! - The engine: active timers, ticking, and persistence through a repository

pub mod engine;
pub mod protocol;
pub mod reconcile;
pub mod repository;
pub mod session;
pub mod status;
pub mod types;

pub use engine::{EngineOptions, Outcome, TimerEngine};
pub use protocol::{BackgroundEvent, ControlCommand, Inbound, Signal, UserCommand};
pub use reconcile::{IgnoreReason, TimerCommand, Transition, transition};
pub use repository::{MemoryRepository, MemoryRepositoryError, SessionRepository};
pub use session::{Segment, TaskTimer, TimerSession};
pub use status::{ActionSource, TimerAction, TimerStatus};
pub use types::{TicketId, TicketMeta, ValidationError};
