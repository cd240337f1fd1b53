//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Per-ticket work timers.
///
/// Tracks time spent on tickets as a history of running and paused segments,
/// persisted to a local database.
#[derive(Debug, Parser)]
#[command(name = "tk", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Ticket metadata supplied when starting or renaming.
#[derive(Debug, Clone, Args)]
pub struct MetaArgs {
    /// Human-readable ticket name.
    #[arg(long)]
    pub name: Option<String>,

    /// Story point estimate.
    #[arg(long)]
    pub points: Option<f64>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start (or restart) the timer for a ticket.
    Start {
        ticket: String,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Queue a ticket without counting time.
    Queue {
        ticket: String,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Pause a running timer.
    Pause { ticket: String },

    /// Resume a paused or held timer.
    Resume { ticket: String },

    /// Put a timer on hold.
    Hold { ticket: String },

    /// Mark a ticket as completed.
    Complete { ticket: String },

    /// Stop a timer.
    Stop { ticket: String },

    /// Remove a ticket's timer.
    Delete {
        ticket: String,

        /// Stop the timer but keep its history in the database.
        #[arg(long)]
        keep_record: bool,
    },

    /// Update a ticket's name or story points.
    Rename {
        ticket: String,
        #[command(flatten)]
        meta: MetaArgs,
    },

    /// Show active timers and stored sessions.
    Status {
        /// Output active timers as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export all sessions as JSON to stdout.
    Export,

    /// Import sessions from a JSON export on stdin.
    Import,

    /// Delete every stored session.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Run the timer service, reading JSON-lines messages from stdin.
    Run,
}
