//! Ticket timer CLI library.
//!
//! This crate provides the CLI interface and the long-running timer service.

mod cli;
pub mod commands;
mod config;
pub mod service;
pub mod ticker;

pub use cli::{Cli, Commands, MetaArgs};
pub use config::Config;
