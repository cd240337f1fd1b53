//! CLI subcommand implementations.

pub mod action;
pub mod export;
pub mod import;
pub mod reset;
pub mod run;
pub mod status;
pub mod util;
