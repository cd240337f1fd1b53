use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tk_cli::commands::{action, export, import, reset, run, status};
use tk_cli::{Cli, Commands, Config, MetaArgs};
use tk_core::{TicketMeta, TimerAction};

fn meta(args: &MetaArgs) -> TicketMeta {
    TicketMeta::new(args.name.clone(), args.points)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support. Stdout carries command
    // output and `run` signals, so logs go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout();
    let lifecycle = |ticket: &str, action: TimerAction, out: &mut io::Stdout| {
        action::run(out, &config, ticket, action)
    };

    match &cli.command {
        Some(Commands::Start { ticket, meta: args }) => {
            lifecycle(ticket, TimerAction::Start(meta(args)), &mut stdout)?;
        }
        Some(Commands::Queue { ticket, meta: args }) => {
            lifecycle(ticket, TimerAction::Queue(meta(args)), &mut stdout)?;
        }
        Some(Commands::Pause { ticket }) => lifecycle(ticket, TimerAction::Pause, &mut stdout)?,
        Some(Commands::Resume { ticket }) => lifecycle(ticket, TimerAction::Resume, &mut stdout)?,
        Some(Commands::Hold { ticket }) => lifecycle(ticket, TimerAction::Hold, &mut stdout)?,
        Some(Commands::Complete { ticket }) => {
            lifecycle(ticket, TimerAction::Complete, &mut stdout)?;
        }
        Some(Commands::Stop { ticket }) => lifecycle(ticket, TimerAction::Stop, &mut stdout)?,
        Some(Commands::Delete {
            ticket,
            keep_record,
        }) => action::delete(&mut stdout, &config, ticket, *keep_record)?,
        Some(Commands::Rename { ticket, meta: args }) => {
            action::rename(&mut stdout, &config, ticket, &meta(args))?;
        }
        Some(Commands::Status { json }) => status::run(&mut stdout, &config, *json)?,
        Some(Commands::Export) => export::run(&mut stdout, &config)?,
        Some(Commands::Import) => {
            let imported = import::run(io::stdin().lock(), &config)?;
            tracing::info!(imported, "imported sessions");
            writeln!(stdout, "Imported {imported} session(s).")?;
        }
        Some(Commands::Reset { yes }) => reset::run(&mut stdout, &config, *yes)?,
        Some(Commands::Run) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(run::run(&config))?;
        }
        None => status::run(&mut stdout, &config, false)?,
    }

    Ok(())
}
