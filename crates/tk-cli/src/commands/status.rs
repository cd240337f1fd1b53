//! Status command for showing active timers and stored sessions.

use std::io::Write;

use anyhow::Result;

use tk_core::{TaskTimer, TimerEngine};
use tk_db::Database;

use crate::Config;

use super::util::{format_duration, open_engine};

pub fn run<W: Write>(writer: &mut W, config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, engine.list_active())?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "Ticket timers")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    write_active(writer, engine.list_active())?;
    write_sessions(writer, &engine)?;
    Ok(())
}

fn write_active<W: Write>(writer: &mut W, timers: &[TaskTimer]) -> Result<()> {
    if timers.is_empty() {
        writeln!(writer, "No active timers.")?;
        return Ok(());
    }

    writeln!(writer, "Active:")?;
    for timer in timers {
        let points = timer
            .story_points
            .map(|points| format!(" [{points} pts]"))
            .unwrap_or_default();
        writeln!(
            writer,
            "- {} ({}){points}: {} {} (total {})",
            timer.ticket_number,
            timer.ticket_name,
            timer.status,
            format_duration(timer.elapsed_time),
            format_duration(timer.total_elapsed),
        )?;
    }
    Ok(())
}

fn write_sessions<W: Write>(writer: &mut W, engine: &TimerEngine<Database>) -> Result<()> {
    let mut summaries = engine.repository().list_summaries()?;
    if summaries.is_empty() {
        return Ok(());
    }
    summaries.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));

    writeln!(writer, "Sessions:")?;
    for summary in summaries {
        writeln!(
            writer,
            "- {}: {}, {} across {} segment(s)",
            summary.ticket_number,
            summary.status,
            format_duration(summary.total_elapsed_ms),
            summary.segment_count,
        )?;
    }
    Ok(())
}
