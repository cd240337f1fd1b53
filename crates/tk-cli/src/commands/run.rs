//! Run command: the long-lived timer service.
//!
//! Reads one JSON message per line from stdin (user commands and background
//! events), ticks running timers, and writes an `activeCount` signal to stdout
//! whenever the number of running timers changes. Logs go to stderr.

use std::future::Future;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use tk_core::{SessionRepository, Signal};

use crate::Config;
use crate::service::TimerService;

use super::util::{acquire_lock, open_engine};

pub async fn run(config: &Config) -> Result<()> {
    let lock_path = config.lock_path();
    let _lock = acquire_lock(&lock_path)
        .with_context(|| format!("another `tk run` holds {}", lock_path.display()))?;

    let engine = open_engine(config)?;
    info!(
        database = %config.database_path.display(),
        active = engine.list_active().len(),
        running = engine.active_count(),
        "timer service started"
    );

    let mut service = TimerService::new(engine, config.tick_interval());
    service.start_ticker();

    let input = BufReader::new(tokio::io::stdin());
    let result = serve(&service, input, tokio::io::stdout(), interrupted()).await;

    let unsaved = service.shutdown();
    result?;
    if unsaved > 0 {
        bail!("{unsaved} session(s) could not be saved");
    }
    info!("timer service stopped");
    Ok(())
}

/// Pumps messages until the input closes or `shutdown` resolves.
///
/// Writes the current running count first, then one signal per change.
pub async fn serve<R, I, O, S>(
    service: &TimerService<R>,
    input: I,
    mut output: O,
    shutdown: S,
) -> Result<()>
where
    R: SessionRepository + Send + 'static,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut active = service.subscribe();
    let mut sent = *active.borrow_and_update();
    write_signal(&mut output, sent).await?;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            changed = active.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *active.borrow_and_update();
                if count != sent {
                    write_signal(&mut output, count).await?;
                    sent = count;
                }
            }
            () = &mut shutdown => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                match line.context("failed to read message")? {
                    Some(line) => {
                        service.handle_line(&line, Utc::now());
                    }
                    None => {
                        debug!("input closed");
                        break;
                    }
                }
            }
        }
    }

    output.flush().await?;
    Ok(())
}

async fn write_signal<O: AsyncWrite + Unpin>(output: &mut O, count: usize) -> Result<()> {
    let mut line = serde_json::to_vec(&Signal::ActiveCount { count })?;
    line.push(b'\n');
    output
        .write_all(&line)
        .await
        .context("failed to write signal")?;
    output.flush().await?;
    Ok(())
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
