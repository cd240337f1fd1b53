//! Periodic tick source.
//!
//! A ticker invokes its callback once per period on the tokio runtime. Late
//! ticks are delayed rather than bunched up, so a stalled process never
//! credits a burst of catch-up quanta at once.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Owns a running ticker task. Dropping the handle cancels the ticker.
#[derive(Debug)]
pub struct TickerHandle {
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Stops the ticker. No callback runs after this returns to the runtime.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a ticker whose first callback fires one full `period` from now.
///
/// Must be called from within a tokio runtime.
pub fn start<F>(period: Duration, mut on_tick: F) -> TickerHandle
where
    F: FnMut() + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            on_tick();
        }
    });
    TickerHandle { task }
}
