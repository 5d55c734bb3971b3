//! Cooperative control loop
//!
//! Each relay runs one task on a single thread. Every iteration polls the
//! task once, then yields for a short fixed interval so the runtime can
//! service sockets and timers. No other task runs concurrently, so relay
//! state needs no locking.

use crate::link;
use crate::stats::RelayStats;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::info;

/// A relay role driven by the scheduler
#[async_trait]
pub trait PollTask: Send {
    /// Run one iteration. Must not block beyond the task's own bounded waits.
    ///
    /// An error is fatal for the process.
    async fn run_once(&mut self) -> Result<()>;

    fn stats(&self) -> &RelayStats;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    yield_interval: Duration,
    stats_interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(link::YIELD_INTERVAL_MS),
            Duration::from_secs(link::STATS_INTERVAL_SECS),
        )
    }
}

impl Scheduler {
    pub fn new(yield_interval: Duration, stats_interval: Duration) -> Self {
        Self {
            yield_interval,
            stats_interval,
        }
    }

    /// Drive `task` until `shutdown` resolves or an iteration fails
    ///
    /// A zero stats interval turns the periodic summary off.
    pub async fn run<T, F>(&self, task: &mut T, shutdown: F) -> Result<()>
    where
        T: PollTask + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut stats_ticker = if self.stats_interval.is_zero() {
            None
        } else {
            let mut ticker = interval(self.stats_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            Some(ticker)
        };

        info!("[{}] Control loop started", task.name());

        loop {
            task.run_once().await?;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("[{}] Shutdown requested: {}", task.name(), task.stats());
                    return Ok(());
                }
                _ = next_tick(&mut stats_ticker) => {
                    info!("[{}] {}", task.name(), task.stats());
                }
                _ = sleep(self.yield_interval) => {}
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
