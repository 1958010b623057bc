use std::cmp;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};

use crate::shared::error::SchedulerFault;

// Floor between the end of one tick and the start of the next, so a tick
// that overruns its interval cannot fire again back-to-back.
const MIN_TICK_GAP: Duration = Duration::from_millis(25);

/// The unit of work the scheduler drives once per interval.
#[async_trait]
pub trait TickHandler: Send {
    async fn tick(&mut self);
}

/// Fixed-interval driver for a `TickHandler`.
///
/// Deadlines are anchored to the start of the previous tick, not its
/// completion, so tick duration never accumulates as drift. Ticks are
/// strictly sequential: the next one is not scheduled until the current one
/// returns.
pub struct Scheduler {
    interval: Duration,
    min_gap: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            min_gap: MIN_TICK_GAP,
        }
    }

    pub fn with_min_gap(mut self, min_gap: Duration) -> Self {
        self.min_gap = min_gap;
        self
    }

    /// Spawns the tick loop. The first tick fires immediately.
    pub fn spawn<H>(self, mut handler: H) -> SchedulerHandle
    where
        H: TickHandler + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let min_gap = self.min_gap;

        let task = tokio::spawn(async move {
            let mut deadline = Instant::now();
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = time::sleep_until(deadline) => {}
                }

                let started = Instant::now();
                handler.tick().await;

                if *shutdown_rx.borrow() {
                    break;
                }
                deadline = cmp::max(started + interval, Instant::now() + min_gap);
            }
            debug!("scheduler loop exited");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Cancellation handle for a running scheduler loop. Dropping it without
/// calling `stop` also shuts the loop down at its next await point.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cooperative stop: no further ticks are scheduled, the in-flight tick
    /// runs to completion, and the loop task is joined before this returns.
    /// Calling it again after the loop has stopped is a no-op.
    pub async fn stop(&mut self) -> Result<(), SchedulerFault> {
        let _ = self.shutdown.send(true);
        match self.task.take() {
            Some(task) => task.await.map_err(fault_from_join),
            None => Ok(()),
        }
    }

    /// True while the loop task is still alive.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

fn fault_from_join(err: JoinError) -> SchedulerFault {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        SchedulerFault::TickPanicked(message)
    } else {
        SchedulerFault::Aborted
    }
}
