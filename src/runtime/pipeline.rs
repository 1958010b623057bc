use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time;

use crate::features::sampler::Snapshot;
use crate::runtime::scheduler::{Scheduler, SchedulerHandle, TickHandler};
use crate::shared::error::{PipelineError, SinkError};
use crate::shared::traits::{Event, Sampler, SnapshotSink};

/// Retry policy for transient sink failures, applied within a single tick.
/// The delay doubles per attempt and is capped, so one bad tick can never
/// bleed into the next interval indefinitely.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying the given 1-based attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub interval: Duration,
    pub store_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Read-only run telemetry, republished after every tick. No tick outcome,
/// success or failure, goes unreflected here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub last_success_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_ticks: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
}

struct Worker<S> {
    sampler: S,
    sink: Arc<dyn SnapshotSink>,
    store_timeout: Duration,
    retry: RetryPolicy,
    status: PipelineStatus,
    status_tx: watch::Sender<PipelineStatus>,
    last_committed: Option<DateTime<Utc>>,
}

impl<S> Worker<S> {
    fn record_success(&mut self, committed_at: DateTime<Utc>) {
        self.status.last_success_time = Some(committed_at);
        self.status.consecutive_failures = 0;
        self.status.last_error = None;
    }

    fn record_failure(&mut self, message: String) {
        self.status.consecutive_failures += 1;
        self.status.total_failures += 1;
        self.status.last_error = Some(message);
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }

    async fn store_with_retry(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut attempt: u32 = 1;
        loop {
            let result = match time::timeout(self.store_timeout, self.sink.store(snapshot)).await {
                Ok(inner) => inner,
                Err(_) => Err(SinkError::Unavailable(format!(
                    "store timed out after {:?}",
                    self.store_timeout
                ))),
            };

            match result {
                Ok(()) => return Ok(()),
                // Permanent: the record itself was refused, retrying cannot help.
                Err(e @ SinkError::Rejected(_)) => return Err(e),
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(e);
                    }
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        "sink unavailable on attempt {}/{}, retrying in {:?}: {}",
                        attempt, self.retry.max_attempts, delay, e
                    );
                    time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S> TickHandler for Worker<S>
where
    S: Sampler,
{
    async fn tick(&mut self) {
        self.status.total_ticks += 1;

        match self.sampler.sample() {
            Ok(snapshot) => {
                debug!(
                    "tick {}: sampled {} ({:?})",
                    self.status.total_ticks,
                    snapshot.id,
                    snapshot.severity()
                );

                // Committed timestamps must be strictly increasing. The
                // sampler alone constructs snapshots, so a stale clock is
                // reported as a failed tick rather than re-stamped.
                if let Some(last) = self.last_committed {
                    if snapshot.timestamp <= last {
                        let message = format!(
                            "snapshot timestamp {} is not after last committed {}",
                            snapshot.timestamp, last
                        );
                        warn!("tick {}: {}", self.status.total_ticks, message);
                        self.record_failure(message);
                        self.publish();
                        return;
                    }
                }

                match self.store_with_retry(&snapshot).await {
                    Ok(()) => {
                        self.last_committed = Some(snapshot.timestamp);
                        self.record_success(snapshot.timestamp);
                        info!(
                            "stored snapshot {} (cpu {:.1}%, mem {:.1}%, disk {:.1}%)",
                            snapshot.id,
                            snapshot.cpu_usage_percent,
                            snapshot.memory_usage_percent,
                            snapshot.disk_usage_percent
                        );
                    }
                    Err(e) => {
                        error!("tick {}: giving up on store: {}", self.status.total_ticks, e);
                        self.record_failure(e.to_string());
                    }
                }
            }
            Err(e) => {
                warn!(
                    "tick {}: collection failed, skipping store: {}",
                    self.status.total_ticks, e
                );
                self.record_failure(e.to_string());
            }
        }

        self.publish();
    }
}

/// Composes Scheduler, Sampler, and Sink into the sample-then-store loop.
///
/// Collection and storage stay decoupled: a storage outage costs only that
/// tick's persistence, never the sampling cadence. A panicked tick kills the
/// loop task and surfaces as a `SchedulerFault` from `stop`.
pub struct Pipeline {
    handle: SchedulerHandle,
    status_rx: watch::Receiver<PipelineStatus>,
}

impl Pipeline {
    /// Spawns the tick loop; the first tick fires immediately.
    pub fn start<S>(
        settings: PipelineSettings,
        sampler: S,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Self, PipelineError>
    where
        S: Sampler + 'static,
    {
        if settings.interval.is_zero() {
            return Err(PipelineError::ZeroInterval);
        }

        let (status_tx, status_rx) = watch::channel(PipelineStatus::default());
        let worker = Worker {
            sampler,
            sink,
            store_timeout: settings.store_timeout,
            retry: settings.retry,
            status: PipelineStatus::default(),
            status_tx,
            last_committed: None,
        };
        let handle = Scheduler::new(settings.interval).spawn(worker);

        Ok(Self { handle, status_rx })
    }

    /// Latest published telemetry. Reads the watch channel's current value;
    /// never contends with the tick loop.
    pub fn status(&self) -> PipelineStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver an external health poller can hold on to; it observes
    /// every status republication without touching the pipeline.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status_rx.clone()
    }

    /// Stops the loop. The in-flight tick completes first; calling this
    /// again once stopped is a no-op.
    pub async fn stop(&mut self) -> Result<(), PipelineError> {
        self.handle.stop().await.map_err(PipelineError::from)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }
}
