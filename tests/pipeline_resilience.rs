use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use resmon::{
    CollectionError, MetricField, Pipeline, PipelineError, PipelineSettings, RetryPolicy,
    SampleError, Sampler, SchedulerFault, SinkError, Snapshot, SnapshotBuilder, SnapshotSink,
};
use tokio::time;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn snapshot_at(n: i64) -> Snapshot {
    SnapshotBuilder::new(
        format!("snap-{n}"),
        "test-host".to_string(),
        base_time() + chrono::Duration::seconds(n),
    )
    .cpu_usage_percent(45.5)
    .memory_usage_percent(60.0)
    .memory_total_mb(8000)
    .memory_used_mb(4800)
    .disk_usage_percent(70.0)
    .disk_total_gb(500)
    .disk_used_gb(350)
    .active_process_count(120)
    .load_average_1m(Some(1.2))
    .build()
    .unwrap()
}

/// Emits one valid snapshot per call, each stamped one second after the
/// previous. The wall clock is synthetic so assertions stay exact.
struct FixedSampler {
    ticks: i64,
}

impl FixedSampler {
    fn new() -> Self {
        Self { ticks: 0 }
    }
}

impl Sampler for FixedSampler {
    fn sample(&mut self) -> Result<Snapshot, SampleError> {
        let snapshot = snapshot_at(self.ticks);
        self.ticks += 1;
        Ok(snapshot)
    }

    fn health_check(&self) -> bool {
        true
    }
}

struct FailingSampler;

impl Sampler for FailingSampler {
    fn sample(&mut self) -> Result<Snapshot, SampleError> {
        Err(CollectionError::system_api(MetricField::Cpu, "cpu counters offline").into())
    }

    fn health_check(&self) -> bool {
        false
    }
}

struct StuckClockSampler;

impl Sampler for StuckClockSampler {
    fn sample(&mut self) -> Result<Snapshot, SampleError> {
        Ok(snapshot_at(0))
    }

    fn health_check(&self) -> bool {
        true
    }
}

struct PanickingSampler;

impl Sampler for PanickingSampler {
    fn sample(&mut self) -> Result<Snapshot, SampleError> {
        panic!("sampler exploded");
    }

    fn health_check(&self) -> bool {
        false
    }
}

/// Storage double driven by a queue of scripted outcomes. An exhausted
/// script means every further store succeeds.
#[derive(Default)]
struct ScriptedSink {
    script: Mutex<VecDeque<Result<(), SinkError>>>,
    stored: Mutex<Vec<Snapshot>>,
    attempts: AtomicU32,
}

impl ScriptedSink {
    fn with_script(script: Vec<Result<(), SinkError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn stored(&self) -> Vec<Snapshot> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSink for ScriptedSink {
    async fn store(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Err(e)) => Err(e),
            _ => {
                self.stored.lock().unwrap().push(snapshot.clone());
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Never resolves a store call. Exercises the per-attempt timeout.
struct HangingSink;

#[async_trait]
impl SnapshotSink for HangingSink {
    async fn store(&self, _snapshot: &Snapshot) -> Result<(), SinkError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn one_second_settings() -> PipelineSettings {
    PipelineSettings {
        interval: Duration::from_secs(1),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn snapshots_flow_from_sampler_to_sink_every_tick() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), FixedSampler::new(), sink.clone()).unwrap();

    time::sleep(Duration::from_millis(4_500)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 5);
    assert_eq!(status.total_failures, 0);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(
        status.last_success_time,
        Some(base_time() + chrono::Duration::seconds(4))
    );

    let stored = sink.stored();
    assert_eq!(stored.len(), 5);
    for pair in stored.windows(2) {
        assert!(pair[1].timestamp > pair[0].timestamp);
    }
}

#[tokio::test(start_paused = true)]
async fn transient_sink_failures_are_retried_within_the_tick() {
    let sink = ScriptedSink::with_script(vec![
        Err(SinkError::Unavailable("connection refused".into())),
        Err(SinkError::Unavailable("connection refused".into())),
    ]);
    let settings = PipelineSettings {
        interval: Duration::from_secs(60),
        ..Default::default()
    };
    let mut pipeline =
        Pipeline::start(settings, FixedSampler::new(), sink.clone()).unwrap();

    time::sleep(Duration::from_secs(2)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 1);
    assert_eq!(status.total_failures, 0);
    assert_eq!(sink.attempts(), 3);
    assert_eq!(sink.stored().len(), 1);
    assert_eq!(status.last_success_time, Some(base_time()));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_tick_and_the_next_tick_recovers() {
    let sink = ScriptedSink::with_script(vec![
        Err(SinkError::Unavailable("down".into())),
        Err(SinkError::Unavailable("down".into())),
        Err(SinkError::Unavailable("down".into())),
        Err(SinkError::Unavailable("down".into())),
    ]);
    let settings = PipelineSettings {
        interval: Duration::from_secs(2),
        ..Default::default()
    };
    let mut pipeline =
        Pipeline::start(settings, FixedSampler::new(), sink.clone()).unwrap();

    // first tick burned all three attempts; queried while the loop is idle
    time::sleep(Duration::from_secs(1)).await;
    let mid = pipeline.status();
    assert_eq!(mid.total_ticks, 1);
    assert_eq!(mid.total_failures, 1);
    assert_eq!(mid.consecutive_failures, 1);
    assert!(mid.last_success_time.is_none());
    assert!(mid
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("unavailable"));

    time::sleep(Duration::from_secs(2)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 2);
    assert_eq!(status.total_failures, 1);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(
        status.last_success_time,
        Some(base_time() + chrono::Duration::seconds(1))
    );
    assert!(status.last_error.is_none());
    assert_eq!(sink.attempts(), 5);

    let stored = sink.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "snap-1");
}

#[tokio::test(start_paused = true)]
async fn rejected_snapshot_is_not_retried() {
    let sink = ScriptedSink::with_script(vec![Err(SinkError::Rejected("schema mismatch".into()))]);
    let settings = PipelineSettings {
        interval: Duration::from_secs(60),
        ..Default::default()
    };
    let mut pipeline =
        Pipeline::start(settings, FixedSampler::new(), sink.clone()).unwrap();

    time::sleep(Duration::from_secs(1)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 1);
    assert_eq!(status.total_failures, 1);
    assert_eq!(sink.attempts(), 1);
    assert!(sink.stored().is_empty());
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("rejected"));
}

#[tokio::test(start_paused = true)]
async fn hung_store_times_out_as_unavailable() {
    let settings = PipelineSettings {
        interval: Duration::from_secs(60),
        store_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        },
    };
    let mut pipeline =
        Pipeline::start(settings, FixedSampler::new(), Arc::new(HangingSink)).unwrap();

    time::sleep(Duration::from_secs(3)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 1);
    assert_eq!(status.total_failures, 1);
    assert_eq!(status.consecutive_failures, 1);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn collection_failure_skips_the_sink_entirely() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), FailingSampler, sink.clone()).unwrap();

    time::sleep(Duration::from_millis(2_500)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 3);
    assert_eq!(status.total_failures, 3);
    assert_eq!(status.consecutive_failures, 3);
    assert!(status.last_success_time.is_none());
    assert_eq!(sink.attempts(), 0);
    assert!(sink.stored().is_empty());
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("cpu"));
}

#[tokio::test(start_paused = true)]
async fn stale_timestamp_is_reported_not_committed() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), StuckClockSampler, sink.clone()).unwrap();

    time::sleep(Duration::from_millis(2_500)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert_eq!(status.total_ticks, 3);
    assert_eq!(status.total_failures, 2);
    assert_eq!(status.consecutive_failures, 2);
    assert_eq!(status.last_success_time, Some(base_time()));
    assert_eq!(sink.stored().len(), 1);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("not after"));
}

#[tokio::test]
async fn zero_interval_is_refused() {
    let sink = ScriptedSink::with_script(Vec::new());
    let settings = PipelineSettings {
        interval: Duration::ZERO,
        ..Default::default()
    };
    match Pipeline::start(settings, FixedSampler::new(), sink.clone()) {
        Err(PipelineError::ZeroInterval) => {}
        Err(other) => panic!("expected a zero interval refusal, got {other}"),
        Ok(_) => panic!("a zero interval was accepted"),
    }
}

#[tokio::test(start_paused = true)]
async fn status_subscriber_observes_every_tick() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), FixedSampler::new(), sink.clone()).unwrap();

    let mut rx = pipeline.subscribe();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow().total_ticks);
            if seen.len() == 3 {
                break;
            }
        }
        seen
    });

    time::sleep(Duration::from_millis(2_500)).await;
    pipeline.stop().await.unwrap();

    let seen = observer.await.unwrap();
    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_the_final_status_persists() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), FixedSampler::new(), sink.clone()).unwrap();
    assert!(pipeline.is_running());

    time::sleep(Duration::from_millis(1_500)).await;
    pipeline.stop().await.unwrap();
    assert!(!pipeline.is_running());
    let after_first = pipeline.status();
    pipeline.stop().await.unwrap();
    let after_second = pipeline.status();

    assert_eq!(after_first.total_ticks, 2);
    assert_eq!(after_second.total_ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_sampler_surfaces_as_a_scheduler_fault() {
    let sink = ScriptedSink::with_script(Vec::new());
    let mut pipeline =
        Pipeline::start(one_second_settings(), PanickingSampler, sink.clone()).unwrap();

    time::sleep(Duration::from_millis(100)).await;
    assert!(!pipeline.is_running());
    let err = pipeline.stop().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Scheduler(SchedulerFault::TickPanicked(_))
    ));
}

// The loop task migrates across worker threads here, so this run only
// compiles and passes while sampler and worker state can cross threads.
// Real clock: the paused clock is a current-thread facility.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_runs_ticks_on_a_threaded_runtime() {
    let sink = ScriptedSink::with_script(Vec::new());
    let settings = PipelineSettings {
        interval: Duration::from_millis(20),
        ..Default::default()
    };
    let mut pipeline =
        Pipeline::start(settings, FixedSampler::new(), sink.clone()).unwrap();

    time::sleep(Duration::from_millis(150)).await;
    pipeline.stop().await.unwrap();

    let status = pipeline.status();
    assert!(status.total_ticks >= 2, "got {} ticks", status.total_ticks);
    assert_eq!(status.total_failures, 0);
    assert_eq!(sink.stored().len() as u64, status.total_ticks);
}
