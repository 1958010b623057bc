use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::sampler::Snapshot;
use crate::shared::error::{SampleError, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

pub trait Event {
    fn timestamp(&self) -> DateTime<Utc>;
    fn source(&self) -> &str;
    fn event_type(&self) -> &str;
    fn severity(&self) -> Severity;
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Produces one atomic reading of host resource state per call. A reading
/// either satisfies every `Snapshot` invariant or is not produced at all.
/// Samplers are driven from a spawned loop task, hence the thread bounds.
pub trait Sampler: Send + Sync {
    fn sample(&mut self) -> Result<Snapshot, SampleError>;
    fn health_check(&self) -> bool;
}

/// Durable destination for committed snapshots. Implementations must not
/// assume snapshots arrive in timestamp order.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn store(&self, snapshot: &Snapshot) -> Result<(), SinkError>;
    async fn health_check(&self) -> bool;
}
