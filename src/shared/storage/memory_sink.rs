use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::features::sampler::Snapshot;
use crate::shared::error::SinkError;
use crate::shared::traits::{SnapshotSink, Validatable};

/// Keeps snapshots in process memory. Backs local runs without an
/// Elasticsearch node and doubles as the storage double in tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<Snapshot>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshots(&self) -> Vec<Snapshot> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn store(&self, snapshot: &Snapshot) -> Result<(), SinkError> {
        snapshot.validate().map_err(SinkError::Rejected)?;

        let mut records = self.records.lock().await;
        records.push(snapshot.clone());
        debug!("memory sink holds {} snapshots", records.len());
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
