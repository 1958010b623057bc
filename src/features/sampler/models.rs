use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::{CollectionError, MetricField};
use crate::shared::traits::{Event, Severity, Validatable};

/// One immutable point-in-time reading of host resource usage. Constructed
/// in a single step by a sampler and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub memory_total_mb: u64,
    pub memory_used_mb: u64,
    pub disk_usage_percent: f64,
    pub disk_total_gb: u64,
    pub disk_used_gb: u64,
    pub active_process_count: u32,
    pub load_average_1m: Option<f64>,
}

impl Snapshot {
    /// Checks every model invariant, attributing a violation to the field it
    /// belongs to. `SnapshotBuilder::build` and strict sinks both route
    /// through this.
    pub fn check_invariants(&self) -> Result<(), CollectionError> {
        check_percent(MetricField::Cpu, self.cpu_usage_percent)?;
        check_percent(MetricField::Memory, self.memory_usage_percent)?;
        check_percent(MetricField::Disk, self.disk_usage_percent)?;

        if self.memory_total_mb == 0 {
            return Err(CollectionError::out_of_range(
                MetricField::Memory,
                "memory_total_mb must be positive",
            ));
        }
        if self.memory_used_mb > self.memory_total_mb {
            return Err(CollectionError::out_of_range(
                MetricField::Memory,
                format!(
                    "memory_used_mb {} exceeds memory_total_mb {}",
                    self.memory_used_mb, self.memory_total_mb
                ),
            ));
        }

        if self.disk_total_gb == 0 {
            return Err(CollectionError::out_of_range(
                MetricField::Disk,
                "disk_total_gb must be positive",
            ));
        }
        if self.disk_used_gb > self.disk_total_gb {
            return Err(CollectionError::out_of_range(
                MetricField::Disk,
                format!(
                    "disk_used_gb {} exceeds disk_total_gb {}",
                    self.disk_used_gb, self.disk_total_gb
                ),
            ));
        }

        if let Some(load) = self.load_average_1m {
            if !load.is_finite() {
                return Err(CollectionError::parse(
                    MetricField::LoadAverage,
                    format!("non-finite value {load}"),
                ));
            }
            if load < 0.0 {
                return Err(CollectionError::out_of_range(
                    MetricField::LoadAverage,
                    format!("{load} is negative"),
                ));
            }
        }

        Ok(())
    }
}

/// Rejects non-finite and out-of-range percentages instead of clamping them;
/// a percentage above 100 means the instrumentation is wrong, and hiding
/// that would defeat the point of collecting it.
pub(crate) fn check_percent(field: MetricField, value: f64) -> Result<f64, CollectionError> {
    if !value.is_finite() {
        return Err(CollectionError::parse(
            field,
            format!("non-finite value {value}"),
        ));
    }
    if !(0.0..=100.0).contains(&value) {
        return Err(CollectionError::out_of_range(
            field,
            format!("{value} is outside 0..=100"),
        ));
    }
    Ok(value)
}

impl Event for Snapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn event_type(&self) -> &str {
        "resource_snapshot"
    }

    fn severity(&self) -> Severity {
        if self.cpu_usage_percent > 90.0
            || self.memory_usage_percent > 95.0
            || self.disk_usage_percent > 95.0
        {
            Severity::Critical
        } else if self.cpu_usage_percent > 75.0
            || self.memory_usage_percent > 85.0
            || self.disk_usage_percent > 90.0
        {
            Severity::High
        } else if self.cpu_usage_percent > 60.0
            || self.memory_usage_percent > 75.0
            || self.disk_usage_percent > 80.0
        {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Validatable for Snapshot {
    fn validate(&self) -> Result<(), String> {
        self.check_invariants().map_err(|e| e.to_string())
    }
}

/// Builder for `Snapshot`. Identity fields are required up front; each
/// measurement is set by the accessor that obtained it. `build` re-checks
/// every invariant so no invalid snapshot leaves this module.
pub struct SnapshotBuilder {
    id: String,
    source: String,
    timestamp: DateTime<Utc>,
    cpu_usage_percent: Option<f64>,
    memory_usage_percent: Option<f64>,
    memory_total_mb: Option<u64>,
    memory_used_mb: Option<u64>,
    disk_usage_percent: Option<f64>,
    disk_total_gb: Option<u64>,
    disk_used_gb: Option<u64>,
    active_process_count: Option<u32>,
    load_average_1m: Option<f64>,
}

impl SnapshotBuilder {
    pub fn new(id: String, source: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            source,
            timestamp,
            cpu_usage_percent: None,
            memory_usage_percent: None,
            memory_total_mb: None,
            memory_used_mb: None,
            disk_usage_percent: None,
            disk_total_gb: None,
            disk_used_gb: None,
            active_process_count: None,
            load_average_1m: None,
        }
    }

    pub fn cpu_usage_percent(mut self, value: f64) -> Self {
        self.cpu_usage_percent = Some(value);
        self
    }

    pub fn memory_usage_percent(mut self, value: f64) -> Self {
        self.memory_usage_percent = Some(value);
        self
    }

    pub fn memory_total_mb(mut self, value: u64) -> Self {
        self.memory_total_mb = Some(value);
        self
    }

    pub fn memory_used_mb(mut self, value: u64) -> Self {
        self.memory_used_mb = Some(value);
        self
    }

    pub fn disk_usage_percent(mut self, value: f64) -> Self {
        self.disk_usage_percent = Some(value);
        self
    }

    pub fn disk_total_gb(mut self, value: u64) -> Self {
        self.disk_total_gb = Some(value);
        self
    }

    pub fn disk_used_gb(mut self, value: u64) -> Self {
        self.disk_used_gb = Some(value);
        self
    }

    pub fn active_process_count(mut self, value: u32) -> Self {
        self.active_process_count = Some(value);
        self
    }

    pub fn load_average_1m(mut self, value: Option<f64>) -> Self {
        self.load_average_1m = value;
        self
    }

    pub fn build(self) -> Result<Snapshot, CollectionError> {
        let snapshot = Snapshot {
            id: self.id,
            source: self.source,
            timestamp: self.timestamp,
            cpu_usage_percent: require(self.cpu_usage_percent, MetricField::Cpu)?,
            memory_usage_percent: require(self.memory_usage_percent, MetricField::Memory)?,
            memory_total_mb: require(self.memory_total_mb, MetricField::Memory)?,
            memory_used_mb: require(self.memory_used_mb, MetricField::Memory)?,
            disk_usage_percent: require(self.disk_usage_percent, MetricField::Disk)?,
            disk_total_gb: require(self.disk_total_gb, MetricField::Disk)?,
            disk_used_gb: require(self.disk_used_gb, MetricField::Disk)?,
            active_process_count: require(self.active_process_count, MetricField::Processes)?,
            load_average_1m: self.load_average_1m,
        };

        snapshot.check_invariants()?;
        Ok(snapshot)
    }
}

fn require<T>(value: Option<T>, field: MetricField) -> Result<T, CollectionError> {
    value.ok_or_else(|| CollectionError::system_api(field, "measurement was not collected"))
}
