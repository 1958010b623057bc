use chrono::{DateTime, Utc};
use log::{debug, warn};
use sysinfo::{Disks, System};
use uuid::Uuid;

use crate::features::sampler::models::{check_percent, Snapshot, SnapshotBuilder};
use crate::shared::error::{
    CollectionError, MetricField, PartialCollectionError, SampleError,
};
use crate::shared::traits::Sampler;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * 1024 * 1024;

/// Reads one `Snapshot` per call from the local host via `sysinfo`.
///
/// Every measurement sits behind its own accessor and all of them are
/// attempted on every call, so a broken counter degrades one field instead
/// of taking down the whole reading.
pub struct HostSampler {
    sys: System,
    hostname: String,
}

#[derive(Debug, Clone, Copy)]
struct MemoryReading {
    usage_percent: f64,
    total_mb: u64,
    used_mb: u64,
}

#[derive(Debug, Clone, Copy)]
struct DiskReading {
    usage_percent: f64,
    total_gb: u64,
    used_gb: u64,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_all();
        let hostname = whoami::hostname();
        Self { sys, hostname }
    }

    fn collect_cpu(&self) -> Result<f64, CollectionError> {
        if self.sys.cpus().is_empty() {
            return Err(CollectionError::system_api(
                MetricField::Cpu,
                "no CPU information available",
            ));
        }
        check_percent(MetricField::Cpu, f64::from(self.sys.global_cpu_usage()))
    }

    fn collect_memory(&self) -> Result<MemoryReading, CollectionError> {
        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        if total == 0 {
            return Err(CollectionError::system_api(
                MetricField::Memory,
                "total memory reported as zero",
            ));
        }
        if used > total {
            return Err(CollectionError::out_of_range(
                MetricField::Memory,
                format!("used {used} bytes exceeds total {total} bytes"),
            ));
        }
        let total_mb = total / MB;
        if total_mb == 0 {
            return Err(CollectionError::system_api(
                MetricField::Memory,
                "total memory below 1 MB",
            ));
        }
        let usage_percent = check_percent(MetricField::Memory, used as f64 / total as f64 * 100.0)?;
        Ok(MemoryReading {
            usage_percent,
            total_mb,
            used_mb: used / MB,
        })
    }

    fn collect_disk(&self) -> Result<DiskReading, CollectionError> {
        let disks = Disks::new_with_refreshed_list();
        let mut total: u64 = 0;
        let mut available: u64 = 0;
        for disk in disks.list() {
            total = total.saturating_add(disk.total_space());
            available = available.saturating_add(disk.available_space());
        }
        if total == 0 {
            return Err(CollectionError::system_api(
                MetricField::Disk,
                "no disks reported",
            ));
        }
        if available > total {
            return Err(CollectionError::out_of_range(
                MetricField::Disk,
                format!("available {available} bytes exceeds total {total} bytes"),
            ));
        }
        let total_gb = total / GB;
        if total_gb == 0 {
            return Err(CollectionError::system_api(
                MetricField::Disk,
                "total disk space below 1 GB",
            ));
        }
        let used = total - available;
        let usage_percent = check_percent(MetricField::Disk, used as f64 / total as f64 * 100.0)?;
        Ok(DiskReading {
            usage_percent,
            total_gb,
            used_gb: used / GB,
        })
    }

    fn collect_process_count(&self) -> Result<u32, CollectionError> {
        let count = self.sys.processes().len();
        if count == 0 {
            return Err(CollectionError::system_api(
                MetricField::Processes,
                "no processes visible",
            ));
        }
        u32::try_from(count).map_err(|_| {
            CollectionError::out_of_range(
                MetricField::Processes,
                format!("process count {count} exceeds u32"),
            )
        })
    }

    /// `sysinfo` reports zeros instead of an error where the platform has no
    /// load average, so Windows is mapped to absent rather than zero.
    fn collect_load_average(&self) -> Result<Option<f64>, CollectionError> {
        if cfg!(target_os = "windows") {
            return Ok(None);
        }
        let load = System::load_average();
        if !load.one.is_finite() {
            return Err(CollectionError::parse(
                MetricField::LoadAverage,
                format!("non-finite value {}", load.one),
            ));
        }
        if load.one < 0.0 {
            return Err(CollectionError::out_of_range(
                MetricField::LoadAverage,
                format!("{} is negative", load.one),
            ));
        }
        Ok(Some(load.one))
    }

    fn assemble(
        id: String,
        source: String,
        timestamp: DateTime<Utc>,
        cpu: Result<f64, CollectionError>,
        memory: Result<MemoryReading, CollectionError>,
        disk: Result<DiskReading, CollectionError>,
        processes: Result<u32, CollectionError>,
        load_average_1m: Option<f64>,
    ) -> Result<Snapshot, SampleError> {
        let mut builder =
            SnapshotBuilder::new(id, source, timestamp).load_average_1m(load_average_1m);
        let mut failures = Vec::new();

        match cpu {
            Ok(value) => builder = builder.cpu_usage_percent(value),
            Err(e) => failures.push(e),
        }
        match memory {
            Ok(reading) => {
                builder = builder
                    .memory_usage_percent(reading.usage_percent)
                    .memory_total_mb(reading.total_mb)
                    .memory_used_mb(reading.used_mb);
            }
            Err(e) => failures.push(e),
        }
        match disk {
            Ok(reading) => {
                builder = builder
                    .disk_usage_percent(reading.usage_percent)
                    .disk_total_gb(reading.total_gb)
                    .disk_used_gb(reading.used_gb);
            }
            Err(e) => failures.push(e),
        }
        match processes {
            Ok(count) => builder = builder.active_process_count(count),
            Err(e) => failures.push(e),
        }

        match failures.len() {
            0 => Ok(builder.build()?),
            1 => Err(SampleError::Collection(failures.remove(0))),
            _ => Err(SampleError::Partial(PartialCollectionError { failures })),
        }
    }
}

impl Sampler for HostSampler {
    fn sample(&mut self) -> Result<Snapshot, SampleError> {
        self.sys.refresh_all();

        let cpu = self.collect_cpu();
        let memory = self.collect_memory();
        let disk = self.collect_disk();
        let processes = self.collect_process_count();

        // Optional measurement: degrade to absent, never abort the reading.
        let load_average_1m = match self.collect_load_average() {
            Ok(value) => value,
            Err(e) => {
                warn!("load average unavailable, omitting: {}", e);
                None
            }
        };

        let snapshot = Self::assemble(
            Uuid::new_v4().to_string(),
            self.hostname.clone(),
            Utc::now(),
            cpu,
            memory,
            disk,
            processes,
            load_average_1m,
        )?;

        debug!(
            "host snapshot {}: cpu {:.1}%, mem {:.1}%, disk {:.1}%, {} processes",
            snapshot.id,
            snapshot.cpu_usage_percent,
            snapshot.memory_usage_percent,
            snapshot.disk_usage_percent,
            snapshot.active_process_count
        );
        Ok(snapshot)
    }

    fn health_check(&self) -> bool {
        !self.sys.cpus().is_empty()
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}
