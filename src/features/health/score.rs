use serde::{Deserialize, Serialize};

use crate::features::sampler::Snapshot;
use crate::shared::traits::Severity;

// Single authoritative weighting; headroom-style score where 100 is an idle
// host and 0 is a saturated one.
const CPU_WEIGHT: f64 = 0.40;
const MEMORY_WEIGHT: f64 = 0.35;
const DISK_WEIGHT: f64 = 0.25;

/// Aggregate health over a window of recent snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: f64,
    pub severity: Severity,
    pub samples: usize,
}

/// Scores a window of snapshots:
/// `score = 100 - (0.40 * avg_cpu + 0.35 * avg_mem + 0.25 * avg_disk)`.
///
/// Pure over its input; storage and scheduling never enter into it. Returns
/// `None` for an empty window rather than inventing a score.
pub fn health_score(snapshots: &[Snapshot]) -> Option<HealthReport> {
    if snapshots.is_empty() {
        return None;
    }

    let n = snapshots.len() as f64;
    let avg_cpu = snapshots.iter().map(|s| s.cpu_usage_percent).sum::<f64>() / n;
    let avg_memory = snapshots.iter().map(|s| s.memory_usage_percent).sum::<f64>() / n;
    let avg_disk = snapshots.iter().map(|s| s.disk_usage_percent).sum::<f64>() / n;

    let pressure = CPU_WEIGHT * avg_cpu + MEMORY_WEIGHT * avg_memory + DISK_WEIGHT * avg_disk;
    let score = (100.0 - pressure).clamp(0.0, 100.0);

    Some(HealthReport {
        score,
        severity: severity_for(score),
        samples: snapshots.len(),
    })
}

fn severity_for(score: f64) -> Severity {
    if score >= 75.0 {
        Severity::Low
    } else if score >= 50.0 {
        Severity::Medium
    } else if score >= 25.0 {
        Severity::High
    } else {
        Severity::Critical
    }
}
