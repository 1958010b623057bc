mod collector;
mod models;

pub use collector::HostSampler;
pub use models::{Snapshot, SnapshotBuilder};
