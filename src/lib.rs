pub mod features;
pub mod runtime;
pub mod shared;

// Re-export commonly used items from features
pub use features::health::{health_score, HealthReport};
pub use features::sampler::{HostSampler, Snapshot, SnapshotBuilder};

// Re-export the runtime surface
pub use runtime::pipeline::{
    Pipeline,
    PipelineSettings,
    PipelineStatus,
    RetryPolicy,
};
pub use runtime::scheduler::{Scheduler, SchedulerHandle, TickHandler};

// Re-export shared functionality
pub use shared::config::{AgentConfig, RetryConfig, SinkBackend, SinkConfig};
pub use shared::error::{
    AgentError,
    CollectionCause,
    CollectionError,
    ConfigError,
    MetricField,
    PartialCollectionError,
    PipelineError,
    SampleError,
    SchedulerFault,
    SinkError,
};
pub use shared::storage::{ElasticsearchSink, MemorySink};
pub use shared::traits::{Event, Sampler, Severity, SnapshotSink, Validatable};
