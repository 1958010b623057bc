use std::fmt;
use std::io;

use thiserror::Error;

/// Which snapshot measurement an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricField {
    Cpu,
    Memory,
    Disk,
    Processes,
    LoadAverage,
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricField::Cpu => "cpu",
            MetricField::Memory => "memory",
            MetricField::Disk => "disk",
            MetricField::Processes => "processes",
            MetricField::LoadAverage => "load average",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CollectionCause {
    #[error("failed to parse value: {0}")]
    Parse(String),

    #[error("system API error: {0}")]
    SystemApi(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// A single measurement could not be obtained. Carries the field it belongs
/// to so a degraded platform counter can be pinpointed from the log line.
#[derive(Debug, Error)]
#[error("failed to collect {field}: {cause}")]
pub struct CollectionError {
    pub field: MetricField,
    pub cause: CollectionCause,
}

impl CollectionError {
    pub fn parse(field: MetricField, reason: impl Into<String>) -> Self {
        Self {
            field,
            cause: CollectionCause::Parse(reason.into()),
        }
    }

    pub fn system_api(field: MetricField, reason: impl Into<String>) -> Self {
        Self {
            field,
            cause: CollectionCause::SystemApi(reason.into()),
        }
    }

    pub fn out_of_range(field: MetricField, reason: impl Into<String>) -> Self {
        Self {
            field,
            cause: CollectionCause::OutOfRange(reason.into()),
        }
    }
}

/// Two or more required measurements failed in one collection pass. Each
/// field was still attempted; all of the per-field errors are kept.
#[derive(Debug)]
pub struct PartialCollectionError {
    pub failures: Vec<CollectionError>,
}

impl PartialCollectionError {
    pub fn fields(&self) -> Vec<MetricField> {
        self.failures.iter().map(|failure| failure.field).collect()
    }
}

impl fmt::Display for PartialCollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incomplete collection:")?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, " {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialCollectionError {}

/// What a sampler returns when a reading cannot be produced.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Partial(#[from] PartialCollectionError),
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// Transient: the backend is down, unreachable, or timed out. Worth
    /// retrying within the same tick.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Permanent: the backend refused this record. Retrying cannot help.
    #[error("snapshot rejected by sink: {0}")]
    Rejected(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

/// The tick loop itself died. Fatal to the pipeline that owned it.
#[derive(Debug, Error)]
pub enum SchedulerFault {
    #[error("tick handler panicked: {0}")]
    TickPanicked(String),

    #[error("scheduler task was aborted before it could stop")]
    Aborted,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sampling interval must be non-zero")]
    ZeroInterval,

    #[error("scheduler fault: {0}")]
    Scheduler(#[from] SchedulerFault),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Invalid { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("collection failed: {0}")]
    Sample(#[from] SampleError),

    #[error("storage failed: {0}")]
    Sink(#[from] SinkError),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("configuration failed: {0}")]
    Config(#[from] ConfigError),
}
