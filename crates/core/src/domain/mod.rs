// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod job;
pub mod log;
pub mod metrics;
pub mod profiling;

// Re-exports
pub use error::DomainError;
pub use event::JobEvent;
pub use job::{JobId, JobRequest, JobSnapshot, JobState, JobStatus, ObservedStatus};
pub use log::{LogLine, LogStream};
pub use metrics::{HostSnapshot, IoCounters, MetricSample};
pub use profiling::{
    ArtifactKind, CommandProfile, ProfilingArtifacts, ProfilingManifest, ProfilingTool,
};
