// Application Layer - Use Cases and Job Orchestration

pub mod broadcaster;
pub mod constants;
pub mod layout;
pub mod registry;
pub mod retention;
pub mod runner;
pub mod sampler;
pub mod service;
pub mod shutdown;

// Re-exports
pub use broadcaster::StatusBroadcaster;
pub use layout::JobLayout;
pub use registry::{JobRegistry, LogPoll};
pub use retention::RetentionSweeper;
pub use runner::JobRunner;
pub use sampler::ResourceSampler;
pub use service::{Accepted, JobService, LogsView};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
