// Port Layer - Interfaces for external dependencies

pub mod command_runner;
pub mod profiler;
pub mod status_notifier;
pub mod system_probe;
pub mod time_provider;

// Re-exports
pub use command_runner::{CommandOutcome, CommandRunner, ExecutionError, LogSink};
pub use profiler::{Profiler, ProfilingError};
pub use status_notifier::{NoopNotifier, NotifyError, StatusNotifier, StatusReport};
pub use system_probe::SystemProbe;
pub use time_provider::TimeProvider;
