// Perf Agent Infrastructure - System Adapters
// Implements: CommandRunner, SystemProbe, Profiler

pub mod process;
pub mod profiling;
pub mod shell_executor;
pub mod system_probe_impl;

pub use process::{shell_quote, ProcessEnv};
pub use profiling::{ProfilingBinaries, ProfilingOrchestrator};
pub use shell_executor::ShellExecutor;
pub use system_probe_impl::SystemProbeImpl;
