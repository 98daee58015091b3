// Profiler Port
// Re-executes a command under each enabled profiling tool

use crate::domain::{CommandProfile, ProfilingTool};
use crate::port::command_runner::LogSink;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Failure of a single tool invocation. Never aborts the script.
#[derive(Error, Debug)]
pub enum ProfilingError {
    #[error("{tool} exited unsuccessfully during '{step}': {message}")]
    ToolFailed {
        tool: ProfilingTool,
        step: String,
        message: String,
    },

    #[error("{tool} could not be started: {message}")]
    SpawnFailed {
        tool: ProfilingTool,
        message: String,
    },

    #[error("{tool} produced no usable output: {message}")]
    InvalidOutput {
        tool: ProfilingTool,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Profiler trait
///
/// Implementations run each tool independently and only return the tools
/// that succeeded; failures are reported through `sink` and tracing.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Profile one command (script position `index`) into `profile_dir`
    async fn profile(
        &self,
        index: usize,
        command: &str,
        tools: &BTreeSet<ProfilingTool>,
        profile_dir: &Path,
        sink: &LogSink,
    ) -> CommandProfile;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{ArtifactKind, LogLine, LogStream, ProfilingArtifacts};
    use std::sync::Mutex;

    /// Mock profiler: writes one placeholder artifact per succeeding tool
    #[derive(Default)]
    pub struct MockProfiler {
        failing: BTreeSet<ProfilingTool>,
        calls: Mutex<Vec<(usize, String)>>,
    }

    impl MockProfiler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(mut self, tool: ProfilingTool) -> Self {
            self.failing.insert(tool);
            self
        }

        pub fn calls(&self) -> Vec<(usize, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Profiler for MockProfiler {
        async fn profile(
            &self,
            index: usize,
            command: &str,
            tools: &BTreeSet<ProfilingTool>,
            profile_dir: &Path,
            sink: &LogSink,
        ) -> CommandProfile {
            self.calls
                .lock()
                .unwrap()
                .push((index, command.to_string()));

            let mut profile = CommandProfile::new(command);
            for tool in tools {
                if self.failing.contains(tool) {
                    let _ = sink.send(LogLine::new(
                        LogStream::Profile,
                        format!("{} failed: mock failure", tool),
                    ));
                    continue;
                }
                let kind = match tool {
                    ProfilingTool::CpuSampler => ArtifactKind::Flamegraph,
                    ProfilingTool::MemChecker => ArtifactKind::LeakSummary,
                    ProfilingTool::CallGraph => ArtifactKind::CallgraphVisual,
                };
                let path = profile_dir.join(format!("{}_{}", index, kind.file_name()));
                let _ = std::fs::write(&path, b"mock");
                let mut artifacts = ProfilingArtifacts::new();
                artifacts.insert(kind, path);
                profile.tools.insert(*tool, artifacts);
            }
            profile
        }
    }
}
