// Profiling Orchestrator
// Re-executes a succeeded command once per enabled tool and collects the
// artifacts each tool leaves in the profile directory.

mod callgraph;
mod heap_svg;
pub mod memcheck;
mod perf;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{info, warn};

use perfagent_core::domain::{
    ArtifactKind, CommandProfile, LogLine, LogStream, ProfilingArtifacts, ProfilingTool,
};
use perfagent_core::port::command_runner::LogSink;
use perfagent_core::port::profiler::{Profiler, ProfilingError};

use crate::process::ProcessEnv;

/// Maximum stderr characters kept in a tool failure message
const STDERR_TAIL_CHARS: usize = 400;

/// Executables used by the profiling tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingBinaries {
    pub perf: String,
    pub valgrind: String,
    pub stackcollapse: String,
    pub flamegraph: String,
    pub gprof2dot: String,
    pub dot: String,
}

impl Default for ProfilingBinaries {
    fn default() -> Self {
        Self {
            perf: "perf".to_string(),
            valgrind: "valgrind".to_string(),
            stackcollapse: "stackcollapse-perf.pl".to_string(),
            flamegraph: "flamegraph.pl".to_string(),
            gprof2dot: "gprof2dot".to_string(),
            dot: "dot".to_string(),
        }
    }
}

/// Profiler adapter driving perf, valgrind memcheck and callgrind
pub struct ProfilingOrchestrator {
    env: ProcessEnv,
    bins: ProfilingBinaries,
}

impl ProfilingOrchestrator {
    pub fn new(env: ProcessEnv, bins: ProfilingBinaries) -> Self {
        Self { env, bins }
    }

    async fn run_tool(
        &self,
        tool: ProfilingTool,
        index: usize,
        command: &str,
        profile_dir: &Path,
    ) -> Result<ProfilingArtifacts, ProfilingError> {
        match tool {
            ProfilingTool::CpuSampler => perf::cpu_sampler(self, index, command, profile_dir).await,
            ProfilingTool::MemChecker => memcheck::mem_checker(self, index, command, profile_dir).await,
            ProfilingTool::CallGraph => callgraph::call_graph(self, index, command, profile_dir).await,
        }
    }

    /// Run one step of a tool to completion; a non-zero exit is a failure
    async fn run_step(
        &self,
        tool: ProfilingTool,
        step: &str,
        mut cmd: Command,
    ) -> Result<Output, ProfilingError> {
        let output = cmd.output().await.map_err(|e| ProfilingError::SpawnFailed {
            tool,
            message: format!("{}: {}", step, e),
        })?;
        if !output.status.success() {
            return Err(ProfilingError::ToolFailed {
                tool,
                step: step.to_string(),
                message: stderr_tail(&output),
            });
        }
        Ok(output)
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    let tail: String = trimmed.chars().skip(skip).collect();
    if tail.is_empty() {
        format!("exit status {}", output.status)
    } else {
        tail
    }
}

/// `<profile_dir>/<index>_<file name>`
fn artifact_path(profile_dir: &Path, index: usize, kind: ArtifactKind) -> PathBuf {
    profile_dir.join(format!("{}_{}", index, kind.file_name()))
}

/// A step can exit 0 and still leave nothing behind (broken pipeline)
async fn ensure_non_empty(tool: ProfilingTool, path: &Path) -> Result<(), ProfilingError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(ProfilingError::InvalidOutput {
            tool,
            message: format!("{} is missing or empty", path.display()),
        }),
    }
}

#[async_trait]
impl Profiler for ProfilingOrchestrator {
    async fn profile(
        &self,
        index: usize,
        command: &str,
        tools: &BTreeSet<ProfilingTool>,
        profile_dir: &Path,
        sink: &LogSink,
    ) -> CommandProfile {
        let mut profile = CommandProfile::new(command);

        for tool in tools {
            let _ = sink.send(LogLine::new(
                LogStream::Profile,
                format!("Running {} on command {}", tool, index),
            ));
            match self.run_tool(*tool, index, command, profile_dir).await {
                Ok(artifacts) => {
                    info!(tool = %tool, index, artifacts = artifacts.len(), "Profiling tool finished");
                    let _ = sink.send(LogLine::new(
                        LogStream::Profile,
                        format!("{} finished: {} artifacts", tool, artifacts.len()),
                    ));
                    profile.tools.insert(*tool, artifacts);
                }
                Err(e) => {
                    warn!(tool = %tool, index, error = %e, "Profiling tool failed");
                    let _ = sink.send(LogLine::new(
                        LogStream::Profile,
                        format!("{} failed: {}", tool, e),
                    ));
                }
            }
        }

        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn missing_binaries() -> ProfilingBinaries {
        ProfilingBinaries {
            perf: "/nonexistent/perf".to_string(),
            valgrind: "/nonexistent/valgrind".to_string(),
            stackcollapse: "/nonexistent/stackcollapse-perf.pl".to_string(),
            flamegraph: "/nonexistent/flamegraph.pl".to_string(),
            gprof2dot: "/nonexistent/gprof2dot".to_string(),
            dot: "/nonexistent/dot".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tool_failures_never_abort_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = ProfilingOrchestrator::new(ProcessEnv::default(), missing_binaries());
        let (sink, mut rx) = mpsc::unbounded_channel();
        let tools: BTreeSet<ProfilingTool> = ProfilingTool::ALL.into_iter().collect();

        let profile = orchestrator
            .profile(0, "true", &tools, tmp.path(), &sink)
            .await;

        assert!(profile.is_empty());
        assert_eq!(profile.command, "true");

        let mut failures = Vec::new();
        while let Ok(line) = rx.try_recv() {
            if line.text.contains(" failed: ") {
                failures.push(line.text);
            }
        }
        assert_eq!(failures.len(), 3);
        assert!(failures[0].starts_with("cpu_sampler failed"));
        assert!(failures[2].starts_with("call_graph failed"));
    }

    #[test]
    fn test_artifact_paths_are_index_prefixed() {
        let dir = Path::new("/r/profile");
        assert_eq!(
            artifact_path(dir, 2, ArtifactKind::Flamegraph),
            PathBuf::from("/r/profile/2_flamegraph.svg")
        );
        assert_eq!(
            artifact_path(dir, 0, ArtifactKind::CallgraphRaw),
            PathBuf::from("/r/profile/0_callgrind.out")
        );
    }

    #[tokio::test]
    async fn test_run_step_reports_stderr() {
        let orchestrator = ProfilingOrchestrator::new(ProcessEnv::default(), missing_binaries());
        let err = orchestrator
            .run_step(
                ProfilingTool::CpuSampler,
                "record",
                ProcessEnv::default().shell("echo broken 1>&2; exit 2"),
            )
            .await
            .unwrap_err();
        match err {
            ProfilingError::ToolFailed { step, message, .. } => {
                assert_eq!(step, "record");
                assert_eq!(message, "broken");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
