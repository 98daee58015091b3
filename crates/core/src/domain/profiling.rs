// Profiling tools and artifact manifest

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Profiling tools that can wrap a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingTool {
    /// `perf record -g` sampling profiler
    #[serde(alias = "perf")]
    CpuSampler,
    /// valgrind memcheck leak checker
    #[serde(alias = "valgrind", alias = "memcheck")]
    MemChecker,
    /// valgrind callgrind call-graph profiler
    #[serde(alias = "callgrind", alias = "callgraph")]
    CallGraph,
}

impl ProfilingTool {
    pub const ALL: [ProfilingTool; 3] = [
        ProfilingTool::CpuSampler,
        ProfilingTool::MemChecker,
        ProfilingTool::CallGraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilingTool::CpuSampler => "cpu_sampler",
            ProfilingTool::MemChecker => "mem_checker",
            ProfilingTool::CallGraph => "call_graph",
        }
    }
}

impl std::fmt::Display for ProfilingTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProfilingTool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cpu_sampler" | "perf" => Ok(ProfilingTool::CpuSampler),
            "mem_checker" | "valgrind" | "memcheck" => Ok(ProfilingTool::MemChecker),
            "call_graph" | "callgrind" | "callgraph" => Ok(ProfilingTool::CallGraph),
            other => Err(format!("unknown profiling tool '{}'", other)),
        }
    }
}

/// Kinds of files a profiling tool leaves behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Flamegraph,
    PerfReport,
    PerfAnnotate,
    ValgrindLog,
    LeakSummary,
    HeapVisual,
    CallgraphRaw,
    CallgraphVisual,
}

impl ArtifactKind {
    /// File name inside the profile directory (prefixed by the command index)
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Flamegraph => "flamegraph.svg",
            ArtifactKind::PerfReport => "perf_report.txt",
            ArtifactKind::PerfAnnotate => "perf_annotate.txt",
            ArtifactKind::ValgrindLog => "valgrind.log",
            ArtifactKind::LeakSummary => "leak_summary.txt",
            ArtifactKind::HeapVisual => "heap.svg",
            ArtifactKind::CallgraphRaw => "callgrind.out",
            ArtifactKind::CallgraphVisual => "callgraph.svg",
        }
    }
}

/// Artifacts produced by one tool run
pub type ProfilingArtifacts = BTreeMap<ArtifactKind, PathBuf>;

/// Manifest entry for one profiled command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandProfile {
    pub command: String,
    pub tools: BTreeMap<ProfilingTool, ProfilingArtifacts>,
}

impl CommandProfile {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            tools: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Command index (0-based script position) -> artifacts
pub type ProfilingManifest = BTreeMap<usize, CommandProfile>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_accept_aliases() {
        let tools: Vec<ProfilingTool> =
            serde_json::from_str(r#"["perf", "mem_checker", "callgrind"]"#).unwrap();
        assert_eq!(tools, ProfilingTool::ALL.to_vec());
        assert_eq!("valgrind".parse::<ProfilingTool>().unwrap(), ProfilingTool::MemChecker);
        assert!("strace".parse::<ProfilingTool>().is_err());
    }

    #[test]
    fn test_manifest_serializes_with_readable_keys() {
        let mut profile = CommandProfile::new("./bench");
        let mut artifacts = ProfilingArtifacts::new();
        artifacts.insert(ArtifactKind::Flamegraph, PathBuf::from("/r/profile/0_flamegraph.svg"));
        profile.tools.insert(ProfilingTool::CpuSampler, artifacts);

        let mut manifest = ProfilingManifest::new();
        manifest.insert(0, profile);

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json["0"]["tools"]["cpu_sampler"]["flamegraph"],
            "/r/profile/0_flamegraph.svg"
        );
        assert_eq!(json["0"]["command"], "./bench");
    }
}
