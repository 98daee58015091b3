// Call-graph profiling via `valgrind --tool=callgrind`
use std::path::{Path, PathBuf};

use perfagent_core::domain::{ArtifactKind, ProfilingArtifacts, ProfilingTool};
use perfagent_core::port::profiler::ProfilingError;

use super::{artifact_path, ensure_non_empty, ProfilingOrchestrator};
use crate::process::shell_quote;

const TOOL: ProfilingTool = ProfilingTool::CallGraph;

pub(super) async fn call_graph(
    orchestrator: &ProfilingOrchestrator,
    index: usize,
    command: &str,
    profile_dir: &Path,
) -> Result<ProfilingArtifacts, ProfilingError> {
    let bins = &orchestrator.bins;
    let raw = artifact_path(profile_dir, index, ArtifactKind::CallgraphRaw);

    // one output file per traced process, `%p` expands to the pid
    let per_process = format!("{}.%p", raw.display());
    let mut cmd = orchestrator.env.command(&bins.valgrind);
    cmd.arg("--tool=callgrind")
        .arg("--trace-children=yes")
        .arg(format!("--callgrind-out-file={}", per_process))
        .args(["sh", "-c", command]);
    orchestrator.run_step(TOOL, "callgrind", cmd).await?;

    keep_largest_output(&raw).await?;

    let svg = artifact_path(profile_dir, index, ArtifactKind::CallgraphVisual);
    let pipeline = format!(
        "{} -f callgrind {} | {} -Tsvg -o {}",
        shell_quote(&bins.gprof2dot),
        shell_quote(&raw.to_string_lossy()),
        shell_quote(&bins.dot),
        shell_quote(&svg.to_string_lossy()),
    );
    orchestrator
        .run_step(TOOL, "render", orchestrator.env.shell(&pipeline))
        .await?;
    ensure_non_empty(TOOL, &svg).await?;

    let mut artifacts = ProfilingArtifacts::new();
    artifacts.insert(ArtifactKind::CallgraphRaw, raw);
    artifacts.insert(ArtifactKind::CallgraphVisual, svg);
    Ok(artifacts)
}

/// Keep the biggest `<raw>.<pid>` file as `<raw>` and delete the others.
/// The wrapping shell produces a tiny profile; the profiled program the largest.
async fn keep_largest_output(raw: &Path) -> Result<(), ProfilingError> {
    let dir = raw.parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        "{}.",
        raw.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    );

    let mut candidates: Vec<(u64, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_pid_suffix = name
            .strip_prefix(&prefix)
            .is_some_and(|pid| !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit()));
        if is_pid_suffix {
            candidates.push((entry.metadata().await?.len(), entry.path()));
        }
    }

    candidates.sort();
    let Some((_, largest)) = candidates.pop() else {
        return Err(ProfilingError::InvalidOutput {
            tool: TOOL,
            message: "callgrind wrote no output file".to_string(),
        });
    };
    for (_, path) in candidates {
        let _ = tokio::fs::remove_file(path).await;
    }
    tokio::fs::rename(&largest, raw).await?;
    Ok(())
}
