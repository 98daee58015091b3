// CPU sampling via `perf record -g`
use std::path::Path;

use perfagent_core::domain::{ArtifactKind, ProfilingArtifacts, ProfilingTool};
use perfagent_core::port::profiler::ProfilingError;

use super::{artifact_path, ensure_non_empty, ProfilingOrchestrator};
use crate::process::shell_quote;

const TOOL: ProfilingTool = ProfilingTool::CpuSampler;

/// Record the command, then derive a flame graph, a report and an annotated
/// listing from the same perf.data
pub(super) async fn cpu_sampler(
    orchestrator: &ProfilingOrchestrator,
    index: usize,
    command: &str,
    profile_dir: &Path,
) -> Result<ProfilingArtifacts, ProfilingError> {
    let bins = &orchestrator.bins;
    let data = profile_dir.join(format!("{}_perf.data", index));
    let data_arg = data.to_string_lossy().to_string();

    let mut record = orchestrator.env.command(&bins.perf);
    record.args(["record", "-g", "-o", data_arg.as_str(), "--", "sh", "-c", command]);
    orchestrator.run_step(TOOL, "record", record).await?;

    let result = derive_artifacts(orchestrator, index, &data_arg, profile_dir).await;
    let _ = tokio::fs::remove_file(&data).await;
    result
}

async fn derive_artifacts(
    orchestrator: &ProfilingOrchestrator,
    index: usize,
    data: &str,
    profile_dir: &Path,
) -> Result<ProfilingArtifacts, ProfilingError> {
    let bins = &orchestrator.bins;
    let mut artifacts = ProfilingArtifacts::new();

    let flamegraph = artifact_path(profile_dir, index, ArtifactKind::Flamegraph);
    let pipeline = format!(
        "{} script -i {} | {} | {} > {}",
        shell_quote(&bins.perf),
        shell_quote(data),
        shell_quote(&bins.stackcollapse),
        shell_quote(&bins.flamegraph),
        shell_quote(&flamegraph.to_string_lossy()),
    );
    orchestrator
        .run_step(TOOL, "flamegraph", orchestrator.env.shell(&pipeline))
        .await?;
    ensure_non_empty(TOOL, &flamegraph).await?;
    artifacts.insert(ArtifactKind::Flamegraph, flamegraph);

    for (kind, step) in [
        (ArtifactKind::PerfReport, "report"),
        (ArtifactKind::PerfAnnotate, "annotate"),
    ] {
        let mut cmd = orchestrator.env.command(&bins.perf);
        cmd.args([step, "-i", data, "--stdio"]);
        let output = orchestrator.run_step(TOOL, step, cmd).await?;

        let path = artifact_path(profile_dir, index, kind);
        tokio::fs::write(&path, &output.stdout).await?;
        artifacts.insert(kind, path);
    }

    Ok(artifacts)
}
