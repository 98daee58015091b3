// Memory checking via `valgrind --leak-check=full`
//
// Every valgrind line is prefixed with `==<pid>==`; the HEAP SUMMARY and
// LEAK SUMMARY blocks are collected per process.
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use perfagent_core::domain::{ArtifactKind, ProfilingArtifacts, ProfilingTool};
use perfagent_core::port::profiler::ProfilingError;

use super::{artifact_path, heap_svg, ProfilingOrchestrator};

const TOOL: ProfilingTool = ProfilingTool::MemChecker;

/// Heap and leak figures of one process, in bytes unless noted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMemory {
    pub pid: u32,
    pub in_use_at_exit: u64,
    pub in_use_blocks: u64,
    pub total_allocs: u64,
    pub total_frees: u64,
    pub total_allocated: u64,
    pub definitely_lost: u64,
    pub indirectly_lost: u64,
    pub possibly_lost: u64,
    pub still_reachable: u64,
    pub suppressed: u64,
}

impl ProcessMemory {
    /// Bytes allocated and released before exit
    pub fn freed(&self) -> u64 {
        self.total_allocated.saturating_sub(self.in_use_at_exit)
    }
}

pub(super) async fn mem_checker(
    orchestrator: &ProfilingOrchestrator,
    index: usize,
    command: &str,
    profile_dir: &Path,
) -> Result<ProfilingArtifacts, ProfilingError> {
    let log = artifact_path(profile_dir, index, ArtifactKind::ValgrindLog);

    let mut cmd = orchestrator.env.command(&orchestrator.bins.valgrind);
    cmd.arg("--leak-check=full")
        .arg("--trace-children=yes")
        .arg(format!("--log-file={}", log.display()))
        .args(["sh", "-c", command]);
    orchestrator.run_step(TOOL, "memcheck", cmd).await?;

    let content = tokio::fs::read_to_string(&log).await?;
    let processes = parse_memcheck_log(&content);
    if processes.is_empty() {
        return Err(ProfilingError::InvalidOutput {
            tool: TOOL,
            message: "no HEAP SUMMARY found in valgrind log".to_string(),
        });
    }

    let summary = artifact_path(profile_dir, index, ArtifactKind::LeakSummary);
    tokio::fs::write(&summary, render_summary(&processes)).await?;

    let heap = artifact_path(profile_dir, index, ArtifactKind::HeapVisual);
    tokio::fs::write(&heap, heap_svg::render(&processes)).await?;

    let mut artifacts = ProfilingArtifacts::new();
    artifacts.insert(ArtifactKind::ValgrindLog, log);
    artifacts.insert(ArtifactKind::LeakSummary, summary);
    artifacts.insert(ArtifactKind::HeapVisual, heap);
    Ok(artifacts)
}

/// `1,024` -> 1024
fn parse_count(token: &str) -> Option<u64> {
    token.trim_end_matches(',').replace(',', "").parse().ok()
}

/// Split `==123== text` into the pid and the trimmed text
fn split_pid(line: &str) -> Option<(u32, &str)> {
    let rest = line.strip_prefix("==")?;
    let end = rest.find("==")?;
    let pid = rest[..end].parse().ok()?;
    Some((pid, rest[end + 2..].trim()))
}

/// Parse a memcheck log into one entry per process that printed a HEAP SUMMARY
pub fn parse_memcheck_log(content: &str) -> Vec<ProcessMemory> {
    let mut processes: BTreeMap<u32, ProcessMemory> = BTreeMap::new();

    for (pid, text) in content.lines().filter_map(split_pid) {
        if text == "HEAP SUMMARY:" {
            processes.entry(pid).or_insert_with(|| ProcessMemory {
                pid,
                ..Default::default()
            });
            continue;
        }
        let Some(entry) = processes.get_mut(&pid) else {
            continue;
        };
        let Some((key, value)) = text.split_once(':') else {
            continue;
        };
        let tokens: Vec<&str> = value.split_whitespace().collect();
        let first = tokens.first().and_then(|t| parse_count(t)).unwrap_or(0);

        match key.trim() {
            "in use at exit" => {
                entry.in_use_at_exit = first;
                entry.in_use_blocks = tokens.get(3).and_then(|t| parse_count(t)).unwrap_or(0);
            }
            "total heap usage" => {
                entry.total_allocs = first;
                entry.total_frees = tokens.get(2).and_then(|t| parse_count(t)).unwrap_or(0);
                entry.total_allocated = tokens.get(4).and_then(|t| parse_count(t)).unwrap_or(0);
            }
            "definitely lost" => entry.definitely_lost = first,
            "indirectly lost" => entry.indirectly_lost = first,
            "possibly lost" => entry.possibly_lost = first,
            "still reachable" => entry.still_reachable = first,
            "suppressed" => entry.suppressed = first,
            _ => {}
        }
    }

    processes.into_values().collect()
}

/// Human readable leak summary
pub fn render_summary(processes: &[ProcessMemory]) -> String {
    let mut out = format!("Memory check summary ({} processes)\n", processes.len());
    for p in processes {
        let _ = write!(
            out,
            "\nPID {}\n  \
             in use at exit:   {} bytes in {} blocks\n  \
             total heap usage: {} allocs, {} frees, {} bytes allocated\n  \
             definitely lost:  {} bytes\n  \
             indirectly lost:  {} bytes\n  \
             possibly lost:    {} bytes\n  \
             still reachable:  {} bytes\n  \
             suppressed:       {} bytes\n",
            p.pid,
            p.in_use_at_exit,
            p.in_use_blocks,
            p.total_allocs,
            p.total_frees,
            p.total_allocated,
            p.definitely_lost,
            p.indirectly_lost,
            p.possibly_lost,
            p.still_reachable,
            p.suppressed,
        );
    }
    out
}
