// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::metrics::MetricSample;
use crate::domain::profiling::{ProfilingManifest, ProfilingTool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;

/// Job ID (caller supplied, becomes part of the result directory name)
pub type JobId = String;

/// Maximum accepted job id length
pub const MAX_JOB_ID_LEN: usize = 128;

/// Job Status
///
/// The only legal transitions are `Running -> Success` and `Running -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as reported to readers. `Unknown` is only produced when a job is no
/// longer in memory and its status file has no terminal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedStatus {
    Running,
    Success,
    Failed,
    Unknown,
}

impl From<JobStatus> for ObservedStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => ObservedStatus::Running,
            JobStatus::Success => ObservedStatus::Success,
            JobStatus::Failed => ObservedStatus::Failed,
        }
    }
}

impl std::str::FromStr for ObservedStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "running" => Ok(ObservedStatus::Running),
            "success" => Ok(ObservedStatus::Success),
            "failed" => Ok(ObservedStatus::Failed),
            "unknown" => Ok(ObservedStatus::Unknown),
            other => Err(DomainError::ValidationError(format!(
                "unrecognized status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObservedStatus::Running => "running",
            ObservedStatus::Success => "success",
            ObservedStatus::Failed => "failed",
            ObservedStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A validated request to execute a script. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_id: JobId,
    pub script: Vec<String>,
    pub profiling_enabled: bool,
    pub profiling_tools: BTreeSet<ProfilingTool>,
}

impl JobRequest {
    /// Build a request from raw command text (newline separated).
    ///
    /// Blank lines are dropped, the remaining lines keep their order. When
    /// profiling is enabled without any tool, the CPU sampler is used.
    pub fn new(
        job_id: impl Into<String>,
        command: &str,
        profiling_enabled: bool,
        tools: impl IntoIterator<Item = ProfilingTool>,
    ) -> Result<Self> {
        let job_id = job_id.into();
        validate_job_id(&job_id)?;

        let script: Vec<String> = command
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if script.is_empty() {
            return Err(DomainError::ValidationError(
                "script contains no commands".to_string(),
            ));
        }

        let mut profiling_tools: BTreeSet<ProfilingTool> = tools.into_iter().collect();
        if !profiling_enabled {
            profiling_tools.clear();
        } else if profiling_tools.is_empty() {
            profiling_tools.insert(ProfilingTool::CpuSampler);
        }

        Ok(Self {
            job_id,
            script,
            profiling_enabled,
            profiling_tools,
        })
    }

    /// Full script text, one command per line
    pub fn script_text(&self) -> String {
        self.script.join("\n")
    }
}

/// Job ids end up in directory names, so only a conservative charset is allowed.
pub fn validate_job_id(job_id: &str) -> Result<()> {
    if job_id.is_empty() {
        return Err(DomainError::ValidationError(
            "job_id cannot be empty".to_string(),
        ));
    }
    if job_id.len() > MAX_JOB_ID_LEN {
        return Err(DomainError::ValidationError(format!(
            "job_id too long (max {} chars)",
            MAX_JOB_ID_LEN
        )));
    }
    if job_id == "." || job_id == ".." {
        return Err(DomainError::ValidationError(
            "job_id cannot be a relative path component".to_string(),
        ));
    }
    if !job_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(DomainError::ValidationError(
            "job_id must be alphanumeric with '-', '_' or '.'".to_string(),
        ));
    }
    Ok(())
}

/// Live state of a job, owned by the registry.
///
/// Field ownership: the worker writes status, end_time, log_channel and
/// profiling_manifest; the sampler writes metrics.
#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: JobId,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result_dir: PathBuf,
    pub profiling_enabled: bool,
    /// Pending log lines; `None` once the channel has been discarded
    pub log_channel: Option<VecDeque<String>>,
    pub metrics: Vec<MetricSample>,
    pub profiling_manifest: ProfilingManifest,
}

impl JobState {
    pub fn new(
        job_id: impl Into<String>,
        start_time: DateTime<Utc>,
        result_dir: PathBuf,
        profiling_enabled: bool,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Running,
            start_time,
            end_time: None,
            result_dir,
            profiling_enabled,
            log_channel: Some(VecDeque::new()),
            metrics: Vec::new(),
            profiling_manifest: ProfilingManifest::new(),
        }
    }

    /// Move to a terminal status. Fails on any transition other than
    /// running -> success / running -> failed.
    pub fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Running || !status.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.end_time = Some(now);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Read-only copy without the pending log lines
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            result_dir: self.result_dir.clone(),
            profiling_enabled: self.profiling_enabled,
            metrics: self.metrics.clone(),
            profiling_manifest: self.profiling_manifest.clone(),
        }
    }
}

/// Point-in-time copy of a job's state handed to readers (reporter, agent)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result_dir: PathBuf,
    pub profiling_enabled: bool,
    pub metrics: Vec<MetricSample>,
    pub profiling_manifest: ProfilingManifest,
}
