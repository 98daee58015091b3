// Job Registry - in-memory live state per job
//
// The only state shared between tasks. Every operation holds the lock for a
// short, non-awaiting critical section so readers never see a half-updated job.

use crate::domain::{
    DomainError, JobId, JobSnapshot, JobState, JobStatus, MetricSample, ProfilingManifest,
};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Result of a log poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPoll {
    /// Job still running: lines buffered since the previous poll
    Live { lines: Vec<String> },
    /// Job finished: the live channel is gone, read the persisted log instead
    Finished {
        status: JobStatus,
        result_dir: PathBuf,
    },
}

/// Concurrency-safe map from job id to live state
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobState>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobState>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly accepted job.
    ///
    /// A terminal entry with the same id is replaced; a running one is a conflict.
    pub fn register(&self, state: JobState) -> Result<()> {
        let mut jobs = self.lock();
        if let Some(existing) = jobs.get(&state.job_id) {
            if existing.is_running() {
                return Err(AppError::Conflict(format!(
                    "job {} is already running",
                    state.job_id
                )));
            }
        }
        info!(job_id = %state.job_id, result_dir = %state.result_dir.display(), "Job registered");
        jobs.insert(state.job_id.clone(), state);
        Ok(())
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.lock().get(job_id).map(|job| job.status)
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.status(job_id) == Some(JobStatus::Running)
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.lock().get(job_id).map(JobState::snapshot)
    }

    /// Append one line to the live log channel (worker only)
    pub fn append_log(&self, job_id: &str, line: String) {
        let mut jobs = self.lock();
        if let Some(channel) = jobs
            .get_mut(job_id)
            .filter(|job| job.is_running())
            .and_then(|job| job.log_channel.as_mut())
        {
            channel.push_back(line);
        }
    }

    /// Drain buffered lines of a running job, or discard the channel of a
    /// finished one. Each line is handed out exactly once.
    pub fn poll_logs(&self, job_id: &str) -> Option<LogPoll> {
        let mut jobs = self.lock();
        let job = jobs.get_mut(job_id)?;

        if job.is_running() {
            let lines = job
                .log_channel
                .as_mut()
                .map(|channel| channel.drain(..).collect())
                .unwrap_or_default();
            Some(LogPoll::Live { lines })
        } else {
            if job.log_channel.take().is_some() {
                debug!(job_id = %job_id, "Discarded live log channel of finished job");
            }
            Some(LogPoll::Finished {
                status: job.status,
                result_dir: job.result_dir.clone(),
            })
        }
    }

    /// Append one metric sample (sampler only). Returns false once the job is
    /// no longer running, which tells the sampler to stop.
    pub fn append_metric(&self, job_id: &str, sample: MetricSample) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(job_id) {
            Some(job) if job.is_running() => {
                job.metrics.push(sample);
                true
            }
            _ => false,
        }
    }

    /// Replace the profiling manifest (worker only, while running)
    pub fn set_manifest(&self, job_id: &str, manifest: ProfilingManifest) -> Result<()> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| DomainError::JobNotFound(job_id.to_string()))?;
        if !job.is_running() {
            return Err(DomainError::InvalidStatusTransition {
                from: job.status.to_string(),
                to: "manifest update".to_string(),
            }
            .into());
        }
        job.profiling_manifest = manifest;
        Ok(())
    }

    /// Move a job to its terminal status and return the frozen state
    pub fn finish(&self, job_id: &str, status: JobStatus, now: DateTime<Utc>) -> Result<JobSnapshot> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| DomainError::JobNotFound(job_id.to_string()))?;
        job.finish(status, now)?;
        info!(job_id = %job_id, status = %status, "Job reached terminal status");
        Ok(job.snapshot())
    }

    /// Evict terminal jobs that ended before `cutoff`. Returns the number removed.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, job| match job.end_time {
            Some(end) if !job.is_running() => end >= cutoff,
            _ => true,
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.lock().values().filter(|job| job.is_running()).count()
    }
}
