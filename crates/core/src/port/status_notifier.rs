// Status Notifier Port
// Delivers a job's terminal status to the control plane

use crate::domain::{JobId, JobSnapshot, JobStatus, MetricSample, ProfilingManifest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Terminal status report, built once per job
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub job_id: JobId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub metrics: Vec<MetricSample>,
    pub profiling_manifest: ProfilingManifest,
}

impl From<JobSnapshot> for StatusReport {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            job_id: snapshot.job_id,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            status: snapshot.status,
            metrics: snapshot.metrics,
            profiling_manifest: snapshot.profiling_manifest,
        }
    }
}

/// Callback delivery errors (logged only, never retried)
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Callback transport error: {0}")]
    Transport(String),

    #[error("Callback rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Deliver one report. Called exactly once per job.
    async fn notify(&self, report: &StatusReport) -> Result<(), NotifyError>;
}

/// Used when no callback endpoint is configured
pub struct NoopNotifier;

#[async_trait]
impl StatusNotifier for NoopNotifier {
    async fn notify(&self, report: &StatusReport) -> Result<(), NotifyError> {
        tracing::debug!(job_id = %report.job_id, "No callback configured, skipping status report");
        Ok(())
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every report; optionally fails delivery
    #[derive(Default)]
    pub struct RecordingNotifier {
        reports: Mutex<Vec<StatusReport>>,
        fail: bool,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                reports: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn reports(&self) -> Vec<StatusReport> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusNotifier for RecordingNotifier {
        async fn notify(&self, report: &StatusReport) -> Result<(), NotifyError> {
            self.reports.lock().unwrap().push(report.clone());
            if self.fail {
                return Err(NotifyError::Transport("mock callback down".to_string()));
            }
            Ok(())
        }
    }
}
