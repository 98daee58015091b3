// Job status events (published to subscribers)

use crate::domain::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result_dir: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(
        job_id: impl Into<String>,
        status: JobStatus,
        result_dir: PathBuf,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            result_dir,
            timestamp,
        }
    }
}
