//! SDK Request/Response Types
//!
//! Mirrors the wire types of the agent protocol crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status as reported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    /// Result directory exists but carries no final status
    Unknown,
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
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to run a script
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteTestRequest {
    pub job_id: String,
    /// Newline separated commands
    pub command: String,
    pub enable_profiling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiling_config: Option<ProfilingConfig>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilingConfig {
    /// Tool names: cpu_sampler, mem_checker, call_graph (or perf, valgrind, gprof2dot)
    pub tools: Vec<String>,
}

impl ExecuteTestRequest {
    pub fn new(job_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            command: command.into(),
            enable_profiling: false,
            profiling_config: None,
        }
    }

    /// Enable profiling. An empty tool list lets the agent pick its default.
    pub fn with_profiling<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enable_profiling = true;
        let tools: Vec<String> = tools.into_iter().map(Into::into).collect();
        self.profiling_config = (!tools.is_empty()).then_some(ProfilingConfig { tools });
        self
    }
}

/// Acknowledgment of an accepted job
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteTestResponse {
    pub status: JobStatus,
    pub job_id: String,
    pub result_dir: String,
    pub timestamp: String,
    pub profiling_enabled: bool,
}

/// Response from get_logs
#[derive(Debug, Clone, Deserialize)]
pub struct GetLogsResponse {
    pub status: JobStatus,
    pub job_id: String,
    pub logs: Vec<String>,
}

/// Outcome of waiting for a job
#[derive(Debug, Clone)]
pub struct Completion {
    pub job_id: String,
    pub status: JobStatus,
    /// Full log in order
    pub logs: Vec<String>,
}

/// One status change pushed on a subscription
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub result_dir: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let plain = serde_json::to_value(ExecuteTestRequest::new("j", "true")).unwrap();
        assert_eq!(
            plain,
            serde_json::json!({"job_id": "j", "command": "true", "enable_profiling": false})
        );

        let profiled =
            serde_json::to_value(ExecuteTestRequest::new("j", "true").with_profiling(["perf"]))
                .unwrap();
        assert_eq!(profiled["enable_profiling"], true);
        assert_eq!(profiled["profiling_config"]["tools"], serde_json::json!(["perf"]));

        let defaulted = ExecuteTestRequest::new("j", "true").with_profiling(Vec::<String>::new());
        assert!(defaulted.enable_profiling);
        assert!(defaulted.profiling_config.is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Unknown.is_terminal());
        let parsed: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, JobStatus::Failed);
    }
}
