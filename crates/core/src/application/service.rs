// Job Service - use cases behind the agent's actions
//
// execute_test -> submit, get_logs -> logs, subscribe -> subscribe

use crate::application::constants::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::application::layout::JobLayout;
use crate::application::registry::{JobRegistry, LogPoll};
use crate::application::runner::JobRunner;
use crate::domain::job::validate_job_id;
use crate::domain::{JobEvent, JobId, JobRequest, JobState, JobStatus, ObservedStatus};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

/// Acknowledgment returned as soon as a job is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub job_id: JobId,
    pub result_dir: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub profiling_enabled: bool,
}

/// Log lines returned by a log query together with the job status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsView {
    pub job_id: JobId,
    pub status: ObservedStatus,
    pub lines: Vec<String>,
}

pub struct JobService {
    runner: Arc<JobRunner>,
    registry: Arc<JobRegistry>,
    results_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl JobService {
    pub fn new(runner: JobRunner, results_dir: impl Into<PathBuf>) -> Self {
        Self::with_max_concurrent_jobs(runner, results_dir, DEFAULT_MAX_CONCURRENT_JOBS)
    }

    pub fn with_max_concurrent_jobs(
        runner: JobRunner,
        results_dir: impl Into<PathBuf>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let registry = runner.registry().clone();
        Self {
            runner: Arc::new(runner),
            registry,
            results_dir: results_dir.into(),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Accept a job: create its result directory, register it as running and
    /// hand it to a worker task. Returns without waiting for execution.
    ///
    /// # Errors
    /// - AppError::Conflict if a job with the same id is still running
    /// - AppError::Io if the result directory cannot be created
    pub async fn submit(&self, request: JobRequest) -> Result<Accepted> {
        if self.registry.is_running(&request.job_id) {
            return Err(AppError::Conflict(format!(
                "job {} is already running",
                request.job_id
            )));
        }

        let start = self.runner.time_provider().now();
        let layout = JobLayout::create(&self.results_dir, &request.job_id, start).await?;
        layout.write_status_header(&request, start).await?;

        self.registry.register(JobState::new(
            request.job_id.clone(),
            start,
            layout.root().to_path_buf(),
            request.profiling_enabled,
        ))?;

        self.runner.broadcaster().publish(&JobEvent::new(
            request.job_id.clone(),
            JobStatus::Running,
            layout.root().to_path_buf(),
            start,
        ));

        let accepted = Accepted {
            job_id: request.job_id.clone(),
            result_dir: layout.root().to_path_buf(),
            timestamp: start,
            profiling_enabled: request.profiling_enabled,
        };

        info!(
            job_id = %accepted.job_id,
            result_dir = %accepted.result_dir.display(),
            available_permits = self.permits.available_permits(),
            "Job accepted"
        );

        self.spawn_worker(request, layout);
        Ok(accepted)
    }

    /// Outer task waits for a permit, inner task runs the job. A panic in the
    /// inner task surfaces as a JoinError and the job is failed explicitly.
    fn spawn_worker(&self, request: JobRequest, layout: JobLayout) {
        let runner = self.runner.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            let job_id = request.job_id.clone();
            debug!(job_id = %job_id, "Worker permit acquired");

            let worker = {
                let runner = runner.clone();
                let layout = layout.clone();
                tokio::spawn(async move { runner.run(&request, &layout).await })
            };

            if let Err(e) = worker.await {
                error!(job_id = %job_id, error = %e, "Worker task died before finishing the job");
                runner
                    .fail_unfinished(&job_id, &layout, "worker task panicked")
                    .await;
            }
        });
    }

    /// Log query.
    ///
    /// Running jobs hand out the lines buffered since the previous call.
    /// Finished or evicted jobs return the whole persisted log.
    pub async fn logs(&self, job_id: &str) -> Result<LogsView> {
        validate_job_id(job_id)?;

        match self.registry.poll_logs(job_id) {
            Some(LogPoll::Live { lines }) => Ok(LogsView {
                job_id: job_id.to_string(),
                status: ObservedStatus::Running,
                lines,
            }),
            Some(LogPoll::Finished { status, result_dir }) => {
                let lines = JobLayout::open(result_dir).read_log_lines().await?;
                Ok(LogsView {
                    job_id: job_id.to_string(),
                    status: status.into(),
                    lines,
                })
            }
            None => {
                let layout = JobLayout::find_latest(&self.results_dir, job_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("no results for job {}", job_id)))?;
                debug!(job_id = %job_id, result_dir = %layout.root().display(), "Serving logs from disk");
                Ok(LogsView {
                    job_id: job_id.to_string(),
                    status: layout.read_status().await,
                    lines: layout.read_log_lines().await?,
                })
            }
        }
    }

    /// Status event stream, optionally limited to one job
    pub fn subscribe(&self, job_filter: Option<JobId>) -> mpsc::UnboundedReceiver<JobEvent> {
        self.runner.broadcaster().subscribe(job_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::broadcaster::StatusBroadcaster;
    use crate::application::sampler::ResourceSampler;
    use crate::port::command_runner::mocks::{ScriptedCommand, ScriptedCommandRunner};
    use crate::port::profiler::mocks::MockProfiler;
    use crate::port::status_notifier::mocks::RecordingNotifier;
    use crate::port::system_probe::mocks::MockSystemProbe;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::TimeProvider;
    use std::time::Duration;

    fn service(commands: ScriptedCommandRunner, root: &std::path::Path, permits: usize) -> JobService {
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let runner = JobRunner::new(
            Arc::new(JobRegistry::new()),
            Arc::new(commands),
            Arc::new(MockProfiler::new()),
            ResourceSampler::with_period(
                Arc::new(MockSystemProbe::busy_host()),
                time.clone(),
                Duration::from_millis(20),
            ),
            Arc::new(RecordingNotifier::new()),
            Arc::new(StatusBroadcaster::new()),
            time,
        );
        JobService::with_max_concurrent_jobs(runner, root, permits)
    }

    async fn wait_terminal(service: &JobService, job_id: &str) -> JobStatus {
        for _ in 0..200 {
            match service.registry().status(job_id) {
                Some(status) if status.is_terminal() => return status,
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_submit_acknowledges_before_execution() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = ScriptedCommandRunner::new()
            .with("sleep", ScriptedCommand::ok(&["done"]).with_delay(Duration::from_millis(200)));
        let svc = service(commands, tmp.path(), 2);
        let mut events = svc.subscribe(Some("j1".to_string()));

        let request = JobRequest::new("j1", "sleep", false, []).unwrap();
        let accepted = svc.submit(request.clone()).await.unwrap();

        assert_eq!(accepted.job_id, "j1");
        assert!(accepted.result_dir.starts_with(tmp.path()));
        assert!(accepted.result_dir.to_string_lossy().ends_with("_j1"));
        assert_eq!(svc.registry().status("j1"), Some(JobStatus::Running));
        assert_eq!(events.recv().await.unwrap().status, JobStatus::Running);

        // duplicate while running
        assert!(matches!(svc.submit(request).await, Err(AppError::Conflict(_))));

        assert_eq!(wait_terminal(&svc, "j1").await, JobStatus::Success);
        assert_eq!(events.recv().await.unwrap().status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_logs_match_persisted_file_after_completion_and_eviction() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = ScriptedCommandRunner::new()
            .with("echo hello", ScriptedCommand::ok(&["hello"]))
            .with("exit 1", ScriptedCommand::exit(1));
        let svc = service(commands, tmp.path(), 2);

        let request = JobRequest::new("j2", "echo hello\nexit 1", false, []).unwrap();
        let accepted = svc.submit(request).await.unwrap();
        assert_eq!(wait_terminal(&svc, "j2").await, JobStatus::Failed);

        let persisted: Vec<String> = std::fs::read_to_string(accepted.result_dir.join("output.log"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();

        let view = svc.logs("j2").await.unwrap();
        assert_eq!(view.status, ObservedStatus::Failed);
        assert_eq!(view.lines, persisted);
        assert!(view.lines.contains(&"[STDOUT] hello".to_string()));

        // evicted from memory: located on disk instead
        svc.registry().evict_finished_before(Utc::now() + chrono::Duration::seconds(1));
        assert!(svc.registry().status("j2").is_none());
        let view = svc.logs("j2").await.unwrap();
        assert_eq!(view.status, ObservedStatus::Failed);
        assert_eq!(view.lines, persisted);
    }

    #[tokio::test]
    async fn test_logs_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(ScriptedCommandRunner::new(), tmp.path(), 1);

        assert!(matches!(svc.logs("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.logs("../etc").await, Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn test_jobs_beyond_the_bound_wait_for_a_permit() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = ScriptedCommandRunner::new()
            .with("slow", ScriptedCommand::ok(&[]).with_delay(Duration::from_millis(150)));
        let svc = service(commands, tmp.path(), 1);

        svc.submit(JobRequest::new("a", "slow", false, []).unwrap())
            .await
            .unwrap();
        svc.submit(JobRequest::new("b", "slow", false, []).unwrap())
            .await
            .unwrap();

        // both registered as running right away
        assert_eq!(svc.registry().running_count(), 2);

        assert_eq!(wait_terminal(&svc, "a").await, JobStatus::Success);
        assert_eq!(svc.registry().status("b"), Some(JobStatus::Running));
        assert_eq!(wait_terminal(&svc, "b").await, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_live_logs_are_drained() {
        let tmp = tempfile::tempdir().unwrap();
        let commands = ScriptedCommandRunner::new()
            .with("first", ScriptedCommand::ok(&["one"]))
            .with("wait", ScriptedCommand::ok(&[]).with_delay(Duration::from_millis(300)));
        let svc = service(commands, tmp.path(), 1);

        svc.submit(JobRequest::new("live", "first\nwait", false, []).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let first = svc.logs("live").await.unwrap();
        assert_eq!(first.status, ObservedStatus::Running);
        assert_eq!(
            first.lines,
            vec!["[COMMAND] first", "[STDOUT] one", "[COMMAND] wait"]
        );
        let second = svc.logs("live").await.unwrap();
        assert!(second.lines.is_empty());

        wait_terminal(&svc, "live").await;
    }
}
