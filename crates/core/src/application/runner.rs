// Job Runner - executes one accepted job to its terminal status
//
// Per job: a log pump task (file + registry channel), the resource sampler,
// and the sequential command loop on the calling task.

use crate::application::broadcaster::StatusBroadcaster;
use crate::application::constants::DEFAULT_SAMPLER_JOIN_TIMEOUT;
use crate::application::layout::{write_json_atomic, JobLayout};
use crate::application::registry::JobRegistry;
use crate::application::sampler::ResourceSampler;
use crate::application::shutdown::shutdown_channel;
use crate::domain::{
    JobEvent, JobRequest, JobStatus, LogLine, LogStream, MetricSample, ProfilingManifest,
};
use crate::port::{CommandRunner, LogSink, Profiler, StatusNotifier, StatusReport, TimeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct JobRunner {
    registry: Arc<JobRegistry>,
    command_runner: Arc<dyn CommandRunner>,
    profiler: Arc<dyn Profiler>,
    sampler: ResourceSampler,
    notifier: Arc<dyn StatusNotifier>,
    broadcaster: Arc<StatusBroadcaster>,
    time_provider: Arc<dyn TimeProvider>,
    sampler_join_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        command_runner: Arc<dyn CommandRunner>,
        profiler: Arc<dyn Profiler>,
        sampler: ResourceSampler,
        notifier: Arc<dyn StatusNotifier>,
        broadcaster: Arc<StatusBroadcaster>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            registry,
            command_runner,
            profiler,
            sampler,
            notifier,
            broadcaster,
            time_provider,
            sampler_join_timeout: DEFAULT_SAMPLER_JOIN_TIMEOUT,
        }
    }

    pub fn with_sampler_join_timeout(mut self, timeout: Duration) -> Self {
        self.sampler_join_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.broadcaster
    }

    pub fn time_provider(&self) -> &Arc<dyn TimeProvider> {
        &self.time_provider
    }

    /// Run every script line in order and drive the job to a terminal status.
    ///
    /// The job must already be registered as running. Stops at the first
    /// failing line. The status reporter is invoked exactly once.
    pub async fn run(&self, request: &JobRequest, layout: &JobLayout) -> JobStatus {
        let job_id = request.job_id.as_str();
        info!(
            job_id = %job_id,
            commands = request.script.len(),
            profiling = request.profiling_enabled,
            "Job execution started"
        );

        let (stop_tx, stop) = shutdown_channel();
        let sampler = self.sampler.spawn(
            request.job_id.clone(),
            self.registry.clone(),
            layout.metrics_file(),
            stop,
        );

        let (sink, rx) = mpsc::unbounded_channel();
        let pump = spawn_log_pump(request.job_id.clone(), self.registry.clone(), layout.log_file(), rx);

        if request.profiling_enabled {
            if let Err(e) = tokio::fs::create_dir_all(layout.profile_dir()).await {
                warn!(job_id = %job_id, error = %e, "Failed to create profile directory");
            }
        }

        let (failure, manifest) = self.execute_script(request, layout, &sink).await;
        let status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Success
        };

        if request.profiling_enabled {
            if let Err(e) = self.registry.set_manifest(job_id, manifest.clone()) {
                warn!(job_id = %job_id, error = %e, "Failed to store profiling manifest");
            }
            if let Err(e) = write_json_atomic(&layout.manifest_file(), &manifest).await {
                warn!(job_id = %job_id, error = %e, "Failed to write profiling manifest");
            }
        }

        // closing the sink ends the pump once every queued line is written
        drop(sink);
        if let Err(e) = pump.await {
            error!(job_id = %job_id, error = %e, "Log pump task failed");
        }

        stop_tx.shutdown();
        let series = self.join_sampler(job_id, sampler).await;
        if let Err(e) = write_json_atomic(&layout.metrics_file(), &series).await {
            warn!(job_id = %job_id, error = %e, "Failed to write final metrics");
        }

        self.complete(job_id, layout, status, failure.as_deref()).await;
        status
    }

    /// Mark a job failed when its runner never reached a terminal status
    /// (the worker task panicked or was cancelled).
    pub async fn fail_unfinished(&self, job_id: &str, layout: &JobLayout, reason: &str) {
        if !self.registry.is_running(job_id) {
            return;
        }
        warn!(job_id = %job_id, reason = %reason, "Failing job that did not finish");
        self.complete(job_id, layout, JobStatus::Failed, Some(reason)).await;
    }

    /// Sequential command loop. Returns the failure message (if any) and the
    /// manifest of successfully profiled commands.
    async fn execute_script(
        &self,
        request: &JobRequest,
        layout: &JobLayout,
        sink: &LogSink,
    ) -> (Option<String>, ProfilingManifest) {
        let job_id = request.job_id.as_str();
        let profile_dir = layout.profile_dir();
        let mut manifest = ProfilingManifest::new();

        for (index, line) in request.script.iter().enumerate() {
            let _ = sink.send(LogLine::new(LogStream::Command, line.clone()));

            let failure = match self.command_runner.run(line, sink).await {
                Ok(outcome) if outcome.succeeded() => {
                    debug!(job_id = %job_id, index, duration_ms = outcome.duration_ms, "Command succeeded");
                    if request.profiling_enabled {
                        let profile = self
                            .profiler
                            .profile(index, line, &request.profiling_tools, &profile_dir, sink)
                            .await;
                        if !profile.is_empty() {
                            manifest.insert(index, profile);
                        }
                    }
                    None
                }
                Ok(outcome) => Some(format!(
                    "Command '{}' failed with {}",
                    line,
                    outcome.exit_description()
                )),
                Err(e) => Some(format!("Command '{}' could not be executed: {}", line, e)),
            };

            if let Some(message) = failure {
                warn!(job_id = %job_id, index, error = %message, "Command failed, aborting script");
                let _ = sink.send(LogLine::new(LogStream::Error, message.clone()));
                return (Some(message), manifest);
            }
        }

        (None, manifest)
    }

    async fn join_sampler(
        &self,
        job_id: &str,
        mut handle: JoinHandle<Vec<MetricSample>>,
    ) -> Vec<MetricSample> {
        match tokio::time::timeout(self.sampler_join_timeout, &mut handle).await {
            Ok(Ok(series)) => series,
            Ok(Err(e)) => {
                error!(job_id = %job_id, error = %e, "Resource sampler task failed");
                self.recorded_metrics(job_id)
            }
            Err(_) => {
                warn!(
                    job_id = %job_id,
                    timeout_ms = self.sampler_join_timeout.as_millis() as u64,
                    "Resource sampler did not stop in time, aborting it"
                );
                handle.abort();
                self.recorded_metrics(job_id)
            }
        }
    }

    fn recorded_metrics(&self, job_id: &str) -> Vec<MetricSample> {
        self.registry
            .snapshot(job_id)
            .map(|snapshot| snapshot.metrics)
            .unwrap_or_default()
    }

    /// Status footer, registry transition, event, then the single report
    async fn complete(&self, job_id: &str, layout: &JobLayout, status: JobStatus, error: Option<&str>) {
        let end = self.time_provider.now();

        if let Err(e) = layout.append_status_footer(status, end, error).await {
            warn!(job_id = %job_id, error = %e, "Failed to append status footer");
        }

        let snapshot = match self.registry.finish(job_id, status, end) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Could not record terminal status");
                return;
            }
        };

        self.broadcaster.publish(&JobEvent::new(
            job_id,
            status,
            layout.root().to_path_buf(),
            end,
        ));

        info!(
            job_id = %job_id,
            status = %status,
            samples = snapshot.metrics.len(),
            profiled_commands = snapshot.profiling_manifest.len(),
            "Job finished"
        );

        if let Err(e) = self.notifier.notify(&StatusReport::from(snapshot)).await {
            warn!(job_id = %job_id, error = %e, "Status callback failed");
        }
    }
}

/// Forward every line to output.log (flushed per line) and the registry channel
fn spawn_log_pump(
    job_id: String,
    registry: Arc<JobRegistry>,
    log_path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<LogLine>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(file) => Some(file),
            Err(e) => {
                error!(job_id = %job_id, error = %e, path = %log_path.display(), "Failed to open job log");
                None
            }
        };

        while let Some(line) = rx.recv().await {
            let text = line.to_string();
            if let Some(f) = file.as_mut() {
                let written = async {
                    f.write_all(text.as_bytes()).await?;
                    f.write_all(b"\n").await?;
                    f.flush().await
                }
                .await;
                if let Err(e) = written {
                    error!(job_id = %job_id, error = %e, "Failed to write job log, continuing in memory only");
                    file = None;
                }
            }
            registry.append_log(&job_id, text);
        }
    })
}
