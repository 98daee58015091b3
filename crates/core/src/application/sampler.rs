// Resource Sampler - periodic host metrics for one running job

use crate::application::constants::DEFAULT_SAMPLE_INTERVAL;
use crate::application::layout::write_json_atomic;
use crate::application::registry::JobRegistry;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{JobId, MetricSample};
use crate::port::{SystemProbe, TimeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Samples host CPU/memory/IO on a fixed period while a job runs.
///
/// I/O values are deltas against the counters read at sampler start, so a
/// series starts near zero regardless of what the host did before.
#[derive(Clone)]
pub struct ResourceSampler {
    probe: Arc<dyn SystemProbe>,
    time_provider: Arc<dyn TimeProvider>,
    period: Duration,
}

impl ResourceSampler {
    pub fn new(probe: Arc<dyn SystemProbe>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self::with_period(probe, time_provider, DEFAULT_SAMPLE_INTERVAL)
    }

    pub fn with_period(
        probe: Arc<dyn SystemProbe>,
        time_provider: Arc<dyn TimeProvider>,
        period: Duration,
    ) -> Self {
        Self {
            probe,
            time_provider,
            period,
        }
    }

    /// Start sampling `job_id` on its own task. The task ends when `stop`
    /// fires or the registry reports the job is no longer running, and
    /// yields the collected series.
    pub fn spawn(
        &self,
        job_id: JobId,
        registry: Arc<JobRegistry>,
        snapshot_path: PathBuf,
        stop: ShutdownToken,
    ) -> JoinHandle<Vec<MetricSample>> {
        let sampler = self.clone();
        tokio::spawn(async move { sampler.run(job_id, registry, snapshot_path, stop).await })
    }

    async fn run(
        self,
        job_id: JobId,
        registry: Arc<JobRegistry>,
        snapshot_path: PathBuf,
        mut stop: ShutdownToken,
    ) -> Vec<MetricSample> {
        let baseline = self.probe.snapshot().await.counters;
        let mut series: Vec<MetricSample> = Vec::new();

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(job_id = %job_id, period_ms = self.period.as_millis() as u64, "Resource sampler started");

        loop {
            if stop.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {},
                _ = stop.wait() => break,
            }
            if !registry.is_running(&job_id) {
                break;
            }

            let snapshot = self.probe.snapshot().await;
            let sample = MetricSample::from_snapshot(self.time_provider.now(), &snapshot, &baseline);
            if !registry.append_metric(&job_id, sample.clone()) {
                break;
            }
            series.push(sample);

            if let Err(e) = write_json_atomic(&snapshot_path, &series).await {
                warn!(job_id = %job_id, error = %e, path = %snapshot_path.display(), "Failed to write metrics snapshot");
            }
        }

        info!(job_id = %job_id, samples = series.len(), "Resource sampler stopped");
        series
    }
}
