// Retention Sweeper
// Periodically evicts terminal jobs from the registry. Their result
// directories stay on disk and remain readable through the log fallback.

use crate::application::constants::{DEFAULT_JOB_TTL, DEFAULT_SWEEP_INTERVAL};
use crate::application::registry::JobRegistry;
use crate::application::shutdown::ShutdownToken;
use crate::port::TimeProvider;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

pub struct RetentionSweeper {
    registry: Arc<JobRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    job_ttl: Duration,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<JobRegistry>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            registry,
            time_provider,
            job_ttl: DEFAULT_JOB_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// # Arguments
    /// * `job_ttl` - How long a terminal job stays in memory
    /// * `sweep_interval` - How often the registry is scanned
    pub fn with_schedule(mut self, job_ttl: Duration, sweep_interval: Duration) -> Self {
        self.job_ttl = job_ttl;
        self.sweep_interval = sweep_interval;
        self
    }

    /// Sweep loop (background task), ends on shutdown
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            ttl_secs = self.job_ttl.as_secs(),
            interval_secs = self.sweep_interval.as_secs(),
            "Retention sweeper started"
        );

        let mut tick = interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep_now();
                }
                _ = shutdown.wait() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Evict every terminal job that ended more than `job_ttl` ago.
    /// Returns the number of evicted entries.
    pub fn sweep_now(&self) -> usize {
        let ttl_ms = i64::try_from(self.job_ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff_ms = self.time_provider.now_millis().saturating_sub(ttl_ms);
        let Some(cutoff) = Utc.timestamp_millis_opt(cutoff_ms).single() else {
            return 0;
        };

        let evicted = self.registry.evict_finished_before(cutoff);
        if evicted > 0 {
            info!(evicted, remaining = self.registry.len(), "Evicted expired jobs");
        } else {
            debug!(remaining = self.registry.len(), "Retention sweep found nothing to evict");
        }
        evicted
    }
}
