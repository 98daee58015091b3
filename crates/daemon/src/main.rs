//! Perf Agent - Main Entry Point
//! Composition root: config, adapters, job service, TCP server

mod config;
mod logging;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AgentConfig;
use perfagent_api_agent::{AgentHandler, AgentServer};
use perfagent_core::application::{
    shutdown_channel, JobRegistry, JobRunner, JobService, ResourceSampler, RetentionSweeper,
    StatusBroadcaster,
};
use perfagent_core::port::time_provider::SystemTimeProvider;
use perfagent_core::port::{NoopNotifier, StatusNotifier, TimeProvider};
use perfagent_infra_http::CallbackReporter;
use perfagent_infra_system::{ProcessEnv, ProfilingOrchestrator, ShellExecutor, SystemProbeImpl};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    let _log_guard = logging::init()?;
    info!("Perf Agent v{} starting...", VERSION);

    // 2. Configuration
    let config = AgentConfig::load()?;
    let results_dir = config.results_dir();
    std::fs::create_dir_all(&results_dir)
        .with_context(|| format!("Failed to create results dir {}", results_dir.display()))?;
    info!(
        results_dir = %results_dir.display(),
        working_dir = %config.working_dir().display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Configuration loaded"
    );

    // 3. Adapters (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let process_env = ProcessEnv::new(config.env_allowlist.clone(), config.working_dir());

    let command_runner = Arc::new(ShellExecutor::new(
        time_provider.clone(),
        process_env.clone(),
    ));
    let profiler = Arc::new(ProfilingOrchestrator::new(
        process_env,
        config.profiling_binaries(),
    ));
    let probe = Arc::new(SystemProbeImpl::new());

    let notifier: Arc<dyn StatusNotifier> = match config.callback_url() {
        Some(url) => {
            info!(callback_url = %url, "Status callbacks enabled");
            Arc::new(
                CallbackReporter::with_timeout(url, config.callback_timeout())
                    .context("Failed to build callback client")?,
            )
        }
        None => {
            warn!("No callback_url configured; results are only available via get_logs");
            Arc::new(NoopNotifier)
        }
    };

    // 4. Job orchestration
    let registry = Arc::new(JobRegistry::new());
    let runner = JobRunner::new(
        registry.clone(),
        command_runner,
        profiler,
        ResourceSampler::with_period(probe, time_provider.clone(), config.sample_interval()),
        notifier,
        Arc::new(StatusBroadcaster::new()),
        time_provider.clone(),
    )
    .with_sampler_join_timeout(config.sampler_join_timeout());

    let service = Arc::new(JobService::with_max_concurrent_jobs(
        runner,
        results_dir,
        config.max_concurrent_jobs,
    ));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    // 5. Retention sweeper
    let sweeper = RetentionSweeper::new(registry, time_provider)
        .with_schedule(config.job_ttl(), config.sweep_interval());
    tokio::spawn(sweeper.run(shutdown_rx.clone()));

    // 6. TCP server
    let server = AgentServer::bind(config.server(), Arc::new(AgentHandler::new(service)))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let server_handle = tokio::spawn(server.run(shutdown_rx));

    info!("✅ Agent ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown (running jobs are abandoned with the process)
    shutdown_tx.shutdown();
    if tokio::time::timeout(SERVER_STOP_TIMEOUT, server_handle)
        .await
        .is_err()
    {
        warn!("Server did not stop in time");
    }

    info!("Shutdown complete.");
    Ok(())
}
