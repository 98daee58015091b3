//! Shared harness: a real agent (shell executor, host probe, TCP server)
//! on an ephemeral port, driven through the SDK.

#![allow(dead_code)]

use perfagent_api_agent::{AgentHandler, AgentServer, AgentServerConfig};
use perfagent_core::application::{
    shutdown_channel, JobRegistry, JobRunner, JobService, ResourceSampler, RetentionSweeper,
    ShutdownSender, StatusBroadcaster,
};
use perfagent_core::port::time_provider::SystemTimeProvider;
use perfagent_core::port::{NoopNotifier, StatusNotifier, TimeProvider};
use perfagent_infra_http::CallbackReporter;
use perfagent_infra_system::process::DEFAULT_ENV_ALLOWLIST;
use perfagent_infra_system::{
    ProcessEnv, ProfilingBinaries, ProfilingOrchestrator, ShellExecutor, SystemProbeImpl,
};
use perfagent_sdk::{AgentClient, Completion, RetryPolicy};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct AgentOptions {
    pub callback_url: Option<String>,
    pub bins: ProfilingBinaries,
    pub max_concurrent_jobs: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            callback_url: None,
            bins: ProfilingBinaries::default(),
            max_concurrent_jobs: 4,
        }
    }
}

pub struct TestAgent {
    pub client: AgentClient,
    pub service: Arc<JobService>,
    results: TempDir,
    _workdir: TempDir,
    _shutdown: ShutdownSender,
}

impl TestAgent {
    pub async fn start() -> Self {
        Self::start_with(AgentOptions::default()).await
    }

    pub async fn start_with(options: AgentOptions) -> Self {
        let results = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

        let allowlist = DEFAULT_ENV_ALLOWLIST.iter().map(|v| v.to_string()).collect();
        let env = ProcessEnv::new(allowlist, workdir.path());
        let notifier: Arc<dyn StatusNotifier> = match options.callback_url {
            Some(url) => Arc::new(CallbackReporter::new(url).unwrap()),
            None => Arc::new(NoopNotifier),
        };

        let runner = JobRunner::new(
            Arc::new(JobRegistry::new()),
            Arc::new(ShellExecutor::new(time.clone(), env.clone())),
            Arc::new(ProfilingOrchestrator::new(env, options.bins)),
            ResourceSampler::with_period(
                Arc::new(SystemProbeImpl::new()),
                time.clone(),
                Duration::from_millis(100),
            ),
            notifier,
            Arc::new(StatusBroadcaster::new()),
            time,
        );
        let service = Arc::new(JobService::with_max_concurrent_jobs(
            runner,
            results.path(),
            options.max_concurrent_jobs,
        ));

        let config = AgentServerConfig {
            port: 0,
            ..Default::default()
        };
        let server = AgentServer::bind(config, Arc::new(AgentHandler::new(service.clone())))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown, token) = shutdown_channel();
        tokio::spawn(server.run(token));

        let client = AgentClient::new(addr.to_string()).with_policy(RetryPolicy {
            max_retries: 3,
            timeout: Duration::from_secs(5),
            backoff_unit: Duration::from_millis(50),
        });

        Self {
            client,
            service,
            results,
            _workdir: workdir,
            _shutdown: shutdown,
        }
    }

    pub fn results_root(&self) -> &Path {
        self.results.path()
    }

    pub async fn wait(&self, job_id: &str) -> Completion {
        self.client
            .wait_for_completion(job_id, Duration::from_millis(20), Some(Duration::from_secs(30)))
            .await
            .unwrap()
    }

    /// Drop every finished job from the registry
    pub fn evict_finished(&self) -> usize {
        RetentionSweeper::new(self.service.registry().clone(), Arc::new(SystemTimeProvider))
            .with_schedule(Duration::ZERO, Duration::from_secs(60))
            .sweep_now()
    }
}
