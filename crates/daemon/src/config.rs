//! Agent configuration
//!
//! Defaults, overlaid by an optional TOML file (`PERFAGENT_CONFIG`, default
//! `perfagent.toml`), overlaid by `PERFAGENT_*` environment variables.

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use perfagent_api_agent::codec::DEFAULT_MAX_FRAME_BYTES;
use perfagent_api_agent::AgentServerConfig;
use perfagent_core::application::constants::{
    DEFAULT_JOB_TTL, DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_SAMPLER_JOIN_TIMEOUT,
    DEFAULT_SAMPLE_INTERVAL, DEFAULT_SWEEP_INTERVAL,
};
use perfagent_infra_http::callback_reporter::DEFAULT_CALLBACK_TIMEOUT;
use perfagent_infra_system::process::DEFAULT_ENV_ALLOWLIST;
use perfagent_infra_system::ProfilingBinaries;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "PERFAGENT";
pub const CONFIG_PATH_VAR: &str = "PERFAGENT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "perfagent.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    pub results_dir: String,
    pub working_dir: String,
    pub callback_url: Option<String>,
    pub callback_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub max_frame_bytes: usize,
    pub sample_interval_ms: u64,
    pub job_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub sampler_join_timeout_ms: u64,
    pub env_allowlist: Vec<String>,
    pub perf_bin: String,
    pub valgrind_bin: String,
    pub stackcollapse_bin: String,
    pub flamegraph_bin: String,
    pub gprof2dot_bin: String,
    pub dot_bin: String,
}

impl AgentConfig {
    /// Load from the file named by `PERFAGENT_CONFIG` and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_with(&path, Environment::with_prefix(ENV_PREFIX))
    }

    pub fn load_with(path: &str, environment: Environment) -> Result<Self> {
        let bins = ProfilingBinaries::default();
        let allowlist: Vec<&str> = DEFAULT_ENV_ALLOWLIST.to_vec();

        let settings = Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 9999)?
            .set_default("results_dir", "./results")?
            .set_default("working_dir", ".")?
            .set_default("callback_timeout_secs", DEFAULT_CALLBACK_TIMEOUT.as_secs())?
            .set_default("max_concurrent_jobs", DEFAULT_MAX_CONCURRENT_JOBS as u64)?
            .set_default("max_frame_bytes", DEFAULT_MAX_FRAME_BYTES as u64)?
            .set_default("sample_interval_ms", DEFAULT_SAMPLE_INTERVAL.as_millis() as u64)?
            .set_default("job_ttl_secs", DEFAULT_JOB_TTL.as_secs())?
            .set_default("sweep_interval_secs", DEFAULT_SWEEP_INTERVAL.as_secs())?
            .set_default(
                "sampler_join_timeout_ms",
                DEFAULT_SAMPLER_JOIN_TIMEOUT.as_millis() as u64,
            )?
            .set_default("env_allowlist", allowlist)?
            .set_default("perf_bin", bins.perf)?
            .set_default("valgrind_bin", bins.valgrind)?
            .set_default("stackcollapse_bin", bins.stackcollapse)?
            .set_default("flamegraph_bin", bins.flamegraph)?
            .set_default("gprof2dot_bin", bins.gprof2dot)?
            .set_default("dot_bin", bins.dot)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                environment
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("env_allowlist"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration ({})", path))?;

        let config: AgentConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_concurrent_jobs > 0, "max_concurrent_jobs must be at least 1");
        anyhow::ensure!(self.max_frame_bytes > 0, "max_frame_bytes must be positive");
        anyhow::ensure!(self.sample_interval_ms > 0, "sample_interval_ms must be positive");
        anyhow::ensure!(self.sweep_interval_secs > 0, "sweep_interval_secs must be positive");
        if let Some(url) = self.callback_url() {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "callback_url must be an http(s) URL, got '{}'",
                url
            );
        }
        Ok(())
    }

    /// Results root with `~` expanded
    pub fn results_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.results_dir).into_owned())
    }

    pub fn working_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.working_dir).into_owned())
    }

    /// Callback target; an empty string disables callbacks
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn server(&self) -> AgentServerConfig {
        AgentServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_frame_bytes: self.max_frame_bytes,
        }
    }

    pub fn profiling_binaries(&self) -> ProfilingBinaries {
        ProfilingBinaries {
            perf: self.perf_bin.clone(),
            valgrind: self.valgrind_bin.clone(),
            stackcollapse: self.stackcollapse_bin.clone(),
            flamegraph: self.flamegraph_bin.clone(),
            gprof2dot: self.gprof2dot_bin.clone(),
            dot: self.dot_bin.clone(),
        }
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sampler_join_timeout(&self) -> Duration {
        Duration::from_millis(self.sampler_join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::load_with("/nonexistent/perfagent.toml", env(&[])).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9999);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
        assert_eq!(config.sample_interval(), Duration::from_secs(1));
        assert_eq!(config.job_ttl(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.env_allowlist, vec!["PATH", "HOME", "USER", "LANG", "TMPDIR"]);
        assert_eq!(config.callback_url(), None);
        assert_eq!(config.profiling_binaries(), ProfilingBinaries::default());
    }

    #[test]
    fn test_file_then_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("agent.toml");
        std::fs::write(
            &path,
            "port = 7000\nresults_dir = \"/srv/results\"\nperf_bin = \"/opt/perf\"\n",
        )
        .unwrap();

        let config = AgentConfig::load_with(
            path.to_str().unwrap(),
            env(&[
                ("PERFAGENT_PORT", "7100"),
                ("PERFAGENT_CALLBACK_URL", "http://control:5000/api/tests/callback"),
                ("PERFAGENT_ENV_ALLOWLIST", "PATH,JAVA_HOME"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 7100);
        assert_eq!(config.results_dir(), PathBuf::from("/srv/results"));
        assert_eq!(config.perf_bin, "/opt/perf");
        assert_eq!(
            config.callback_url(),
            Some("http://control:5000/api/tests/callback")
        );
        assert_eq!(config.env_allowlist, vec!["PATH", "JAVA_HOME"]);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let zero_jobs = env(&[("PERFAGENT_MAX_CONCURRENT_JOBS", "0")]);
        assert!(AgentConfig::load_with("/nonexistent", zero_jobs).is_err());

        let bad_url = env(&[("PERFAGENT_CALLBACK_URL", "ftp://x")]);
        assert!(AgentConfig::load_with("/nonexistent", bad_url).is_err());

        let disabled = env(&[("PERFAGENT_CALLBACK_URL", "")]);
        let config = AgentConfig::load_with("/nonexistent", disabled).unwrap();
        assert_eq!(config.callback_url(), None);
    }
}
