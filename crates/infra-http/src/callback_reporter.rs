// Callback reporter - posts a job's terminal status to the control plane
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use perfagent_core::domain::{JobStatus, MetricSample, ProfilingManifest};
use perfagent_core::port::status_notifier::{NotifyError, StatusNotifier, StatusReport};

/// Default request timeout (10s)
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON body expected by the control plane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackBody<'a> {
    pub test_case_id: &'a str,
    pub start_timestamp: DateTime<Utc>,
    pub status: JobStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub perf_data: PerfData<'a>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfData<'a> {
    pub metrics: &'a [MetricSample],
    pub profiling_manifest: &'a ProfilingManifest,
}

impl<'a> From<&'a StatusReport> for CallbackBody<'a> {
    fn from(report: &'a StatusReport) -> Self {
        Self {
            test_case_id: &report.job_id,
            start_timestamp: report.start_time,
            status: report.status,
            end_time: report.end_time,
            perf_data: PerfData {
                metrics: &report.metrics,
                profiling_manifest: &report.profiling_manifest,
            },
        }
    }
}

/// StatusNotifier over HTTP POST. One attempt per report, never retried.
pub struct CallbackReporter {
    client: Client,
    url: String,
}

impl CallbackReporter {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_timeout(url, DEFAULT_CALLBACK_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StatusNotifier for CallbackReporter {
    async fn notify(&self, report: &StatusReport) -> Result<(), NotifyError> {
        debug!(job_id = %report.job_id, url = %self.url, "Posting status callback");

        let response = self
            .client
            .post(&self.url)
            .json(&CallbackBody::from(report))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(job_id = %report.job_id, status = %report.status, http_status = status.as_u16(), "Status callback delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use perfagent_core::domain::{ArtifactKind, CommandProfile, ProfilingTool};
    use std::path::PathBuf;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report() -> StatusReport {
        let start = Utc.with_ymd_and_hms(2025, 1, 23, 10, 50, 3).single().unwrap();
        let mut profile = CommandProfile::new("./bench");
        profile.tools.insert(
            ProfilingTool::CpuSampler,
            [(ArtifactKind::Flamegraph, PathBuf::from("/r/profile/0_flamegraph.svg"))]
                .into_iter()
                .collect(),
        );
        StatusReport {
            job_id: "11".to_string(),
            start_time: start,
            end_time: Some(start + chrono::Duration::seconds(4)),
            status: JobStatus::Success,
            metrics: vec![MetricSample {
                timestamp: start,
                cpu_pct: 12.5,
                mem_pct: 40.0,
                disk_read_delta: 0,
                disk_write_delta: 4096,
                net_sent_delta: 0,
                net_recv_delta: 0,
            }],
            profiling_manifest: [(0, profile)].into_iter().collect(),
        }
    }

    #[test]
    fn test_body_shape() {
        let report = report();
        let value = serde_json::to_value(CallbackBody::from(&report)).unwrap();

        assert_eq!(value["test_case_id"], "11");
        assert_eq!(value["status"], "success");
        assert_eq!(value["start_timestamp"], "2025-01-23T10:50:03Z");
        assert_eq!(value["end_time"], "2025-01-23T10:50:07Z");
        assert_eq!(value["perf_data"]["metrics"][0]["disk_write_delta"], 4096);
        assert_eq!(
            value["perf_data"]["profiling_manifest"]["0"]["tools"]["cpu_sampler"]["flamegraph"],
            "/r/profile/0_flamegraph.svg"
        );
    }

    #[tokio::test]
    async fn test_posts_report_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/test-results/callback"))
            .and(body_partial_json(serde_json::json!({
                "test_case_id": "11",
                "status": "success"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let reporter =
            CallbackReporter::new(format!("{}/api/test-results/callback", server.uri())).unwrap();
        reporter.notify(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = CallbackReporter::new(server.uri()).unwrap();
        match reporter.notify(&report()).await {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // port 9 (discard) is not listening on test hosts
        let reporter =
            CallbackReporter::with_timeout("http://127.0.0.1:9/callback", Duration::from_secs(2))
                .unwrap();
        assert!(matches!(
            reporter.notify(&report()).await,
            Err(NotifyError::Transport(_))
        ));
    }
}
