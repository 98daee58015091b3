//! Action Handlers
//!
//! Decodes a frame, dispatches it to the job service and builds the reply.

use crate::error::{code, to_error_response};
use crate::types::{
    ErrorResponse, ExecuteTestRequest, ExecuteTestResponse, GetLogsRequest, GetLogsResponse,
    Request, SubscribeAck, SubscribeRequest,
};
use perfagent_core::application::JobService;
use perfagent_core::domain::{JobEvent, JobRequest};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// What the connection should do after handling a request
#[derive(Debug)]
pub enum Reply {
    /// Send one response and close
    Respond(Value),
    /// Send the ack, then stream events until either side goes away
    Stream {
        ack: Value,
        events: mpsc::UnboundedReceiver<JobEvent>,
    },
}

fn to_value<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({
            "status": "error",
            "code": code::INTERNAL_ERROR,
            "error": format!("could not encode response: {}", e),
        })
    })
}

/// Handler with injected job service
pub struct AgentHandler {
    service: Arc<JobService>,
}

impl AgentHandler {
    pub fn new(service: Arc<JobService>) -> Self {
        Self { service }
    }

    /// Handle one decoded frame
    pub async fn handle(&self, frame: &[u8]) -> Reply {
        let request = match Request::parse(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                return Reply::Respond(to_value(&ErrorResponse::from(&e)));
            }
        };
        debug!(action = request.action(), "Request received");

        match request {
            Request::ExecuteTest(req) => Reply::Respond(match self.execute_test(req).await {
                Ok(response) => to_value(&response),
                Err(error) => to_value(&error),
            }),
            Request::GetLogs(req) => Reply::Respond(match self.get_logs(req).await {
                Ok(response) => to_value(&response),
                Err(error) => to_value(&error),
            }),
            Request::Subscribe(req) => {
                let (ack, events) = self.subscribe(req);
                Reply::Stream {
                    ack: to_value(&ack),
                    events,
                }
            }
        }
    }

    /// execute_test
    pub async fn execute_test(
        &self,
        params: ExecuteTestRequest,
    ) -> Result<ExecuteTestResponse, ErrorResponse> {
        let tools = params.tools();
        let request = JobRequest::new(
            params.job_id,
            &params.command,
            params.enable_profiling,
            tools,
        )
        .map_err(|e| ErrorResponse::new(code::VALIDATION_ERROR, e.to_string()))?;

        let accepted = self
            .service
            .submit(request)
            .await
            .map_err(|e| to_error_response(&e))?;

        Ok(ExecuteTestResponse {
            status: "running",
            job_id: accepted.job_id,
            result_dir: accepted.result_dir,
            timestamp: accepted.timestamp,
            profiling_enabled: accepted.profiling_enabled,
        })
    }

    /// get_logs
    pub async fn get_logs(&self, params: GetLogsRequest) -> Result<GetLogsResponse, ErrorResponse> {
        let view = self
            .service
            .logs(&params.job_id)
            .await
            .map_err(|e| to_error_response(&e))?;

        Ok(GetLogsResponse {
            status: view.status,
            job_id: view.job_id,
            logs: view.lines,
        })
    }

    /// subscribe
    pub fn subscribe(
        &self,
        params: SubscribeRequest,
    ) -> (SubscribeAck, mpsc::UnboundedReceiver<JobEvent>) {
        let events = self.service.subscribe(params.job_id.clone());
        (
            SubscribeAck {
                status: "subscribed",
                job_id: params.job_id,
            },
            events,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfagent_core::application::{JobRunner, JobRegistry, ResourceSampler, StatusBroadcaster};
    use perfagent_core::domain::JobStatus;
    use perfagent_core::port::command_runner::mocks::{ScriptedCommand, ScriptedCommandRunner};
    use perfagent_core::port::profiler::mocks::MockProfiler;
    use perfagent_core::port::status_notifier::mocks::RecordingNotifier;
    use perfagent_core::port::system_probe::mocks::MockSystemProbe;
    use perfagent_core::port::time_provider::SystemTimeProvider;
    use perfagent_core::port::TimeProvider;
    use std::time::Duration;

    fn handler(root: &std::path::Path) -> AgentHandler {
        let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let commands = ScriptedCommandRunner::new()
            .with("echo hello", ScriptedCommand::ok(&["hello"]))
            .with("exit 1", ScriptedCommand::exit(1));
        let runner = JobRunner::new(
            Arc::new(JobRegistry::new()),
            Arc::new(commands),
            Arc::new(MockProfiler::new()),
            ResourceSampler::with_period(
                Arc::new(MockSystemProbe::busy_host()),
                time.clone(),
                Duration::from_millis(50),
            ),
            Arc::new(RecordingNotifier::new()),
            Arc::new(StatusBroadcaster::new()),
            time,
        );
        AgentHandler::new(Arc::new(JobService::new(runner, root)))
    }

    fn respond(reply: Reply) -> Value {
        match reply {
            Reply::Respond(value) => value,
            Reply::Stream { .. } => panic!("expected a single response"),
        }
    }

    async fn logs_until_terminal(handler: &AgentHandler, job_id: &str) -> Value {
        for _ in 0..200 {
            let frame = format!(r#"{{"action":"get_logs","job_id":"{}"}}"#, job_id);
            let value = respond(handler.handle(frame.as_bytes()).await);
            if value["status"] != "running" {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_execute_then_get_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = handler(tmp.path());

        let ack = respond(
            handler
                .handle(br#"{"action":"execute_test","test_id":"t1","command":"echo hello\nexit 1"}"#)
                .await,
        );
        assert_eq!(ack["status"], "running");
        assert_eq!(ack["job_id"], "t1");
        assert_eq!(ack["profiling_enabled"], false);
        assert!(ack["result_dir"].as_str().unwrap().ends_with("_t1"));

        let logs = logs_until_terminal(&handler, "t1").await;
        assert_eq!(logs["status"], "failed");
        assert_eq!(
            logs["logs"],
            serde_json::json!([
                "[COMMAND] echo hello",
                "[STDOUT] hello",
                "[COMMAND] exit 1",
                "[ERROR] Command 'exit 1' failed with exit code 1"
            ])
        );
    }

    #[tokio::test]
    async fn test_error_replies() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = handler(tmp.path());

        let cases: [(&[u8], &str); 5] = [
            (b"garbage", "protocol_error"),
            (br#"{"action":"reboot"}"#, "unknown_action"),
            (br#"{"action":"execute_test","job_id":"x","command":"  \n "}"#, "validation_error"),
            (br#"{"action":"execute_test","job_id":"../x","command":"true"}"#, "validation_error"),
            (br#"{"action":"get_logs","job_id":"ghost"}"#, "not_found"),
        ];
        for (frame, expected) in cases {
            let value = respond(handler.handle(frame).await);
            assert_eq!(value["status"], "error");
            assert_eq!(value["code"], expected, "frame {:?}", String::from_utf8_lossy(frame));
        }
    }

    #[tokio::test]
    async fn test_subscribe_streams_events() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = handler(tmp.path());

        let Reply::Stream { ack, mut events } =
            handler.handle(br#"{"action":"subscribe","job_id":"s1"}"#).await
        else {
            panic!("expected a stream");
        };
        assert_eq!(ack, serde_json::json!({"status": "subscribed", "job_id": "s1"}));

        handler
            .handle(br#"{"action":"execute_test","job_id":"other","command":"true"}"#)
            .await;
        handler
            .handle(br#"{"action":"execute_test","job_id":"s1","command":"echo hello"}"#)
            .await;

        let running = events.recv().await.unwrap();
        assert_eq!((running.job_id.as_str(), running.status), ("s1", JobStatus::Running));
        let done = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, JobStatus::Success);
    }
}
