//! Perf Agent Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{Completion, ExecuteTestRequest, ExecuteTestResponse, GetLogsResponse, StatusEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Retry and timeout settings for [`AgentClient`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request
    pub max_retries: u32,
    /// Bound on one connect + request + response exchange
    pub timeout: Duration,
    /// Wait after the n-th failed attempt is `n * backoff_unit`
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(5),
            backoff_unit: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_unit * failed_attempt
    }
}

/// Perf Agent Client
///
/// Every request opens a fresh TCP connection to the agent.
///
/// Note: `execute_test` is not idempotent. If the agent accepted a job but
/// the acknowledgment was lost, the retry submits it again; the agent then
/// answers `conflict` while the first run is still going, or runs it twice
/// once it has finished.
///
/// # Example
///
/// ```no_run
/// use perfagent_sdk::{AgentClient, ExecuteTestRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = AgentClient::new("127.0.0.1:9999");
/// let ack = client
///     .execute_test(&ExecuteTestRequest::new("smoke-1", "make test"))
///     .await?;
/// println!("results in {}", ack.result_dir);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AgentClient {
    addr: String,
    policy: RetryPolicy,
}

impl AgentClient {
    /// Create a client for `host:port`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send one raw request and return the decoded response.
    ///
    /// Transport failures (timeout, refused connection, unparseable body) are
    /// retried with linear backoff. An error answered by the agent is
    /// returned as [`SdkError::Remote`] without retrying.
    pub async fn submit(&self, request: &Value) -> Result<Value> {
        let mut frame = serde_json::to_vec(request)?;
        frame.push(b'\n');

        let attempts = self.policy.max_retries.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match self.round_trip(&frame).await {
                Ok(response) => return into_result(response),
                Err(e) if e.is_retryable() => {
                    warn!(addr = %self.addr, attempt, error = %e, "Agent request failed");
                    last = Some(e);
                    if attempt < attempts {
                        sleep(self.policy.backoff(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(SdkError::RetriesExhausted {
            attempts,
            last: Box::new(
                last.unwrap_or_else(|| SdkError::Connection("no attempt made".to_string())),
            ),
        })
    }

    async fn round_trip(&self, frame: &[u8]) -> Result<Value> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(frame).await?;
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).await?;
            Ok::<_, SdkError>(line)
        };
        let line = timeout(self.policy.timeout, exchange)
            .await
            .map_err(|_| SdkError::Timeout(self.policy.timeout))??;

        if line.is_empty() {
            return Err(SdkError::MalformedResponse(
                "connection closed without a response".to_string(),
            ));
        }
        serde_json::from_slice(&line).map_err(|e| SdkError::MalformedResponse(e.to_string()))
    }

    /// Submit a script for execution
    pub async fn execute_test(&self, request: &ExecuteTestRequest) -> Result<ExecuteTestResponse> {
        let response = self.submit(&action_request("execute_test", request)?).await?;
        decode(response)
    }

    /// Fetch new log lines (running job) or the full log (finished job)
    pub async fn get_logs(&self, job_id: &str) -> Result<GetLogsResponse> {
        let response = self
            .submit(&json!({"action": "get_logs", "job_id": job_id}))
            .await?;
        decode(response)
    }

    /// Poll `get_logs` until the job reaches a terminal status
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        poll_interval: Duration,
        max_wait: Option<Duration>,
    ) -> Result<Completion> {
        let started = Instant::now();
        let mut logs = Vec::new();

        loop {
            let response = self.get_logs(job_id).await?;
            if response.status.is_terminal() {
                // terminal replies carry the whole persisted log
                if response.logs.len() >= logs.len() {
                    logs = response.logs;
                }
                return Ok(Completion {
                    job_id: response.job_id,
                    status: response.status,
                    logs,
                });
            }

            debug!(job_id, new_lines = response.logs.len(), "Job still running");
            logs.extend(response.logs);

            if let Some(limit) = max_wait {
                if started.elapsed() >= limit {
                    return Err(SdkError::WaitTimedOut {
                        job_id: job_id.to_string(),
                        waited: started.elapsed(),
                    });
                }
            }
            sleep(poll_interval).await;
        }
    }

    /// Open a status event stream, optionally for a single job
    pub async fn subscribe(&self, job_id: Option<&str>) -> Result<Subscription> {
        let mut request = json!({"action": "subscribe"});
        if let Some(job_id) = job_id {
            request["job_id"] = json!(job_id);
        }
        let mut frame = serde_json::to_vec(&request)?;
        frame.push(b'\n');

        let handshake = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(&frame).await?;
            let mut lines = BufReader::new(stream).lines();
            let ack = lines.next_line().await?;
            Ok::<_, SdkError>((ack, lines))
        };
        let (ack, lines) = timeout(self.policy.timeout, handshake)
            .await
            .map_err(|_| SdkError::Timeout(self.policy.timeout))??;

        let ack = ack.ok_or_else(|| {
            SdkError::MalformedResponse("connection closed before acknowledgment".to_string())
        })?;
        let ack: Value =
            serde_json::from_str(&ack).map_err(|e| SdkError::MalformedResponse(e.to_string()))?;
        into_result(ack)?;

        Ok(Subscription { lines })
    }

    /// Check that the agent accepts connections
    pub async fn ping(&self) -> bool {
        matches!(
            timeout(self.policy.timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Open status event stream. Dropping it closes the connection.
pub struct Subscription {
    lines: Lines<BufReader<TcpStream>>,
}

impl Subscription {
    /// Next event, or `None` once the agent closes the stream
    pub async fn next_event(&mut self) -> Result<Option<StatusEvent>> {
        match self.lines.next_line().await? {
            Some(line) => serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| SdkError::MalformedResponse(e.to_string())),
            None => Ok(None),
        }
    }
}

fn action_request<T: Serialize>(action: &str, body: &T) -> Result<Value> {
    let mut value = serde_json::to_value(body)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("action".to_string(), json!(action));
            Ok(value)
        }
        None => Err(SdkError::MalformedResponse(format!(
            "{} request must serialize to an object",
            action
        ))),
    }
}

fn into_result(response: Value) -> Result<Value> {
    if response.get("status").and_then(Value::as_str) == Some("error") {
        let code = response
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = response
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(SdkError::Remote { code, message });
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(response: Value) -> Result<T> {
    serde_json::from_value(response).map_err(|e| SdkError::MalformedResponse(e.to_string()))
}
