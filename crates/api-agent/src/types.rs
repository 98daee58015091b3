//! Wire Request/Response Types
//!
//! Requests carry an `action` field next to their parameters.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use perfagent_core::domain::{JobEvent, ObservedStatus, ProfilingTool};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Accept job ids sent as JSON strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "job_id must be a string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "job_id must be a string or number, got {}",
            other
        ))),
    }
}

/// execute_test - run a script
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteTestRequest {
    #[serde(alias = "test_id", deserialize_with = "string_or_number")]
    pub job_id: String,
    /// Newline separated script
    pub command: String,
    #[serde(default)]
    pub enable_profiling: bool,
    #[serde(default)]
    pub profiling_config: Option<ProfilingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfilingConfig {
    #[serde(default)]
    pub tools: Vec<ProfilingTool>,
}

impl ExecuteTestRequest {
    pub fn tools(&self) -> Vec<ProfilingTool> {
        self.profiling_config
            .as_ref()
            .map(|config| config.tools.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteTestResponse {
    pub status: &'static str,
    pub job_id: String,
    pub result_dir: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub profiling_enabled: bool,
}

/// get_logs - drain or read a job's log
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetLogsRequest {
    #[serde(alias = "test_id", deserialize_with = "string_or_number")]
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetLogsResponse {
    pub status: ObservedStatus,
    pub job_id: String,
    pub logs: Vec<String>,
}

/// subscribe - stream status events
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default, alias = "test_id", deserialize_with = "optional_string_or_number")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeAck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// One frame per status change on a subscription
pub type EventFrame = JobEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status: "error",
            code,
            error: error.into(),
        }
    }
}

/// A decoded request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ExecuteTest(ExecuteTestRequest),
    GetLogs(GetLogsRequest),
    Subscribe(SubscribeRequest),
}

impl Request {
    /// Decode one frame.
    ///
    /// Invalid JSON is a protocol error, a missing or unusable field a
    /// validation error, an unrecognised `action` an unknown action.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_slice(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::Malformed(
                "request must be a JSON object".to_string(),
            ));
        }

        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::Invalid("missing 'action'".to_string()))?
            .to_string();

        let invalid = |e: serde_json::Error| ProtocolError::Invalid(e.to_string());
        match action.as_str() {
            "execute_test" => serde_json::from_value(value)
                .map(Request::ExecuteTest)
                .map_err(invalid),
            "get_logs" => serde_json::from_value(value)
                .map(Request::GetLogs)
                .map_err(invalid),
            "subscribe" => serde_json::from_value(value)
                .map(Request::Subscribe)
                .map_err(invalid),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::ExecuteTest(_) => "execute_test",
            Request::GetLogs(_) => "get_logs",
            Request::Subscribe(_) => "subscribe",
        }
    }
}
