//! SDK Error Types

use std::time::Duration;
use thiserror::Error;

/// SDK Result type
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK Error
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Every attempt failed at the transport level
    #[error("Failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SdkError> },

    /// Well-formed error sent by the agent
    #[error("Agent error ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job {job_id} still running after {waited:?}")]
    WaitTimedOut { job_id: String, waited: Duration },
}

impl SdkError {
    /// Transport failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdkError::Connection(_) | SdkError::Timeout(_) | SdkError::MalformedResponse(_)
        )
    }

    /// Error code when the agent answered with an error
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            SdkError::Remote { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SdkError {
    fn from(e: std::io::Error) -> Self {
        SdkError::Connection(e.to_string())
    }
}
