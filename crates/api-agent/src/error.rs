//! Protocol Error Types
//!
//! Maps protocol and application errors to the wire error codes.

use crate::types::ErrorResponse;
use perfagent_core::domain::DomainError;
use perfagent_core::error::AppError;
use thiserror::Error;

/// Wire error codes
pub mod code {
    pub const PROTOCOL_ERROR: &str = "protocol_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const UNKNOWN_ACTION: &str = "unknown_action";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Errors raised before a request reaches the job service
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) | ProtocolError::FrameTooLarge { .. } => {
                code::PROTOCOL_ERROR
            }
            ProtocolError::UnknownAction(_) => code::UNKNOWN_ACTION,
            ProtocolError::Invalid(_) => code::VALIDATION_ERROR,
            ProtocolError::Encode(_) | ProtocolError::Io(_) => code::INTERNAL_ERROR,
        }
    }
}

impl From<&ProtocolError> for ErrorResponse {
    fn from(err: &ProtocolError) -> Self {
        ErrorResponse::new(err.code(), err.to_string())
    }
}

/// Convert AppError to a wire error
pub fn to_error_response(err: &AppError) -> ErrorResponse {
    let code = match err {
        AppError::Validation(_) => code::VALIDATION_ERROR,
        AppError::Domain(DomainError::ValidationError(_)) => code::VALIDATION_ERROR,
        AppError::Domain(DomainError::JobNotFound(_)) | AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Domain(DomainError::InvalidStatusTransition { .. }) | AppError::Conflict(_) => {
            code::CONFLICT
        }
        AppError::Io(_)
        | AppError::Serialization(_)
        | AppError::Config(_)
        | AppError::Execution(_)
        | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorResponse::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_codes() {
        let cases = [
            (AppError::Conflict("dup".into()), code::CONFLICT),
            (AppError::NotFound("x".into()), code::NOT_FOUND),
            (
                AppError::Domain(DomainError::ValidationError("bad".into())),
                code::VALIDATION_ERROR,
            ),
            (AppError::Internal("boom".into()), code::INTERNAL_ERROR),
        ];
        for (err, expected) in cases {
            let response = to_error_response(&err);
            assert_eq!(response.code, expected);
            assert_eq!(response.status, "error");
            assert_eq!(response.error, err.to_string());
        }
    }

    #[test]
    fn test_protocol_error_codes() {
        assert_eq!(
            ProtocolError::FrameTooLarge { limit: 10 }.code(),
            code::PROTOCOL_ERROR
        );
        assert_eq!(
            ProtocolError::UnknownAction("x".into()).code(),
            code::UNKNOWN_ACTION
        );
        assert_eq!(ProtocolError::Invalid("x".into()).code(), code::VALIDATION_ERROR);
    }
}
