//! # API Error Type
//!
//! Unified error type for terminal commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Terminal                           │
//! │                                                                         │
//! │  Operator UI                 Rust Backend                               │
//! │  ───────────                 ────────────                               │
//! │                                                                         │
//! │  select_nozzle(3, "4")                                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Link Error? ─── LinkError::OpenFailed(..) ────────┐            │  │
//! │  │         │                                          │            │  │
//! │  │         ▼                                          ▼            │  │
//! │  │  Controller? ─── ResultCode::InitError ───────── ApiError ─────►│  │
//! │  │         │                                          ▲            │  │
//! │  │         ▼                                          │            │  │
//! │  │  Transition refused? ── last reported ErrorInfo ───┘            │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  e.code    = "TRANSITION_REJECTED"                                      │
//! │  e.message = "Nozzle 4 is out of range for a pump with 3 nozzles"       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pts_core::{CoreError, ErrorInfo, ResultCode};
use pts_link::LinkError;
use serde::Serialize;
use thiserror::Error;

/// API error returned from terminal commands.
///
/// ## Serialization
/// This is what the operator UI receives when a command fails:
/// ```json
/// {
///   "code": "NOT_CONNECTED",
///   "message": "INIT_ERROR: Device is not initialized"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code:?}] {message}")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Operator input failed validation
    ValidationError,

    /// The order state machine refused the step
    TransitionRejected,

    /// The controller reported a failure
    ControllerError,

    /// The link is not open
    NotConnected,

    /// Settings are invalid or could not be read/written
    ConfigError,

    /// Anything else
    Internal,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// A refused transition, explained by the error reported while it ran
    /// (if any).
    pub fn rejected(step: &str, reported: Option<ErrorInfo>) -> Self {
        let message = match reported {
            Some(info) if !info.message.is_empty() => info.message,
            _ => format!("{} is not possible now", step),
        };
        ApiError::new(ErrorCode::TransitionRejected, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts controller outcomes to API errors.
impl From<ResultCode> for ApiError {
    fn from(code: ResultCode) -> Self {
        let kind = match code {
            ResultCode::InitError => ErrorCode::NotConnected,
            ResultCode::InputDataIsWrong => ErrorCode::ValidationError,
            _ => ErrorCode::ControllerError,
        };
        ApiError::new(kind, format!("{}: {}", code, code.description()))
    }
}

/// Converts link errors to API errors.
impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        if err.is_config_error() {
            return ApiError::new(ErrorCode::ConfigError, err.to_string());
        }
        match err {
            LinkError::OpenFailed(_) | LinkError::FirstStatusTimeout(_) | LinkError::Cancelled => {
                ApiError::new(ErrorCode::ControllerError, err.to_string())
            }
            other => {
                tracing::error!("Unexpected link error: {}", other);
                ApiError::internal(other.to_string())
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ApiError::validation(e.to_string()),
            CoreError::NozzleOutOfRange { .. } => ApiError::validation(err.to_string()),
            other => ApiError::new(ErrorCode::TransitionRejected, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pts_core::ValidationError;

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(ApiError::from(ResultCode::InitError).code, ErrorCode::NotConnected);
        assert_eq!(
            ApiError::from(ResultCode::InputDataIsWrong).code,
            ErrorCode::ValidationError
        );
        let err = ApiError::from(ResultCode::AtLastOneRequestInSequenceFailed);
        assert_eq!(err.code, ErrorCode::ControllerError);
        assert!(err
            .message
            .starts_with("AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR"));
    }

    #[test]
    fn test_link_error_mapping() {
        let err = ApiError::from(LinkError::InvalidConfig("host must not be empty".into()));
        assert_eq!(err.code, ErrorCode::ConfigError);

        let err = ApiError::from(LinkError::FirstStatusTimeout(10));
        assert_eq!(err.code, ErrorCode::ControllerError);
    }

    #[test]
    fn test_core_error_mapping() {
        let err = ApiError::from(CoreError::Validation(ValidationError::MustBePositive {
            field: "Volume".into(),
        }));
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = ApiError::from(CoreError::PumpNotSelected);
        assert_eq!(err.code, ErrorCode::TransitionRejected);
        assert_eq!(err.message, "Select the pump first");
    }

    #[test]
    fn test_rejected_prefers_reported_message() {
        let info = ErrorInfo::new("", "NOZZLE_NOT_LOADED", "The chosen nozzle 2 is not configured");
        let err = ApiError::rejected("Nozzle selection", Some(info));
        assert_eq!(err.message, "The chosen nozzle 2 is not configured");

        let err = ApiError::rejected("Nozzle selection", None);
        assert_eq!(err.message, "Nozzle selection is not possible now");
    }

    #[test]
    fn test_serializes_code_screaming_snake() {
        let json = serde_json::to_value(ApiError::from(ResultCode::InitError)).unwrap();
        assert_eq!(json["code"], "NOT_CONNECTED");
    }
}
