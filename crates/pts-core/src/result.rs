//! # Controller Outcomes
//!
//! Every device operation ends in a [`ResultCode`]. `Success` is the only
//! non-error value; everything else carries a wire code and a human
//! description, and batch failures are decomposed into [`ErrorInfo`] trees.
//!
//! ## Batch Failure Decomposition
//! ```text
//! Poll batch: [PumpGetStatus(1), PumpGetStatus(2), GetConfigurationIdentifier]
//!                     ✓                  ✗                    ✓
//!                                        │
//!                                        ▼
//! ErrorInfo {
//!     code: "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR",
//!     inner: [ ErrorInfo { name: "PumpGetStatus", code: "CONNECTION_ERROR", .. } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Result Code
// =============================================================================

/// Outcome of a controller operation or a whole request batch.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    /// The device or the manager is not open.
    InitError,
    /// The order or the arguments are malformed.
    InputDataIsWrong,
    /// One or more requests of an executed batch failed.
    #[serde(rename = "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR")]
    AtLastOneRequestInSequenceFailed,
    /// A single request did not complete within its time bound.
    RequestTimeout,
    /// The transport could not reach the controller.
    ConnectionError,
    /// The controller answered with an error packet.
    DeviceRejected,
    /// The controller's configuration does not allow the request.
    ConfigurationError,
}

impl ResultCode {
    /// Wire code, as reported in `ErrorInfo::code`.
    pub fn code(&self) -> &'static str {
        match self {
            ResultCode::Success => "SUCCESS",
            ResultCode::InitError => "INIT_ERROR",
            ResultCode::InputDataIsWrong => "INPUT_DATA_IS_WRONG",
            ResultCode::AtLastOneRequestInSequenceFailed => {
                "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR"
            }
            ResultCode::RequestTimeout => "REQUEST_TIMEOUT",
            ResultCode::ConnectionError => "CONNECTION_ERROR",
            ResultCode::DeviceRejected => "DEVICE_REJECTED",
            ResultCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// Human description shown to the operator.
    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Success => "Success",
            ResultCode::InitError => "Device is not initialized",
            ResultCode::InputDataIsWrong => "Input data is wrong",
            ResultCode::AtLastOneRequestInSequenceFailed => {
                "At least one request in sequence failed"
            }
            ResultCode::RequestTimeout => "Request timed out",
            ResultCode::ConnectionError => "Connection error",
            ResultCode::DeviceRejected => "Request rejected by the controller",
            ResultCode::ConfigurationError => "Controller configuration error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Error Info
// =============================================================================

/// Diagnostic record for a failed operation.
///
/// `name` identifies the request (`"PumpGetStatus"`, ...) and is empty for
/// the top-level record of a batch. `inner` holds one entry per failed
/// request when the batch failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<ErrorInfo>,
}

impl ErrorInfo {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            message: message.into(),
            inner: Vec::new(),
        }
    }

    /// Top-level record for a result code, without a request name.
    pub fn from_result(code: ResultCode) -> Self {
        Self::new("", code.code(), code.description())
    }

    pub fn with_inner(mut self, inner: Vec<ErrorInfo>) -> Self {
        self.inner = inner;
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}: {}", self.code, self.message)?;
        } else {
            write!(f, "{} {}: {}", self.name, self.code, self.message)?;
        }
        for inner in &self.inner {
            write!(f, "; {}", inner)?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_success() {
        assert!(ResultCode::Success.is_success());
        assert!(!ResultCode::InitError.is_success());
        assert!(!ResultCode::AtLastOneRequestInSequenceFailed.is_success());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(
            ResultCode::AtLastOneRequestInSequenceFailed.code(),
            "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR"
        );
        assert_eq!(ResultCode::InitError.to_string(), "INIT_ERROR");

        let json = serde_json::to_string(&ResultCode::InputDataIsWrong).unwrap();
        assert_eq!(json, "\"INPUT_DATA_IS_WRONG\"");
        let json = serde_json::to_string(&ResultCode::AtLastOneRequestInSequenceFailed).unwrap();
        assert_eq!(json, "\"AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR\"");
    }

    #[test]
    fn test_error_info_display_with_inner() {
        let info = ErrorInfo::from_result(ResultCode::AtLastOneRequestInSequenceFailed)
            .with_inner(vec![ErrorInfo::new(
                "PumpGetStatus",
                "CONNECTION_ERROR",
                "Connection error",
            )]);

        assert_eq!(info.name, "");
        assert_eq!(info.inner.len(), 1);
        assert_eq!(
            info.to_string(),
            "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR: At least one request in sequence failed; \
             PumpGetStatus CONNECTION_ERROR: Connection error"
        );
    }
}
