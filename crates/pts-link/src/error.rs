//! # Link Error Types
//!
//! Error types for connection establishment and settings handling.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Link Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Connection    │  │     Lifecycle           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  OpenFailed     │  │  Cancelled              │ │
//! │  │  ConfigLoad...  │  │  FirstStatus... │  │                         │ │
//! │  │  ConfigSave...  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Individual controller requests never produce a `LinkError`; they end in a
//! [`ResultCode`].

use pts_core::ResultCode;
use thiserror::Error;

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Debug, Error)]
pub enum LinkError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid link configuration.
    #[error("Invalid link configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// The device refused to open.
    #[error("Failed to open controller connection: {} ({})", .0.description(), .0)]
    OpenFailed(ResultCode),

    /// The poller produced no successful status within the open timeout.
    #[error("No status from controller within {0} seconds")]
    FirstStatusTimeout(u64),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The connection was closed while `open()` was waiting.
    #[error("Connection was closed while opening")]
    Cancelled,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for LinkError {
    fn from(err: toml::de::Error) -> Self {
        LinkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for LinkError {
    fn from(err: toml::ser::Error) -> Self {
        LinkError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl LinkError {
    /// Returns true if re-invoking `open()` may succeed without changing
    /// anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::OpenFailed(code) => matches!(
                code,
                ResultCode::ConnectionError | ResultCode::RequestTimeout
            ),
            LinkError::FirstStatusTimeout(_) | LinkError::Cancelled => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LinkError::InvalidConfig(_)
                | LinkError::ConfigLoadFailed(_)
                | LinkError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LinkError::FirstStatusTimeout(10).is_retryable());
        assert!(LinkError::OpenFailed(ResultCode::ConnectionError).is_retryable());

        assert!(!LinkError::OpenFailed(ResultCode::ConfigurationError).is_retryable());
        assert!(!LinkError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LinkError::OpenFailed(ResultCode::ConnectionError);
        assert_eq!(
            err.to_string(),
            "Failed to open controller connection: Connection error (CONNECTION_ERROR)"
        );
        assert!(LinkError::ConfigLoadFailed("x".into()).is_config_error());
    }
}
