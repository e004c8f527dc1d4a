//! # Error Types
//!
//! Domain-specific error types for pts-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pts-core errors (this file)                                           │
//! │  ├── CoreError        - Order and pump configuration failures          │
//! │  └── ValidationError  - Operator input validation failures             │
//! │                                                                         │
//! │  pts-link errors (separate crate)                                      │
//! │  └── LinkError        - Connection establishment / settings failures   │
//! │                                                                         │
//! │  Terminal API errors (in app)                                          │
//! │  └── ApiError         - What the operator UI sees (serialized)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → Operator UI            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Controller outcomes are NOT errors in this sense: they are
//! [`ResultCode`](crate::result::ResultCode) values returned by every device
//! operation.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Order construction and pump configuration errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation needs an order bound to a pump, and there is none.
    #[error("Select the pump first")]
    PumpNotSelected,

    /// The order under construction belongs to another pump.
    ///
    /// ## When This Occurs
    /// ```text
    /// Pump 1 selected ──► nozzle chosen ──► operator taps pump 2's keypad
    ///                                              │
    ///                                              ▼
    ///                      OrderBoundToOtherPump { expected: 2, actual: 1 }
    /// ```
    #[error("Order under construction belongs to pump {actual}, not pump {expected}")]
    OrderBoundToOtherPump { expected: u32, actual: u32 },

    /// No configuration record exists for the pump.
    #[error("Pump {pump} is not configured")]
    PumpNotConfigured { pump: u32 },

    /// More than one configuration record claims the same pump id.
    ///
    /// Treated exactly like a missing record: the controller's configuration
    /// is inconsistent and the terminal refuses to guess.
    #[error("Pump {pump} has more than one configuration record")]
    AmbiguousPumpConfiguration { pump: u32 },

    /// Nozzle number is outside the pump's configured range.
    #[error("Nozzle {nozzle} is out of range for a pump with {count} nozzles")]
    NozzleOutOfRange { nozzle: i64, count: u8 },

    /// The nozzle number is valid but no nozzle item is loaded for it.
    #[error("The chosen nozzle {nozzle} is not configured")]
    NozzleNotLoaded { nozzle: u8 },

    /// Order cannot be authorized yet.
    #[error("Order is incomplete: {missing} is not set")]
    OrderIncomplete { missing: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., not a number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
