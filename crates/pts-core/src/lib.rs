//! # pts-core: Pure Domain Logic for the PTS Terminal
//!
//! This crate holds everything about fueling orders and pump data that can be
//! expressed without talking to the pump controller.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PTS Terminal Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Operator UI (external collaborator)             │   │
//! │  │    Pumps ──► Nozzles ──► Volume/Amount keypad ──► Authorize     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ commands                               │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          apps/terminal: state machine, orders, pump board       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pts-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  result   │  │ progress  │  │ validation│  │   │
//! │  │   │   Order   │  │ResultCode │  │ safe %    │  │ nozzle #  │  │   │
//! │  │   │   Pump    │  │ ErrorInfo │  │           │  │ ports     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO CONTROLLER • NO TIMERS • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              pts-link (controller sync engine)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (pump configuration, statuses, orders, display items)
//! - [`result`] - Controller outcome codes and `ErrorInfo` diagnostics
//! - [`progress`] - Fueling progress percentage
//! - [`error`] - Domain error types
//! - [`validation`] - Operator input and settings validation
//!
//! ## Example Usage
//!
//! ```rust
//! use pts_core::progress::calculate_progress_safe;
//! use rust_decimal::Decimal;
//!
//! let target = Decimal::new(5000, 2); // 50.00 litres
//! assert_eq!(calculate_progress_safe("25.00", target), 50);
//! assert_eq!(calculate_progress_safe("50.00", target), 100);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod progress;
pub mod result;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use result::{ErrorInfo, ResultCode};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Lowest nozzle number on any pump. Nozzles are numbered from 1.
pub const MIN_NOZZLE_NUMBER: u8 = 1;

/// Upper bound of a fueling progress indicator.
pub const MAX_PROGRESS: u8 = 100;

/// Decimal places used when an order target is shown to the operator.
pub const DISPLAY_SCALE: u32 = 2;
