//! # Terminal Commands Module
//!
//! Everything the operator UI can ask of the terminal.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs         ◄─── You are here (exports)
//! ├── connection.rs  ◄─── Open, close, status of the controller link
//! ├── device.rs      ◄─── Clock, firmware, self-test, totals
//! ├── order.rs       ◄─── Pump/nozzle/target selection, authorize, stop
//! └── query.rs       ◄─── Pump board and order under construction
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Command Flow                                         │
//! │                                                                         │
//! │  Operator UI                                                            │
//! │  ───────────                                                            │
//! │  select_nozzle(&terminal, 3, "2")                                       │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  OrderStateMachine::try_transition(NozzleSelected, data)                │
//! │         │                                                               │
//! │         ├── refused ──► Err(ApiError { code: TRANSITION_REJECTED, .. }) │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Ok(OrderResponse { order, value, unit, state, notice })                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every command takes the [`Terminal`](crate::Terminal) it acts on and
//! returns a serializable DTO or an [`ApiError`](crate::error::ApiError).

pub mod connection;
pub mod device;
pub mod order;
pub mod query;

use pts_core::ResultCode;

use crate::error::ApiError;

/// Turns a controller outcome into a command result.
pub(crate) fn ensure_success(code: ResultCode) -> Result<(), ApiError> {
    if code.is_success() {
        Ok(())
    } else {
        Err(ApiError::from(code))
    }
}
