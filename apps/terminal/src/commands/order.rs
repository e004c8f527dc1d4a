//! # Order Commands
//!
//! The operator's path from choosing a pump to a dispensing nozzle.
//!
//! ## Order Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Order Flow                                           │
//! │                                                                         │
//! │  select_pump(3) ──► select_nozzle(3, "2") ──┬─► select_volume(3, "20")  │
//! │       ▲                     ▲               ├─► select_full_tank(3)     │
//! │       │                     │               └─► select_amount(3, "50")  │
//! │       │                     │                          │                │
//! │  deselect_pump(3)     (change nozzle)                  ▼                │
//! │                                                  authorize(3)           │
//! │                                                        │                │
//! │                          board sync: Filling ──► Fueling                │
//! │                                                        │                │
//! │           stop_pump(3) / suspend_pump(3) / resume_pump(3)               │
//! │                                                        │                │
//! │                          board sync: Idle ──► Idle (order closed)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each step is one order state machine transition. A refused step comes
//! back as `TRANSITION_REJECTED` with the reason the state gave.

use pts_core::Order;
use serde::Serialize;
use tracing::{debug, warn};

use super::ensure_success;
use crate::error::ApiError;
use crate::state::{StateData, StateId};
use crate::Terminal;

/// Shown when the operator picks a pump whose nozzle is still hung up.
pub const TAKE_NOZZLE_NOTICE: &str = "Take the nozzle first";

/// The order under construction after a step, ready for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order: Order,

    /// Target as text: "20.00", "Full tank" or empty
    pub value: String,

    /// "L", currency symbol or empty
    pub unit: String,

    /// State of the pump the step was for
    pub state: StateId,

    /// Something the operator should do next
    pub notice: Option<String>,
}

async fn respond(terminal: &Terminal, pump: u32) -> OrderResponse {
    let services = terminal.services();
    let units = services.store().measurement_units.snapshot();
    OrderResponse {
        order: services.orders.constructing_order(),
        value: services.orders.order_value(),
        unit: services.orders.order_unit(&units, &services.settings),
        state: terminal.machine().state_of(pump).await,
        notice: None,
    }
}

async fn step(
    terminal: &Terminal,
    name: &str,
    target: StateId,
    data: StateData,
) -> Result<OrderResponse, ApiError> {
    let pump = data.pump_id;
    match terminal.machine().try_transition(target, &data).await {
        Ok(true) => Ok(respond(terminal, pump).await),
        Ok(false) => {
            warn!(pump, step = name, "Step done, but the previous state did not clean up");
            Ok(respond(terminal, pump).await)
        }
        Err(reason) => Err(ApiError::rejected(name, reason)),
    }
}

/// Selects a pump, releasing the pump selected before it.
///
/// ## Nozzle Must Be Taken
/// With `nozzle_must_be_taken` on, selecting a pump whose nozzle is down
/// still succeeds, but the response carries [`TAKE_NOZZLE_NOTICE`].
pub async fn select_pump(terminal: &Terminal, pump: u32) -> Result<OrderResponse, ApiError> {
    debug!(pump, "select_pump command");
    let services = terminal.services();

    let previous = *services.store().selected_pump.snapshot();
    if let Some(previous) = previous.filter(|p| *p != pump) {
        let released = terminal
            .machine()
            .transition(StateId::PumpNotSelected, &StateData::for_pump(previous))
            .await;
        if !released && services.orders.constructing_order().is_for_pump(previous) {
            // The previous pump moved on (e.g. started fueling) while selected
            debug!(previous, "Dropping order left on previously selected pump");
            services.orders.reset_constructing_for(previous);
            services.store().release_pump(previous);
        }
    }

    let mut response = step(
        terminal,
        "Pump selection",
        StateId::PumpSelected,
        StateData::for_pump(pump),
    )
    .await?;

    let nozzle_up = services.board().item(pump).map_or(0, |item| item.nozzle);
    if services.settings.nozzle_must_be_taken && nozzle_up == 0 {
        response.notice = Some(TAKE_NOZZLE_NOTICE.to_string());
    }
    Ok(response)
}

pub async fn deselect_pump(terminal: &Terminal, pump: u32) -> Result<OrderResponse, ApiError> {
    debug!(pump, "deselect_pump command");
    step(
        terminal,
        "Pump deselection",
        StateId::PumpNotSelected,
        StateData::for_pump(pump),
    )
    .await
}

/// Binds a nozzle, typed as its 1-based number, to the order.
pub async fn select_nozzle(
    terminal: &Terminal,
    pump: u32,
    nozzle: &str,
) -> Result<OrderResponse, ApiError> {
    debug!(pump, nozzle, "select_nozzle command");
    step(
        terminal,
        "Nozzle selection",
        StateId::NozzleSelected,
        StateData::with_text(pump, nozzle),
    )
    .await
}

pub async fn select_volume(
    terminal: &Terminal,
    pump: u32,
    volume: &str,
) -> Result<OrderResponse, ApiError> {
    debug!(pump, volume, "select_volume command");
    step(
        terminal,
        "Volume selection",
        StateId::QuantitySelected,
        StateData::with_text(pump, volume),
    )
    .await
}

pub async fn select_full_tank(terminal: &Terminal, pump: u32) -> Result<OrderResponse, ApiError> {
    debug!(pump, "select_full_tank command");
    step(
        terminal,
        "Full tank selection",
        StateId::QuantitySelected,
        StateData::full_tank(pump),
    )
    .await
}

pub async fn select_amount(
    terminal: &Terminal,
    pump: u32,
    amount: &str,
) -> Result<OrderResponse, ApiError> {
    debug!(pump, amount, "select_amount command");
    step(
        terminal,
        "Amount selection",
        StateId::CurrencySelected,
        StateData::with_text(pump, amount),
    )
    .await
}

/// Sends the order to the controller. On success the order becomes the
/// pump's formed order and the returned order under construction is empty.
pub async fn authorize(terminal: &Terminal, pump: u32) -> Result<OrderResponse, ApiError> {
    debug!(pump, "authorize command");
    step(
        terminal,
        "Authorization",
        StateId::Authorizing,
        StateData::for_pump(pump),
    )
    .await
}

pub async fn stop_pump(terminal: &Terminal, pump: u32) -> Result<OrderResponse, ApiError> {
    debug!(pump, "stop_pump command");
    step(
        terminal,
        "Stop",
        StateId::Stopping,
        StateData::for_pump(pump),
    )
    .await
}

/// Pauses dispensing. Not a state change: the pump stays `Fueling`.
pub async fn suspend_pump(terminal: &Terminal, pump: u32) -> Result<(), ApiError> {
    debug!(pump, "suspend_pump command");
    let order = active_order(terminal, pump);
    ensure_success(terminal.connection().pump_suspend(&order).await)
}

pub async fn resume_pump(terminal: &Terminal, pump: u32) -> Result<(), ApiError> {
    debug!(pump, "resume_pump command");
    let order = active_order(terminal, pump);
    ensure_success(terminal.connection().pump_resume(&order).await)
}

/// The pump's formed order, or a bare one naming just the pump.
fn active_order(terminal: &Terminal, pump: u32) -> Order {
    terminal
        .services()
        .orders
        .formed_order_for_pump(pump)
        .unwrap_or_else(|| Order::for_pump(pump))
}
