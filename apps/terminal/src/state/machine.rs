//! # Order State Machine
//!
//! Gates every order-mutating step the operator takes, per pump.
//!
//! ## Transition Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transition(target, data)                                               │
//! │                                                                         │
//! │  target ∈ current.successors()? ──no──► false (nothing happens)         │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  target.on_start(current, data) ──false──► false (state unchanged,      │
//! │        │ true                               on_end never runs)          │
//! │        ▼                                                                │
//! │  current.on_end(target, data)   ──► result of the transition            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  active state = target (always, whatever on_end returned)               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  target.on_entered(current, data)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## States and Successors
//! | State            | May move to                                                      |
//! |------------------|------------------------------------------------------------------|
//! | PumpNotSelected  | Idle, PumpSelected, Fueling, Stopping                            |
//! | PumpSelected     | PumpNotSelected, PumpSelected, NozzleSelected, Idle, Fueling, Stopping |
//! | NozzleSelected   | PumpNotSelected, PumpSelected, NozzleSelected, QuantitySelected, CurrencySelected, Stopping, Idle, Fueling |
//! | QuantitySelected | as NozzleSelected, plus Authorizing                              |
//! | CurrencySelected | as NozzleSelected, plus Authorizing                              |
//! | Authorizing      | Fueling, Idle, Stopping, PumpNotSelected                         |
//! | Fueling          | Idle, Stopping, Fueling                                          |
//! | Stopping         | Idle, Fueling                                                    |
//! | Idle             | any                                                              |
//!
//! Every pump starts in `Idle`. Transitions of all pumps are serialized; the
//! order under construction is shared, so steps that need it fail when it is
//! bound to another pump.
//!
//! ## Error Reporting
//! A state that refuses a step says why through [`Services::reject`]: the
//! reason is logged, published through the link's event emitter and kept so
//! the command that asked can return it.

use async_trait::async_trait;
use pts_core::validation::{parse_nozzle_for_pump, parse_positive_decimal};
use pts_core::{CoreError, CoreResult, ErrorInfo, Order, OrderTarget, PumpStatus, ResultCode};
use pts_link::{ConnectionManager, DataStore};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::board::PumpBoard;
use super::config::TerminalSettings;
use super::orders::OrderManager;

// =============================================================================
// State Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateId {
    PumpNotSelected,
    PumpSelected,
    NozzleSelected,
    /// Volume or full tank chosen.
    QuantitySelected,
    /// Amount chosen.
    CurrencySelected,
    Authorizing,
    Idle,
    Fueling,
    Stopping,
}

impl StateId {
    pub const ALL: [StateId; 9] = [
        StateId::PumpNotSelected,
        StateId::PumpSelected,
        StateId::NozzleSelected,
        StateId::QuantitySelected,
        StateId::CurrencySelected,
        StateId::Authorizing,
        StateId::Idle,
        StateId::Fueling,
        StateId::Stopping,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StateId::PumpNotSelected => "PumpNotSelected",
            StateId::PumpSelected => "PumpSelected",
            StateId::NozzleSelected => "NozzleSelected",
            StateId::QuantitySelected => "QuantitySelected",
            StateId::CurrencySelected => "CurrencySelected",
            StateId::Authorizing => "Authorizing",
            StateId::Idle => "Idle",
            StateId::Fueling => "Fueling",
            StateId::Stopping => "Stopping",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Transition Input
// =============================================================================

/// What the operator supplied with a step.
#[derive(Debug, Clone, Default)]
pub struct StateData {
    pub pump_id: u32,
    /// Keypad text: nozzle number, volume or amount.
    pub text: Option<String>,
    pub full_tank: bool,
}

impl StateData {
    pub fn for_pump(pump_id: u32) -> Self {
        Self {
            pump_id,
            ..Self::default()
        }
    }

    pub fn with_text(pump_id: u32, text: impl Into<String>) -> Self {
        Self {
            pump_id,
            text: Some(text.into()),
            full_tank: false,
        }
    }

    pub fn full_tank(pump_id: u32) -> Self {
        Self {
            pump_id,
            text: None,
            full_tank: true,
        }
    }

    fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Services
// =============================================================================

/// What state handlers act on.
pub struct Services {
    pub connection: ConnectionManager,
    pub orders: OrderManager,
    pub settings: TerminalSettings,
    board: Mutex<PumpBoard>,
    rejection: Mutex<Option<ErrorInfo>>,
}

impl Services {
    pub fn new(connection: ConnectionManager, settings: TerminalSettings) -> Self {
        Self {
            connection,
            orders: OrderManager::new(),
            settings,
            board: Mutex::new(PumpBoard::new()),
            rejection: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<DataStore> {
        self.connection.store()
    }

    /// The pump board. Take it before calling into the order manager,
    /// never the other way round.
    pub fn board(&self) -> MutexGuard<'_, PumpBoard> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuses a step: logs, publishes and keeps the reason.
    pub fn reject(&self, state: StateId, reason: impl fmt::Display) {
        let info = ErrorInfo::new(state.name(), "TRANSITION_REJECTED", reason.to_string());
        self.connection.report_error(info.clone());
        self.keep_rejection(info);
    }

    /// Keeps the reason of a controller failure the link already reported.
    fn device_failed(&self, state: StateId, code: ResultCode) {
        warn!(state = %state, code = %code, "Controller refused the step");
        let info = self
            .connection
            .last_error()
            .map(|info| info.inner.first().cloned().unwrap_or(info))
            .unwrap_or_else(|| ErrorInfo::from_result(code));
        self.keep_rejection(info);
    }

    fn keep_rejection(&self, info: ErrorInfo) {
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    fn take_rejection(&self) -> Option<ErrorInfo> {
        self.rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// The order under construction, if it belongs to `pump`; otherwise the
    /// step is refused.
    fn bound_order(&self, state: StateId, pump: u32) -> Option<Order> {
        let order = self.orders.constructing_order();
        match order.pump {
            Some(bound) if bound == pump => Some(order),
            Some(bound) => {
                self.reject(
                    state,
                    CoreError::OrderBoundToOtherPump {
                        expected: pump,
                        actual: bound,
                    },
                );
                None
            }
            None => {
                self.reject(state, CoreError::PumpNotSelected);
                None
            }
        }
    }
}

// =============================================================================
// State Trait
// =============================================================================

#[async_trait]
pub trait OrderState: Send + Sync {
    fn id(&self) -> StateId;

    /// States this one may hand over to.
    fn successors(&self) -> &'static [StateId];

    /// Runs before the state becomes active. `false` cancels the transition.
    async fn on_start(&self, _from: StateId, _data: &StateData, _services: &Services) -> bool {
        true
    }

    /// Runs on the state being left, after the next state accepted.
    async fn on_end(&self, _to: StateId, _data: &StateData, _services: &Services) -> bool {
        true
    }

    /// Runs once the state is active.
    async fn on_entered(&self, _from: StateId, _data: &StateData, _services: &Services) {}
}

// =============================================================================
// States
// =============================================================================

use StateId::*;

const PUMP_NOT_SELECTED_NEXT: &[StateId] = &[Idle, PumpSelected, Fueling, Stopping];
const PUMP_SELECTED_NEXT: &[StateId] = &[
    PumpNotSelected,
    PumpSelected,
    NozzleSelected,
    Idle,
    Fueling,
    Stopping,
];
const NOZZLE_SELECTED_NEXT: &[StateId] = &[
    PumpNotSelected,
    PumpSelected,
    NozzleSelected,
    QuantitySelected,
    CurrencySelected,
    Stopping,
    Idle,
    Fueling,
];
const TARGET_SELECTED_NEXT: &[StateId] = &[
    PumpNotSelected,
    PumpSelected,
    NozzleSelected,
    QuantitySelected,
    CurrencySelected,
    Authorizing,
    Stopping,
    Idle,
    Fueling,
];
const AUTHORIZING_NEXT: &[StateId] = &[Fueling, Idle, Stopping, PumpNotSelected];
const FUELING_NEXT: &[StateId] = &[Idle, Stopping, Fueling];
const STOPPING_NEXT: &[StateId] = &[Idle, Fueling];

/// Nothing chosen. Entering it drops the pump's order under construction
/// and its selection; another pump's order is left alone.
pub struct PumpNotSelectedState;

#[async_trait]
impl OrderState for PumpNotSelectedState {
    fn id(&self) -> StateId {
        PumpNotSelected
    }

    fn successors(&self) -> &'static [StateId] {
        PUMP_NOT_SELECTED_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        let pump = data.pump_id;
        if services.orders.reset_constructing_for(pump) {
            debug!(pump, "Order under construction dropped");
        }
        services.store().release_pump(pump);
        true
    }
}

/// A pump is chosen; the order under construction is bound to it.
pub struct PumpSelectedState;

#[async_trait]
impl OrderState for PumpSelectedState {
    fn id(&self) -> StateId {
        PumpSelected
    }

    fn successors(&self) -> &'static [StateId] {
        PUMP_SELECTED_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        let pump = data.pump_id;
        if let Err(e) = services
            .store()
            .pumps_configuration
            .snapshot()
            .find_unique(pump)
        {
            services.reject(PumpSelected, e);
            return false;
        }

        match services.orders.constructing_order().pump {
            Some(bound) if bound != pump => {
                services.reject(
                    PumpSelected,
                    CoreError::OrderBoundToOtherPump {
                        expected: pump,
                        actual: bound,
                    },
                );
                return false;
            }
            Some(_) => {}
            None => {
                services.orders.create_constructing_order(pump);
            }
        }

        services.store().select_pump(Some(pump));
        true
    }
}

/// A nozzle of the chosen pump is bound to the order.
pub struct NozzleSelectedState;

#[async_trait]
impl OrderState for NozzleSelectedState {
    fn id(&self) -> StateId {
        NozzleSelected
    }

    fn successors(&self) -> &'static [StateId] {
        NOZZLE_SELECTED_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        let pump = data.pump_id;
        if services.bound_order(NozzleSelected, pump).is_none() {
            return false;
        }

        let store = services.store();
        let configuration = store.pumps_configuration.snapshot();
        let pump_config = match configuration.find_unique(pump) {
            Ok(config) => config,
            Err(e) => {
                services.reject(NozzleSelected, e);
                return false;
            }
        };

        let number = match parse_nozzle_for_pump(data.text(), pump_config) {
            Ok(number) => number,
            Err(e) => {
                services.reject(NozzleSelected, e);
                return false;
            }
        };

        let item = store
            .nozzle_items
            .snapshot()
            .iter()
            .find(|item| item.pump_id == pump && item.nozzle_number == number)
            .cloned();
        let Some(item) = item else {
            services.reject(NozzleSelected, CoreError::NozzleNotLoaded { nozzle: number });
            return false;
        };

        debug!(pump, nozzle = number, grade = %item.fuel_grade.name, "Nozzle selected");
        services
            .orders
            .with_constructing_for(pump, |order| order.set_nozzle(item));
        store.select_nozzle(Some(number));
        true
    }

    async fn on_end(&self, to: StateId, data: &StateData, services: &Services) -> bool {
        let back_to_pump = to == PumpSelected;
        let cleared = services.orders.with_constructing_for(data.pump_id, |order| {
            if back_to_pump {
                order.reset_nozzle();
            }
            order.reset_target();
        });
        if back_to_pump && cleared.is_some() {
            services.store().select_nozzle(None);
        }
        true
    }
}

/// Volume or full tank for the order, from the keypad.
fn requested_quantity(data: &StateData) -> CoreResult<OrderTarget> {
    if data.full_tank {
        return Ok(OrderTarget::FullTank);
    }
    Ok(OrderTarget::Volume(parse_positive_decimal("Volume", data.text())?))
}

fn requested_amount(data: &StateData) -> CoreResult<OrderTarget> {
    Ok(OrderTarget::Amount(parse_positive_decimal("Amount", data.text())?))
}

/// Checks that a target may be chosen for the pump's order.
fn check_target(
    state: StateId,
    data: &StateData,
    services: &Services,
    requested: fn(&StateData) -> CoreResult<OrderTarget>,
) -> bool {
    let Some(order) = services.bound_order(state, data.pump_id) else {
        return false;
    };
    if !order.is_nozzle_set() {
        services.reject(
            state,
            CoreError::OrderIncomplete {
                missing: "nozzle".to_string(),
            },
        );
        return false;
    }
    if let Err(e) = requested(data) {
        services.reject(state, e);
        return false;
    }
    true
}

fn apply_target(
    state: StateId,
    data: &StateData,
    services: &Services,
    requested: fn(&StateData) -> CoreResult<OrderTarget>,
) {
    if let Ok(target) = requested(data) {
        debug!(pump = data.pump_id, state = %state, ?target, "Order target set");
        services
            .orders
            .with_constructing_for(data.pump_id, |order| order.target = Some(target));
    }
}

/// Volume or full tank chosen.
pub struct QuantitySelectedState;

#[async_trait]
impl OrderState for QuantitySelectedState {
    fn id(&self) -> StateId {
        QuantitySelected
    }

    fn successors(&self) -> &'static [StateId] {
        TARGET_SELECTED_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        check_target(QuantitySelected, data, services, requested_quantity)
    }

    async fn on_end(&self, to: StateId, data: &StateData, services: &Services) -> bool {
        if matches!(to, PumpNotSelected | PumpSelected | NozzleSelected) {
            services.orders.with_constructing_for(data.pump_id, |order| {
                order.reset_volume();
                order.reset_full_tank();
            });
        }
        true
    }

    async fn on_entered(&self, _from: StateId, data: &StateData, services: &Services) {
        apply_target(QuantitySelected, data, services, requested_quantity);
    }
}

/// Amount chosen.
pub struct CurrencySelectedState;

#[async_trait]
impl OrderState for CurrencySelectedState {
    fn id(&self) -> StateId {
        CurrencySelected
    }

    fn successors(&self) -> &'static [StateId] {
        TARGET_SELECTED_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        check_target(CurrencySelected, data, services, requested_amount)
    }

    async fn on_end(&self, to: StateId, data: &StateData, services: &Services) -> bool {
        if matches!(to, PumpNotSelected | PumpSelected | NozzleSelected) {
            services
                .orders
                .with_constructing_for(data.pump_id, |order| order.reset_amount());
        }
        true
    }

    async fn on_entered(&self, _from: StateId, data: &StateData, services: &Services) {
        apply_target(CurrencySelected, data, services, requested_amount);
    }
}

/// The order is sent to the controller. On success it becomes the pump's
/// formed order and the terminal is free to build the next one.
pub struct AuthorizingState;

#[async_trait]
impl OrderState for AuthorizingState {
    fn id(&self) -> StateId {
        Authorizing
    }

    fn successors(&self) -> &'static [StateId] {
        AUTHORIZING_NEXT
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        let Some(order) = services.bound_order(Authorizing, data.pump_id) else {
            return false;
        };
        if let Err(e) = order.ensure_ready_for_authorization() {
            services.reject(Authorizing, e);
            return false;
        }

        let code = services.connection.pump_authorize(&order).await;
        if !code.is_success() {
            services.device_failed(Authorizing, code);
            return false;
        }

        if let Err(e) = services.orders.add_formed_order(order) {
            services.reject(Authorizing, e);
            return false;
        }
        services.orders.reset_constructing_for(data.pump_id);
        services.store().release_pump(data.pump_id);
        true
    }
}

/// The pump is dispensing.
pub struct FuelingState;

#[async_trait]
impl OrderState for FuelingState {
    fn id(&self) -> StateId {
        Fueling
    }

    fn successors(&self) -> &'static [StateId] {
        FUELING_NEXT
    }
}

/// Nothing going on at the pump. Entering it closes the pump's formed order.
pub struct IdleState;

#[async_trait]
impl OrderState for IdleState {
    fn id(&self) -> StateId {
        Idle
    }

    fn successors(&self) -> &'static [StateId] {
        &StateId::ALL
    }

    async fn on_start(&self, _from: StateId, data: &StateData, services: &Services) -> bool {
        let mut board = services.board();
        let item = board.item_mut(data.pump_id);
        services.orders.close_order_for_pump(item);
        true
    }
}

/// A stop was sent to the pump.
pub struct StoppingState;

#[async_trait]
impl OrderState for StoppingState {
    fn id(&self) -> StateId {
        Stopping
    }

    fn successors(&self) -> &'static [StateId] {
        STOPPING_NEXT
    }

    async fn on_start(&self, from: StateId, data: &StateData, services: &Services) -> bool {
        let pump = data.pump_id;
        if from == Idle {
            services.reject(Stopping, format!("Pump {} is idle, nothing to stop", pump));
            return false;
        }

        let order = services
            .orders
            .formed_order_for_pump(pump)
            .unwrap_or_else(|| Order::for_pump(pump));

        let code = services.connection.pump_stop(&order).await;
        if !code.is_success() {
            services.device_failed(Stopping, code);
            return false;
        }
        info!(pump, order = %order.id, "Pump stopped");
        true
    }
}

fn default_states() -> Vec<Box<dyn OrderState>> {
    vec![
        Box::new(PumpNotSelectedState),
        Box::new(PumpSelectedState),
        Box::new(NozzleSelectedState),
        Box::new(QuantitySelectedState),
        Box::new(CurrencySelectedState),
        Box::new(AuthorizingState),
        Box::new(FuelingState),
        Box::new(IdleState),
        Box::new(StoppingState),
    ]
}

// =============================================================================
// State Machine
// =============================================================================

pub struct OrderStateMachine {
    services: Arc<Services>,
    states: HashMap<StateId, Box<dyn OrderState>>,
    current: tokio::sync::Mutex<HashMap<u32, StateId>>,
}

impl OrderStateMachine {
    pub fn new(services: Arc<Services>) -> Self {
        Self::with_states(services, default_states())
    }

    /// Builds a machine from explicit state handlers. A later handler for
    /// the same id replaces an earlier one.
    pub fn with_states(services: Arc<Services>, states: Vec<Box<dyn OrderState>>) -> Self {
        Self {
            services,
            states: states.into_iter().map(|s| (s.id(), s)).collect(),
            current: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Active state of a pump. Pumps start in `Idle`.
    pub async fn state_of(&self, pump: u32) -> StateId {
        self.current.lock().await.get(&pump).copied().unwrap_or(Idle)
    }

    /// Moves the pump to `target` following the transition protocol.
    ///
    /// Returns false when the step was refused, or when it went through but
    /// the left state's cleanup reported a problem.
    pub async fn transition(&self, target: StateId, data: &StateData) -> bool {
        matches!(self.try_transition(target, data).await, Ok(true))
    }

    /// Like [`transition`](Self::transition), but a refused step comes back
    /// with the reason a state gave for it.
    ///
    /// `Ok(cleanup_ok)` means the active state moved to `target`.
    pub async fn try_transition(
        &self,
        target: StateId,
        data: &StateData,
    ) -> Result<bool, Option<ErrorInfo>> {
        let pump = data.pump_id;
        let mut current = self.current.lock().await;
        let from = current.get(&pump).copied().unwrap_or(Idle);
        self.services.take_rejection();

        let (Some(from_state), Some(to_state)) = (self.states.get(&from), self.states.get(&target))
        else {
            warn!(pump, from = %from, to = %target, "No handler for state");
            return Err(None);
        };

        if !from_state.successors().contains(&target) {
            warn!(pump, from = %from, to = %target, "Transition not allowed");
            return Err(None);
        }

        if !to_state.on_start(from, data, &self.services).await {
            info!(pump, from = %from, to = %target, "Transition refused");
            return Err(self.services.take_rejection());
        }

        let cleanup_ok = from_state.on_end(target, data, &self.services).await;
        current.insert(pump, target);
        self.services.board().set_state_name(pump, target.name());
        to_state.on_entered(from, data, &self.services).await;

        debug!(pump, from = %from, to = %target, cleanup_ok, "Transition done");
        Ok(cleanup_ok)
    }

    /// Follows what the controller reports: a filling pump is `Fueling`, a
    /// pump that was fueling or stopping and is idle again goes `Idle`.
    pub async fn follow_device(&self, pump: u32, status: PumpStatus) {
        let state = self.state_of(pump).await;
        let target = match (status, state) {
            (PumpStatus::Filling, s) if s != Fueling => Fueling,
            (PumpStatus::Idle | PumpStatus::NozzleLifted, Fueling | Stopping) => Idle,
            _ => return,
        };

        if !self.transition(target, &StateData::for_pump(pump)).await {
            debug!(pump, from = %state, to = %target, status = %status, "Device-driven transition refused");
        }
    }
}
