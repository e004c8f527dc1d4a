//! # Domain Types
//!
//! Core domain types used throughout the PTS terminal.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Controller configuration          Controller status                    │
//! │  ┌─────────────────┐               ┌──────────────────────┐            │
//! │  │   PumpConfig    │               │  PumpStatusReport    │            │
//! │  │  id, port,      │               │  ├── Idle            │            │
//! │  │  nozzle_count   │               │  ├── Filling         │            │
//! │  ├─────────────────┤               │  ├── EndOfTransaction│            │
//! │  │  PumpNozzles    │──┐            │  └── Offline         │            │
//! │  │  grade per nozzle│ │            └──────────────────────┘            │
//! │  ├─────────────────┤  ├──► NozzleItem (pump, number, grade)            │
//! │  │   FuelGrade     │──┘                                                 │
//! │  │  name, price    │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  Terminal                                                              │
//! │  ┌─────────────────┐               ┌──────────────────────┐            │
//! │  │     Order       │               │  PumpDisplayItem     │            │
//! │  │  pump?, nozzle? │               │  status, dispensed,  │            │
//! │  │  target?        │               │  progress, state     │            │
//! │  │  formed         │               └──────────────────────┘            │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order Targets
//! An order carries at most one target: volume, amount or full tank. The
//! target is an `Option<OrderTarget>`, so "not set" is never confused with a
//! zero dose, and setting one target replaces any other.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Pump Status
// =============================================================================

/// Coarse status of a pump as last reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpStatus {
    Offline,
    Idle,
    NozzleLifted,
    Filling,
    /// Nothing reported yet.
    #[default]
    None,
}

impl fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PumpStatus::Offline => "Offline",
            PumpStatus::Idle => "Idle",
            PumpStatus::NozzleLifted => "Nozzle lifted",
            PumpStatus::Filling => "Filling",
            PumpStatus::None => "-",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Controller Configuration
// =============================================================================

/// One pump as configured on the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    pub id: u32,
    pub port: u32,
    pub address: u32,
    pub nozzle_count: u8,
}

/// The controller's pump table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpsConfiguration {
    pub pumps: Vec<PumpConfig>,
}

impl PumpsConfiguration {
    /// Resolves the single configuration record for a pump.
    ///
    /// Zero matches and more than one match are both failures: a duplicated
    /// pump id means the table cannot be trusted for that pump.
    pub fn find_unique(&self, pump: u32) -> CoreResult<&PumpConfig> {
        let mut matches = self.pumps.iter().filter(|p| p.id == pump);
        match (matches.next(), matches.next()) {
            (Some(config), None) => Ok(config),
            (None, _) => Err(CoreError::PumpNotConfigured { pump }),
            (Some(_), Some(_)) => Err(CoreError::AmbiguousPumpConfiguration { pump }),
        }
    }

    pub fn pump_ids(&self) -> Vec<u32> {
        self.pumps.iter().map(|p| p.id).collect()
    }
}

/// A fuel grade with its current unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelGrade {
    pub id: u32,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelGradesConfiguration {
    pub fuel_grades: Vec<FuelGrade>,
}

impl FuelGradesConfiguration {
    pub fn find(&self, id: u32) -> Option<&FuelGrade> {
        self.fuel_grades.iter().find(|g| g.id == id)
    }
}

/// Fuel grade ids per nozzle of one pump. Index 0 is nozzle 1; id 0 means
/// the nozzle has no grade assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpNozzles {
    pub pump_id: u32,
    pub fuel_grade_ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpNozzlesConfiguration {
    pub pump_nozzles: Vec<PumpNozzles>,
}

/// A selectable nozzle: pump, 1-based nozzle number and bound fuel grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NozzleItem {
    pub pump_id: u32,
    pub nozzle_number: u8,
    pub fuel_grade: FuelGrade,
}

impl NozzleItem {
    /// Builds the nozzle list of one pump by joining its nozzle table with the
    /// fuel grade table. Nozzles without a known grade are skipped.
    pub fn build_for_pump(
        pump: u32,
        nozzles: &PumpNozzlesConfiguration,
        grades: &FuelGradesConfiguration,
    ) -> Vec<NozzleItem> {
        nozzles
            .pump_nozzles
            .iter()
            .filter(|n| n.pump_id == pump)
            .flat_map(|n| n.fuel_grade_ids.iter().enumerate())
            .filter_map(|(index, grade_id)| {
                let grade = grades.find(*grade_id)?;
                let nozzle_number = u8::try_from(index + 1).ok()?;
                Some(NozzleItem {
                    pump_id: pump,
                    nozzle_number,
                    fuel_grade: grade.clone(),
                })
            })
            .collect()
    }
}

// =============================================================================
// Controller Status Reports
// =============================================================================

/// Pump is idle. `nozzle_up` is the lifted nozzle, 0 if none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpIdleStatus {
    pub pump: u32,
    pub nozzle_up: u8,
    pub last_nozzle: u8,
    pub last_volume: Decimal,
    pub last_price: Decimal,
    pub last_amount: Decimal,
    pub last_transaction: u32,
}

/// Pump is dispensing. Volume and amount are the running totals of the
/// current transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpFillingStatus {
    pub pump: u32,
    pub nozzle: u8,
    pub volume: Decimal,
    pub amount: Decimal,
    pub price: Decimal,
    pub transaction: u32,
}

/// Pump finished a transaction that has not been closed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpEndOfTransactionStatus {
    pub pump: u32,
    pub nozzle: u8,
    pub volume: Decimal,
    pub amount: Decimal,
    pub price: Decimal,
    pub transaction: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpOfflineStatus {
    pub pump: u32,
}

/// Electronic totalizer values of one nozzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpTotals {
    pub pump: u32,
    pub nozzle: u8,
    pub volume: Decimal,
    pub amount: Decimal,
    pub transactions: u32,
}

/// What the pump's own display currently shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpDisplayData {
    pub pump: u32,
    pub volume: Decimal,
    pub amount: Decimal,
    pub price: Decimal,
}

/// Any status answer to a `PumpGetStatus` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PumpStatusReport {
    Idle(PumpIdleStatus),
    Filling(PumpFillingStatus),
    EndOfTransaction(PumpEndOfTransactionStatus),
    Offline(PumpOfflineStatus),
}

impl PumpStatusReport {
    pub fn pump(&self) -> u32 {
        match self {
            PumpStatusReport::Idle(s) => s.pump,
            PumpStatusReport::Filling(s) => s.pump,
            PumpStatusReport::EndOfTransaction(s) => s.pump,
            PumpStatusReport::Offline(s) => s.pump,
        }
    }

    /// Coarse status; an idle pump with a lifted nozzle is `NozzleLifted`,
    /// an unclosed transaction counts as idle.
    pub fn status(&self) -> PumpStatus {
        match self {
            PumpStatusReport::Idle(s) if s.nozzle_up > 0 => PumpStatus::NozzleLifted,
            PumpStatusReport::Idle(_) => PumpStatus::Idle,
            PumpStatusReport::Filling(_) => PumpStatus::Filling,
            PumpStatusReport::EndOfTransaction(_) => PumpStatus::Idle,
            PumpStatusReport::Offline(_) => PumpStatus::Offline,
        }
    }
}

// =============================================================================
// Controller Settings
// =============================================================================

/// Controller clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeSettings {
    pub date_time: NaiveDateTime,
    pub auto_synchronize: bool,
    pub utc_offset_minutes: i32,
}

/// Unit names configured on the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementUnits {
    pub volume: String,
    pub temperature: String,
    pub pressure: String,
    pub mass: String,
}

impl Default for MeasurementUnits {
    fn default() -> Self {
        Self {
            volume: "L".to_string(),
            temperature: "C".to_string(),
            pressure: "bar".to_string(),
            mass: "kg".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub version: String,
    pub release_date: String,
}

// =============================================================================
// On / Off Setting Values
// =============================================================================

/// Boolean-like setting value.
///
/// ## Accepted Aliases (case-insensitive)
/// | Input            | Value |
/// |------------------|-------|
/// | `on`, `true`     | On    |
/// | `off`, `false`   | Off   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateOnOff {
    On,
    Off,
}

impl StateOnOff {
    const ALIASES: [(&'static str, StateOnOff); 4] = [
        ("on", StateOnOff::On),
        ("true", StateOnOff::On),
        ("off", StateOnOff::Off),
        ("false", StateOnOff::Off),
    ];

    pub fn is_on(&self) -> bool {
        matches!(self, StateOnOff::On)
    }
}

impl From<bool> for StateOnOff {
    fn from(value: bool) -> Self {
        if value {
            StateOnOff::On
        } else {
            StateOnOff::Off
        }
    }
}

impl FromStr for StateOnOff {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(needle))
            .map(|(_, value)| *value)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "on/off value".to_string(),
                allowed: Self::ALIASES.iter().map(|(a, _)| a.to_string()).collect(),
            })
    }
}

// =============================================================================
// Order
// =============================================================================

/// What the order asks the pump to dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OrderTarget {
    Volume(Decimal),
    Amount(Decimal),
    FullTank,
}

/// A fueling order.
///
/// ## Lifecycle
/// ```text
/// for_pump(3) ──► set_nozzle ──► set_volume / set_amount / set_full_tank
///                                          │
///                                          ▼ authorize
///                                    mark_formed()  (formed = true)
///                                          │
///                                          ▼ pump back to Idle
///                                      removed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub pump: Option<u32>,
    pub nozzle: Option<NozzleItem>,
    pub target: Option<OrderTarget>,
    formed: bool,
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

impl Order {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            pump: None,
            nozzle: None,
            target: None,
            formed: false,
        }
    }

    pub fn for_pump(pump: u32) -> Self {
        let mut order = Self::new();
        order.set_pump(pump);
        order
    }

    // --- pump --------------------------------------------------------------

    pub fn set_pump(&mut self, pump: u32) {
        self.pump = Some(pump);
    }

    pub fn reset_pump(&mut self) {
        self.pump = None;
    }

    pub fn is_pump_set(&self) -> bool {
        self.pump.is_some()
    }

    /// True when the order is bound to exactly this pump.
    pub fn is_for_pump(&self, pump: u32) -> bool {
        self.pump == Some(pump)
    }

    // --- nozzle ------------------------------------------------------------

    pub fn set_nozzle(&mut self, nozzle: NozzleItem) {
        self.nozzle = Some(nozzle);
    }

    pub fn reset_nozzle(&mut self) {
        self.nozzle = None;
    }

    pub fn is_nozzle_set(&self) -> bool {
        self.nozzle.is_some()
    }

    // --- targets -----------------------------------------------------------

    pub fn set_volume(&mut self, volume: Decimal) {
        self.target = Some(OrderTarget::Volume(volume));
    }

    pub fn set_amount(&mut self, amount: Decimal) {
        self.target = Some(OrderTarget::Amount(amount));
    }

    pub fn set_full_tank(&mut self) {
        self.target = Some(OrderTarget::FullTank);
    }

    pub fn volume(&self) -> Option<Decimal> {
        match self.target {
            Some(OrderTarget::Volume(v)) => Some(v),
            _ => None,
        }
    }

    pub fn amount(&self) -> Option<Decimal> {
        match self.target {
            Some(OrderTarget::Amount(a)) => Some(a),
            _ => None,
        }
    }

    pub fn is_volume_set(&self) -> bool {
        matches!(self.target, Some(OrderTarget::Volume(_)))
    }

    pub fn is_amount_set(&self) -> bool {
        matches!(self.target, Some(OrderTarget::Amount(_)))
    }

    pub fn is_full_tank_set(&self) -> bool {
        matches!(self.target, Some(OrderTarget::FullTank))
    }

    pub fn reset_volume(&mut self) {
        if self.is_volume_set() {
            self.target = None;
        }
    }

    pub fn reset_amount(&mut self) {
        if self.is_amount_set() {
            self.target = None;
        }
    }

    pub fn reset_full_tank(&mut self) {
        if self.is_full_tank_set() {
            self.target = None;
        }
    }

    /// Clears whichever target is set.
    pub fn reset_target(&mut self) {
        self.target = None;
    }

    // --- formed ------------------------------------------------------------

    /// Marks the order as authorized.
    ///
    /// Fails unless pump and target are set, so a formed order always
    /// satisfies that invariant.
    pub fn mark_formed(&mut self) -> CoreResult<()> {
        if !self.is_pump_set() {
            return Err(CoreError::OrderIncomplete {
                missing: "pump".to_string(),
            });
        }
        if self.target.is_none() {
            return Err(CoreError::OrderIncomplete {
                missing: "volume, amount or full tank".to_string(),
            });
        }
        self.formed = true;
        Ok(())
    }

    /// True once the controller accepted the order. Only [`Order::mark_formed`]
    /// sets it.
    pub fn is_formed(&self) -> bool {
        self.formed
    }

    pub fn reset_formed(&mut self) {
        self.formed = false;
    }

    /// Returns the order to its blank state, keeping its id.
    pub fn reset(&mut self) {
        self.reset_pump();
        self.reset_nozzle();
        self.reset_target();
        self.reset_formed();
    }

    /// Checks everything authorization needs: pump, nozzle and a target.
    pub fn ensure_ready_for_authorization(&self) -> CoreResult<()> {
        if !self.is_pump_set() {
            return Err(CoreError::PumpNotSelected);
        }
        if !self.is_nozzle_set() {
            return Err(CoreError::OrderIncomplete {
                missing: "nozzle".to_string(),
            });
        }
        if self.target.is_none() {
            return Err(CoreError::OrderIncomplete {
                missing: "volume, amount or full tank".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Pump Display Item
// =============================================================================

/// UI-facing projection of one pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpDisplayItem {
    pub pump_id: u32,
    pub status: PumpStatus,
    /// Nozzle in use or lifted, 0 if none.
    pub nozzle: u8,
    /// Live dispensed volume as a decimal string.
    pub dispensed_volume: String,
    /// Live dispensed amount as a decimal string.
    pub dispensed_amount: String,
    /// Fueling progress, 0..=100.
    pub progress: u8,
    pub last_price: Decimal,
    pub last_volume: Decimal,
    pub last_amount: Decimal,
    /// Name of the pump's order state.
    pub state_name: String,
}

impl PumpDisplayItem {
    pub fn new(pump_id: u32) -> Self {
        Self {
            pump_id,
            status: PumpStatus::None,
            nozzle: 0,
            dispensed_volume: "0".to_string(),
            dispensed_amount: "0".to_string(),
            progress: 0,
            last_price: Decimal::ZERO,
            last_volume: Decimal::ZERO,
            last_amount: Decimal::ZERO,
            state_name: String::new(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn pump(id: u32, nozzles: u8) -> PumpConfig {
        PumpConfig {
            id,
            port: 1,
            address: id,
            nozzle_count: nozzles,
        }
    }

    #[test]
    fn test_find_unique_pump() {
        let config = PumpsConfiguration {
            pumps: vec![pump(1, 2), pump(2, 4), pump(2, 3)],
        };

        assert_eq!(config.find_unique(1).unwrap().nozzle_count, 2);
        assert!(matches!(
            config.find_unique(2),
            Err(CoreError::AmbiguousPumpConfiguration { pump: 2 })
        ));
        assert!(matches!(
            config.find_unique(9),
            Err(CoreError::PumpNotConfigured { pump: 9 })
        ));
    }

    #[test]
    fn test_nozzle_items_join_grades() {
        let grades = FuelGradesConfiguration {
            fuel_grades: vec![
                FuelGrade {
                    id: 1,
                    name: "A95".to_string(),
                    price: dec("1.85"),
                },
                FuelGrade {
                    id: 2,
                    name: "Diesel".to_string(),
                    price: dec("1.62"),
                },
            ],
        };
        let nozzles = PumpNozzlesConfiguration {
            pump_nozzles: vec![
                PumpNozzles {
                    pump_id: 1,
                    fuel_grade_ids: vec![2, 0, 1],
                },
                PumpNozzles {
                    pump_id: 2,
                    fuel_grade_ids: vec![1],
                },
            ],
        };

        let items = NozzleItem::build_for_pump(1, &nozzles, &grades);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].nozzle_number, 1);
        assert_eq!(items[0].fuel_grade.name, "Diesel");
        assert_eq!(items[1].nozzle_number, 3);
        assert_eq!(items[1].fuel_grade.name, "A95");
    }

    #[test]
    fn test_status_report_coarse_status() {
        let idle = PumpStatusReport::Idle(PumpIdleStatus {
            pump: 1,
            nozzle_up: 2,
            last_nozzle: 1,
            last_volume: Decimal::ZERO,
            last_price: Decimal::ZERO,
            last_amount: Decimal::ZERO,
            last_transaction: 0,
        });
        assert_eq!(idle.status(), PumpStatus::NozzleLifted);
        assert_eq!(idle.pump(), 1);

        let offline = PumpStatusReport::Offline(PumpOfflineStatus { pump: 4 });
        assert_eq!(offline.status(), PumpStatus::Offline);
    }

    #[test]
    fn test_state_on_off_aliases() {
        assert_eq!("on".parse::<StateOnOff>().unwrap(), StateOnOff::On);
        assert_eq!("TRUE".parse::<StateOnOff>().unwrap(), StateOnOff::On);
        assert_eq!(" Off ".parse::<StateOnOff>().unwrap(), StateOnOff::Off);
        assert_eq!("false".parse::<StateOnOff>().unwrap(), StateOnOff::Off);
        assert!("yes".parse::<StateOnOff>().is_err());
    }

    #[test]
    fn test_order_targets_are_exclusive() {
        let mut order = Order::for_pump(3);
        order.set_volume(dec("50.00"));
        assert!(order.is_volume_set());

        order.set_amount(dec("20"));
        assert!(!order.is_volume_set());
        assert_eq!(order.amount(), Some(dec("20")));

        // Resetting a target that is not set leaves the other alone
        order.reset_volume();
        assert!(order.is_amount_set());

        order.set_full_tank();
        assert!(order.is_full_tank_set());
        assert_eq!(order.volume(), None);
    }

    #[test]
    fn test_zero_volume_is_still_set() {
        let mut order = Order::for_pump(1);
        order.set_volume(Decimal::ZERO);
        assert!(order.is_volume_set());
    }

    #[test]
    fn test_mark_formed_requires_pump_and_target() {
        let mut order = Order::new();
        assert!(order.mark_formed().is_err());

        order.set_pump(2);
        assert!(order.mark_formed().is_err());
        assert!(!order.is_formed());

        order.set_full_tank();
        order.mark_formed().unwrap();
        assert!(order.is_formed());

        order.reset();
        assert!(!order.is_formed());
        assert!(order.mark_formed().is_err());
    }

    #[test]
    fn test_reset_keeps_id() {
        let mut order = Order::for_pump(2);
        order.set_amount(dec("10"));
        let id = order.id;

        order.reset();
        assert_eq!(order.id, id);
        assert!(!order.is_pump_set());
        assert!(order.target.is_none());
    }
}
