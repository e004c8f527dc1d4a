//! # Data Store
//!
//! Latest controller-reported data, published through watch channels.
//!
//! ## Holder Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Holder<T>                                     │
//! │                                                                         │
//! │   writer (poller / caller)            readers (UI, terminal)            │
//! │   ────────────────────────            ──────────────────────            │
//! │   set(value)      ─┐                  snapshot() -> Arc<T>              │
//! │   update(|v| ..)  ─┼──► watch<Arc<T>> subscribe() -> Receiver           │
//! │                    │                  version()  -> u64                 │
//! │                    └──► version += 1                                    │
//! │                                                                         │
//! │   Readers only ever see immutable snapshots. An update copies the       │
//! │   current value only while some reader still holds the old snapshot.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`DataStore`] is the queue's [`ResponseObserver`]: every successful
//! response is applied to the matching holder.

use pts_core::{
    DateTimeSettings, FirmwareInfo, FuelGradesConfiguration, MeasurementUnits, NozzleItem,
    PumpDisplayData, PumpEndOfTransactionStatus, PumpFillingStatus, PumpIdleStatus,
    PumpNozzlesConfiguration, PumpOfflineStatus, PumpStatusReport, PumpTotals,
    PumpsConfiguration,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::queue::ResponseObserver;
use crate::request::{DeviceRequest, DeviceResponse};

// =============================================================================
// Holder
// =============================================================================

/// A single published value.
pub struct Holder<T> {
    tx: watch::Sender<Arc<T>>,
    version: AtomicU64,
}

impl<T: Clone> Holder<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self {
            tx,
            version: AtomicU64::new(0),
        }
    }

    /// Current value.
    pub fn snapshot(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    /// Replaces the value wholesale.
    pub fn set(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Mutates the value in place.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(|value| f(Arc::make_mut(value)));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }

    /// Number of changes since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<T: Clone + PartialEq> Holder<T> {
    /// Sets the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        if **self.tx.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: Clone + Default> Default for Holder<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// =============================================================================
// Data Store
// =============================================================================

/// Per-pump map published as one value.
pub type PumpMap<T> = HashMap<u32, T>;

/// Everything the terminal knows about the controller.
#[derive(Default)]
pub struct DataStore {
    // --- configuration ----------------------------------------------------
    pub pumps_configuration: Holder<PumpsConfiguration>,
    pub pump_nozzles_configuration: Holder<PumpNozzlesConfiguration>,
    pub fuel_grades_configuration: Holder<FuelGradesConfiguration>,
    /// Nozzles of the selected pump.
    pub nozzle_items: Holder<Vec<NozzleItem>>,
    pub configuration_identifier: Holder<Option<String>>,

    // --- pump status --------------------------------------------------------
    pub idle_statuses: Holder<PumpMap<PumpIdleStatus>>,
    pub filling_statuses: Holder<PumpMap<PumpFillingStatus>>,
    pub end_of_transaction_statuses: Holder<PumpMap<PumpEndOfTransactionStatus>>,
    pub offline_statuses: Holder<PumpMap<PumpOfflineStatus>>,
    pub totals: Holder<PumpMap<Vec<PumpTotals>>>,
    pub display_data: Holder<PumpMap<PumpDisplayData>>,

    // --- controller --------------------------------------------------------
    pub date_time: Holder<Option<DateTimeSettings>>,
    pub measurement_units: Holder<MeasurementUnits>,
    pub firmware_info: Holder<Option<FirmwareInfo>>,
    /// Millivolts.
    pub battery_voltage: Holder<Option<u32>>,
    /// Degrees Celsius.
    pub cpu_temperature: Holder<Option<i32>>,

    // --- connection --------------------------------------------------------
    pub opened: Holder<bool>,
    pub connected: Holder<bool>,

    // --- operator selection ------------------------------------------------
    pub selected_pump: Holder<Option<u32>>,
    pub selected_nozzle: Holder<Option<u8>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freshest status report for a pump, whatever its kind.
    pub fn latest_status(&self, pump: u32) -> Option<PumpStatusReport> {
        if let Some(s) = self.filling_statuses.snapshot().get(&pump) {
            return Some(PumpStatusReport::Filling(s.clone()));
        }
        if let Some(s) = self.end_of_transaction_statuses.snapshot().get(&pump) {
            return Some(PumpStatusReport::EndOfTransaction(s.clone()));
        }
        if let Some(s) = self.idle_statuses.snapshot().get(&pump) {
            return Some(PumpStatusReport::Idle(s.clone()));
        }
        self.offline_statuses
            .snapshot()
            .get(&pump)
            .map(|s| PumpStatusReport::Offline(s.clone()))
    }

    /// Nozzle items of a pump, built from the loaded nozzle and fuel grade
    /// tables.
    pub fn nozzle_items_for_pump(&self, pump: u32) -> Vec<NozzleItem> {
        NozzleItem::build_for_pump(
            pump,
            &self.pump_nozzles_configuration.snapshot(),
            &self.fuel_grades_configuration.snapshot(),
        )
    }

    /// Records the operator's pump choice and loads its nozzle items.
    pub fn select_pump(&self, pump: Option<u32>) {
        self.selected_pump.set(pump);
        self.selected_nozzle.set(None);
        self.reload_nozzle_items();
    }

    /// Clears the selection if `pump` is the selected pump.
    pub fn release_pump(&self, pump: u32) -> bool {
        if *self.selected_pump.snapshot() == Some(pump) {
            self.select_pump(None);
            true
        } else {
            false
        }
    }

    pub fn select_nozzle(&self, nozzle: Option<u8>) {
        self.selected_nozzle.set(nozzle);
    }

    fn reload_nozzle_items(&self) {
        let items = match *self.selected_pump.snapshot() {
            Some(pump) => self.nozzle_items_for_pump(pump),
            None => Vec::new(),
        };
        self.nozzle_items.set(items);
    }

    /// Stores a status report, dropping the pump from the other status maps
    /// so that exactly one kind of status is current per pump.
    pub fn apply_status(&self, report: PumpStatusReport) {
        let pump = report.pump();

        let is_idle = matches!(report, PumpStatusReport::Idle(_));
        let is_filling = matches!(report, PumpStatusReport::Filling(_));
        let is_eot = matches!(report, PumpStatusReport::EndOfTransaction(_));
        let is_offline = matches!(report, PumpStatusReport::Offline(_));

        if !is_idle && self.idle_statuses.snapshot().contains_key(&pump) {
            self.idle_statuses.update(|m| {
                m.remove(&pump);
            });
        }
        if !is_filling && self.filling_statuses.snapshot().contains_key(&pump) {
            self.filling_statuses.update(|m| {
                m.remove(&pump);
            });
        }
        if !is_eot && self.end_of_transaction_statuses.snapshot().contains_key(&pump) {
            self.end_of_transaction_statuses.update(|m| {
                m.remove(&pump);
            });
        }
        if !is_offline && self.offline_statuses.snapshot().contains_key(&pump) {
            self.offline_statuses.update(|m| {
                m.remove(&pump);
            });
        }

        match report {
            PumpStatusReport::Idle(s) => self.idle_statuses.update(|m| {
                m.insert(pump, s);
            }),
            PumpStatusReport::Filling(s) => self.filling_statuses.update(|m| {
                m.insert(pump, s);
            }),
            PumpStatusReport::EndOfTransaction(s) => {
                self.end_of_transaction_statuses.update(|m| {
                    m.insert(pump, s);
                })
            }
            PumpStatusReport::Offline(s) => self.offline_statuses.update(|m| {
                m.insert(pump, s);
            }),
        }
    }

    /// Applies one successful response.
    pub fn apply_response(&self, response: &DeviceResponse) {
        match response {
            DeviceResponse::Ack => {}
            DeviceResponse::PumpStatus(report) => self.apply_status(report.clone()),
            DeviceResponse::PumpTotals(totals) => {
                let totals = totals.clone();
                self.totals.update(|m| {
                    let entries = m.entry(totals.pump).or_default();
                    entries.retain(|t| t.nozzle != totals.nozzle);
                    entries.push(totals);
                });
            }
            DeviceResponse::PumpDisplayData(data) => {
                let data = data.clone();
                self.display_data.update(|m| {
                    m.insert(data.pump, data);
                });
            }
            DeviceResponse::ConfigurationIdentifier(id) => {
                self.configuration_identifier.set_if_changed(Some(id.clone()));
            }
            DeviceResponse::DateTime(dt) => self.date_time.set(Some(dt.clone())),
            DeviceResponse::MeasurementUnits(units) => self.measurement_units.set(units.clone()),
            DeviceResponse::PumpsConfiguration(config) => {
                debug!(pumps = config.pumps.len(), "Pumps configuration loaded");
                self.pumps_configuration.set(config.clone());
            }
            DeviceResponse::FuelGradesConfiguration(config) => {
                self.fuel_grades_configuration.set(config.clone());
                self.reload_nozzle_items();
            }
            DeviceResponse::PumpNozzlesConfiguration(config) => {
                self.pump_nozzles_configuration.set(config.clone());
                self.reload_nozzle_items();
            }
            DeviceResponse::FirmwareInformation(info) => self.firmware_info.set(Some(info.clone())),
            DeviceResponse::BatteryVoltage(mv) => self.battery_voltage.set(Some(*mv)),
            DeviceResponse::CpuTemperature(c) => self.cpu_temperature.set(Some(*c)),
        }
    }
}

impl ResponseObserver for DataStore {
    fn on_response(&self, _request: &DeviceRequest, response: &DeviceResponse) {
        self.apply_response(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pts_core::{FuelGrade, PumpNozzles};
    use rust_decimal::Decimal;

    fn idle(pump: u32) -> PumpStatusReport {
        PumpStatusReport::Idle(PumpIdleStatus {
            pump,
            nozzle_up: 0,
            last_nozzle: 0,
            last_volume: Decimal::ZERO,
            last_price: Decimal::ZERO,
            last_amount: Decimal::ZERO,
            last_transaction: 0,
        })
    }

    fn filling(pump: u32, volume: i64) -> PumpStatusReport {
        PumpStatusReport::Filling(PumpFillingStatus {
            pump,
            nozzle: 1,
            volume: Decimal::new(volume, 0),
            amount: Decimal::new(volume * 2, 0),
            price: Decimal::new(2, 0),
            transaction: 7,
        })
    }

    #[test]
    fn test_snapshot_is_immutable_copy() {
        let holder = Holder::new(vec![1, 2]);
        let before = holder.snapshot();

        holder.update(|v| v.push(3));

        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*holder.snapshot(), vec![1, 2, 3]);
        assert_eq!(holder.version(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let holder = Holder::new(false);
        let mut rx = holder.subscribe();

        holder.set(true);
        rx.changed().await.unwrap();
        assert!(**rx.borrow());

        assert!(!holder.set_if_changed(true));
        assert_eq!(holder.version(), 1);
    }

    #[test]
    fn test_one_status_kind_per_pump() {
        let store = DataStore::new();
        store.apply_status(idle(1));
        store.apply_status(filling(1, 5));
        store.apply_status(idle(2));

        assert!(matches!(store.latest_status(1), Some(PumpStatusReport::Filling(_))));
        assert!(!store.idle_statuses.snapshot().contains_key(&1));
        assert!(matches!(store.latest_status(2), Some(PumpStatusReport::Idle(_))));
        assert!(store.latest_status(3).is_none());
    }

    #[test]
    fn test_nozzle_items_follow_selection_and_config() {
        let store = DataStore::new();
        store.select_pump(Some(1));
        assert!(store.nozzle_items.snapshot().is_empty());

        store.apply_response(&DeviceResponse::FuelGradesConfiguration(
            FuelGradesConfiguration {
                fuel_grades: vec![FuelGrade {
                    id: 3,
                    name: "Diesel".to_string(),
                    price: Decimal::new(162, 2),
                }],
            },
        ));
        store.apply_response(&DeviceResponse::PumpNozzlesConfiguration(
            PumpNozzlesConfiguration {
                pump_nozzles: vec![PumpNozzles {
                    pump_id: 1,
                    fuel_grade_ids: vec![3, 3],
                }],
            },
        ));

        let items = store.nozzle_items.snapshot();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].nozzle_number, 2);

        store.select_pump(None);
        assert!(store.nozzle_items.snapshot().is_empty());
    }

    #[test]
    fn test_release_pump_only_clears_own_selection() {
        let store = DataStore::new();
        store.select_pump(Some(1));
        store.select_nozzle(Some(2));

        assert!(!store.release_pump(2));
        assert_eq!(*store.selected_pump.snapshot(), Some(1));
        assert_eq!(*store.selected_nozzle.snapshot(), Some(2));

        assert!(store.release_pump(1));
        assert_eq!(*store.selected_pump.snapshot(), None);
        assert_eq!(*store.selected_nozzle.snapshot(), None);
    }

    #[test]
    fn test_configuration_identifier_version_moves_on_change_only() {
        let store = DataStore::new();
        let id = DeviceResponse::ConfigurationIdentifier("abc".to_string());

        store.apply_response(&id);
        store.apply_response(&id);
        assert_eq!(store.configuration_identifier.version(), 1);
        assert_eq!(
            store.configuration_identifier.snapshot().as_deref(),
            Some("abc")
        );
    }
}
