//! # Simulated Controller
//!
//! An in-memory pump controller implementing [`Device`]. Used by the
//! terminal binary when no hardware transport is configured, and as the
//! device double in tests.
//!
//! ## Dispensing Model
//! ```text
//!           PumpAuthorize                 every PumpGetStatus
//!  Idle ───────────────────► Filling ──────────────────────────► volume += step
//!   ▲                        │    ▲                                   │
//!   │      PumpStop          │    │ PumpResume                        │ dose reached
//!   ├────────────────────────┤    │                                   ▼
//!   │                        ▼    │                         last report: Filling(dose)
//!   │                     Suspended                          next report: Idle
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failure injection works per request name, optionally narrowed to a pump.
//! Every request is recorded in [`SimulatedController::issued`].

use async_trait::async_trait;
use chrono::Utc;
use pts_core::{
    DateTimeSettings, FirmwareInfo, FuelGrade, FuelGradesConfiguration, MeasurementUnits,
    PumpConfig, PumpDisplayData, PumpFillingStatus, PumpIdleStatus, PumpNozzles,
    PumpNozzlesConfiguration, PumpOfflineStatus, PumpStatusReport, PumpTotals,
    PumpsConfiguration, ResultCode,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::device::Device;
use crate::request::{
    AuthorizeType, DeviceRequest, DeviceResponse, PumpAuthorizeData, RequestFailure,
};

/// Volume dispensed for a full-tank authorization.
const FULL_TANK_VOLUME: i64 = 40;

// =============================================================================
// Simulated State
// =============================================================================

#[derive(Debug, Clone)]
struct Dispense {
    nozzle: u8,
    price: Decimal,
    /// Volume at which the pump stops by itself.
    limit: Decimal,
    volume: Decimal,
    transaction: u32,
}

impl Dispense {
    fn amount(&self) -> Decimal {
        (self.volume * self.price).round_dp(2)
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle { nozzle_up: u8 },
    Filling(Dispense),
    /// Dose reached; reported once more as filling, then idle.
    Completing(Dispense),
    Suspended(Dispense),
    Offline,
}

#[derive(Debug, Clone)]
struct SimPump {
    config: PumpConfig,
    nozzle_grades: Vec<u32>,
    phase: Phase,
    last: Option<Dispense>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    request: String,
    pump: Option<u32>,
    code: ResultCode,
}

struct SimState {
    pumps: Vec<SimPump>,
    grades: Vec<FuelGrade>,
    open_result: ResultCode,
    failures: Vec<FailureRule>,
    latency: Duration,
    issued: Vec<DeviceRequest>,
    configuration_id: String,
    date_time: DateTimeSettings,
    units: MeasurementUnits,
    fill_step: Decimal,
    next_transaction: u32,
    totals: HashMap<(u32, u8), (Decimal, Decimal, u32)>,
}

// =============================================================================
// Simulated Controller
// =============================================================================

pub struct SimulatedController {
    state: Mutex<SimState>,
    opened: AtomicBool,
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedController {
    /// A controller with no pumps and no fuel grades.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                pumps: Vec::new(),
                grades: Vec::new(),
                open_result: ResultCode::Success,
                failures: Vec::new(),
                latency: Duration::ZERO,
                issued: Vec::new(),
                configuration_id: "sim-1".to_string(),
                date_time: DateTimeSettings {
                    date_time: Utc::now().naive_utc(),
                    auto_synchronize: false,
                    utc_offset_minutes: 0,
                },
                units: MeasurementUnits::default(),
                fill_step: Decimal::new(5, 0),
                next_transaction: 1,
                totals: HashMap::new(),
            }),
            opened: AtomicBool::new(false),
        }
    }

    /// Four pumps: 1 and 2 with two nozzles (A95, Diesel), 3 and 4 with three
    /// (A92, A95, Diesel).
    pub fn with_default_site() -> Self {
        Self::new()
            .with_fuel_grade(1, "A92", Decimal::new(172, 2))
            .with_fuel_grade(2, "A95", Decimal::new(185, 2))
            .with_fuel_grade(3, "Diesel", Decimal::new(162, 2))
            .with_pump(1, &[2, 3])
            .with_pump(2, &[2, 3])
            .with_pump(3, &[1, 2, 3])
            .with_pump(4, &[1, 2, 3])
    }

    pub fn with_fuel_grade(self, id: u32, name: &str, price: Decimal) -> Self {
        self.lock().grades.push(FuelGrade {
            id,
            name: name.to_string(),
            price,
        });
        self
    }

    /// Adds a pump whose nozzles dispense the given fuel grades, in order.
    pub fn with_pump(self, id: u32, nozzle_grades: &[u32]) -> Self {
        {
            let mut state = self.lock();
            state.pumps.push(SimPump {
                config: PumpConfig {
                    id,
                    port: 1,
                    address: id,
                    nozzle_count: nozzle_grades.len() as u8,
                },
                nozzle_grades: nozzle_grades.to_vec(),
                phase: Phase::Idle { nozzle_up: 0 },
                last: None,
            });
        }
        self
    }

    /// Adds a second configuration record for an existing pump id.
    pub fn with_duplicate_pump_record(self, id: u32, nozzle_count: u8) -> Self {
        self.lock().pumps.push(SimPump {
            config: PumpConfig {
                id,
                port: 2,
                address: id,
                nozzle_count,
            },
            nozzle_grades: Vec::new(),
            phase: Phase::Offline,
            last: None,
        });
        self
    }

    pub fn with_open_result(self, code: ResultCode) -> Self {
        self.lock().open_result = code;
        self
    }

    // =========================================================================
    // Runtime Controls
    // =========================================================================

    /// Makes every request named `request` (and addressed to `pump`, if
    /// given) fail with `code`.
    pub fn fail_request(&self, request: &str, pump: Option<u32>, code: ResultCode) {
        self.lock().failures.push(FailureRule {
            request: request.to_string(),
            pump,
            code,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Delay applied to every request.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Volume added per status poll while filling.
    pub fn set_fill_step(&self, step: Decimal) {
        self.lock().fill_step = step;
    }

    pub fn set_configuration_identifier(&self, id: &str) {
        self.lock().configuration_id = id.to_string();
    }

    pub fn set_offline(&self, pump: u32, offline: bool) {
        if let Some(p) = self.lock().pumps.iter_mut().find(|p| p.config.id == pump) {
            p.phase = if offline {
                Phase::Offline
            } else {
                Phase::Idle { nozzle_up: 0 }
            };
        }
    }

    pub fn lift_nozzle(&self, pump: u32, nozzle: u8) {
        if let Some(p) = self.lock().pumps.iter_mut().find(|p| p.config.id == pump) {
            if let Phase::Idle { nozzle_up } = &mut p.phase {
                *nozzle_up = nozzle;
            }
        }
    }

    /// Every request received so far, in order.
    pub fn issued(&self) -> Vec<DeviceRequest> {
        self.lock().issued.clone()
    }

    /// Requests received so far with the given name.
    pub fn issued_named(&self, name: &str) -> Vec<DeviceRequest> {
        self.lock()
            .issued
            .iter()
            .filter(|r| r.name() == name)
            .cloned()
            .collect()
    }

    pub fn clear_issued(&self) {
        self.lock().issued.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Request Handling
// =============================================================================

impl SimState {
    fn injected_failure(&self, request: &DeviceRequest) -> Option<RequestFailure> {
        self.failures
            .iter()
            .find(|rule| {
                rule.request == request.name()
                    && (rule.pump.is_none() || rule.pump == request.pump())
            })
            .map(|rule| RequestFailure::new(rule.code, format!("Injected {}", rule.code)))
    }

    fn pump_mut(&mut self, pump: u32) -> Result<&mut SimPump, RequestFailure> {
        self.pumps
            .iter_mut()
            .find(|p| p.config.id == pump)
            .ok_or_else(|| {
                RequestFailure::new(
                    ResultCode::ConfigurationError,
                    format!("Pump {} is not configured", pump),
                )
            })
    }

    fn handle(&mut self, request: &DeviceRequest) -> Result<DeviceResponse, RequestFailure> {
        match request {
            DeviceRequest::PumpGetStatus { pump } => self.status(*pump),
            DeviceRequest::PumpAuthorize(data) => self.authorize(data),
            DeviceRequest::PumpStop { pump } => {
                let p = self.pump_mut(*pump)?;
                match std::mem::replace(&mut p.phase, Phase::Idle { nozzle_up: 0 }) {
                    Phase::Filling(d) | Phase::Completing(d) | Phase::Suspended(d) => {
                        p.last = Some(d.clone());
                        self.book_totals(*pump, &d);
                    }
                    Phase::Offline => p.phase = Phase::Offline,
                    Phase::Idle { .. } => {}
                }
                Ok(DeviceResponse::Ack)
            }
            DeviceRequest::PumpSuspend { pump } => {
                let p = self.pump_mut(*pump)?;
                match std::mem::replace(&mut p.phase, Phase::Offline) {
                    Phase::Filling(d) => {
                        p.phase = Phase::Suspended(d);
                        Ok(DeviceResponse::Ack)
                    }
                    other => {
                        p.phase = other;
                        Err(RequestFailure::new(
                            ResultCode::DeviceRejected,
                            format!("Pump {} is not filling", pump),
                        ))
                    }
                }
            }
            DeviceRequest::PumpResume { pump } => {
                let p = self.pump_mut(*pump)?;
                match std::mem::replace(&mut p.phase, Phase::Offline) {
                    Phase::Suspended(d) => {
                        p.phase = Phase::Filling(d);
                        Ok(DeviceResponse::Ack)
                    }
                    other => {
                        p.phase = other;
                        Err(RequestFailure::new(
                            ResultCode::DeviceRejected,
                            format!("Pump {} is not suspended", pump),
                        ))
                    }
                }
            }
            DeviceRequest::PumpGetTotals { pump, nozzle } => {
                self.pump_mut(*pump)?;
                let (volume, amount, transactions) = self
                    .totals
                    .get(&(*pump, *nozzle))
                    .copied()
                    .unwrap_or((Decimal::ZERO, Decimal::ZERO, 0));
                Ok(DeviceResponse::PumpTotals(PumpTotals {
                    pump: *pump,
                    nozzle: *nozzle,
                    volume,
                    amount,
                    transactions,
                }))
            }
            DeviceRequest::PumpGetDisplayData { pump } => {
                let p = self.pump_mut(*pump)?;
                let shown = match &p.phase {
                    Phase::Filling(d) | Phase::Completing(d) | Phase::Suspended(d) => Some(d),
                    _ => p.last.as_ref(),
                };
                let (volume, amount, price) = shown
                    .map(|d| (d.volume, d.amount(), d.price))
                    .unwrap_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO));
                Ok(DeviceResponse::PumpDisplayData(PumpDisplayData {
                    pump: *pump,
                    volume,
                    amount,
                    price,
                }))
            }
            DeviceRequest::GetConfigurationIdentifier => Ok(
                DeviceResponse::ConfigurationIdentifier(self.configuration_id.clone()),
            ),
            DeviceRequest::GetDateTime => Ok(DeviceResponse::DateTime(self.date_time.clone())),
            DeviceRequest::SetDateTime(settings) => {
                self.date_time = settings.clone();
                Ok(DeviceResponse::Ack)
            }
            DeviceRequest::GetMeasurementUnits => {
                Ok(DeviceResponse::MeasurementUnits(self.units.clone()))
            }
            DeviceRequest::GetPumpsConfiguration => {
                Ok(DeviceResponse::PumpsConfiguration(PumpsConfiguration {
                    pumps: self.pumps.iter().map(|p| p.config.clone()).collect(),
                }))
            }
            DeviceRequest::GetFuelGradesConfiguration => Ok(
                DeviceResponse::FuelGradesConfiguration(FuelGradesConfiguration {
                    fuel_grades: self.grades.clone(),
                }),
            ),
            DeviceRequest::GetPumpNozzlesConfiguration => Ok(
                DeviceResponse::PumpNozzlesConfiguration(PumpNozzlesConfiguration {
                    pump_nozzles: self
                        .pumps
                        .iter()
                        .filter(|p| !p.nozzle_grades.is_empty())
                        .map(|p| PumpNozzles {
                            pump_id: p.config.id,
                            fuel_grade_ids: p.nozzle_grades.clone(),
                        })
                        .collect(),
                }),
            ),
            DeviceRequest::GetFirmwareInformation => {
                Ok(DeviceResponse::FirmwareInformation(FirmwareInfo {
                    version: "SIM-1.0.0".to_string(),
                    release_date: "2024-01-01".to_string(),
                }))
            }
            DeviceRequest::GetBatteryVoltage => Ok(DeviceResponse::BatteryVoltage(12_600)),
            DeviceRequest::GetCpuTemperature => Ok(DeviceResponse::CpuTemperature(41)),
        }
    }

    fn authorize(&mut self, data: &PumpAuthorizeData) -> Result<DeviceResponse, RequestFailure> {
        let transaction = self.next_transaction;
        let grades = self.grades.clone();
        let p = self.pump_mut(data.pump)?;

        if !matches!(p.phase, Phase::Idle { .. }) {
            return Err(RequestFailure::new(
                ResultCode::DeviceRejected,
                format!("Pump {} is busy", data.pump),
            ));
        }

        let grade_id = p
            .nozzle_grades
            .get(usize::from(data.nozzle).wrapping_sub(1))
            .copied()
            .ok_or_else(|| {
                RequestFailure::new(
                    ResultCode::DeviceRejected,
                    format!("Pump {} has no nozzle {}", data.pump, data.nozzle),
                )
            })?;
        let price = grades
            .iter()
            .find(|g| g.id == grade_id)
            .map(|g| g.price)
            .ok_or_else(|| {
                RequestFailure::new(ResultCode::ConfigurationError, "Fuel grade has no price")
            })?;

        let limit = match (data.kind, data.dose) {
            (AuthorizeType::Volume, Some(dose)) => dose,
            (AuthorizeType::Amount, Some(dose)) if price > Decimal::ZERO => {
                (dose / price).round_dp(2)
            }
            _ => Decimal::new(FULL_TANK_VOLUME, 0),
        };

        p.phase = Phase::Filling(Dispense {
            nozzle: data.nozzle,
            price,
            limit,
            volume: Decimal::ZERO,
            transaction,
        });
        self.next_transaction += 1;
        Ok(DeviceResponse::Ack)
    }

    fn status(&mut self, pump: u32) -> Result<DeviceResponse, RequestFailure> {
        let step = self.fill_step;
        let p = self.pump_mut(pump)?;

        let report = match p.phase.clone() {
            Phase::Offline => PumpStatusReport::Offline(PumpOfflineStatus { pump }),
            Phase::Idle { nozzle_up } => {
                let last = p.last.as_ref();
                PumpStatusReport::Idle(PumpIdleStatus {
                    pump,
                    nozzle_up,
                    last_nozzle: last.map(|d| d.nozzle).unwrap_or(0),
                    last_volume: last.map(|d| d.volume).unwrap_or_default(),
                    last_price: last.map(|d| d.price).unwrap_or_default(),
                    last_amount: last.map(|d| d.amount()).unwrap_or_default(),
                    last_transaction: last.map(|d| d.transaction).unwrap_or(0),
                })
            }
            Phase::Completing(d) => {
                p.last = Some(d.clone());
                p.phase = Phase::Idle { nozzle_up: 0 };
                let report = PumpStatusReport::Idle(PumpIdleStatus {
                    pump,
                    nozzle_up: 0,
                    last_nozzle: d.nozzle,
                    last_volume: d.volume,
                    last_price: d.price,
                    last_amount: d.amount(),
                    last_transaction: d.transaction,
                });
                self.book_totals(pump, &d);
                return Ok(DeviceResponse::PumpStatus(report));
            }
            Phase::Filling(mut d) => {
                d.volume = (d.volume + step).min(d.limit);
                let report = filling_report(pump, &d);
                p.phase = if d.volume >= d.limit {
                    debug!(pump, volume = %d.volume, "Simulated dose reached");
                    Phase::Completing(d)
                } else {
                    Phase::Filling(d)
                };
                report
            }
            Phase::Suspended(d) => filling_report(pump, &d),
        };

        Ok(DeviceResponse::PumpStatus(report))
    }

    fn book_totals(&mut self, pump: u32, d: &Dispense) {
        let entry = self
            .totals
            .entry((pump, d.nozzle))
            .or_insert((Decimal::ZERO, Decimal::ZERO, 0));
        entry.0 += d.volume;
        entry.1 += d.amount();
        entry.2 += 1;
    }
}

fn filling_report(pump: u32, d: &Dispense) -> PumpStatusReport {
    PumpStatusReport::Filling(PumpFillingStatus {
        pump,
        nozzle: d.nozzle,
        volume: d.volume,
        amount: d.amount(),
        price: d.price,
        transaction: d.transaction,
    })
}

// =============================================================================
// Device Implementation
// =============================================================================

#[async_trait]
impl Device for SimulatedController {
    async fn open(&self, settings: &ConnectionSettings) -> ResultCode {
        let result = self.lock().open_result;
        debug!(url = %settings.base_url(), %result, "Simulated controller open");
        self.opened.store(result.is_success(), Ordering::Release);
        result
    }

    async fn close(&self) {
        self.opened.store(false, Ordering::Release);
    }

    fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    async fn execute(&self, request: &DeviceRequest) -> Result<DeviceResponse, RequestFailure> {
        let latency = {
            let mut state = self.lock();
            state.issued.push(request.clone());
            state.latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.is_opened() {
            return Err(RequestFailure::new(
                ResultCode::ConnectionError,
                "Controller link is closed",
            ));
        }

        let mut state = self.lock();
        if let Some(failure) = state.injected_failure(request) {
            return Err(failure);
        }
        state.handle(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pts_core::{NozzleItem, Order};

    async fn opened() -> SimulatedController {
        let sim = SimulatedController::with_default_site();
        let _ = sim.open(&ConnectionSettings::default()).await;
        sim
    }

    fn authorize_volume(pump: u32, nozzle: u8, litres: i64) -> DeviceRequest {
        let mut order = Order::for_pump(pump);
        order.set_nozzle(NozzleItem {
            pump_id: pump,
            nozzle_number: nozzle,
            fuel_grade: FuelGrade {
                id: 2,
                name: "A95".to_string(),
                price: Decimal::new(185, 2),
            },
        });
        order.set_volume(Decimal::new(litres, 0));
        DeviceRequest::PumpAuthorize(PumpAuthorizeData::from_order(&order).unwrap())
    }

    async fn status(sim: &SimulatedController, pump: u32) -> PumpStatusReport {
        match sim.execute(&DeviceRequest::PumpGetStatus { pump }).await {
            Ok(DeviceResponse::PumpStatus(report)) => report,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispense_until_dose() {
        let sim = opened().await;
        sim.execute(&authorize_volume(1, 1, 10)).await.unwrap();

        let PumpStatusReport::Filling(first) = status(&sim, 1).await else {
            panic!("expected filling");
        };
        assert_eq!(first.volume, Decimal::new(5, 0));

        let PumpStatusReport::Filling(second) = status(&sim, 1).await else {
            panic!("expected filling");
        };
        assert_eq!(second.volume, Decimal::new(10, 0));

        let PumpStatusReport::Idle(idle) = status(&sim, 1).await else {
            panic!("expected idle");
        };
        assert_eq!(idle.last_volume, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn test_busy_pump_rejects_authorize() {
        let sim = opened().await;
        sim.execute(&authorize_volume(2, 1, 10)).await.unwrap();
        let err = sim.execute(&authorize_volume(2, 1, 10)).await.unwrap_err();
        assert_eq!(err.code, ResultCode::DeviceRejected);
    }

    #[tokio::test]
    async fn test_injected_failure_by_pump() {
        let sim = opened().await;
        sim.fail_request("PumpGetStatus", Some(2), ResultCode::ConnectionError);

        assert!(sim.execute(&DeviceRequest::PumpGetStatus { pump: 1 }).await.is_ok());
        assert!(sim.execute(&DeviceRequest::PumpGetStatus { pump: 2 }).await.is_err());
        assert_eq!(sim.issued_named("PumpGetStatus").len(), 2);
    }

    #[tokio::test]
    async fn test_suspend_resume_stop() {
        let sim = opened().await;
        sim.execute(&authorize_volume(3, 2, 20)).await.unwrap();

        sim.execute(&DeviceRequest::PumpSuspend { pump: 3 }).await.unwrap();
        assert!(sim.execute(&DeviceRequest::PumpSuspend { pump: 3 }).await.is_err());
        sim.execute(&DeviceRequest::PumpResume { pump: 3 }).await.unwrap();
        sim.execute(&DeviceRequest::PumpStop { pump: 3 }).await.unwrap();

        assert!(matches!(status(&sim, 3).await, PumpStatusReport::Idle(_)));
    }

    #[tokio::test]
    async fn test_closed_link_fails_requests() {
        let sim = SimulatedController::with_default_site();
        let err = sim.execute(&DeviceRequest::GetDateTime).await.unwrap_err();
        assert_eq!(err.code, ResultCode::ConnectionError);
    }
}
