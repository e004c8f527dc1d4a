//! # Device Commands
//!
//! Controller housekeeping: clock, firmware, self-test and counters.
//!
//! Each command runs one batch on the link and answers from the data store,
//! which the batch's responses have just updated.

use pts_core::{DateTimeSettings, FirmwareInfo, MeasurementUnits, PumpDisplayData, PumpTotals};
use serde::Serialize;
use tracing::debug;

use super::ensure_success;
use crate::error::ApiError;
use crate::Terminal;

/// Controller health as read by the self-test.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    /// Supply voltage, millivolts
    pub battery_voltage: Option<u32>,

    /// CPU temperature, degrees Celsius
    pub cpu_temperature: Option<i32>,

    pub date_time: Option<DateTimeSettings>,
    pub firmware: Option<FirmwareInfo>,
    pub measurement_units: MeasurementUnits,
}

fn missing(what: &str) -> ApiError {
    ApiError::internal(format!("Controller answered without {}", what))
}

/// Reads the controller clock.
pub async fn get_date_time(terminal: &Terminal) -> Result<DateTimeSettings, ApiError> {
    debug!("get_date_time command");
    ensure_success(terminal.connection().get_date_time().await)?;
    (*terminal.store().date_time.snapshot())
        .clone()
        .ok_or_else(|| missing("date and time"))
}

/// Sets the controller clock.
pub async fn set_date_time(
    terminal: &Terminal,
    settings: DateTimeSettings,
) -> Result<DateTimeSettings, ApiError> {
    debug!(date_time = %settings.date_time, "set_date_time command");
    ensure_success(terminal.connection().set_date_time(settings.clone()).await)?;
    Ok(settings)
}

pub async fn get_firmware_information(terminal: &Terminal) -> Result<FirmwareInfo, ApiError> {
    debug!("get_firmware_information command");
    ensure_success(terminal.connection().get_firmware_information().await)?;
    (*terminal.store().firmware_info.snapshot())
        .clone()
        .ok_or_else(|| missing("firmware information"))
}

/// Runs the controller self-test.
pub async fn run_self_test(terminal: &Terminal) -> Result<SelfTestReport, ApiError> {
    debug!("run_self_test command");
    ensure_success(terminal.connection().run_self_test().await)?;

    let store = terminal.store();
    Ok(SelfTestReport {
        battery_voltage: *store.battery_voltage.snapshot(),
        cpu_temperature: *store.cpu_temperature.snapshot(),
        date_time: (*store.date_time.snapshot()).clone(),
        firmware: (*store.firmware_info.snapshot()).clone(),
        measurement_units: (*store.measurement_units.snapshot()).clone(),
    })
}

/// Reads the electronic totals of one nozzle.
pub async fn pump_totals(
    terminal: &Terminal,
    pump: u32,
    nozzle: u8,
) -> Result<Vec<PumpTotals>, ApiError> {
    debug!(pump, nozzle, "pump_totals command");
    ensure_success(terminal.connection().pump_get_totals(pump, nozzle).await)?;
    Ok(terminal
        .store()
        .totals
        .snapshot()
        .get(&pump)
        .cloned()
        .unwrap_or_default())
}

/// Reads what the pump's own display shows.
pub async fn pump_display_data(
    terminal: &Terminal,
    pump: u32,
) -> Result<PumpDisplayData, ApiError> {
    debug!(pump, "pump_display_data command");
    ensure_success(terminal.connection().pump_get_display_data(pump).await)?;
    terminal
        .store()
        .display_data
        .snapshot()
        .get(&pump)
        .cloned()
        .ok_or_else(|| missing("display data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::connection::open_connection;
    use crate::error::ErrorCode;
    use crate::state::AppConfig;
    use pts_link::SimulatedController;
    use std::sync::Arc;

    fn terminal() -> Terminal {
        Terminal::new(
            AppConfig::default(),
            Arc::new(SimulatedController::with_default_site()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_open_link() {
        let terminal = terminal();
        let err = get_date_time(&terminal).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_test_and_clock() {
        let terminal = terminal();
        open_connection(&terminal).await.unwrap();

        let report = run_self_test(&terminal).await.unwrap();
        assert_eq!(report.battery_voltage, Some(12_600));
        assert!(report.firmware.is_some());
        assert_eq!(report.measurement_units.volume, "L");

        let mut clock = get_date_time(&terminal).await.unwrap();
        clock.utc_offset_minutes = 300;
        set_date_time(&terminal, clock).await.unwrap();
        assert_eq!(get_date_time(&terminal).await.unwrap().utc_offset_minutes, 300);

        terminal.connection().close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pump_display_data_fails() {
        let terminal = terminal();
        open_connection(&terminal).await.unwrap();

        let err = pump_display_data(&terminal, 42).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ControllerError);

        terminal.connection().close().await;
    }
}
