//! # Controller Requests
//!
//! Typed requests the terminal sends to the pump controller and the typed
//! answers it gets back.
//!
//! ## Wire Format (jsonPTS)
//! A batch is a single jsonPTS document; packet ids are 1-based in queue
//! order:
//! ```json
//! {
//!   "Protocol": "jsonPTS",
//!   "Packets": [
//!     { "Id": 1, "Type": "PumpGetStatus", "Data": { "Pump": 1 } },
//!     { "Id": 2, "Type": "GetConfigurationIdentifier" }
//!   ]
//! }
//! ```
//! Transports that speak HTTP to a real controller post this document; the
//! in-memory simulator consumes the typed requests directly.

use pts_core::{
    DateTimeSettings, FirmwareInfo, FuelGradesConfiguration, MeasurementUnits, Order,
    OrderTarget, PumpDisplayData, PumpNozzlesConfiguration, PumpStatusReport, PumpTotals,
    PumpsConfiguration, ResultCode,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

/// Protocol name carried by every jsonPTS document.
pub const JSON_PTS_PROTOCOL: &str = "jsonPTS";

// =============================================================================
// Pump Authorization
// =============================================================================

/// How the dose of an authorization is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthorizeType {
    Volume,
    Amount,
    FullTank,
}

/// How the controller picks the product to dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NozzleSelector {
    Nozzle,
    FuelGrade,
}

/// Payload of a `PumpAuthorize` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpAuthorizeData {
    pub pump: u32,
    pub nozzle: u8,
    pub kind: AuthorizeType,
    /// Volume or amount to dispense; `None` for a full tank.
    pub dose: Option<Decimal>,
    pub auto_close_transaction: bool,
    pub selector: NozzleSelector,
}

impl PumpAuthorizeData {
    /// Builds the payload from an order.
    ///
    /// Pump and nozzle must be set. An order without a target is authorized
    /// as a full tank, matching the controller's own default.
    pub fn from_order(order: &Order) -> Result<Self, ResultCode> {
        let (Some(pump), Some(nozzle)) = (order.pump, order.nozzle.as_ref()) else {
            return Err(ResultCode::InputDataIsWrong);
        };

        let (kind, dose) = match order.target {
            Some(OrderTarget::Volume(v)) => (AuthorizeType::Volume, Some(v)),
            Some(OrderTarget::Amount(a)) => (AuthorizeType::Amount, Some(a)),
            Some(OrderTarget::FullTank) | None => (AuthorizeType::FullTank, None),
        };

        Ok(Self {
            pump,
            nozzle: nozzle.nozzle_number,
            kind,
            dose,
            auto_close_transaction: true,
            selector: NozzleSelector::Nozzle,
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One request in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    PumpGetStatus { pump: u32 },
    PumpAuthorize(PumpAuthorizeData),
    PumpStop { pump: u32 },
    PumpSuspend { pump: u32 },
    PumpResume { pump: u32 },
    PumpGetTotals { pump: u32, nozzle: u8 },
    PumpGetDisplayData { pump: u32 },
    GetConfigurationIdentifier,
    GetDateTime,
    SetDateTime(DateTimeSettings),
    GetMeasurementUnits,
    GetPumpsConfiguration,
    GetFuelGradesConfiguration,
    GetPumpNozzlesConfiguration,
    GetFirmwareInformation,
    GetBatteryVoltage,
    GetCpuTemperature,
}

impl DeviceRequest {
    /// jsonPTS packet type; also the request name in `ErrorInfo`.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceRequest::PumpGetStatus { .. } => "PumpGetStatus",
            DeviceRequest::PumpAuthorize(_) => "PumpAuthorize",
            DeviceRequest::PumpStop { .. } => "PumpStop",
            DeviceRequest::PumpSuspend { .. } => "PumpSuspend",
            DeviceRequest::PumpResume { .. } => "PumpResume",
            DeviceRequest::PumpGetTotals { .. } => "PumpGetTotals",
            DeviceRequest::PumpGetDisplayData { .. } => "PumpGetDisplayData",
            DeviceRequest::GetConfigurationIdentifier => "GetConfigurationIdentifier",
            DeviceRequest::GetDateTime => "GetDateTime",
            DeviceRequest::SetDateTime(_) => "SetDateTime",
            DeviceRequest::GetMeasurementUnits => "GetMeasurementUnits",
            DeviceRequest::GetPumpsConfiguration => "GetPumpsConfiguration",
            DeviceRequest::GetFuelGradesConfiguration => "GetFuelGradesConfiguration",
            DeviceRequest::GetPumpNozzlesConfiguration => "GetPumpNozzlesConfiguration",
            DeviceRequest::GetFirmwareInformation => "GetFirmwareInformation",
            DeviceRequest::GetBatteryVoltage => "GetBatteryVoltage",
            DeviceRequest::GetCpuTemperature => "GetCpuTemperature",
        }
    }

    /// Pump the request addresses, if any.
    pub fn pump(&self) -> Option<u32> {
        match self {
            DeviceRequest::PumpGetStatus { pump }
            | DeviceRequest::PumpStop { pump }
            | DeviceRequest::PumpSuspend { pump }
            | DeviceRequest::PumpResume { pump }
            | DeviceRequest::PumpGetTotals { pump, .. }
            | DeviceRequest::PumpGetDisplayData { pump } => Some(*pump),
            DeviceRequest::PumpAuthorize(data) => Some(data.pump),
            _ => None,
        }
    }

    /// `Data` object of the jsonPTS packet, if the request carries one.
    pub fn packet_data(&self) -> Option<Value> {
        match self {
            DeviceRequest::PumpGetStatus { pump }
            | DeviceRequest::PumpStop { pump }
            | DeviceRequest::PumpSuspend { pump }
            | DeviceRequest::PumpResume { pump }
            | DeviceRequest::PumpGetDisplayData { pump } => Some(json!({ "Pump": pump })),
            DeviceRequest::PumpGetTotals { pump, nozzle } => {
                Some(json!({ "Pump": pump, "Nozzle": nozzle }))
            }
            DeviceRequest::PumpAuthorize(data) => {
                let mut packet = json!({
                    "Pump": data.pump,
                    "Nozzle": data.nozzle,
                    "Type": data.kind,
                    "AutoCloseTransaction": data.auto_close_transaction,
                });
                if let (Some(dose), Some(object)) = (data.dose, packet.as_object_mut()) {
                    object.insert("Dose".to_string(), json!(dose.to_f64()));
                }
                Some(packet)
            }
            DeviceRequest::SetDateTime(settings) => Some(json!({
                "DateTime": settings.date_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "AutoSynchronize": settings.auto_synchronize,
                "UTCOffset": settings.utc_offset_minutes,
            })),
            _ => None,
        }
    }
}

// =============================================================================
// jsonPTS Rendering
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Packet {
    id: usize,
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JsonPtsDocument {
    protocol: &'static str,
    packets: Vec<Packet>,
}

/// Renders a batch as one jsonPTS document.
pub fn render_json_pts<'a, I>(requests: I) -> Value
where
    I: IntoIterator<Item = &'a DeviceRequest>,
{
    let document = JsonPtsDocument {
        protocol: JSON_PTS_PROTOCOL,
        packets: requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| Packet {
                id: i + 1,
                kind: request.name(),
                data: request.packet_data(),
            })
            .collect(),
    };
    serde_json::to_value(document).unwrap_or(Value::Null)
}

// =============================================================================
// Responses
// =============================================================================

/// Typed answer to a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceResponse {
    /// Command accepted, nothing to report.
    Ack,
    PumpStatus(PumpStatusReport),
    PumpTotals(PumpTotals),
    PumpDisplayData(PumpDisplayData),
    ConfigurationIdentifier(String),
    DateTime(DateTimeSettings),
    MeasurementUnits(MeasurementUnits),
    PumpsConfiguration(PumpsConfiguration),
    FuelGradesConfiguration(FuelGradesConfiguration),
    PumpNozzlesConfiguration(PumpNozzlesConfiguration),
    FirmwareInformation(FirmwareInfo),
    /// Millivolts.
    BatteryVoltage(u32),
    /// Degrees Celsius.
    CpuTemperature(i32),
}

/// Why a single request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub code: ResultCode,
    pub message: String,
}

impl RequestFailure {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pts_core::{FuelGrade, NozzleItem};

    fn nozzle(pump: u32, number: u8) -> NozzleItem {
        NozzleItem {
            pump_id: pump,
            nozzle_number: number,
            fuel_grade: FuelGrade {
                id: 1,
                name: "A95".to_string(),
                price: Decimal::new(185, 2),
            },
        }
    }

    #[test]
    fn test_authorize_needs_pump_and_nozzle() {
        let mut order = Order::for_pump(2);
        order.set_volume(Decimal::new(30, 0));
        assert_eq!(
            PumpAuthorizeData::from_order(&order),
            Err(ResultCode::InputDataIsWrong)
        );

        order.set_nozzle(nozzle(2, 1));
        let data = PumpAuthorizeData::from_order(&order).unwrap();
        assert_eq!(data.kind, AuthorizeType::Volume);
        assert_eq!(data.dose, Some(Decimal::new(30, 0)));
        assert!(data.auto_close_transaction);
        assert_eq!(data.selector, NozzleSelector::Nozzle);
    }

    #[test]
    fn test_full_tank_has_no_dose() {
        let mut order = Order::for_pump(1);
        order.set_nozzle(nozzle(1, 2));
        order.set_full_tank();

        let data = PumpAuthorizeData::from_order(&order).unwrap();
        assert_eq!(data.kind, AuthorizeType::FullTank);
        assert_eq!(data.dose, None);
    }

    #[test]
    fn test_render_json_pts_batch() {
        let mut order = Order::for_pump(1);
        order.set_nozzle(nozzle(1, 2));
        order.set_amount(Decimal::new(2050, 2));
        let authorize = PumpAuthorizeData::from_order(&order).unwrap();

        let batch = vec![
            DeviceRequest::PumpGetStatus { pump: 1 },
            DeviceRequest::GetConfigurationIdentifier,
            DeviceRequest::PumpAuthorize(authorize),
        ];
        let doc = render_json_pts(&batch);

        assert_eq!(doc["Protocol"], "jsonPTS");
        assert_eq!(doc["Packets"][0]["Id"], 1);
        assert_eq!(doc["Packets"][0]["Type"], "PumpGetStatus");
        assert_eq!(doc["Packets"][0]["Data"]["Pump"], 1);
        assert!(doc["Packets"][1].get("Data").is_none());
        assert_eq!(doc["Packets"][2]["Data"]["Type"], "Amount");
        assert_eq!(doc["Packets"][2]["Data"]["Dose"], 20.5);
        assert_eq!(doc["Packets"][2]["Data"]["AutoCloseTransaction"], true);
    }

    #[test]
    fn test_request_pump() {
        assert_eq!(DeviceRequest::PumpStop { pump: 4 }.pump(), Some(4));
        assert_eq!(DeviceRequest::GetDateTime.pump(), None);
        assert_eq!(DeviceRequest::GetDateTime.name(), "GetDateTime");
    }
}
