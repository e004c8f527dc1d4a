//! # Device Abstraction
//!
//! The seam between the sync engine and whatever actually reaches the pump
//! controller (an HTTP jsonPTS client, or [`SimulatedController`] in tests
//! and demos).
//!
//! [`SimulatedController`]: crate::simulator::SimulatedController

use async_trait::async_trait;
use pts_core::ResultCode;

use crate::config::ConnectionSettings;
use crate::request::{DeviceRequest, DeviceResponse, RequestFailure};

/// A pump controller reachable through request/response exchanges.
///
/// Implementations must be cheap to share (`Arc<dyn Device>`) and safe to
/// call from the poller task and caller tasks at the same time; the
/// [`RequestQueue`](crate::queue::RequestQueue) never issues two requests
/// concurrently, but `is_opened` may be read from anywhere.
#[async_trait]
pub trait Device: Send + Sync {
    /// Opens the link with the given settings.
    async fn open(&self, settings: &ConnectionSettings) -> ResultCode;

    /// Closes the link. Never fails.
    async fn close(&self);

    fn is_opened(&self) -> bool;

    /// Performs one request.
    async fn execute(&self, request: &DeviceRequest) -> Result<DeviceResponse, RequestFailure>;
}
