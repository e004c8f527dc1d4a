//! # Connection Manager
//!
//! Owns the device, runs the poller and serializes every controller
//! operation through the request queue.
//!
//! ## Open Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           open()                                        │
//! │                                                                         │
//! │  already open? ──► close first                                          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  device.open(settings) ──✗──► report error, Err(OpenFailed)             │
//! │        │ ✓                                                              │
//! │        ▼                                                                │
//! │  observer = DataStore ──► spawn poller (first cycle immediately)        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  wait: first successful poll │ close() called │ timeout                 │
//! │        │ ✓                          │                 │                 │
//! │        │                            ▼                 ▼                 │
//! │        │                   Err(Cancelled)   close, Err(FirstStatus..)   │
//! │        ▼                                                                │
//! │  start-of-day batch (identifier, clock, units, pumps, grades, nozzles) │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  store.opened = true                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Poller
//! One task per open connection. Each cycle clears the queue, asks every
//! configured pump for its status plus the configuration identifier, and
//! executes the batch; the next cycle starts one poll interval after the
//! previous one finished, so cycles never overlap. `close()` aborts the task
//! outright; an interrupted cycle leaves nothing half-applied because the
//! queue is re-cleared by whoever uses it next.
//!
//! ## Locking
//! - `lifecycle` serializes `open()` and `close()`.
//! - `queue` serializes every batch (poll cycles and device operations).
//!
//! `close()` raises the cancel flag before taking `lifecycle`, so a pending
//! `open()` wait ends promptly instead of running into its timeout.

use pts_core::{DateTimeSettings, ErrorInfo, Order, ResultCode};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionSettings, LinkConfig};
use crate::device::Device;
use crate::error::{LinkError, LinkResult};
use crate::queue::RequestQueue;
use crate::request::{DeviceRequest, PumpAuthorizeData};
use crate::store::DataStore;

// =============================================================================
// Connection State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Link closed.
    Closed,
    /// Device open, waiting for the first status.
    Opening,
    /// Last poll cycle succeeded.
    Connected,
    /// Link open but the last poll cycle failed.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Opening => write!(f, "opening"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives link events (implemented by the terminal UI integration).
pub trait LinkEventEmitter: Send + Sync {
    /// Emits a connection state change.
    fn emit_connection(&self, state: ConnectionState);

    /// Emits an error report.
    fn emit_error(&self, error: &ErrorInfo);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl LinkEventEmitter for NoOpEmitter {
    fn emit_connection(&self, _state: ConnectionState) {}
    fn emit_error(&self, _error: &ErrorInfo) {}
}

// =============================================================================
// Connection Manager
// =============================================================================

struct Inner {
    device: Arc<dyn Device>,
    queue: tokio::sync::Mutex<RequestQueue>,
    lifecycle: tokio::sync::Mutex<()>,
    store: Arc<DataStore>,
    config: RwLock<LinkConfig>,
    emitter: Arc<dyn LinkEventEmitter>,
    first_status: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<ErrorInfo>>,
}

/// Handle to the controller link. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Creates a manager with a no-op event emitter.
    pub fn new(device: Arc<dyn Device>, store: Arc<DataStore>, config: LinkConfig) -> Self {
        Self::with_emitter(device, store, config, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        device: Arc<dyn Device>,
        store: Arc<DataStore>,
        config: LinkConfig,
        emitter: Arc<dyn LinkEventEmitter>,
    ) -> Self {
        let queue = RequestQueue::new(device.clone(), config.polling.request_timeout());
        let (first_status, _) = watch::channel(false);
        let (cancel, _) = watch::channel(false);

        ConnectionManager {
            inner: Arc::new(Inner {
                device,
                queue: tokio::sync::Mutex::new(queue),
                lifecycle: tokio::sync::Mutex::new(()),
                store,
                config: RwLock::new(config),
                emitter,
                first_status,
                cancel,
                poller: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn is_opened(&self) -> bool {
        self.inner.device.is_opened()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.store.connected.snapshot()
    }

    /// Current link configuration.
    pub fn config(&self) -> LinkConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn settings(&self) -> ConnectionSettings {
        self.config().connection
    }

    /// Replaces the connection settings. Takes effect on the next `open()`.
    pub fn set_settings(&self, settings: ConnectionSettings) {
        self.inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .connection = settings;
    }

    /// Most recent error produced by any operation.
    pub fn last_error(&self) -> Option<ErrorInfo> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens the link and waits for the first successful status poll.
    pub async fn open(&self) -> LinkResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.inner.device.is_opened() {
            info!("Link already open, reopening");
            self.shutdown().await;
        }

        self.inner.cancel.send_replace(false);
        self.inner.first_status.send_replace(false);

        let config = self.config();
        info!(url = %config.connection.base_url(), auth = %config.connection.auth, "Opening controller link");

        let result = self.inner.device.open(&config.connection).await;
        if !result.is_success() {
            self.handle_error(result, Vec::new());
            return Err(LinkError::OpenFailed(result));
        }
        self.inner.emitter.emit_connection(ConnectionState::Opening);

        {
            let mut queue = self.inner.queue.lock().await;
            queue.set_request_timeout(config.polling.request_timeout());
            queue.remove_observers();
            queue.register_observer(self.inner.store.clone());
        }

        self.start_poller(config.polling.poll_interval());

        if let Err(e) = self.wait_first_status(config.polling.open_timeout()).await {
            match e {
                LinkError::Cancelled => info!("Open cancelled by close()"),
                _ => {
                    error!(error = %e, "Controller did not answer the first status poll");
                    self.record_error(ErrorInfo::new("", "OPEN_ERROR", e.to_string()));
                }
            }
            self.shutdown().await;
            return Err(e);
        }

        let result = self.refresh_configuration().await;
        if !result.is_success() {
            warn!(code = %result, "Start-of-day data incomplete");
        }

        self.inner.store.opened.set(true);
        info!("Controller link open");
        Ok(())
    }

    /// Closes the link. Never fails.
    pub async fn close(&self) {
        self.inner.cancel.send_replace(true);
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = poller {
            handle.abort();
            debug!("Poller stopped");
        }

        {
            let mut queue = self.inner.queue.lock().await;
            queue.remove_observers();
            let _ = queue.clear();
        }

        self.inner.device.close().await;
        self.inner.first_status.send_replace(false);
        self.inner.store.connected.set_if_changed(false);
        self.inner.store.opened.set_if_changed(false);
        self.inner.emitter.emit_connection(ConnectionState::Closed);
        info!("Controller link closed");
    }

    /// Waits until the poller signals a first status, `close()` is called,
    /// or the timeout elapses.
    async fn wait_first_status(&self, timeout: Duration) -> LinkResult<()> {
        let mut status_rx = self.inner.first_status.subscribe();
        let mut cancel_rx = self.inner.cancel.subscribe();

        let wait = async {
            tokio::select! {
                signaled = wait_flag(&mut status_rx) => {
                    if signaled { Ok(()) } else { Err(LinkError::Cancelled) }
                }
                _ = wait_flag(&mut cancel_rx) => Err(LinkError::Cancelled),
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::FirstStatusTimeout(timeout.as_secs())),
        }
    }

    // =========================================================================
    // Poller
    // =========================================================================

    fn start_poller(&self, interval: Duration) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = ConnectionManager { inner };
                let _ = manager.poll_cycle().await;
                drop(manager);

                tokio::time::sleep(interval).await;
            }
        });

        let previous = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!(interval_ms = interval.as_millis() as u64, "Poller started");
    }

    /// One poll cycle: status of every configured pump plus the
    /// configuration identifier.
    pub async fn poll_cycle(&self) -> ResultCode {
        let store = &self.inner.store;
        let pumps = store.pumps_configuration.snapshot().pump_ids();
        let known_id = (*store.configuration_identifier.snapshot()).clone();

        let (result, failures) = {
            let mut queue = self.inner.queue.lock().await;
            let mut result = queue.clear();
            if result.is_success() {
                for pump in pumps {
                    queue.enqueue(DeviceRequest::PumpGetStatus { pump });
                }
                queue.enqueue(DeviceRequest::GetConfigurationIdentifier);
                result = queue.execute().await;
            }
            (result, queue.failed())
        };

        if result.is_success() {
            if store.connected.set_if_changed(true) {
                info!("Controller connected");
                self.inner.emitter.emit_connection(ConnectionState::Connected);
            }
            self.inner.first_status.send_replace(true);

            let current_id = (*store.configuration_identifier.snapshot()).clone();
            if *store.opened.snapshot() && known_id.is_some() && current_id != known_id {
                info!(
                    old = ?known_id,
                    new = ?current_id,
                    "Configuration identifier changed, reloading configuration"
                );
                let _ = self.refresh_configuration().await;
            }
        } else {
            if store.connected.set_if_changed(false) {
                warn!("Controller disconnected");
                self.inner.emitter.emit_connection(ConnectionState::Disconnected);
            }
            self.handle_error(result, failures);
        }

        result
    }

    // =========================================================================
    // Error Handling
    // =========================================================================

    /// Builds, logs and publishes the `ErrorInfo` for a failed result. A
    /// partial batch failure gets one inner entry per failed request.
    fn handle_error(&self, result: ResultCode, failures: Vec<ErrorInfo>) -> ErrorInfo {
        let mut info = ErrorInfo::from_result(result);
        if result == ResultCode::AtLastOneRequestInSequenceFailed {
            info = info.with_inner(failures);
        }

        error!(code = %result, error = %info, "Controller operation failed");
        self.record_error(info.clone());
        info
    }

    fn record_error(&self, info: ErrorInfo) {
        self.inner.emitter.emit_error(&info);
        *self
            .inner
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    /// Reports an error raised outside the manager (e.g. a rejected order
    /// transition) through the same channel.
    pub fn report_error(&self, info: ErrorInfo) {
        warn!(error = %info, "Reported error");
        self.record_error(info);
    }

    // =========================================================================
    // Device Operations
    // =========================================================================

    /// Runs one batch under the queue lock.
    async fn run_batch(&self, operation: &str, requests: Vec<DeviceRequest>) -> ResultCode {
        if !self.inner.device.is_opened() {
            warn!(operation, "Device is not open");
            return ResultCode::InitError;
        }

        let (result, failures) = {
            let mut queue = self.inner.queue.lock().await;
            let mut result = queue.clear();
            if result.is_success() {
                for request in requests {
                    queue.enqueue(request);
                }
                result = queue.execute().await;
            }
            (result, queue.failed())
        };

        if result.is_success() {
            debug!(operation, "Controller operation succeeded");
        } else {
            self.handle_error(result, failures);
        }
        result
    }

    /// Start-of-day data: configuration identifier, clock, measurement units,
    /// pumps, fuel grades and nozzles.
    pub async fn refresh_configuration(&self) -> ResultCode {
        self.run_batch(
            "refresh_configuration",
            vec![
                DeviceRequest::GetConfigurationIdentifier,
                DeviceRequest::GetDateTime,
                DeviceRequest::GetMeasurementUnits,
                DeviceRequest::GetPumpsConfiguration,
                DeviceRequest::GetFuelGradesConfiguration,
                DeviceRequest::GetPumpNozzlesConfiguration,
            ],
        )
        .await
    }

    /// Controller self-test: supply voltage, CPU temperature, clock,
    /// firmware and measurement units.
    pub async fn run_self_test(&self) -> ResultCode {
        self.run_batch(
            "run_self_test",
            vec![
                DeviceRequest::GetBatteryVoltage,
                DeviceRequest::GetCpuTemperature,
                DeviceRequest::GetDateTime,
                DeviceRequest::GetFirmwareInformation,
                DeviceRequest::GetMeasurementUnits,
            ],
        )
        .await
    }

    /// Authorizes the order's pump and nozzle for the order's dose.
    pub async fn pump_authorize(&self, order: &Order) -> ResultCode {
        if !self.inner.device.is_opened() {
            warn!("pump_authorize: device is not open");
            return ResultCode::InitError;
        }
        let data = match PumpAuthorizeData::from_order(order) {
            Ok(data) => data,
            Err(code) => {
                warn!(order = %order.id, "pump_authorize: pump or nozzle not set");
                return code;
            }
        };
        info!(pump = data.pump, nozzle = data.nozzle, kind = ?data.kind, dose = ?data.dose, "Authorizing pump");
        self.run_batch("pump_authorize", vec![DeviceRequest::PumpAuthorize(data)])
            .await
    }

    pub async fn pump_stop(&self, order: &Order) -> ResultCode {
        match self.order_pump("pump_stop", order) {
            Ok(pump) => self.pump_stop_pump(pump).await,
            Err(code) => code,
        }
    }

    /// Stops a pump by number, without an order.
    pub async fn pump_stop_pump(&self, pump: u32) -> ResultCode {
        info!(pump, "Stopping pump");
        self.run_batch("pump_stop", vec![DeviceRequest::PumpStop { pump }])
            .await
    }

    pub async fn pump_suspend(&self, order: &Order) -> ResultCode {
        match self.order_pump("pump_suspend", order) {
            Ok(pump) => {
                self.run_batch("pump_suspend", vec![DeviceRequest::PumpSuspend { pump }])
                    .await
            }
            Err(code) => code,
        }
    }

    pub async fn pump_resume(&self, order: &Order) -> ResultCode {
        match self.order_pump("pump_resume", order) {
            Ok(pump) => {
                self.run_batch("pump_resume", vec![DeviceRequest::PumpResume { pump }])
                    .await
            }
            Err(code) => code,
        }
    }

    pub async fn pump_get_totals(&self, pump: u32, nozzle: u8) -> ResultCode {
        self.run_batch(
            "pump_get_totals",
            vec![DeviceRequest::PumpGetTotals { pump, nozzle }],
        )
        .await
    }

    pub async fn pump_get_display_data(&self, pump: u32) -> ResultCode {
        self.run_batch(
            "pump_get_display_data",
            vec![DeviceRequest::PumpGetDisplayData { pump }],
        )
        .await
    }

    /// Reads the controller clock into `store.date_time`.
    pub async fn get_date_time(&self) -> ResultCode {
        self.run_batch("get_date_time", vec![DeviceRequest::GetDateTime])
            .await
    }

    pub async fn set_date_time(&self, settings: DateTimeSettings) -> ResultCode {
        let result = self
            .run_batch("set_date_time", vec![DeviceRequest::SetDateTime(settings.clone())])
            .await;
        if result.is_success() {
            self.inner.store.date_time.set(Some(settings));
        }
        result
    }

    /// Reads firmware details into `store.firmware_info`.
    pub async fn get_firmware_information(&self) -> ResultCode {
        self.run_batch(
            "get_firmware_information",
            vec![DeviceRequest::GetFirmwareInformation],
        )
        .await
    }

    /// Pump number of an order, or the code to return instead.
    fn order_pump(&self, operation: &str, order: &Order) -> Result<u32, ResultCode> {
        if !self.inner.device.is_opened() {
            warn!(operation, "Device is not open");
            return Err(ResultCode::InitError);
        }
        order.pump.ok_or_else(|| {
            warn!(operation, order = %order.id, "Order has no pump");
            ResultCode::InputDataIsWrong
        })
    }
}

/// Resolves once the flag is true. Returns false if the sender is gone.
async fn wait_flag(rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *rx.borrow_and_update() {
            return true;
        }
        if rx.changed().await.is_err() {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedController;
    use pts_core::{NozzleItem, PumpStatusReport};
    use rust_decimal::Decimal;

    #[derive(Default)]
    struct RecordingEmitter {
        states: Mutex<Vec<ConnectionState>>,
        errors: Mutex<Vec<ErrorInfo>>,
    }

    impl LinkEventEmitter for RecordingEmitter {
        fn emit_connection(&self, state: ConnectionState) {
            self.states.lock().unwrap().push(state);
        }
        fn emit_error(&self, error: &ErrorInfo) {
            self.errors.lock().unwrap().push(error.clone());
        }
    }

    fn manager_with(sim: Arc<SimulatedController>) -> ConnectionManager {
        ConnectionManager::new(sim, Arc::new(DataStore::new()), LinkConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_loads_start_of_day_data() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());

        manager.open().await.unwrap();

        let store = manager.store();
        assert!(*store.opened.snapshot());
        assert!(*store.connected.snapshot());
        assert_eq!(store.pumps_configuration.snapshot().pumps.len(), 4);
        assert_eq!(store.fuel_grades_configuration.snapshot().fuel_grades.len(), 3);
        assert!(store.date_time.snapshot().is_some());

        let names: Vec<_> = sim.issued().iter().map(|r| r.name()).collect();
        assert_eq!(
            &names[names.len() - 6..],
            &[
                "GetConfigurationIdentifier",
                "GetDateTime",
                "GetMeasurementUnits",
                "GetPumpsConfiguration",
                "GetFuelGradesConfiguration",
                "GetPumpNozzlesConfiguration",
            ]
        );

        manager.close().await;
        assert!(!*store.opened.snapshot());
        assert!(!manager.is_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fails_when_device_refuses() {
        let sim = Arc::new(
            SimulatedController::with_default_site().with_open_result(ResultCode::ConnectionError),
        );
        let manager = manager_with(sim.clone());

        let err = manager.open().await.unwrap_err();
        assert!(matches!(err, LinkError::OpenFailed(ResultCode::ConnectionError)));
        assert!(sim.issued().is_empty());
        assert_eq!(manager.last_error().unwrap().code, "CONNECTION_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_times_out_without_status() {
        let sim = Arc::new(SimulatedController::with_default_site());
        sim.fail_request("GetConfigurationIdentifier", None, ResultCode::ConnectionError);
        let manager = manager_with(sim.clone());

        let err = manager.open().await.unwrap_err();
        assert!(matches!(err, LinkError::FirstStatusTimeout(10)));
        assert!(!manager.is_opened());
        assert!(!*manager.store().opened.snapshot());
        // No start-of-day data was requested
        assert!(sim.issued_named("GetPumpsConfiguration").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_open() {
        let sim = Arc::new(SimulatedController::with_default_site());
        sim.fail_request("GetConfigurationIdentifier", None, ResultCode::ConnectionError);
        let manager = manager_with(sim.clone());

        let opener = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.open().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.close().await;

        let result = opener.await.unwrap();
        assert!(matches!(result, Err(LinkError::Cancelled)));
        assert!(!manager.is_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_decomposes_errors() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let emitter = Arc::new(RecordingEmitter::default());
        let manager = ConnectionManager::with_emitter(
            sim.clone(),
            Arc::new(DataStore::new()),
            LinkConfig::default(),
            emitter.clone(),
        );
        manager.open().await.unwrap();

        sim.fail_request("PumpGetStatus", Some(2), ResultCode::ConnectionError);
        let result = manager.poll_cycle().await;

        assert_eq!(result, ResultCode::AtLastOneRequestInSequenceFailed);
        assert!(!manager.is_connected());

        let info = manager.last_error().unwrap();
        assert_eq!(info.code, "AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR");
        assert_eq!(info.inner.len(), 1);
        assert_eq!(info.inner[0].name, "PumpGetStatus");
        assert!(emitter
            .states
            .lock()
            .unwrap()
            .contains(&ConnectionState::Disconnected));

        // The next clean cycle reconnects
        sim.clear_failures();
        assert_eq!(manager.poll_cycle().await, ResultCode::Success);
        assert!(manager.is_connected());

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_runs_on_fixed_delay() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());
        manager.open().await.unwrap();
        let polls_after_open = sim.issued_named("PumpGetStatus").len();

        tokio::time::sleep(Duration::from_millis(4100)).await;
        let polls = sim.issued_named("PumpGetStatus").len();
        // Two more cycles, four pumps each
        assert_eq!(polls - polls_after_open, 8);

        manager.close().await;
        let stopped_at = sim.issued().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sim.issued().len(), stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_ops_require_open_link() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());

        let order = Order::for_pump(1);
        assert_eq!(manager.pump_authorize(&order).await, ResultCode::InitError);
        assert_eq!(manager.pump_stop(&order).await, ResultCode::InitError);
        assert_eq!(manager.get_date_time().await, ResultCode::InitError);
        assert!(sim.issued().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_ops_validate_order() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());
        manager.open().await.unwrap();
        sim.clear_issued();

        let no_pump = Order::new();
        assert_eq!(manager.pump_stop(&no_pump).await, ResultCode::InputDataIsWrong);
        assert_eq!(manager.pump_suspend(&no_pump).await, ResultCode::InputDataIsWrong);

        let mut no_nozzle = Order::for_pump(1);
        no_nozzle.set_volume(Decimal::new(10, 0));
        assert_eq!(
            manager.pump_authorize(&no_nozzle).await,
            ResultCode::InputDataIsWrong
        );
        assert!(sim.issued_named("PumpAuthorize").is_empty());

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorize_then_fill() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());
        manager.open().await.unwrap();

        let mut order = Order::for_pump(1);
        order.set_nozzle(NozzleItem {
            pump_id: 1,
            nozzle_number: 1,
            fuel_grade: manager.store().nozzle_items_for_pump(1)[0].fuel_grade.clone(),
        });
        order.set_volume(Decimal::new(20, 0));

        assert_eq!(manager.pump_authorize(&order).await, ResultCode::Success);
        assert_eq!(manager.poll_cycle().await, ResultCode::Success);
        assert!(matches!(
            manager.store().latest_status(1),
            Some(PumpStatusReport::Filling(_))
        ));

        assert_eq!(manager.pump_stop_pump(1).await, ResultCode::Success);
        assert_eq!(manager.poll_cycle().await, ResultCode::Success);
        assert!(matches!(
            manager.store().latest_status(1),
            Some(PumpStatusReport::Idle(_))
        ));

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_change_triggers_reload() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());
        manager.open().await.unwrap();
        let loads = sim.issued_named("GetPumpsConfiguration").len();

        sim.set_configuration_identifier("sim-2");
        assert_eq!(manager.poll_cycle().await, ResultCode::Success);

        assert_eq!(sim.issued_named("GetPumpsConfiguration").len(), loads + 1);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_test_and_clock() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim.clone());
        manager.open().await.unwrap();

        assert_eq!(manager.run_self_test().await, ResultCode::Success);
        assert_eq!(*manager.store().battery_voltage.snapshot(), Some(12_600));
        assert!(manager.store().firmware_info.snapshot().is_some());

        let mut clock = (*manager.store().date_time.snapshot()).clone().unwrap();
        clock.utc_offset_minutes = 120;
        assert_eq!(manager.set_date_time(clock).await, ResultCode::Success);
        assert_eq!(manager.get_date_time().await, ResultCode::Success);
        assert_eq!(
            (*manager.store().date_time.snapshot())
                .as_ref()
                .map(|d| d.utc_offset_minutes),
            Some(120)
        );

        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_snapshot() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let manager = manager_with(sim);

        let mut settings = manager.settings();
        settings.host = "10.1.1.1".to_string();
        manager.set_settings(settings);
        assert_eq!(manager.config().connection.host, "10.1.1.1");
    }
}
