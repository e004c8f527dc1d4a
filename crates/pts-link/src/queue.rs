//! # Request Queue
//!
//! Batches typed requests and runs them against a [`Device`] as one unit.
//!
//! ## Batch Execution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Batch Lifecycle                                │
//! │                                                                         │
//! │  clear() ──► enqueue(r1) ──► enqueue(r2) ──► execute()                  │
//! │                                                  │                      │
//! │                    ┌─────────────────────────────┼──────────────┐       │
//! │                    ▼                             ▼              ▼       │
//! │               r1: ok ──► observer       r2: failed        r3: timeout   │
//! │                                          (recorded)        (recorded)   │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │        AT_LAST_ONE_REQUEST_IN_SEQUENCE_FAILED_ERROR + failed() list     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every request runs even when an earlier one failed. Each request is bounded
//! by the queue's request timeout; a request that exceeds it is recorded as
//! `REQUEST_TIMEOUT` and the batch moves on.

use pts_core::{ErrorInfo, ResultCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::device::Device;
use crate::request::{render_json_pts, DeviceRequest, DeviceResponse, RequestFailure};

// =============================================================================
// Response Observer
// =============================================================================

/// Receives every successful response of an executed batch.
pub trait ResponseObserver: Send + Sync {
    fn on_response(&self, request: &DeviceRequest, response: &DeviceResponse);
}

// =============================================================================
// Queued Request
// =============================================================================

/// A request together with the outcome of its last execution.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: DeviceRequest,
    failure: Option<RequestFailure>,
    executed: bool,
}

impl QueuedRequest {
    fn new(request: DeviceRequest) -> Self {
        Self {
            request,
            failure: None,
            executed: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.request.name()
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn is_errored(&self) -> bool {
        self.failure.is_some()
    }

    pub fn error_code(&self) -> Option<ResultCode> {
        self.failure.as_ref().map(|f| f.code)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}

// =============================================================================
// Request Queue
// =============================================================================

pub struct RequestQueue {
    device: Arc<dyn Device>,
    pending: Vec<QueuedRequest>,
    observer: Option<Arc<dyn ResponseObserver>>,
    request_timeout: Duration,
    /// Set while `execute` runs; still set afterwards only if the executing
    /// future was dropped part-way.
    in_flight: bool,
}

impl RequestQueue {
    pub fn new(device: Arc<dyn Device>, request_timeout: Duration) -> Self {
        Self {
            device,
            pending: Vec::new(),
            observer: None,
            request_timeout,
            in_flight: false,
        }
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// Drops every pending request.
    ///
    /// Fails with `INIT_ERROR` when the device is not open, since nothing
    /// queued could be executed anyway.
    pub fn clear(&mut self) -> ResultCode {
        if self.in_flight {
            warn!(
                pending = self.pending.len(),
                "Previous batch was interrupted before completion"
            );
            self.in_flight = false;
        }

        self.pending.clear();

        if !self.device.is_opened() {
            return ResultCode::InitError;
        }
        ResultCode::Success
    }

    pub fn enqueue(&mut self, request: DeviceRequest) {
        self.pending.push(QueuedRequest::new(request));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn requests(&self) -> &[QueuedRequest] {
        &self.pending
    }

    /// Runs every pending request in order.
    ///
    /// Returns `SUCCESS` only if every request succeeded.
    pub async fn execute(&mut self) -> ResultCode {
        if !self.device.is_opened() {
            return ResultCode::InitError;
        }

        self.in_flight = true;
        let mut failed = 0usize;

        for queued in self.pending.iter_mut() {
            let outcome =
                match tokio::time::timeout(self.request_timeout, self.device.execute(&queued.request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RequestFailure::new(
                        ResultCode::RequestTimeout,
                        format!(
                            "No answer within {} ms",
                            self.request_timeout.as_millis()
                        ),
                    )),
                };

            queued.executed = true;
            match outcome {
                Ok(response) => {
                    queued.failure = None;
                    if let Some(observer) = &self.observer {
                        observer.on_response(&queued.request, &response);
                    }
                }
                Err(failure) => {
                    debug!(
                        request = queued.request.name(),
                        pump = ?queued.request.pump(),
                        code = %failure.code,
                        message = %failure.message,
                        "Request failed"
                    );
                    queued.failure = Some(failure);
                    failed += 1;
                }
            }
        }

        self.in_flight = false;

        if failed == 0 {
            ResultCode::Success
        } else {
            ResultCode::AtLastOneRequestInSequenceFailed
        }
    }

    /// `(name, code, message)` of every request that failed in the last
    /// execution, in queue order.
    pub fn failed(&self) -> Vec<ErrorInfo> {
        self.pending
            .iter()
            .filter_map(|q| {
                q.failure
                    .as_ref()
                    .map(|f| ErrorInfo::new(q.name(), f.code.code(), f.message.clone()))
            })
            .collect()
    }

    /// Registers the single observer, replacing any previous one.
    pub fn register_observer(&mut self, observer: Arc<dyn ResponseObserver>) {
        self.observer = Some(observer);
    }

    pub fn remove_observers(&mut self) {
        self.observer = None;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// The pending batch as a jsonPTS document.
    pub fn render_json_pts(&self) -> Value {
        render_json_pts(self.pending.iter().map(|q| &q.request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::simulator::SimulatedController;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    impl ResponseObserver for Recorder {
        fn on_response(&self, request: &DeviceRequest, _response: &DeviceResponse) {
            self.seen.lock().unwrap().push(request.name());
        }
    }

    async fn opened_simulator() -> Arc<SimulatedController> {
        let sim = Arc::new(SimulatedController::with_default_site());
        let _ = sim.open(&ConnectionSettings::default()).await;
        sim
    }

    #[tokio::test]
    async fn test_execute_continues_after_failure() {
        let sim = opened_simulator().await;
        sim.fail_request("PumpGetStatus", Some(2), ResultCode::ConnectionError);

        let mut queue = RequestQueue::new(sim.clone(), Duration::from_secs(1));
        let recorder = Arc::new(Recorder::default());
        queue.register_observer(recorder.clone());

        assert_eq!(queue.clear(), ResultCode::Success);
        queue.enqueue(DeviceRequest::PumpGetStatus { pump: 1 });
        queue.enqueue(DeviceRequest::PumpGetStatus { pump: 2 });
        queue.enqueue(DeviceRequest::GetConfigurationIdentifier);

        let result = queue.execute().await;
        assert_eq!(result, ResultCode::AtLastOneRequestInSequenceFailed);
        assert!(queue.requests().iter().all(|q| q.is_executed()));

        let failed = queue.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "PumpGetStatus");
        assert_eq!(failed[0].code, "CONNECTION_ERROR");
        assert_eq!(queue.requests()[1].error_code(), Some(ResultCode::ConnectionError));

        // Only successful responses reach the observer
        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["PumpGetStatus", "GetConfigurationIdentifier"]);
    }

    #[tokio::test]
    async fn test_clear_requires_open_device() {
        let sim = Arc::new(SimulatedController::with_default_site());
        let mut queue = RequestQueue::new(sim.clone(), Duration::from_secs(1));
        queue.enqueue(DeviceRequest::GetDateTime);

        assert_eq!(queue.clear(), ResultCode::InitError);
        assert!(queue.is_empty());
        assert_eq!(queue.execute().await, ResultCode::InitError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out() {
        let sim = opened_simulator().await;
        sim.set_latency(Duration::from_secs(10));

        let mut queue = RequestQueue::new(sim.clone(), Duration::from_millis(500));
        let _ = queue.clear();
        queue.enqueue(DeviceRequest::GetBatteryVoltage);
        queue.enqueue(DeviceRequest::GetCpuTemperature);

        assert_eq!(
            queue.execute().await,
            ResultCode::AtLastOneRequestInSequenceFailed
        );
        let failed = queue.failed();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|f| f.code == "REQUEST_TIMEOUT"));
    }

    #[tokio::test]
    async fn test_all_success() {
        let sim = opened_simulator().await;
        let mut queue = RequestQueue::new(sim.clone(), Duration::from_secs(1));
        let _ = queue.clear();
        queue.enqueue(DeviceRequest::GetMeasurementUnits);

        assert_eq!(queue.execute().await, ResultCode::Success);
        assert!(queue.failed().is_empty());
        assert_eq!(queue.render_json_pts()["Packets"][0]["Type"], "GetMeasurementUnits");
    }
}
