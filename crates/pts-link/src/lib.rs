//! # pts-link: Controller Sync Engine for the PTS Terminal
//!
//! This crate keeps a local mirror of a PTS2 fuel-pump controller up to date
//! and funnels every controller operation through one serialized queue.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Controller Link                                 │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 ConnectionManager (orchestrator)                 │  │
//! │  │                                                                  │  │
//! │  │  open() / close() lifecycle, device operations, error reports   │  │
//! │  └──────────────┬──────────────────────────────┬────────────────────┘  │
//! │                 │                              │                        │
//! │                 ▼                              ▼                        │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │ Poller (tokio task)        │  │ RequestQueue                   │    │
//! │  │                            │  │                                │    │
//! │  │ every poll interval:       │─►│ ordered batch, per-request     │    │
//! │  │ status of each pump +      │  │ timeout, failures collected,   │    │
//! │  │ configuration identifier   │  │ successes → observer           │    │
//! │  └────────────────────────────┘  └───────────────┬────────────────┘    │
//! │                                                  │                      │
//! │                                   ┌──────────────▼────────────────┐    │
//! │  ┌────────────────────────────┐   │ DataStore                     │    │
//! │  │ Device (trait)             │   │                               │    │
//! │  │  SimulatedController       │   │ configuration, statuses,      │    │
//! │  │  or a transport impl       │   │ totals, clock, selection      │    │
//! │  └────────────────────────────┘   │ (watch-published snapshots)   │    │
//! │                                   └───────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Connection and polling settings (TOML + env overrides)
//! - [`device`] - The `Device` trait every controller transport implements
//! - [`error`] - Link error types
//! - [`manager`] - `ConnectionManager`: lifecycle, poller, device operations
//! - [`queue`] - `RequestQueue` and the response observer seam
//! - [`request`] - Controller requests, responses and jsonPTS rendering
//! - [`simulator`] - In-process controller for development and tests
//! - [`store`] - `DataStore` of published controller data
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pts_link::{ConnectionManager, DataStore, LinkConfig, SimulatedController};
//! use std::sync::Arc;
//!
//! let config = LinkConfig::load_or_default(None);
//! let device = Arc::new(SimulatedController::with_default_site());
//! let manager = ConnectionManager::new(device, Arc::new(DataStore::new()), config);
//!
//! manager.open().await?;
//! println!("Pumps: {:?}", manager.store().pumps_configuration.snapshot().pump_ids());
//! manager.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod queue;
pub mod request;
pub mod simulator;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    AuthScheme, ConnectionSettings, LinkConfig, PollingSettings, ProtocolSecurity,
    DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT,
};
pub use device::Device;
pub use error::{LinkError, LinkResult};
pub use manager::{ConnectionManager, ConnectionState, LinkEventEmitter, NoOpEmitter};
pub use queue::{QueuedRequest, RequestQueue, ResponseObserver};
pub use request::{DeviceRequest, DeviceResponse, PumpAuthorizeData, RequestFailure};
pub use simulator::SimulatedController;
pub use store::{DataStore, Holder, PumpMap};
