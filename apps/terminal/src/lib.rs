//! # PTS Terminal Library
//!
//! Core library for the fuel terminal: wires the controller link, the order
//! state machine and the pump board together behind [`Terminal`].
//!
//! ## Module Organization
//! ```text
//! pts_terminal/
//! ├── lib.rs          ◄─── You are here (Terminal, board sync, run)
//! ├── state/
//! │   ├── mod.rs      ◄─── State type exports
//! │   ├── config.rs   ◄─── AppConfig, TerminalSettings
//! │   ├── orders.rs   ◄─── OrderManager (constructing + formed orders)
//! │   ├── board.rs    ◄─── PumpBoard (display items)
//! │   └── machine.rs  ◄─── OrderStateMachine and its states
//! ├── commands/
//! │   ├── mod.rs      ◄─── Command exports
//! │   ├── connection.rs
//! │   ├── device.rs
//! │   ├── order.rs
//! │   └── query.rs
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## Board Sync
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  poller ──► DataStore holders ──changed()──► refresh_board()            │
//! │                                                  │                      │
//! │                        PumpBoard::apply_store ◄──┤                      │
//! │                                                  ▼                      │
//! │                 OrderStateMachine::follow_device(pump, status)          │
//! │                   Filling            ──► Fueling                        │
//! │                   Idle (was fueling) ──► Idle, formed order closed      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod state;

use pts_core::PumpStatus;
use pts_link::{
    ConnectionManager, DataStore, Device, LinkEventEmitter, NoOpEmitter, SimulatedController,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use error::ApiError;
use state::{AppConfig, OrderStateMachine, Services};

/// One operator terminal attached to one controller.
pub struct Terminal {
    machine: OrderStateMachine,
    config: AppConfig,
}

impl Terminal {
    pub fn new(config: AppConfig, device: Arc<dyn Device>) -> Self {
        Self::with_emitter(config, device, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        config: AppConfig,
        device: Arc<dyn Device>,
        emitter: Arc<dyn LinkEventEmitter>,
    ) -> Self {
        let connection = ConnectionManager::with_emitter(
            device,
            Arc::new(DataStore::new()),
            config.link.clone(),
            emitter,
        );
        let services = Arc::new(Services::new(connection, config.terminal.clone()));
        Self {
            machine: OrderStateMachine::new(services),
            config,
        }
    }

    pub fn machine(&self) -> &OrderStateMachine {
        &self.machine
    }

    pub fn services(&self) -> &Arc<Services> {
        self.machine.services()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.services().connection
    }

    pub fn store(&self) -> &Arc<DataStore> {
        self.connection().store()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Projects the store into the pump board, then moves pumps whose
    /// controller status changed their order state.
    pub async fn refresh_board(&self) {
        let services = self.services();
        let statuses: Vec<(u32, PumpStatus)> = {
            let mut board = services.board();
            board.apply_store(services.store(), &services.orders);
            board
                .items()
                .iter()
                .map(|item| (item.pump_id, item.status))
                .collect()
        };

        for (pump, status) in statuses {
            self.machine.follow_device(pump, status).await;
        }
    }

    /// Refreshes the board whenever the pumps configuration or a pump status
    /// changes in the store. Runs until aborted.
    pub fn spawn_board_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let terminal = Arc::clone(self);
        let store = Arc::clone(terminal.store());

        tokio::spawn(async move {
            let mut pumps = store.pumps_configuration.subscribe();
            let mut idle = store.idle_statuses.subscribe();
            let mut filling = store.filling_statuses.subscribe();
            let mut ended = store.end_of_transaction_statuses.subscribe();
            let mut offline = store.offline_statuses.subscribe();

            loop {
                let changed = tokio::select! {
                    r = pumps.changed() => r,
                    r = idle.changed() => r,
                    r = filling.changed() => r,
                    r = ended.changed() => r,
                    r = offline.changed() => r,
                };
                if changed.is_err() {
                    break;
                }
                terminal.refresh_board().await;
            }
        })
    }
}

/// Runs the terminal until Ctrl+C.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Initialize Logging ─── tracing-subscriber, RUST_LOG overrides       │
/// │  2. Load Configuration ─── defaults → terminal.toml → PTS_* env         │
/// │  3. Build Terminal ─────── simulated controller with the default site   │
/// │  4. Open Link ──────────── first status, then start-of-day data         │
/// │  5. Board Sync ─────────── until Ctrl+C, then close the link            │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run() -> Result<(), ApiError> {
    init_tracing();
    info!("Starting PTS terminal");

    let config = AppConfig::load_or_default(None);
    info!(
        url = %config.link.connection.base_url(),
        poll_interval_ms = config.link.polling.poll_interval_ms,
        "Configuration loaded"
    );

    let device = Arc::new(SimulatedController::with_default_site());
    let terminal = Arc::new(Terminal::new(config, device));

    open_with_retry(&terminal).await?;
    terminal.refresh_board().await;
    let sync = terminal.spawn_board_sync();
    info!(pumps = terminal.services().board().items().len(), "Terminal ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl+C");
    }

    info!("Shutting down");
    sync.abort();
    commands::connection::close_connection(&terminal).await;
    Ok(())
}

/// Attempts made to open the link before giving up.
const OPEN_ATTEMPTS: u32 = 3;

async fn open_with_retry(terminal: &Terminal) -> Result<(), ApiError> {
    let mut attempt = 1;
    loop {
        match terminal.connection().open().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < OPEN_ATTEMPTS => {
                warn!(attempt, error = %e, "Opening the controller link failed, retrying");
                tokio::time::sleep(terminal.config().link.polling.poll_interval()).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,pts_core=debug,pts_link=debug,pts_terminal=debug";

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=pts_link=trace` - Trace the controller link only
/// - Default: INFO, DEBUG for the pts crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateId;
    use pts_link::SimulatedController;
    use rust_decimal::Decimal;
    use std::time::Duration;

    #[test]
    fn test_default_log_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_sync_follows_poller() {
        let sim = Arc::new(SimulatedController::with_default_site());
        sim.set_fill_step(Decimal::new(2, 0));
        let terminal = Arc::new(Terminal::new(AppConfig::default(), sim.clone()));
        terminal.connection().open().await.unwrap();
        let sync = terminal.spawn_board_sync();

        commands::order::select_pump(&terminal, 2).await.unwrap();
        commands::order::select_nozzle(&terminal, 2, "2").await.unwrap();
        commands::order::select_amount(&terminal, 2, "50").await.unwrap();
        commands::order::authorize(&terminal, 2).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(terminal.machine().state_of(2).await, StateId::Fueling);
        assert_eq!(
            terminal.services().board().item(2).unwrap().status,
            PumpStatus::Filling
        );

        sync.abort();
        terminal.connection().close().await;
    }
}
