//! # Connection Commands
//!
//! Opening and closing the controller link.

use pts_core::ErrorInfo;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;
use crate::Terminal;

/// What the status bar shows about the link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Link opened and start-of-day data requested
    pub opened: bool,

    /// Last status poll succeeded
    pub connected: bool,

    /// Controller endpoint
    pub url: String,

    /// Most recent error reported by the link or the order flow
    pub last_error: Option<ErrorInfo>,
}

/// Opens the link and waits for the controller's first status.
///
/// ## Returns
/// Link status after the board has been refreshed with the loaded
/// configuration.
pub async fn open_connection(terminal: &Terminal) -> Result<ConnectionStatus, ApiError> {
    debug!("open_connection command");
    terminal.connection().open().await?;
    terminal.refresh_board().await;
    Ok(connection_status(terminal))
}

/// Closes the link. Cancels an open that is still waiting.
pub async fn close_connection(terminal: &Terminal) -> ConnectionStatus {
    debug!("close_connection command");
    terminal.connection().close().await;
    connection_status(terminal)
}

pub fn connection_status(terminal: &Terminal) -> ConnectionStatus {
    let connection = terminal.connection();
    ConnectionStatus {
        opened: *connection.store().opened.snapshot(),
        connected: connection.is_connected(),
        url: connection.settings().base_url(),
        last_error: connection.last_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;
    use pts_core::ResultCode;
    use pts_link::SimulatedController;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_open_and_close() {
        let terminal = Terminal::new(
            AppConfig::default(),
            Arc::new(SimulatedController::with_default_site()),
        );

        let status = open_connection(&terminal).await.unwrap();
        assert!(status.opened);
        assert!(status.connected);
        assert!(status.last_error.is_none());
        assert_eq!(terminal.services().board().items().len(), 4);

        let status = close_connection(&terminal).await;
        assert!(!status.opened);
        assert!(!status.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_is_reported() {
        let terminal = Terminal::new(
            AppConfig::default(),
            Arc::new(
                SimulatedController::with_default_site()
                    .with_open_result(ResultCode::ConnectionError),
            ),
        );

        let err = open_connection(&terminal).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ControllerError);

        let status = connection_status(&terminal);
        assert!(!status.opened);
        assert_eq!(
            status.last_error.map(|e| e.code),
            Some("CONNECTION_ERROR".to_string())
        );
    }
}
