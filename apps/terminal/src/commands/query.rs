//! # Query Commands
//!
//! Read-only views for the pump grid and the order panel.

use pts_core::{NozzleItem, Order, PumpDisplayItem};
use serde::Serialize;
use tracing::debug;

use crate::Terminal;

/// The order panel: the order being built and its target as text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructingOrderDto {
    pub order: Order,
    pub value: String,
    pub unit: String,

    /// Nozzles of the selected pump, for the nozzle keypad
    pub nozzles: Vec<NozzleItem>,
}

/// One item per configured pump, ordered by pump number.
pub fn pumps(terminal: &Terminal) -> Vec<PumpDisplayItem> {
    debug!("pumps command");
    terminal.services().board().items().to_vec()
}

pub fn constructing_order(terminal: &Terminal) -> ConstructingOrderDto {
    debug!("constructing_order command");
    let services = terminal.services();
    let units = services.store().measurement_units.snapshot();
    ConstructingOrderDto {
        order: services.orders.constructing_order(),
        value: services.orders.order_value(),
        unit: services.orders.order_unit(&units, &services.settings),
        nozzles: services.store().nozzle_items.snapshot().to_vec(),
    }
}

/// Orders the controller has authorized and that are not closed yet.
pub fn formed_orders(terminal: &Terminal) -> Vec<Order> {
    debug!("formed_orders command");
    terminal.services().orders.formed_orders()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::connection::open_connection;
    use crate::commands::order::{select_nozzle, select_pump};
    use crate::state::AppConfig;
    use pts_link::SimulatedController;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_views_follow_selection() {
        let terminal = Terminal::new(
            AppConfig::default(),
            Arc::new(SimulatedController::with_default_site()),
        );
        assert!(pumps(&terminal).is_empty());

        open_connection(&terminal).await.unwrap();
        let ids: Vec<u32> = pumps(&terminal).iter().map(|p| p.pump_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        select_pump(&terminal, 3).await.unwrap();
        let panel = constructing_order(&terminal);
        assert!(panel.order.is_for_pump(3));
        assert_eq!(panel.nozzles.len(), 3);
        assert_eq!(panel.value, "");

        select_nozzle(&terminal, 3, "2").await.unwrap();
        let panel = constructing_order(&terminal);
        assert_eq!(
            panel.order.nozzle.map(|n| n.fuel_grade.name),
            Some("A95".to_string())
        );
        assert!(formed_orders(&terminal).is_empty());
        assert_eq!(pumps(&terminal)[2].state_name, "NozzleSelected");

        terminal.connection().close().await;
    }
}
