//! # Pump Board
//!
//! One [`PumpDisplayItem`] per configured pump, refreshed from the data
//! store after every poll.
//!
//! ## Projection
//! ```text
//! DataStore status            PumpDisplayItem
//! ────────────────            ───────────────────────────────────────────
//! Filling(v, a, p, n)   ──►   status=Filling, nozzle=n, dispensed=v/a
//! EndOfTransaction(..)  ──►   status=Idle, dispensed=v/a, last_*=v/a/p
//! Idle(nozzle_up, last) ──►   status=Idle|NozzleLifted, last_*=last
//! Offline               ──►   status=Offline
//! (nothing yet)         ──►   status=None
//! ```
//!
//! After projecting, progress is recomputed through the [`OrderManager`].

use pts_core::{PumpDisplayItem, PumpStatus, PumpStatusReport};
use pts_link::DataStore;

use super::orders::OrderManager;

#[derive(Debug, Default)]
pub struct PumpBoard {
    items: Vec<PumpDisplayItem>,
}

impl PumpBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[PumpDisplayItem] {
        &self.items
    }

    pub fn item(&self, pump: u32) -> Option<&PumpDisplayItem> {
        self.items.iter().find(|i| i.pump_id == pump)
    }

    /// The pump's item, created on first use so every pump the operator
    /// touches has one even before its configuration arrives.
    pub fn item_mut(&mut self, pump: u32) -> &mut PumpDisplayItem {
        let index = match self.items.iter().position(|i| i.pump_id == pump) {
            Some(index) => index,
            None => {
                let index = self.items.partition_point(|i| i.pump_id < pump);
                self.items.insert(index, PumpDisplayItem::new(pump));
                index
            }
        };
        &mut self.items[index]
    }

    pub fn set_state_name(&mut self, pump: u32, name: &str) {
        self.item_mut(pump).state_name = name.to_string();
    }

    /// Rebuilds the items from the store's pumps configuration and latest
    /// statuses, then recomputes progress.
    pub fn apply_store(&mut self, store: &DataStore, orders: &OrderManager) {
        let pumps = store.pumps_configuration.snapshot().pump_ids();
        if !pumps.is_empty() {
            // Items of pumps no longer configured go away; state names survive
            self.items.retain(|i| pumps.contains(&i.pump_id));
            for pump in &pumps {
                self.item_mut(*pump);
            }
        }

        for item in &mut self.items {
            match store.latest_status(item.pump_id) {
                Some(report) => project(item, &report),
                None => item.status = PumpStatus::None,
            }
        }

        orders.update_orders_progress_indicators(&mut self.items);
    }
}

fn project(item: &mut PumpDisplayItem, report: &PumpStatusReport) {
    item.status = report.status();
    match report {
        PumpStatusReport::Filling(s) => {
            item.nozzle = s.nozzle;
            item.dispensed_volume = s.volume.to_string();
            item.dispensed_amount = s.amount.to_string();
            item.last_price = s.price;
        }
        PumpStatusReport::EndOfTransaction(s) => {
            item.nozzle = s.nozzle;
            item.dispensed_volume = s.volume.to_string();
            item.dispensed_amount = s.amount.to_string();
            item.last_volume = s.volume;
            item.last_amount = s.amount;
            item.last_price = s.price;
        }
        PumpStatusReport::Idle(s) => {
            item.nozzle = s.nozzle_up;
            // The last sale only lives in last_*; nothing flows while idle
            item.dispensed_volume = "0".to_string();
            item.dispensed_amount = "0".to_string();
            item.last_volume = s.last_volume;
            item.last_amount = s.last_amount;
            item.last_price = s.last_price;
        }
        PumpStatusReport::Offline(_) => {
            item.nozzle = 0;
        }
    }
}
