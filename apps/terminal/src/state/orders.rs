//! # Order Manager
//!
//! Tracks the order the operator is building and the orders the controller
//! has authorized.
//!
//! ## Order Book
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          OrderManager                                   │
//! │                                                                         │
//! │  constructing: Order            formed: HashMap<pump, Order>            │
//! │  ────────────────────           ────────────────────────────            │
//! │  create_constructing_order(3)                                           │
//! │  with_constructing_for(3, |o| ..)                                       │
//! │         │                                                               │
//! │         │ authorized                                                    │
//! │         └──────────── add_formed_order ──────► formed[3] (formed=true)  │
//! │                                                     │                   │
//! │                       update_order_progress_indicator ──► item.progress │
//! │                                                     │                   │
//! │                       close_order_for_pump ─────────┘ removed, 0 %      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//! One mutex guards the whole book, so every public call is atomic with
//! respect to every other. Callers never receive a reference into the book,
//! only clones.

use pts_core::progress::calculate_progress_safe;
use pts_core::{
    CoreResult, MeasurementUnits, Order, OrderTarget, PumpDisplayItem, DISPLAY_SCALE,
};
use rust_decimal::RoundingStrategy;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::config::TerminalSettings;

/// Shown instead of a number for full-tank orders.
pub const FULL_TANK_LABEL: &str = "Full tank";

#[derive(Debug, Default)]
struct OrderBook {
    constructing: Order,
    formed: HashMap<u32, Order>,
}

/// Constructing and formed orders, behind one lock.
#[derive(Debug, Default)]
pub struct OrderManager {
    book: Mutex<OrderBook>,
}

impl OrderManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, OrderBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Constructing Order
    // =========================================================================

    /// Starts a new order bound to `pump`, replacing the one under
    /// construction.
    pub fn create_constructing_order(&self, pump: u32) -> Order {
        let order = Order::for_pump(pump);
        debug!(pump, order = %order.id, "Constructing new order");
        self.book().constructing = order.clone();
        order
    }

    /// Snapshot of the order under construction.
    pub fn constructing_order(&self) -> Order {
        self.book().constructing.clone()
    }

    /// Clears the order under construction unless it is bound to another
    /// pump. Returns whether it was cleared.
    pub fn reset_constructing_for(&self, pump: u32) -> bool {
        let mut book = self.book();
        match book.constructing.pump {
            Some(bound) if bound != pump => false,
            _ => {
                book.constructing.reset();
                true
            }
        }
    }

    /// Mutates the order under construction only if it is bound to `pump`.
    pub fn with_constructing_for<R>(
        &self,
        pump: u32,
        f: impl FnOnce(&mut Order) -> R,
    ) -> Option<R> {
        let mut book = self.book();
        if book.constructing.is_for_pump(pump) {
            Some(f(&mut book.constructing))
        } else {
            None
        }
    }

    // =========================================================================
    // Formed Orders
    // =========================================================================

    /// Marks the order as formed and stores it as its pump's active order.
    ///
    /// Fails if the order has no pump or no target. An existing formed order
    /// for the same pump is replaced.
    pub fn add_formed_order(&self, mut order: Order) -> CoreResult<()> {
        order.mark_formed()?;
        let Some(pump) = order.pump else {
            // mark_formed() guarantees a pump
            return Ok(());
        };
        info!(pump, order = %order.id, target = ?order.target, "Order formed");
        self.book().formed.insert(pump, order);
        Ok(())
    }

    /// Replaces all formed orders. Orders that cannot be formed are skipped.
    pub fn set_formed_orders(&self, orders: Vec<Order>) {
        let mut formed = HashMap::new();
        for mut order in orders {
            match (order.mark_formed(), order.pump) {
                (Ok(()), Some(pump)) => {
                    formed.insert(pump, order);
                }
                (result, _) => {
                    debug!(order = %order.id, ?result, "Skipping order that cannot be formed");
                }
            }
        }
        self.book().formed = formed;
    }

    pub fn formed_order_for_pump(&self, pump: u32) -> Option<Order> {
        self.book().formed.get(&pump).cloned()
    }

    /// All formed orders, ordered by pump.
    pub fn formed_orders(&self) -> Vec<Order> {
        let book = self.book();
        let mut orders: Vec<Order> = book.formed.values().cloned().collect();
        orders.sort_by_key(|o| o.pump);
        orders
    }

    /// Drops the pump's formed order, if any, and resets its progress.
    /// Calling it again is harmless.
    pub fn close_order_for_pump(&self, item: &mut PumpDisplayItem) {
        if let Some(order) = self.book().formed.remove(&item.pump_id) {
            info!(pump = item.pump_id, order = %order.id, "Order closed");
        }
        self.update_order_progress_indicator(item);
    }

    // =========================================================================
    // Progress
    // =========================================================================

    /// Recomputes the item's progress from its pump's formed order.
    ///
    /// | Formed order   | Progress                                 |
    /// |----------------|------------------------------------------|
    /// | none           | 0                                        |
    /// | volume target  | dispensed volume vs. target, safe        |
    /// | amount target  | dispensed amount vs. target, safe        |
    /// | full tank      | 100                                      |
    pub fn update_order_progress_indicator(&self, item: &mut PumpDisplayItem) {
        let target = self
            .book()
            .formed
            .get(&item.pump_id)
            .and_then(|order| order.target);

        item.progress = match target {
            None => 0,
            Some(OrderTarget::Volume(volume)) => {
                calculate_progress_safe(&item.dispensed_volume, volume)
            }
            Some(OrderTarget::Amount(amount)) => {
                calculate_progress_safe(&item.dispensed_amount, amount)
            }
            Some(OrderTarget::FullTank) => pts_core::MAX_PROGRESS,
        };
    }

    pub fn update_orders_progress_indicators(&self, items: &mut [PumpDisplayItem]) {
        for item in items {
            self.update_order_progress_indicator(item);
        }
    }

    // =========================================================================
    // Presentation Helpers
    // =========================================================================

    /// Target of the order under construction, as the operator sees it:
    /// two places rounded half-even, the full-tank label, or empty.
    pub fn order_value(&self) -> String {
        match self.book().constructing.target {
            Some(OrderTarget::Volume(value)) | Some(OrderTarget::Amount(value)) => value
                .round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointNearestEven)
                .to_string(),
            Some(OrderTarget::FullTank) => FULL_TANK_LABEL.to_string(),
            None => String::new(),
        }
    }

    /// Unit of the order under construction: the controller's volume unit,
    /// the currency symbol, or empty for full tank.
    pub fn order_unit(&self, units: &MeasurementUnits, settings: &TerminalSettings) -> String {
        match self.book().constructing.target {
            Some(OrderTarget::Volume(_)) => units.volume.clone(),
            Some(OrderTarget::Amount(_)) => settings.currency.clone(),
            Some(OrderTarget::FullTank) | None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn formed_volume_order(manager: &OrderManager, pump: u32, volume: &str) {
        let mut order = Order::for_pump(pump);
        order.set_volume(dec(volume));
        manager.add_formed_order(order).unwrap();
    }

    #[test]
    fn test_progress_follows_dispensed_volume() {
        let manager = OrderManager::new();
        formed_volume_order(&manager, 3, "50.00");

        let mut item = PumpDisplayItem::new(3);
        let mut seen = Vec::new();
        for dispensed in ["0", "25.00", "50.00"] {
            item.dispensed_volume = dispensed.to_string();
            manager.update_order_progress_indicator(&mut item);
            seen.push(item.progress);
        }
        assert_eq!(seen, vec![0, 50, 100]);
    }

    #[test]
    fn test_progress_by_amount_and_full_tank() {
        let manager = OrderManager::new();

        let mut by_amount = Order::for_pump(1);
        by_amount.set_amount(dec("20"));
        manager.add_formed_order(by_amount).unwrap();

        let mut full = Order::for_pump(2);
        full.set_full_tank();
        manager.add_formed_order(full).unwrap();

        let mut items = vec![
            PumpDisplayItem::new(1),
            PumpDisplayItem::new(2),
            PumpDisplayItem::new(4),
        ];
        items[0].dispensed_amount = "5".to_string();
        items[2].progress = 42;

        manager.update_orders_progress_indicators(&mut items);
        assert_eq!(items[0].progress, 25);
        assert_eq!(items[1].progress, 100);
        assert_eq!(items[2].progress, 0);
    }

    #[test]
    fn test_close_order_is_idempotent() {
        let manager = OrderManager::new();
        formed_volume_order(&manager, 1, "10");

        let mut item = PumpDisplayItem::new(2);
        item.progress = 60;
        manager.close_order_for_pump(&mut item);
        assert_eq!(item.progress, 0);
        assert_eq!(manager.formed_orders().len(), 1);

        item.progress = 60;
        manager.close_order_for_pump(&mut item);
        assert_eq!(item.progress, 0);
        assert_eq!(manager.formed_orders().len(), 1);

        let mut item = PumpDisplayItem::new(1);
        manager.close_order_for_pump(&mut item);
        manager.close_order_for_pump(&mut item);
        assert!(manager.formed_orders().is_empty());
        assert_eq!(item.progress, 0);
    }

    #[test]
    fn test_add_formed_order_requires_target() {
        let manager = OrderManager::new();
        assert!(manager.add_formed_order(Order::for_pump(1)).is_err());
        assert!(manager.add_formed_order(Order::new()).is_err());
        assert!(manager.formed_orders().is_empty());
    }

    #[test]
    fn test_one_formed_order_per_pump() {
        let manager = OrderManager::new();
        formed_volume_order(&manager, 1, "10");
        formed_volume_order(&manager, 1, "20");
        formed_volume_order(&manager, 2, "5");

        let orders = manager.formed_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].volume(), Some(dec("20")));
        assert!(orders.iter().all(|o| o.is_formed()));
    }

    #[test]
    fn test_set_formed_orders_forces_flag() {
        let manager = OrderManager::new();
        formed_volume_order(&manager, 9, "1");

        let mut a = Order::for_pump(1);
        a.set_full_tank();
        let incomplete = Order::for_pump(2);
        manager.set_formed_orders(vec![a, incomplete]);

        let orders = manager.formed_orders();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].is_formed());
        assert!(manager.formed_order_for_pump(9).is_none());
    }

    #[test]
    fn test_constructing_order_lifecycle() {
        let manager = OrderManager::new();
        let created = manager.create_constructing_order(4);
        assert!(manager.constructing_order().is_for_pump(4));
        assert_eq!(manager.constructing_order().id, created.id);

        manager.with_constructing_for(4, |o| o.set_volume(dec("12.5")));
        assert_eq!(manager.constructing_order().volume(), Some(dec("12.5")));

        manager.reset_constructing_for(4);
        let order = manager.constructing_order();
        assert!(!order.is_pump_set());
        assert!(order.target.is_none());
    }

    #[test]
    fn test_constructing_order_belongs_to_one_pump() {
        let manager = OrderManager::new();
        manager.create_constructing_order(1);

        assert_eq!(manager.with_constructing_for(2, |o| o.set_full_tank()), None);
        assert!(!manager.reset_constructing_for(2));
        assert!(manager.constructing_order().is_for_pump(1));
        assert!(manager.constructing_order().target.is_none());

        assert!(manager.reset_constructing_for(1));
        assert!(!manager.constructing_order().is_pump_set());
        // An unbound order is anyone's to clear
        assert!(manager.reset_constructing_for(2));
    }

    #[test]
    fn test_order_value_and_unit() {
        let manager = OrderManager::new();
        let units = MeasurementUnits::default();
        let settings = TerminalSettings::default();

        manager.create_constructing_order(1);
        assert_eq!(manager.order_value(), "");
        assert_eq!(manager.order_unit(&units, &settings), "");

        manager.with_constructing_for(1, |o| o.set_volume(dec("10.125")));
        assert_eq!(manager.order_value(), "10.12");
        assert_eq!(manager.order_unit(&units, &settings), "L");

        manager.with_constructing_for(1, |o| o.set_amount(dec("10.135")));
        assert_eq!(manager.order_value(), "10.14");
        assert_eq!(manager.order_unit(&units, &settings), "$");

        manager.with_constructing_for(1, |o| o.set_full_tank());
        assert_eq!(manager.order_value(), FULL_TANK_LABEL);
        assert_eq!(manager.order_unit(&units, &settings), "");
    }
}
