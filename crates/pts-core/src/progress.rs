//! # Fueling Progress
//!
//! Percentage of an order's target that a pump has dispensed so far.
//!
//! ## Algorithm
//! ```text
//! current, target ──► parse ──► either ≤ 0 or unparsable? ──► 0
//!                                     │
//!                                     ▼
//!                ratio   = round_half_up(current / target, 4 dp)
//!                percent = round_half_up(ratio × 100, 0 dp)
//!                                     │
//!                                     ▼
//!            percent ≥ 100 but current < target? ──► 99
//!                                     │
//!                                     ▼
//!                            clamp to 0..=100
//! ```
//!
//! The 99 clamp keeps the indicator from showing completion while the pump
//! is still a fraction of a unit short of the target.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::MAX_PROGRESS;

/// Scale of the intermediate ratio.
const RATIO_SCALE: u32 = 4;

/// Computes progress from a live dispensed value (as reported, a decimal
/// string) against an order target.
///
/// Never fails: anything that cannot be turned into a meaningful ratio
/// yields 0.
pub fn calculate_progress_safe(current: &str, target: Decimal) -> u8 {
    let current = match Decimal::from_str(current.trim()) {
        Ok(value) => value,
        Err(_) => return 0,
    };

    if current <= Decimal::ZERO || target <= Decimal::ZERO {
        return 0;
    }

    let ratio = match current.checked_div(target) {
        Some(ratio) => {
            ratio.round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointAwayFromZero)
        }
        None => return 0,
    };

    let percent = match ratio.checked_mul(Decimal::ONE_HUNDRED) {
        Some(percent) => percent
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0),
        None => return 0,
    };

    let percent = if percent >= 100 && current < target {
        99
    } else {
        percent
    };

    percent.clamp(0, i64::from(MAX_PROGRESS)) as u8
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_progress_bounds() {
        assert_eq!(calculate_progress_safe("0", dec("100")), 0);
        assert_eq!(calculate_progress_safe("100", dec("100")), 100);
        assert_eq!(calculate_progress_safe("-5", dec("100")), 0);
    }

    #[test]
    fn test_progress_never_completes_early() {
        // 0.99999 rounds to 1.0000 at 4 dp, which would read as 100%
        assert_eq!(calculate_progress_safe("99.999", dec("100")), 99);
        assert_eq!(calculate_progress_safe("99.5", dec("100")), 99);
    }

    #[test]
    fn test_progress_rounds_half_up() {
        assert_eq!(calculate_progress_safe("12.5", dec("100")), 13);
        assert_eq!(calculate_progress_safe("1", dec("3")), 33);
        assert_eq!(calculate_progress_safe("2", dec("3")), 67);
    }

    #[test]
    fn test_progress_invalid_input() {
        assert_eq!(calculate_progress_safe("abc", dec("100")), 0);
        assert_eq!(calculate_progress_safe("", dec("100")), 0);
        assert_eq!(calculate_progress_safe("10", Decimal::ZERO), 0);
        assert_eq!(calculate_progress_safe("10", dec("-1")), 0);
    }

    #[test]
    fn test_progress_over_target_clamps_to_100() {
        assert_eq!(calculate_progress_safe("50.02", dec("50.00")), 100);
        assert_eq!(calculate_progress_safe("250", dec("100")), 100);
    }

    #[test]
    fn test_progress_extreme_values_do_not_panic() {
        assert_eq!(calculate_progress_safe("79228162514264337593543950335", Decimal::ONE), 0);
        assert_eq!(
            calculate_progress_safe("79228162514264337593543950335", dec("0.0000000001")),
            0
        );
        assert_eq!(calculate_progress_safe("1", Decimal::MAX), 0);
        assert_eq!(calculate_progress_safe("1e400", dec("100")), 0);
        assert_eq!(calculate_progress_safe("NaN", dec("100")), 0);
        assert_eq!(calculate_progress_safe(" 25 ", dec("50")), 50);
    }

    #[test]
    fn test_volume_order_sequence() {
        let target = dec("50.00");
        let seq: Vec<u8> = ["0", "25.00", "50.00"]
            .iter()
            .map(|v| calculate_progress_safe(v, target))
            .collect();
        assert_eq!(seq, vec![0, 50, 100]);
    }
}
