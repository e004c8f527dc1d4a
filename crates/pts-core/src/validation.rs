//! # Validation Module
//!
//! Operator input and settings validation for the PTS terminal.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Operator UI                                                  │
//! │  └── Keypad only produces digits and a decimal point                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Order state machine                                          │
//! │  └── THIS MODULE: nozzle range, positive doses                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Pump controller                                              │
//! │  └── Rejects authorizations its configuration does not allow           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::PumpConfig;
use crate::MIN_NOZZLE_NUMBER;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Highest TCP port number.
pub const MAX_PORT: i64 = 65535;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Parses an integer and checks it lies in `min..=max`.
///
/// ## Example
/// ```rust
/// use pts_core::validation::parse_integer_in_range;
///
/// assert_eq!(parse_integer_in_range("port", " 8080 ", 0, 65535).unwrap(), 8080);
/// assert!(parse_integer_in_range("port", "70000", 0, 65535).is_err());
/// assert!(parse_integer_in_range("port", "", 0, 65535).is_err());
/// ```
pub fn parse_integer_in_range(field: &str, value: &str, min: i64, max: i64) -> ValidationResult<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let number: i64 = value.parse().map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not an integer", value),
    })?;

    if number < min || number > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }

    Ok(number)
}

/// Parses a strictly positive decimal (a volume or amount dose).
pub fn parse_positive_decimal(field: &str, value: &str) -> ValidationResult<Decimal> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let number = Decimal::from_str(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: format!("'{}' is not a number", value),
    })?;

    if number <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(number)
}

// =============================================================================
// Settings Validators
// =============================================================================

/// Parses a port number, falling back to `default` when the text is not a
/// valid port. Returns the port and whether the fallback was used.
pub fn port_or_default(value: &str, default: u16) -> (u16, bool) {
    match parse_integer_in_range("port", value, 0, MAX_PORT) {
        Ok(port) => (port as u16, false),
        Err(_) => (default, true),
    }
}

// =============================================================================
// Order Validators
// =============================================================================

/// Parses the operator's nozzle entry for a pump.
///
/// Succeeds iff the text is an integer in `1..=pump.nozzle_count`.
///
/// ## Example
/// ```rust
/// use pts_core::types::PumpConfig;
/// use pts_core::validation::parse_nozzle_for_pump;
///
/// let pump = PumpConfig { id: 3, port: 1, address: 3, nozzle_count: 4 };
/// assert_eq!(parse_nozzle_for_pump("2", &pump).unwrap(), 2);
/// assert!(parse_nozzle_for_pump("5", &pump).is_err());
/// assert!(parse_nozzle_for_pump("0", &pump).is_err());
/// ```
pub fn parse_nozzle_for_pump(text: &str, pump: &PumpConfig) -> CoreResult<u8> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Required {
            field: "nozzle".to_string(),
        }
        .into());
    }

    let nozzle: i64 = text.parse().map_err(|_| ValidationError::InvalidFormat {
        field: "nozzle".to_string(),
        reason: format!("'{}' is not a nozzle number", text),
    })?;

    if nozzle < i64::from(MIN_NOZZLE_NUMBER) || nozzle > i64::from(pump.nozzle_count) {
        return Err(CoreError::NozzleOutOfRange {
            nozzle,
            count: pump.nozzle_count,
        });
    }

    Ok(nozzle as u8)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pump(nozzle_count: u8) -> PumpConfig {
        PumpConfig {
            id: 1,
            port: 1,
            address: 1,
            nozzle_count,
        }
    }

    #[test]
    fn test_nozzle_range_for_every_number() {
        let config = pump(4);
        for n in -2..=8i64 {
            let result = parse_nozzle_for_pump(&n.to_string(), &config);
            assert_eq!(result.is_ok(), (1..=4).contains(&n), "nozzle {}", n);
        }
    }

    #[test]
    fn test_nozzle_rejects_garbage() {
        let config = pump(2);
        assert!(matches!(
            parse_nozzle_for_pump("", &config),
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));
        assert!(matches!(
            parse_nozzle_for_pump("1.5", &config),
            Err(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
        assert!(parse_nozzle_for_pump("1", &pump(0)).is_err());
    }

    #[test]
    fn test_positive_decimal() {
        assert_eq!(
            parse_positive_decimal("volume", "50.00").unwrap(),
            Decimal::new(5000, 2)
        );
        assert!(matches!(
            parse_positive_decimal("volume", "0"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(parse_positive_decimal("amount", "ten").is_err());
    }

    #[test]
    fn test_port_fallback() {
        assert_eq!(port_or_default("8080", 80), (8080, false));
        assert_eq!(port_or_default("0", 80), (0, false));
        assert_eq!(port_or_default("65536", 443), (443, true));
        assert_eq!(port_or_default("-1", 80), (80, true));
        assert_eq!(port_or_default("http", 80), (80, true));
    }
}
