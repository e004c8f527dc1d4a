//! # Terminal Configuration
//!
//! Settings loaded at startup: the controller link (`[connection]`,
//! `[polling]`) and the terminal's own `[terminal]` section, all in one TOML
//! file.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`PTS_*`)
//! 2. Config file (`terminal.toml`)
//! 3. Defaults (this file and `pts_link::config`)
//!
//! ```toml
//! [connection]
//! host = "192.168.1.117"
//!
//! [terminal]
//! currency = "$"
//! nozzle_must_be_taken = true
//! predefined_volume = "100.0"
//! predefined_amount = "100.0"
//! ```

use pts_core::validation::parse_positive_decimal;
use pts_core::{StateOnOff, DISPLAY_SCALE};
use pts_link::config::{read_toml, write_toml};
use pts_link::{LinkConfig, LinkResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

// =============================================================================
// Terminal Settings
// =============================================================================

/// Operator-facing settings consumed by the order flow and the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    /// Currency symbol shown next to amounts.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Whether the operator must lift the nozzle before authorizing.
    #[serde(default = "default_nozzle_must_be_taken")]
    pub nozzle_must_be_taken: bool,

    /// Preset offered on the volume keypad.
    #[serde(default = "default_predefined")]
    pub predefined_volume: Decimal,

    /// Preset offered on the amount keypad.
    #[serde(default = "default_predefined")]
    pub predefined_amount: Decimal,
}

fn default_currency() -> String {
    "$".to_string()
}

fn default_nozzle_must_be_taken() -> bool {
    true
}

fn default_predefined() -> Decimal {
    Decimal::new(1000, 1)
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            nozzle_must_be_taken: default_nozzle_must_be_taken(),
            predefined_volume: default_predefined(),
            predefined_amount: default_predefined(),
        }
    }
}

impl TerminalSettings {
    /// Applies environment variable overrides.
    ///
    /// ## Environment Variables
    /// - `PTS_CURRENCY`: currency symbol
    /// - `PTS_NOZZLE_MUST_BE_TAKEN`: `on`/`off`/`true`/`false`
    /// - `PTS_PREDEFINED_VOLUME`, `PTS_PREDEFINED_AMOUNT`: positive decimals
    pub fn apply_env_overrides(&mut self) {
        if let Ok(currency) = std::env::var("PTS_CURRENCY") {
            self.currency = currency;
        }

        if let Ok(flag) = std::env::var("PTS_NOZZLE_MUST_BE_TAKEN") {
            match flag.parse::<StateOnOff>() {
                Ok(value) => self.nozzle_must_be_taken = value.is_on(),
                Err(e) => warn!(%e, "Ignoring PTS_NOZZLE_MUST_BE_TAKEN"),
            }
        }

        if let Ok(value) = std::env::var("PTS_PREDEFINED_VOLUME") {
            match parse_positive_decimal("Predefined volume", &value) {
                Ok(volume) => self.predefined_volume = volume,
                Err(e) => warn!(%e, "Ignoring PTS_PREDEFINED_VOLUME"),
            }
        }

        if let Ok(value) = std::env::var("PTS_PREDEFINED_AMOUNT") {
            match parse_positive_decimal("Predefined amount", &value) {
                Ok(amount) => self.predefined_amount = amount,
                Err(e) => warn!(%e, "Ignoring PTS_PREDEFINED_AMOUNT"),
            }
        }
    }

    /// Formats an amount with the currency symbol, two places, half-even.
    pub fn format_amount(&self, amount: Decimal) -> String {
        let rounded = amount.round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointNearestEven);
        format!("{}{:.2}", self.currency, rounded)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Everything the terminal reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub link: LinkConfig,

    #[serde(default)]
    pub terminal: TerminalSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> LinkResult<Self> {
        let mut config: Self = read_toml(config_path)?.unwrap_or_default();
        config.link.apply_env_overrides();
        config.terminal.apply_env_overrides();
        config.link.validate()?;
        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LinkResult<()> {
        write_toml(self, config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TerminalSettings::default();
        assert_eq!(settings.currency, "$");
        assert!(settings.nozzle_must_be_taken);
        assert_eq!(settings.predefined_volume, Decimal::new(100, 0));
        assert_eq!(settings.predefined_amount, Decimal::new(100, 0));
    }

    #[test]
    fn test_parse_sections() {
        let toml_str = r#"
            [connection]
            host = "10.0.0.5"
            http_port = 8080

            [terminal]
            currency = "€"
            nozzle_must_be_taken = false
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.link.connection.host, "10.0.0.5");
        assert_eq!(config.link.connection.http_port, 8080);
        assert_eq!(config.link.polling.poll_interval_ms, 2000);
        assert_eq!(config.terminal.currency, "€");
        assert!(!config.terminal.nozzle_must_be_taken);
        assert_eq!(config.terminal.predefined_volume, Decimal::new(100, 0));
    }

    #[test]
    fn test_missing_terminal_section_uses_defaults() {
        let config: AppConfig = toml::from_str("[connection]\nhost = \"h\"\n").unwrap();
        assert_eq!(config.terminal, TerminalSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("pts-terminal-{}.toml", uuid::Uuid::new_v4()));

        let mut config = AppConfig::default();
        config.terminal.currency = "PKR".to_string();
        config.link.connection.host = "172.16.0.9".to_string();
        config.save(Some(path.clone())).unwrap();

        let loaded = AppConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.terminal.currency, "PKR");
        assert_eq!(loaded.link.connection.host, "172.16.0.9");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_format_amount_half_even() {
        let settings = TerminalSettings::default();
        assert_eq!(settings.format_amount(Decimal::new(12345, 3)), "$12.34");
        assert_eq!(settings.format_amount(Decimal::new(12355, 3)), "$12.36");
        assert_eq!(settings.format_amount(Decimal::new(5, 0)), "$5.00");
    }
}
