//! # Link Configuration
//!
//! Connection settings for the pump controller and poller timing.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PTS_HOST=192.168.1.117                                             │
//! │     PTS_PROTOCOL=http                                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/terminal/terminal.toml (Linux)                           │
//! │     ~/Library/Application Support/com.pts.terminal/terminal.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     admin/admin @ 192.168.1.117, https, digest auth                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [connection]
//! login = "admin"
//! password = "admin"
//! host = "192.168.1.117"
//! http_port = 80
//! https_port = 443
//! protocol = "https"   # http | https
//! auth = "digest"      # basic | digest
//!
//! [polling]
//! poll_interval_ms = 2000
//! open_timeout_secs = 10
//! request_timeout_ms = 5000
//! ```
//!
//! Ports outside `0..=65535` (or not numbers at all) fall back to 80 / 443
//! with a warning instead of failing the whole load.

use pts_core::validation::port_or_default;
use pts_core::StateOnOff;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{LinkError, LinkResult};

// =============================================================================
// Protocol Security
// =============================================================================

/// Transport security preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolSecurity {
    Http,
    #[default]
    Https,
}

impl ProtocolSecurity {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProtocolSecurity::Http => "http",
            ProtocolSecurity::Https => "https",
        }
    }
}

impl std::fmt::Display for ProtocolSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

impl std::str::FromStr for ProtocolSecurity {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" | "plain" => Ok(ProtocolSecurity::Http),
            "https" | "tls" | "ssl" => Ok(ProtocolSecurity::Https),
            other => Err(LinkError::InvalidConfig(format!(
                "Unknown protocol: '{}'. Valid options: http, https",
                other
            ))),
        }
    }
}

// =============================================================================
// Auth Scheme
// =============================================================================

/// HTTP authentication scheme the controller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Basic,
    #[default]
    Digest,
}

impl std::fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthScheme::Basic => write!(f, "basic"),
            AuthScheme::Digest => write!(f, "digest"),
        }
    }
}

impl std::str::FromStr for AuthScheme {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(AuthScheme::Basic),
            "digest" => Ok(AuthScheme::Digest),
            other => Err(LinkError::InvalidConfig(format!(
                "Unknown auth scheme: '{}'. Valid options: basic, digest",
                other
            ))),
        }
    }
}

impl From<StateOnOff> for AuthScheme {
    /// Digest authentication switched on or off.
    fn from(value: StateOnOff) -> Self {
        if value.is_on() {
            AuthScheme::Digest
        } else {
            AuthScheme::Basic
        }
    }
}

// =============================================================================
// Connection Settings
// =============================================================================

/// Everything `open()` needs to reach the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_login")]
    pub login: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Controller host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(
        default = "default_http_port",
        deserialize_with = "deserialize_http_port"
    )]
    pub http_port: u16,

    #[serde(
        default = "default_https_port",
        deserialize_with = "deserialize_https_port"
    )]
    pub https_port: u16,

    #[serde(default)]
    pub protocol: ProtocolSecurity,

    #[serde(default)]
    pub auth: AuthScheme,
}

fn default_login() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_host() -> String {
    "192.168.1.117".to_string()
}

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_https_port() -> u16 {
    DEFAULT_HTTPS_PORT
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            login: default_login(),
            password: default_password(),
            host: default_host(),
            http_port: default_http_port(),
            https_port: default_https_port(),
            protocol: ProtocolSecurity::default(),
            auth: AuthScheme::default(),
        }
    }
}

impl ConnectionSettings {
    /// Port matching the selected protocol.
    pub fn port(&self) -> u16 {
        match self.protocol {
            ProtocolSecurity::Http => self.http_port,
            ProtocolSecurity::Https => self.https_port,
        }
    }

    /// Endpoint of the controller's JSON protocol.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/jsonPTS",
            self.protocol.scheme(),
            self.host,
            self.port()
        )
    }
}

/// Raw port value as it may appear in a config file.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(i64),
    Text(String),
}

fn lenient_port<'de, D>(deserializer: D, default: u16, field: &str) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let text = match RawPort::deserialize(deserializer)? {
        RawPort::Number(n) => n.to_string(),
        RawPort::Text(s) => s,
    };
    let (port, fell_back) = port_or_default(&text, default);
    if fell_back {
        warn!(field, value = %text, fallback = port, "Invalid port in config, using default");
    }
    Ok(port)
}

fn deserialize_http_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_port(deserializer, DEFAULT_HTTP_PORT, "http_port")
}

fn deserialize_https_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_port(deserializer, DEFAULT_HTTPS_PORT, "https_port")
}

// =============================================================================
// Polling Settings
// =============================================================================

/// Poller and request timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Delay between the end of one poll cycle and the start of the next.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long `open()` waits for the first successful status.
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    /// Upper bound for a single request inside a batch.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_open_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    5000
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            poll_interval_ms: default_poll_interval(),
            open_timeout_secs: default_open_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl PollingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// =============================================================================
// Main Link Configuration
// =============================================================================

/// Complete link configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub polling: PollingSettings,
}

impl LinkConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (terminal.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LinkResult<Self> {
        let mut config: Self = read_toml(config_path)?.unwrap_or_default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load link config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> LinkResult<()> {
        write_toml(self, config_path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LinkResult<()> {
        if self.connection.host.trim().is_empty() {
            return Err(LinkError::InvalidConfig("host must not be empty".into()));
        }

        if self.connection.login.trim().is_empty() {
            return Err(LinkError::InvalidConfig("login must not be empty".into()));
        }

        if self.polling.poll_interval_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.polling.open_timeout_secs == 0 || self.polling.request_timeout_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("PTS_HOST") {
            debug!(host = %host, "Overriding controller host from environment");
            self.connection.host = host;
        }

        if let Ok(login) = std::env::var("PTS_LOGIN") {
            self.connection.login = login;
        }

        if let Ok(password) = std::env::var("PTS_PASSWORD") {
            self.connection.password = password;
        }

        if let Ok(port) = std::env::var("PTS_HTTP_PORT") {
            let (p, fell_back) = port_or_default(&port, DEFAULT_HTTP_PORT);
            if fell_back {
                warn!(value = %port, "Invalid PTS_HTTP_PORT, using default");
            }
            self.connection.http_port = p;
        }

        if let Ok(port) = std::env::var("PTS_HTTPS_PORT") {
            let (p, fell_back) = port_or_default(&port, DEFAULT_HTTPS_PORT);
            if fell_back {
                warn!(value = %port, "Invalid PTS_HTTPS_PORT, using default");
            }
            self.connection.https_port = p;
        }

        if let Ok(protocol) = std::env::var("PTS_PROTOCOL") {
            match protocol.parse() {
                Ok(parsed) => self.connection.protocol = parsed,
                Err(e) => warn!(%e, "Ignoring PTS_PROTOCOL"),
            }
        }

        if let Ok(auth) = std::env::var("PTS_AUTH") {
            match auth.parse() {
                Ok(parsed) => self.connection.auth = parsed,
                Err(e) => warn!(%e, "Ignoring PTS_AUTH"),
            }
        }

        // On/off flavour of PTS_AUTH
        if let Ok(digest) = std::env::var("PTS_DIGEST_AUTH") {
            match digest.parse::<StateOnOff>() {
                Ok(value) => self.connection.auth = value.into(),
                Err(e) => warn!(%e, "Ignoring PTS_DIGEST_AUTH"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "pts", "terminal")
            .map(|dirs| dirs.config_dir().join("terminal.toml"))
    }
}

// =============================================================================
// File Helpers
// =============================================================================

/// Reads a TOML document from the given or default path.
///
/// Returns `Ok(None)` when there is no file to read.
pub fn read_toml<T>(config_path: Option<PathBuf>) -> LinkResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    let Some(path) = config_path.or_else(LinkConfig::default_config_path) else {
        return Ok(None);
    };

    if !path.exists() {
        debug!(?path, "Config file not found, using defaults");
        return Ok(None);
    }

    info!(?path, "Loading config from file");
    let contents = std::fs::read_to_string(&path)?;
    Ok(Some(toml::from_str(&contents)?))
}

/// Writes a TOML document to the given or default path.
pub fn write_toml<T: Serialize>(value: &T, config_path: Option<PathBuf>) -> LinkResult<()> {
    let path = config_path
        .or_else(LinkConfig::default_config_path)
        .ok_or_else(|| LinkError::ConfigSaveFailed("No config path available".into()))?;

    ensure_parent(&path)?;
    let contents = toml::to_string_pretty(value)?;
    std::fs::write(&path, contents).map_err(|e| LinkError::ConfigSaveFailed(e.to_string()))?;

    info!(?path, "Config saved");
    Ok(())
}

fn ensure_parent(path: &Path) -> LinkResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LinkError::ConfigSaveFailed(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_and_auth_parsing() {
        assert_eq!("HTTP".parse::<ProtocolSecurity>().unwrap(), ProtocolSecurity::Http);
        assert_eq!("tls".parse::<ProtocolSecurity>().unwrap(), ProtocolSecurity::Https);
        assert!("ftp".parse::<ProtocolSecurity>().is_err());

        assert_eq!("basic".parse::<AuthScheme>().unwrap(), AuthScheme::Basic);
        assert_eq!(AuthScheme::from(StateOnOff::On), AuthScheme::Digest);
        assert_eq!(AuthScheme::from(StateOnOff::Off), AuthScheme::Basic);
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.connection.login, "admin");
        assert_eq!(config.connection.host, "192.168.1.117");
        assert_eq!(config.connection.protocol, ProtocolSecurity::Https);
        assert_eq!(config.connection.auth, AuthScheme::Digest);
        assert_eq!(config.polling.poll_interval(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_follows_protocol() {
        let mut settings = ConnectionSettings::default();
        assert_eq!(settings.base_url(), "https://192.168.1.117:443/jsonPTS");

        settings.protocol = ProtocolSecurity::Http;
        settings.http_port = 8080;
        assert_eq!(settings.base_url(), "http://192.168.1.117:8080/jsonPTS");
    }

    #[test]
    fn test_invalid_ports_fall_back() {
        let config: LinkConfig = toml::from_str(
            r#"
            [connection]
            host = "10.0.0.5"
            http_port = 70000
            https_port = "secure"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.host, "10.0.0.5");
        assert_eq!(config.connection.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.connection.https_port, DEFAULT_HTTPS_PORT);
        assert_eq!(config.polling, PollingSettings::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LinkConfig::default();
        config.connection.host = "  ".to_string();
        assert!(config.validate().is_err());

        config.connection.host = "pts.local".to_string();
        config.polling.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = LinkConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[polling]"));

        let back: LinkConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }
}
