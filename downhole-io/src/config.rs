//! Configuration for the downhole-io daemon
//!
//! Loads configuration from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields a working configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Port name that selects the simulated downhole unit instead of a tty
pub const SIM_PORT: &str = "sim";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link to the downhole unit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Serial device path, or `"sim"` for the simulated unit
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Read timeout; bounds how long a loop can stall on a silent link
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// First delay before reopening a failed port
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Upper bound for the reopen delay
    #[serde(default = "default_reconnect_backoff_max_ms")]
    pub reconnect_backoff_max_ms: u64,
}

/// Telemetry interpretation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Raw hammer reading that corresponds to 100%
    #[serde(default = "default_hammer_max")]
    pub hammer_max: f64,

    /// Telemetry older than this marks the link as dead
    #[serde(default = "default_liveness_threshold_secs")]
    pub liveness_threshold_secs: f64,
}

/// Store server for external collaborators
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Serve the store over TCP; disabled keeps it in-process only
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,

    /// TCP bind address of the store server
    #[serde(default = "default_store_bind_address")]
    pub bind_address: String,
}

/// Simulated downhole unit (only used when `serial.port = "sim"`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Telemetry frames per second
    #[serde(default = "default_sim_rate_hz")]
    pub rate_hz: f64,

    /// Noise seed, 0 = random each run
    #[serde(default = "default_sim_seed")]
    pub seed: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use downhole_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("downhole-io.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl SerialConfig {
    /// Whether the simulated unit replaces the serial port
    pub fn is_simulated(&self) -> bool {
        self.port == SIM_PORT
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            reconnect_backoff_max_ms: default_reconnect_backoff_max_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            hammer_max: default_hammer_max(),
            liveness_threshold_secs: default_liveness_threshold_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            bind_address: default_store_bind_address(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_sim_rate_hz(),
            seed: default_sim_seed(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115200
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_reconnect_backoff_ms() -> u64 {
    500
}
fn default_reconnect_backoff_max_ms() -> u64 {
    10_000
}
fn default_hammer_max() -> f64 {
    crate::protocol::constants::HAMMER_MAX
}
fn default_liveness_threshold_secs() -> f64 {
    crate::state::LIVENESS_THRESHOLD_SECS
}
fn default_store_enabled() -> bool {
    true
}
fn default_store_bind_address() -> String {
    "127.0.0.1:6390".to_string()
}
fn default_sim_rate_hz() -> f64 {
    20.0
}
fn default_sim_seed() -> u64 {
    42
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.telemetry.hammer_max, 255.0);
        assert_eq!(config.telemetry.liveness_threshold_secs, 15.0);
        assert!(config.store.enabled);
        assert_eq!(config.store.bind_address, "127.0.0.1:6390");
        assert!(!config.serial.is_simulated());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.serial.read_timeout_ms, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
port = "sim"
read_timeout_ms = 50

[telemetry]
liveness_threshold_secs = 5.0

[simulation]
rate_hz = 100.0
seed = 7

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert!(config.serial.is_simulated());
        assert_eq!(config.serial.read_timeout(), Duration::from_millis(50));
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.telemetry.liveness_threshold_secs, 5.0);
        assert_eq!(config.telemetry.hammer_max, 255.0);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("downhole-io.toml");

        let mut config = AppConfig::default();
        config.serial.port = "/dev/ttyS4".to_string();
        config.store.enabled = false;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.serial.port, "/dev/ttyS4");
        assert!(!loaded.store.enabled);
        assert_eq!(loaded.store.bind_address, "127.0.0.1:6390");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = toml::from_str::<AppConfig>("[serial]\nbaud_rate = \"fast\"")
            .map_err(crate::error::Error::from)
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }
}
