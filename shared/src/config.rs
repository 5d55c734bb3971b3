//! Configuration shared by both relay roles
//!
//! Each binary reads one TOML file at startup. Every section has defaults,
//! so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// Long-range transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LongRangeMode {
    /// AT-command LoRa modem on a serial port
    Serial,
    /// UDP simulation (for development)
    #[default]
    Udp,
}

/// Serial LoRa modem configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialRadioConfig {
    /// Serial device path
    pub port: String,
    pub baud_rate: u32,
    /// This node's modem address
    pub address: u16,
    /// Destination address for transmitted packets (0 broadcasts)
    pub peer_address: u16,
    pub network_id: u8,
    /// Carrier frequency in Hz
    pub band_hz: u64,
    pub spreading_factor: u8,
    /// Modem bandwidth code (7 = 125 kHz)
    pub bandwidth: u8,
    /// Coding rate code (4 = 4/8)
    pub coding_rate: u8,
    pub preamble: u8,
    /// `AT` handshakes with the modem before initialization gives up
    pub init_attempts: u32,
    /// Delay between initialization handshakes
    pub init_retry_delay_ms: u64,
    /// How long to wait for a `+OK` after each command
    pub response_timeout_ms: u64,
}

impl Default for SerialRadioConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            address: 0,
            peer_address: 0,
            network_id: 18,
            band_hz: 433_000_000,
            spreading_factor: 12,
            bandwidth: 7,
            coding_rate: 4,
            preamble: 12,
            init_attempts: 5,
            init_retry_delay_ms: 400,
            response_timeout_ms: 1000,
        }
    }
}

/// UDP simulation configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UdpRadioConfig {
    /// Local address to bind
    pub bind_address: String,
    /// Where transmitted packets go; receive-only when unset
    pub peer_address: Option<String>,
}

impl Default for UdpRadioConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7100".into(),
            peer_address: None,
        }
    }
}

/// Long-range link configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LongRangeConfig {
    pub mode: LongRangeMode,
    pub serial: SerialRadioConfig,
    pub udp: UdpRadioConfig,
}

/// Load a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

/// Load a TOML config file, or fall back to defaults when no path is given
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load_toml(path),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_long_range_config() {
        let config: LongRangeConfig = toml::from_str(
            r#"
            mode = "serial"

            [serial]
            port = "/dev/ttyAMA0"
            spreading_factor = 9
            "#,
        )
        .expect("parse failed");

        assert_eq!(config.mode, LongRangeMode::Serial);
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.spreading_factor, 9);
        assert_eq!(config.serial.band_hz, 433_000_000);
        assert_eq!(config.udp, UdpRadioConfig::default());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<LongRangeConfig, _> = toml::from_str(r#"mode = "carrier-pigeon""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[udp]\nbind_address = \"127.0.0.1:9100\"").expect("write");

        let config: LongRangeConfig = load_toml(file.path()).expect("load failed");
        assert_eq!(config.udp.bind_address, "127.0.0.1:9100");
        assert_eq!(config.mode, LongRangeMode::Udp);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result: Result<LongRangeConfig> =
            load_toml(Path::new("/nonexistent/hydrosense.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_no_path_gives_defaults() {
        let config: LongRangeConfig = load_or_default(None).expect("defaults");
        assert_eq!(config, LongRangeConfig::default());
    }
}
