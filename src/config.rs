//! Uplink configuration

use anyhow::{ensure, Context, Result};
use hydrosense_shared::config::{load_or_default, LongRangeConfig};
use hydrosense_shared::link;
use hydrosense_shared::state_machine::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wireless network the uplink associates with
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network interface name
    pub interface: String,
    pub ssid: String,
    pub password: String,
    /// Directory holding per-interface `operstate` files
    pub sysfs_root: PathBuf,
    /// NetworkManager client used to request association
    pub association_command: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".into(),
            ssid: String::new(),
            password: String::new(),
            sysfs_root: PathBuf::from("/sys/class/net"),
            association_command: "nmcli".into(),
        }
    }
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("interface", &self.interface)
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("sysfs_root", &self.sysfs_root)
            .field("association_command", &self.association_command)
            .finish()
    }
}

/// Association timing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Status checks in one bounded association attempt
    pub association_polls: u32,
    pub association_poll_interval_ms: u64,
    /// Delay after a failed association attempt
    pub retry_interval_ms: u64,
    /// Delay after an established association drops
    pub lost_retry_delay_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            association_polls: link::ASSOCIATION_POLLS,
            association_poll_interval_ms: link::ASSOCIATION_POLL_INTERVAL_MS,
            retry_interval_ms: link::RETRY_INTERVAL_MS,
            lost_retry_delay_ms: link::LOST_RETRY_DELAY_MS,
        }
    }
}

impl ConnectivityConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_interval_ms: self.retry_interval_ms,
            lost_retry_delay_ms: self.lost_retry_delay_ms,
        }
    }

    pub fn association_poll_interval(&self) -> Duration {
        Duration::from_millis(self.association_poll_interval_ms)
    }
}

/// Cloud store endpoint
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Full URL records are POSTed to
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/rest/v1/water_levels".into(),
            api_key: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl CloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub long_range: LongRangeConfig,
    pub network: NetworkConfig,
    pub connectivity: ConnectivityConfig,
    pub cloud: CloudConfig,
    pub yield_interval_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            long_range: LongRangeConfig::default(),
            network: NetworkConfig::default(),
            connectivity: ConnectivityConfig::default(),
            cloud: CloudConfig::default(),
            yield_interval_ms: link::YIELD_INTERVAL_MS,
            stats_interval_secs: link::STATS_INTERVAL_SECS,
        }
    }
}

impl UplinkConfig {
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.stats_interval_secs > 0,
            "stats_interval_secs must be at least 1"
        );
        Ok(())
    }
}

/// Load the uplink config from `path`, or use defaults
pub fn load(path: Option<&Path>) -> Result<UplinkConfig> {
    let config: UplinkConfig = load_or_default(path)?;
    config.validate().context("invalid uplink config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_link_timing() {
        let config = UplinkConfig::default();
        assert_eq!(config.connectivity.association_polls, 20);
        assert_eq!(
            config.connectivity.retry_policy(),
            RetryPolicy {
                retry_interval_ms: 30_000,
                lost_retry_delay_ms: 5_000,
            }
        );
        assert_eq!(config.cloud.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config: UplinkConfig = toml::from_str(
            r#"
            [network]
            ssid = "field-ap"
            password = "hunter22"

            [cloud]
            api_key = "sb-secret-key"
            "#,
        )
        .expect("parse failed");

        let debug = format!("{:?}", config);
        assert!(debug.contains("field-ap"));
        assert!(!debug.contains("hunter22"));
        assert!(!debug.contains("sb-secret-key"));
    }

    #[test]
    fn test_load_uplink_config() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
            yield_interval_ms = 5

            [connectivity]
            retry_interval_ms = 60000

            [cloud]
            endpoint = "https://example.supabase.co/rest/v1/water_levels"
            request_timeout_ms = 2500
            "#
        )
        .expect("write");

        let config = load(Some(file.path())).expect("load failed");
        assert_eq!(config.yield_interval(), Duration::from_millis(5));
        assert_eq!(config.connectivity.retry_interval_ms, 60_000);
        assert_eq!(config.connectivity.lost_retry_delay_ms, 5_000);
        assert_eq!(
            config.cloud.endpoint,
            "https://example.supabase.co/rest/v1/water_levels"
        );
        assert_eq!(config.cloud.request_timeout(), Duration::from_millis(2500));
        assert_eq!(config.network.interface, "wlan0");
    }

    #[test]
    fn test_load_rejects_zero_stats_interval() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "stats_interval_secs = 0").expect("write");

        let err = load(Some(file.path())).expect_err("zero interval accepted");
        assert!(format!("{:#}", err).contains("stats_interval_secs"));
    }
}
