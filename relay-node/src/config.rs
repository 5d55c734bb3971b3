//! Bridge configuration

use anyhow::{ensure, Context, Result};
use hydrosense_shared::config::{load_or_default, LongRangeConfig, UdpRadioConfig};
use hydrosense_shared::link;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// What to do when the clock cannot stamp a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockFailurePolicy {
    /// Drop the record, log, keep relaying
    #[default]
    Drop,
    /// Stop the bridge with an error
    Halt,
}

/// Mesh receiver configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub bind_address: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7000".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mesh: MeshConfig,
    pub long_range: LongRangeConfig,
    pub clock_failure: ClockFailurePolicy,
    pub yield_interval_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mesh: MeshConfig::default(),
            long_range: LongRangeConfig {
                udp: UdpRadioConfig {
                    bind_address: "0.0.0.0:0".into(),
                    peer_address: Some("127.0.0.1:7100".into()),
                },
                ..Default::default()
            },
            clock_failure: ClockFailurePolicy::default(),
            yield_interval_ms: link::YIELD_INTERVAL_MS,
            stats_interval_secs: link::STATS_INTERVAL_SECS,
        }
    }
}

impl BridgeConfig {
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

/// Load the bridge config from `path`, or use defaults
pub fn load(path: Option<&Path>) -> Result<BridgeConfig> {
    let config: BridgeConfig = load_or_default(path)?;
    config.validate().context("invalid bridge config")?;
    Ok(config)
}
