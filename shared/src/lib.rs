//! HydroSense Shared Relay Core
//!
//! This crate provides the record model, codec, radio transports and
//! connectivity state machine shared by the mesh-to-LoRa bridge
//! (`relay-node`) and the LoRa-to-cloud uplink (`central-node`).

pub mod clock;
pub mod codec;
pub mod config;
pub mod record;
pub mod scheduler;
pub mod state_machine;
pub mod stats;
pub mod transport;

// Re-export commonly used types at crate root
pub use clock::{Clock, ClockError, SystemClock, Uptime};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use codec::CodecError;
pub use record::{FallbackRecord, SensorRecord, WaterLevel};
pub use stats::{DropKind, RelayStats};

/// Link parameters shared by both relay roles
pub mod link {
    /// Largest datagram the mesh radio can deliver (ESP-NOW frame limit)
    pub const MAX_MESH_PAYLOAD: usize = 250;

    /// Largest payload the long-range modem accepts in a single packet
    pub const MAX_LORA_PAYLOAD: usize = 240;

    /// Polls of association status during one bounded association attempt
    pub const ASSOCIATION_POLLS: u32 = 20;

    /// Delay between association status polls
    pub const ASSOCIATION_POLL_INTERVAL_MS: u64 = 1000;

    /// Wait after a failed association attempt before the next one
    pub const RETRY_INTERVAL_MS: u64 = 30_000;

    /// Wait after losing an established association before reconnecting
    pub const LOST_RETRY_DELAY_MS: u64 = 5_000;

    /// Pause at the end of each control loop iteration
    pub const YIELD_INTERVAL_MS: u64 = 10;

    /// Interval between relay statistics summaries
    pub const STATS_INTERVAL_SECS: u64 = 60;
}
