//! Packet radio transports
//!
//! The mesh hop is simulated over UDP on Linux hosts. The long-range hop
//! runs either on an AT-command LoRa modem attached by serial port or on
//! the same UDP simulation.

pub mod serial;
pub mod traits;
pub mod udp;

pub use serial::{ModemDecoder, ModemError, ModemLine, ReceivedPacket, SerialLoraRadio};
pub use traits::{Datagram, LongRangeRadio, PacketReceiver, PacketSender, Radio};
pub use udp::UdpRadio;

use crate::config::{LongRangeConfig, LongRangeMode};
use anyhow::Result;

/// Open the long-range radio selected by `config`
///
/// Failure here is an initialization-phase failure; the caller decides
/// whether to retry or exit.
pub async fn open_long_range(config: &LongRangeConfig) -> Result<Box<dyn LongRangeRadio>> {
    let radio: Box<dyn LongRangeRadio> = match config.mode {
        LongRangeMode::Serial => Box::new(SerialLoraRadio::open(&config.serial).await?),
        LongRangeMode::Udp => Box::new(
            UdpRadio::long_range(
                &config.udp.bind_address,
                config.udp.peer_address.as_deref(),
            )
            .await?,
        ),
    };
    Ok(radio)
}
