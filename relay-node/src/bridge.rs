//! Mesh-to-LoRa bridge
//!
//! Each mesh datagram is decoded, stamped with the bridge's clock and sent
//! as exactly one long-range packet. Nothing is queued or retried; a record
//! that fails any step is dropped and logged.

use crate::config::ClockFailurePolicy;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hydrosense_shared::codec::{self, CodecError};
use hydrosense_shared::scheduler::PollTask;
use hydrosense_shared::transport::{Datagram, PacketReceiver, PacketSender};
use hydrosense_shared::{Clock, ClockError, DropKind, RelayStats, SensorRecord};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a mesh datagram was not relayed
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("decode error: {0}")]
    Decode(CodecError),

    #[error("encode error: {0}")]
    Encode(CodecError),

    #[error("clock unavailable: {0}")]
    ClockUnavailable(#[from] ClockError),

    #[error("long-range transmit failed: {0}")]
    Transmit(anyhow::Error),
}

impl BridgeError {
    pub fn kind(&self) -> DropKind {
        match self {
            BridgeError::Decode(_) => DropKind::Decode,
            BridgeError::Encode(_) => DropKind::Encode,
            BridgeError::ClockUnavailable(_) => DropKind::ClockUnavailable,
            BridgeError::Transmit(_) => DropKind::Transmit,
        }
    }
}

pub struct Bridge<M, R, C> {
    mesh: M,
    radio: R,
    clock: C,
    clock_failure: ClockFailurePolicy,
    stats: RelayStats,
}

impl<M, R, C> Bridge<M, R, C>
where
    M: PacketReceiver,
    R: PacketSender,
    C: Clock,
{
    pub fn new(mesh: M, radio: R, clock: C, clock_failure: ClockFailurePolicy) -> Self {
        Self {
            mesh,
            radio,
            clock,
            clock_failure,
            stats: RelayStats::default(),
        }
    }

    /// Relay one mesh datagram over the long-range link
    ///
    /// Returns the record as transmitted.
    pub async fn on_mesh_datagram(&mut self, datagram: &Datagram) -> Result<SensorRecord, BridgeError> {
        let record = codec::decode_datagram(&datagram.payload).map_err(BridgeError::Decode)?;
        debug!(origin = %datagram.origin, "Mesh datagram: {:?}", record);

        let timestamp = self.clock.now()?;
        let record = record.with_timestamp(timestamp);
        let packet = codec::encode_sensor_record(&record).map_err(BridgeError::Encode)?;

        self.radio
            .send(&packet)
            .await
            .map_err(BridgeError::Transmit)?;

        info!(
            device_id = %record.device_id,
            timestamp,
            "Relayed reading {} via {}",
            record.water_level,
            self.radio.name()
        );
        Ok(record)
    }

    /// Relay at most one pending mesh datagram
    ///
    /// Returns whether a datagram was taken off the mesh radio. Dropped
    /// records are logged and counted here; only a mesh radio failure or a
    /// clock failure under the halt policy is returned as an error.
    pub async fn poll_mesh(&mut self) -> Result<bool> {
        let Some(datagram) = self.mesh.try_recv().await? else {
            return Ok(false);
        };
        self.stats.record_received();

        match self.on_mesh_datagram(&datagram).await {
            Ok(_) => self.stats.record_sent(),
            Err(BridgeError::ClockUnavailable(e)) if self.clock_failure == ClockFailurePolicy::Halt => {
                self.stats.record_dropped(DropKind::ClockUnavailable);
                error!(origin = %datagram.origin, "Clock unavailable, halting bridge: {}", e);
                return Err(anyhow!("clock unavailable: {}", e));
            }
            Err(e) => {
                warn!(
                    origin = %datagram.origin,
                    kind = %e.kind(),
                    "Dropped mesh datagram: {}",
                    e
                );
                self.stats.record_dropped(e.kind());
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl<M, R, C> PollTask for Bridge<M, R, C>
where
    M: PacketReceiver,
    R: PacketSender,
    C: Clock,
{
    async fn run_once(&mut self) -> Result<()> {
        self.poll_mesh().await?;
        Ok(())
    }

    fn stats(&self) -> &RelayStats {
        &self.stats
    }

    fn name(&self) -> &'static str {
        "bridge"
    }
}
