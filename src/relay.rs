//! LoRa-to-cloud relay
//!
//! Long-range packets are uploaded one at a time, in arrival order. A packet
//! that is already a brace-delimited record goes up byte-for-byte; anything
//! else is wrapped with the local receive tick first. Each packet gets one
//! upload attempt at most.

use crate::cloud::{CloudSink, UploadError};
use crate::connectivity::{ConnectivityEvent, ConnectivityManager, NetworkLink};
use anyhow::Result;
use async_trait::async_trait;
use hydrosense_shared::codec::{self, CodecError};
use hydrosense_shared::scheduler::PollTask;
use hydrosense_shared::state_machine::ConnectivityState;
use hydrosense_shared::transport::PacketReceiver;
use hydrosense_shared::{DropKind, FallbackRecord, RelayStats, Uptime};
use reqwest::StatusCode;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a long-range packet was not uploaded
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("decode error: {0}")]
    Decode(CodecError),

    #[error("encode error: {0}")]
    Encode(CodecError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl RelayError {
    pub fn kind(&self) -> DropKind {
        match self {
            RelayError::Decode(_) => DropKind::Decode,
            RelayError::Encode(_) => DropKind::Encode,
            RelayError::Upload(UploadError::NotConnected) => DropKind::NotConnected,
            RelayError::Upload(UploadError::Transport(_)) => DropKind::Transport,
        }
    }
}

pub struct Uplink<R, L, S> {
    radio: R,
    connectivity: ConnectivityManager<L>,
    cloud: S,
    uptime: Uptime,
    stats: RelayStats,
}

impl<R, L, S> Uplink<R, L, S>
where
    R: PacketReceiver,
    L: NetworkLink,
    S: CloudSink,
{
    pub fn new(radio: R, connectivity: ConnectivityManager<L>, cloud: S, uptime: Uptime) -> Self {
        Self {
            radio,
            connectivity,
            cloud,
            uptime,
            stats: RelayStats::default(),
        }
    }

    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    /// Make the startup association attempt
    ///
    /// A failure here is not fatal; the next attempt comes from the
    /// connectivity tick.
    pub async fn start(&mut self) -> ConnectivityEvent {
        self.connectivity.start().await
    }

    /// Normalize one long-range packet and upload it
    pub async fn on_long_range_packet(&mut self, packet: &[u8]) -> Result<StatusCode, RelayError> {
        let text = codec::decode_text(packet).map_err(RelayError::Decode)?;

        let body = if codec::is_structured(text) {
            Cow::Borrowed(text)
        } else {
            let record = FallbackRecord::new(text, self.uptime.millis());
            Cow::Owned(codec::encode_fallback(&record).map_err(RelayError::Encode)?)
        };
        debug!("Upload body: {}", body);

        Ok(self.send_to_cloud(&body).await?)
    }

    /// Make one upload attempt for `body`
    ///
    /// Without network association this returns `NotConnected` and makes
    /// no request. A response with any status completes the attempt.
    pub async fn send_to_cloud(&mut self, body: &str) -> Result<StatusCode, UploadError> {
        if !self.connectivity.is_connected() {
            return Err(UploadError::NotConnected);
        }

        let response = self.cloud.post(body).await?;
        if response.status.is_success() {
            info!(status = response.status.as_u16(), "Uploaded record");
        } else {
            warn!(
                status = response.status.as_u16(),
                "Cloud rejected record: {}",
                response.body
            );
        }
        Ok(response.status)
    }

    /// Upload at most one pending long-range packet
    ///
    /// Returns whether a packet was taken off the radio. Only a radio
    /// failure is returned as an error; upload failures are logged and
    /// counted.
    pub async fn poll_long_range(&mut self) -> Result<bool> {
        let Some(packet) = self.radio.try_recv().await? else {
            return Ok(false);
        };
        self.stats.record_received();
        debug!(origin = %packet.origin, "Long-range packet: {} bytes", packet.payload.len());

        match self.on_long_range_packet(&packet.payload).await {
            Ok(_) => self.stats.record_sent(),
            Err(e) => {
                warn!(origin = %packet.origin, kind = %e.kind(), "Dropped packet: {}", e);
                self.stats.record_dropped(e.kind());
            }
        }
        Ok(true)
    }

    /// Run whatever connectivity work is due
    pub async fn tick_connectivity(&mut self) -> Option<ConnectivityEvent> {
        self.connectivity.tick().await
    }
}

#[async_trait]
impl<R, L, S> PollTask for Uplink<R, L, S>
where
    R: PacketReceiver,
    L: NetworkLink,
    S: CloudSink,
{
    async fn run_once(&mut self) -> Result<()> {
        self.poll_long_range().await?;
        self.tick_connectivity().await;
        Ok(())
    }

    fn stats(&self) -> &RelayStats {
        &self.stats
    }

    fn name(&self) -> &'static str {
        "uplink"
    }
}
