//! Radio trait abstraction for pluggable packet transports

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// A single inbound datagram or packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Transport-specific sender identity (peer address, modem address)
    pub origin: String,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(origin: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            origin: origin.into(),
            payload: payload.into(),
        }
    }
}

/// Any radio handle
pub trait Radio: Send {
    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// A radio that can be polled for inbound packets
#[async_trait]
pub trait PacketReceiver: Radio {
    /// Return the next pending packet without waiting for one.
    ///
    /// `Ok(None)` means nothing is pending right now. An error means the
    /// radio itself has failed.
    async fn try_recv(&mut self) -> Result<Option<Datagram>>;
}

/// A radio that can transmit packets
#[async_trait]
pub trait PacketSender: Radio {
    /// Transmit one packet. No delivery confirmation is implied.
    async fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// A long-range radio both sends and receives
pub trait LongRangeRadio: PacketSender + PacketReceiver {}

impl<T: PacketSender + PacketReceiver> LongRangeRadio for T {}

impl<T: Radio + ?Sized> Radio for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<T: PacketReceiver + ?Sized> PacketReceiver for Box<T> {
    async fn try_recv(&mut self) -> Result<Option<Datagram>> {
        (**self).try_recv().await
    }
}

#[async_trait]
impl<T: PacketSender + ?Sized> PacketSender for Box<T> {
    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        (**self).send(packet).await
    }
}
