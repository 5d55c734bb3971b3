//! UDP transport implementation for mesh and long-range simulation
//!
//! One UDP datagram stands in for one radio frame. The receive buffer holds
//! one byte more than the largest radio frame, so a datagram that fills it
//! is known to be oversized. Such a datagram is handed on at buffer length,
//! which is past every frame limit, and the codec rejects it.

use crate::link::{MAX_LORA_PAYLOAD, MAX_MESH_PAYLOAD};
use crate::transport::traits::{Datagram, PacketReceiver, PacketSender, Radio};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::warn;

const MAX_FRAME_LEN: usize = if MAX_MESH_PAYLOAD > MAX_LORA_PAYLOAD {
    MAX_MESH_PAYLOAD
} else {
    MAX_LORA_PAYLOAD
};
const RECV_BUFFER_SIZE: usize = MAX_FRAME_LEN + 1;

/// UDP socket posing as a packet radio
pub struct UdpRadio {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    name: &'static str,
    buf: Vec<u8>,
}

impl UdpRadio {
    /// Bind a receive-only mesh radio
    pub async fn mesh(bind_address: &str) -> Result<Self> {
        Self::bind(bind_address, None, "Mesh/UDP").await
    }

    /// Bind a long-range radio, optionally with a transmit peer
    pub async fn long_range(bind_address: &str, peer_address: Option<&str>) -> Result<Self> {
        Self::bind(bind_address, peer_address, "LoRa/UDP").await
    }

    async fn bind(
        bind_address: &str,
        peer_address: Option<&str>,
        name: &'static str,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_address)
            .await
            .with_context(|| format!("failed to bind {} on {}", name, bind_address))?;

        let peer = match peer_address {
            Some(addr) => Some(
                lookup_host(addr)
                    .await
                    .with_context(|| format!("failed to resolve peer {}", addr))?
                    .next()
                    .ok_or_else(|| anyhow!("peer {} resolved to no address", addr))?,
            ),
            None => None,
        };

        Ok(Self {
            socket,
            peer,
            name,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl Radio for UdpRadio {
    fn name(&self) -> &'static str {
        self.name
    }
}

#[async_trait]
impl PacketReceiver for UdpRadio {
    async fn try_recv(&mut self) -> Result<Option<Datagram>> {
        match self.socket.try_recv_from(&mut self.buf) {
            Ok((n, from)) => {
                if n == self.buf.len() {
                    warn!(
                        "[{}] Datagram from {} exceeds {} bytes",
                        self.name, from, MAX_FRAME_LEN
                    );
                }
                Ok(Some(Datagram::new(
                    from.to_string(),
                    Bytes::copy_from_slice(&self.buf[..n]),
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PacketSender for UdpRadio {
    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        let peer = self
            .peer
            .ok_or_else(|| anyhow!("{} has no peer address configured", self.name))?;

        let sent = self.socket.send_to(packet, peer).await?;
        if sent != packet.len() {
            return Err(anyhow!("short send: {} of {} bytes", sent, packet.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, CodecError};
    use std::time::Duration;

    async fn recv_within(radio: &mut UdpRadio, wait: Duration) -> Option<Datagram> {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if let Some(datagram) = radio.try_recv().await.expect("recv error") {
                return Some(datagram);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_udp_radio_names() {
        let mesh = UdpRadio::mesh("127.0.0.1:0").await.unwrap();
        assert_eq!(mesh.name(), "Mesh/UDP");

        let lora = UdpRadio::long_range("127.0.0.1:0", None).await.unwrap();
        assert_eq!(lora.name(), "LoRa/UDP");
    }

    #[tokio::test]
    async fn test_try_recv_returns_none_when_idle() {
        let mut radio = UdpRadio::mesh("127.0.0.1:0").await.unwrap();
        assert!(radio.try_recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let mut rx = UdpRadio::long_range("127.0.0.1:0", None).await.unwrap();
        let rx_addr = rx.local_addr().unwrap().to_string();
        let mut tx = UdpRadio::long_range("127.0.0.1:0", Some(&rx_addr)).await.unwrap();

        tx.send(b"first").await.unwrap();
        tx.send(b"second").await.unwrap();

        let first = recv_within(&mut rx, Duration::from_secs(2)).await.expect("no packet");
        let second = recv_within(&mut rx, Duration::from_secs(2)).await.expect("no packet");
        assert_eq!(&first.payload[..], b"first");
        assert_eq!(&second.payload[..], b"second");
        assert_eq!(first.origin, tx.local_addr().unwrap().to_string());
    }

    #[tokio::test]
    async fn test_largest_frame_arrives_whole() {
        let mut rx = UdpRadio::mesh("127.0.0.1:0").await.unwrap();
        let rx_addr = rx.local_addr().unwrap().to_string();
        let mut tx = UdpRadio::long_range("127.0.0.1:0", Some(&rx_addr)).await.unwrap();

        let frame = vec![b'x'; MAX_FRAME_LEN];
        tx.send(&frame).await.unwrap();

        let datagram = recv_within(&mut rx, Duration::from_secs(2)).await.expect("no packet");
        assert_eq!(datagram.payload.len(), MAX_FRAME_LEN);
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_rejected_by_codec() {
        let mut rx = UdpRadio::long_range("127.0.0.1:0", None).await.unwrap();
        let rx_addr = rx.local_addr().unwrap().to_string();
        let mut tx = UdpRadio::long_range("127.0.0.1:0", Some(&rx_addr)).await.unwrap();

        tx.send(&vec![b'7'; 3000]).await.unwrap();

        let datagram = recv_within(&mut rx, Duration::from_secs(2)).await.expect("no packet");
        assert_eq!(datagram.payload.len(), RECV_BUFFER_SIZE);
        assert!(matches!(
            codec::decode_text(&datagram.payload),
            Err(CodecError::MessageTooLarge { .. })
        ));
        assert!(matches!(
            codec::decode_datagram(&datagram.payload),
            Err(CodecError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_without_peer_fails() {
        let mut radio = UdpRadio::mesh("127.0.0.1:0").await.unwrap();
        assert!(radio.send(b"nowhere").await.is_err());
    }
}
