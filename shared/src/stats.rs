//! Relay counters, reported periodically by the scheduler

use std::fmt;

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropKind {
    Decode,
    Encode,
    ClockUnavailable,
    Transmit,
    NotConnected,
    Transport,
}

impl fmt::Display for DropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropKind::Decode => "DecodeError",
            DropKind::Encode => "EncodeError",
            DropKind::ClockUnavailable => "ClockUnavailable",
            DropKind::Transmit => "TransmitError",
            DropKind::NotConnected => "NotConnected",
            DropKind::Transport => "TransportError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub sent: u64,
    pub decode: u64,
    pub encode: u64,
    pub clock_unavailable: u64,
    pub transmit: u64,
    pub not_connected: u64,
    pub transport: u64,
}

impl RelayStats {
    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_dropped(&mut self, kind: DropKind) {
        let counter = match kind {
            DropKind::Decode => &mut self.decode,
            DropKind::Encode => &mut self.encode,
            DropKind::ClockUnavailable => &mut self.clock_unavailable,
            DropKind::Transmit => &mut self.transmit,
            DropKind::NotConnected => &mut self.not_connected,
            DropKind::Transport => &mut self.transport,
        };
        *counter += 1;
    }

    pub fn dropped(&self) -> u64 {
        self.decode
            + self.encode
            + self.clock_unavailable
            + self.transmit
            + self.not_connected
            + self.transport
    }
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} sent={} dropped={} (decode={} encode={} clock={} transmit={} not_connected={} transport={})",
            self.received,
            self.sent,
            self.dropped(),
            self.decode,
            self.encode,
            self.clock_unavailable,
            self.transmit,
            self.not_connected,
            self.transport
        )
    }
}
