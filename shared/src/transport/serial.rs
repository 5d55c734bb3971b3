//! Serial LoRa modem transport
//!
//! Drives an RYLR-class LoRa modem over UART with AT commands:
//! ```text
//! host  -> modem:  AT+SEND=<addr>,<len>,<data>\r\n
//! modem -> host:   +RCV=<addr>,<len>,<data>,<rssi>,<snr>\r\n
//!                  +OK | +READY | +ERR=<code>
//! ```
//! `<data>` is raw payload and may contain commas or line breaks, so a
//! received line is split by its declared length rather than by delimiter.

use crate::config::SerialRadioConfig;
use crate::link::MAX_LORA_PAYLOAD;
use crate::transport::traits::{Datagram, PacketReceiver, PacketSender, Radio};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::FutureExt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Longest line the modem can emit: a full payload plus header and trailer
pub const MAX_LINE_LEN: usize = MAX_LORA_PAYLOAD + 64;

const RCV_PREFIX: &[u8] = b"+RCV=";
const READ_CHUNK: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModemError {
    #[error("malformed +RCV line: bad {0}")]
    Malformed(&'static str),

    #[error("modem line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,
}

/// A packet reported by the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    /// Sender's modem address
    pub address: u16,
    pub payload: Bytes,
    pub rssi: i16,
    pub snr: i16,
}

/// One unit of modem output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemLine {
    Received(ReceivedPacket),
    /// Any other response: `+OK`, `+READY`, `+ERR=<n>`, ...
    Status(String),
}

/// Streaming decoder for modem output
#[derive(Debug, Default)]
pub struct ModemDecoder {
    buffer: BytesMut,
}

impl ModemDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    #[cfg(test)]
    fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Try to decode the next line from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete
    /// lines. After an error the offending line has been discarded, so the
    /// caller can keep decoding.
    pub fn decode_next(&mut self) -> Result<Option<ModemLine>, ModemError> {
        let blank = self
            .buffer
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        self.buffer.advance(blank);

        if self.buffer.is_empty() {
            return Ok(None);
        }

        if self.buffer.starts_with(RCV_PREFIX) {
            return self.decode_received();
        }

        match find_newline(&self.buffer, 0) {
            Some(pos) => {
                let line = self.buffer.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line).trim().to_owned();
                Ok(Some(ModemLine::Status(text)))
            }
            None => self.incomplete(),
        }
    }

    fn decode_received(&mut self) -> Result<Option<ModemLine>, ModemError> {
        let header_start = RCV_PREFIX.len();

        // Address and length are the first two comma-terminated fields
        let mut commas = [0usize; 2];
        let mut found = 0;
        let mut truncated = false;
        for (i, &b) in self.buffer[header_start..].iter().enumerate() {
            if b == b'\n' {
                truncated = true;
                break;
            }
            if b == b',' {
                commas[found] = header_start + i;
                found += 1;
                if found == 2 {
                    break;
                }
            }
        }
        if truncated {
            return self.reject("header");
        }
        if found < 2 {
            return self.incomplete();
        }
        let [comma1, comma2] = commas;

        let Some(address) = parse_field::<u16>(&self.buffer[header_start..comma1]) else {
            return self.reject("address");
        };
        let len = match parse_field::<usize>(&self.buffer[comma1 + 1..comma2]) {
            Some(len) if len <= MAX_LORA_PAYLOAD => len,
            _ => return self.reject("length"),
        };

        let payload_start = comma2 + 1;
        let payload_end = payload_start + len;
        let Some(newline) = find_newline(&self.buffer, payload_end) else {
            return self.incomplete();
        };

        // Trailer: ",<rssi>,<snr>\r"
        let signal = std::str::from_utf8(&self.buffer[payload_end..newline])
            .ok()
            .and_then(|trailer| {
                let mut fields = trailer.trim_end().strip_prefix(',')?.split(',');
                let rssi = fields.next()?.trim().parse::<i16>().ok()?;
                let snr = fields.next()?.trim().parse::<i16>().ok()?;
                Some((rssi, snr))
            });
        let Some((rssi, snr)) = signal else {
            self.buffer.advance(newline + 1);
            return Err(ModemError::Malformed("signal quality"));
        };

        let line = self.buffer.split_to(newline + 1).freeze();
        Ok(Some(ModemLine::Received(ReceivedPacket {
            address,
            payload: line.slice(payload_start..payload_end),
            rssi,
            snr,
        })))
    }

    /// Wait for more data, unless the partial line is already impossible
    fn incomplete(&mut self) -> Result<Option<ModemLine>, ModemError> {
        if self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            return Err(ModemError::LineTooLong);
        }
        Ok(None)
    }

    fn reject(&mut self, field: &'static str) -> Result<Option<ModemLine>, ModemError> {
        match find_newline(&self.buffer, 0) {
            Some(pos) => self.buffer.advance(pos + 1),
            None => self.buffer.clear(),
        }
        Err(ModemError::Malformed(field))
    }
}

fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| from + i)
}

fn parse_field<T: FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

/// LoRa modem on a serial port
pub struct SerialLoraRadio<S = SerialStream> {
    stream: S,
    decoder: ModemDecoder,
    peer_address: u16,
    response_timeout: Duration,
}

impl SerialLoraRadio<SerialStream> {
    /// Open the serial port and configure the modem
    pub async fn open(config: &SerialRadioConfig) -> Result<Self> {
        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .with_context(|| format!("failed to open serial port {}", config.port))?;

        info!("Opened {} at {} baud", config.port, config.baud_rate);
        Self::initialize(stream, config).await
    }
}

impl<S> SerialLoraRadio<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wake the modem on `stream` and apply the radio parameters
    pub async fn initialize(stream: S, config: &SerialRadioConfig) -> Result<Self> {
        let mut radio = Self::unconfigured(stream, config);

        radio.handshake(config).await?;
        radio
            .command(&format!("AT+ADDRESS={}", config.address))
            .await?;
        radio
            .command(&format!("AT+NETWORKID={}", config.network_id))
            .await?;
        radio.command(&format!("AT+BAND={}", config.band_hz)).await?;
        radio
            .command(&format!(
                "AT+PARAMETER={},{},{},{}",
                config.spreading_factor, config.bandwidth, config.coding_rate, config.preamble
            ))
            .await?;

        info!(
            address = config.address,
            network_id = config.network_id,
            "LoRa modem ready: {} Hz SF{} BW{} CR{}",
            config.band_hz,
            config.spreading_factor,
            config.bandwidth,
            config.coding_rate
        );
        Ok(radio)
    }

    fn unconfigured(stream: S, config: &SerialRadioConfig) -> Self {
        Self {
            stream,
            decoder: ModemDecoder::new(),
            peer_address: config.peer_address,
            response_timeout: Duration::from_millis(config.response_timeout_ms),
        }
    }

    async fn handshake(&mut self, config: &SerialRadioConfig) -> Result<()> {
        let attempts = config.init_attempts.max(1);

        for attempt in 1..=attempts {
            match self.command("AT").await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "LoRa modem not responding (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                    if attempt < attempts {
                        sleep(Duration::from_millis(config.init_retry_delay_ms)).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "LoRa modem did not respond after {} attempts",
            attempts
        ))
    }

    /// Send a configuration command and wait for `+OK`
    async fn command(&mut self, command: &str) -> Result<()> {
        debug!("Modem <- {}", command);
        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;

        timeout(self.response_timeout, self.await_ok())
            .await
            .map_err(|_| anyhow!("no response to {}", command))?
    }

    async fn await_ok(&mut self) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            while let Some(line) = self.next_line() {
                match line {
                    ModemLine::Status(status) if status == "+OK" => return Ok(()),
                    ModemLine::Status(status) if status.starts_with("+ERR") => {
                        bail!("modem rejected command: {}", status)
                    }
                    ModemLine::Status(status) => debug!("Modem -> {}", status),
                    ModemLine::Received(packet) => debug!(
                        address = packet.address,
                        "Discarding packet received while awaiting reply"
                    ),
                }
            }

            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                bail!("serial port closed");
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    fn next_line(&mut self) -> Option<ModemLine> {
        loop {
            match self.decoder.decode_next() {
                Ok(line) => return line,
                Err(e) => warn!("Discarding modem output: {}", e),
            }
        }
    }
}

impl<S: Send> Radio for SerialLoraRadio<S> {
    fn name(&self) -> &'static str {
        "LoRa/Serial"
    }
}

#[async_trait]
impl<S> PacketReceiver for SerialLoraRadio<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn try_recv(&mut self) -> Result<Option<Datagram>> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            while let Some(line) = self.next_line() {
                match line {
                    ModemLine::Received(packet) => {
                        info!(
                            address = packet.address,
                            rssi = packet.rssi,
                            snr = packet.snr,
                            "Received LoRa packet ({} bytes)",
                            packet.payload.len()
                        );
                        return Ok(Some(Datagram::new(
                            format!("lora:{}", packet.address),
                            packet.payload,
                        )));
                    }
                    ModemLine::Status(status) if status.starts_with("+ERR") => {
                        warn!("Modem reported {}", status)
                    }
                    ModemLine::Status(status) => debug!("Modem -> {}", status),
                }
            }

            // Poll the port once; pending means nothing more has arrived
            match self.stream.read(&mut buf).now_or_never() {
                None => return Ok(None),
                Some(Ok(0)) => bail!("serial port closed"),
                Some(Ok(n)) => self.decoder.extend(&buf[..n]),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl<S> PacketSender for SerialLoraRadio<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, packet: &[u8]) -> Result<()> {
        if packet.len() > MAX_LORA_PAYLOAD {
            bail!(
                "packet of {} bytes exceeds modem limit of {}",
                packet.len(),
                MAX_LORA_PAYLOAD
            );
        }

        let header = format!("AT+SEND={},{},", self.peer_address, packet.len());
        let mut frame = Vec::with_capacity(header.len() + packet.len() + 2);
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(packet);
        frame.extend_from_slice(b"\r\n");

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        timeout(self.response_timeout, self.await_ok())
            .await
            .map_err(|_| anyhow!("no response to AT+SEND"))?
    }
}
