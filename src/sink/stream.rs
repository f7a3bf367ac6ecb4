//! Network senders: one wire packet per coalesced batch

use super::Sink;
use crate::error::{ImuError, Result};
use crate::sample::MeasurementPoint;
use crate::wire;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

/// Timeout for the start-up TCP connect
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends each coalesced batch as a single UDP datagram
///
/// Datagrams are not split; a batch too large for one datagram fails to
/// send and is dropped like any other send error.
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
    buffer: Vec<u8>,
}

impl UdpSink {
    /// Bind an ephemeral local socket for sending to `target`
    pub fn new(target: SocketAddr) -> Result<Self> {
        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        log::info!("UDP streaming to {}", target);
        Ok(Self {
            socket,
            target,
            buffer: Vec::with_capacity(wire::packet_size(64)),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Sink for UdpSink {
    fn name(&self) -> &'static str {
        "UDP"
    }

    fn deliver(&mut self, points: &[MeasurementPoint], _received: Instant) -> Result<()> {
        wire::encode_packet_into(points, &mut self.buffer);
        let sent = self.socket.send_to(&self.buffer, self.target)?;
        if sent != self.buffer.len() {
            return Err(ImuError::TransferError {
                expected: self.buffer.len() as u32,
                actual: sent as u32,
            });
        }
        log::trace!("Sent {} points ({} bytes) to {}", points.len(), sent, self.target);
        Ok(())
    }
}

/// Writes packets back to back on one TCP connection
///
/// The connection is opened once; there is no reconnect. A failed write
/// drops that batch and the next batch is attempted on the same stream.
pub struct TcpSink {
    stream: TcpStream,
    target: SocketAddr,
    buffer: Vec<u8>,
}

impl TcpSink {
    /// Connect to `target`; failure here is fatal to the sender
    pub fn connect(target: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT).map_err(|source| {
            log::error!("TCP connect to {} failed: {}", target, source);
            ImuError::ConnectFailed {
                endpoint: target.to_string(),
                source,
            }
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        log::info!("TCP streaming to {}", target);
        Ok(Self {
            stream,
            target,
            buffer: Vec::with_capacity(wire::packet_size(64)),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Sink for TcpSink {
    fn name(&self) -> &'static str {
        "TCP"
    }

    fn deliver(&mut self, points: &[MeasurementPoint], _received: Instant) -> Result<()> {
        wire::encode_packet_into(points, &mut self.buffer);
        self.stream.write_all(&self.buffer)?;
        log::trace!("Sent {} points ({} bytes) to {}", points.len(), self.buffer.len(), self.target);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.stream.flush()?;
        Ok(())
    }
}
