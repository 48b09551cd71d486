//! Datagram transport seam.
//!
//! Pipelines only ever send; receiving is driven by the runtime, which
//! hands inbound datagrams to the pipeline as events.

use meshflow_core::MeshAddress;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::trace;

/// Address and port a pipeline sends to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Mesh address of the receiver
    pub address: MeshAddress,
    /// UDP port of the receiver
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(address: MeshAddress, port: u16) -> Self {
        Self { address, port }
    }

    /// Socket address form
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V6(self.address.ip()), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.address, self.port)
    }
}

/// Sends one datagram; must not suspend
pub trait Transport {
    /// Send `payload` to `destination` as a single datagram
    fn send(&mut self, payload: &[u8], destination: Endpoint) -> io::Result<()>;
}

/// UDP transport over a socket shared with the runtime's receive path
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Wrap a bound socket
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, payload: &[u8], destination: Endpoint) -> io::Result<()> {
        let sent = self.socket.try_send_to(payload, destination.socket_addr())?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram: {} of {} bytes", sent, payload.len()),
            ));
        }
        trace!(%destination, len = sent, "Datagram sent");
        Ok(())
    }
}

/// Datagram captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    /// Payload bytes
    pub payload: Vec<u8>,
    /// Receiver
    pub destination: Endpoint,
}

/// In-memory transport that keeps every datagram, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<SentDatagram>,
    fail: bool,
}

impl RecordingTransport {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again)
    pub fn set_failing(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Datagrams sent so far
    pub fn sent(&self) -> &[SentDatagram] {
        &self.sent
    }

    /// Take the datagrams sent so far
    pub fn drain(&mut self) -> Vec<SentDatagram> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, payload: &[u8], destination: Endpoint) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport set to fail",
            ));
        }
        self.sent.push(SentDatagram {
            payload: payload.to_vec(),
            destination,
        });
        Ok(())
    }
}
