// SPDX-License-Identifier: Apache-2.0

//! Non-blocking UDP socket configured for minimum latency.

use std::net::{SocketAddr, UdpSocket};
use std::str::FromStr;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::warn;

use crate::error::RsiError;
use crate::types::RsiConfig;

/// Receive/send buffer size requested via `setsockopt`. Best-effort: a
/// failure here is logged in verbose mode but never fatal.
const SOCKET_BUFFER_BYTES: usize = 1024 * 1024;

/// Maximum inbound datagram size accepted from the robot.
pub const MAX_DATAGRAM_BYTES: usize = 4095;

pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Create, configure, and bind the socket. Fatal on any failure per
    /// spec §4.6 (`Start` returns `SocketFailed`).
    pub fn bind(config: &RsiConfig) -> Result<Self, RsiError> {
        let addr = if config.bind_address == "0.0.0.0" {
            SocketAddr::from_str(&format!("0.0.0.0:{}", config.bind_port))
        } else {
            SocketAddr::from_str(&format!("{}:{}", config.bind_address, config.bind_port))
        }
        .map_err(|_| RsiError::SocketFailed)?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|_| RsiError::SocketFailed)?;

        if let Err(e) = socket.set_reuse_address(true) {
            if config.verbose {
                warn!("SO_REUSEADDR failed: {e}");
            }
        }
        if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES) {
            if config.verbose {
                warn!("setting receive buffer size failed: {e}");
            }
        }
        if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_BYTES) {
            if config.verbose {
                warn!("setting send buffer size failed: {e}");
            }
        }

        socket.bind(&addr.into()).map_err(|_| RsiError::SocketFailed)?;
        socket
            .set_nonblocking(true)
            .map_err(|_| RsiError::SocketFailed)?;

        Ok(Transport {
            socket: socket.into(),
        })
    }

    /// Non-blocking receive. `Ok(None)` means nothing was pending.
    pub fn try_recv<'a>(
        &self,
        buf: &'a mut [u8],
    ) -> std::io::Result<Option<(&'a str, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, peer)) => {
                let text = std::str::from_utf8(&buf[..len]).unwrap_or("");
                Ok(Some((text, peer)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Best-effort send to the given peer. Transmit failures are swallowed
    /// by the caller (see engine loop); this just reports them to logs.
    pub fn send_to(&self, data: &[u8], peer: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(data, peer)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_to_ephemeral_loopback_port() {
        let config = RsiConfig::default()
            .with_bind_address("127.0.0.1")
            .with_bind_port(0);
        let transport = Transport::bind(&config).unwrap();
        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        assert!(transport.try_recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn round_trips_a_datagram() {
        let config = RsiConfig::default()
            .with_bind_address("127.0.0.1")
            .with_bind_port(0);
        let transport = Transport::bind(&config).unwrap();
        let local_addr = transport.socket.local_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"hello", local_addr).unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_BYTES];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            if let Some((text, peer)) = transport.try_recv(&mut buf).unwrap() {
                assert_eq!(text, "hello");
                transport.send_to(b"world", peer).unwrap();
                break;
            }
            assert!(std::time::Instant::now() < deadline, "timed out waiting for datagram");
            std::thread::yield_now();
        }

        let mut reply = [0u8; 16];
        client.set_read_timeout(Some(std::time::Duration::from_secs(1))).unwrap();
        let (len, _) = client.recv_from(&mut reply).unwrap();
        assert_eq!(&reply[..len], b"world");
    }
}
