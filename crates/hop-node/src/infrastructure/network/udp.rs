//! The node's UDP socket.
//!
//! # Why `try_send_to`? (for beginners)
//!
//! Outbound datagrams are sent from inside event bus handlers, which are plain
//! synchronous closures: they cannot `.await`.  Tokio's `try_send_to` hands
//! the datagram to the kernel immediately if the socket buffer has room and
//! fails with `WouldBlock` otherwise.  A full buffer therefore drops the
//! datagram (UDP gives no delivery guarantee anyway) instead of stalling the
//! event loop.
//!
//! The receive half is an ordinary `async` `recv_from`, polled by the event
//! loop's `select!`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hop_core::peering::{DatagramTransport, TransportError};
use hop_core::protocol::codec::encode_envelope;
use hop_core::protocol::messages::Envelope;
use tokio::net::UdpSocket;
use tracing::{info, trace};

use super::NetworkError;

/// A bound UDP socket shared by the send and receive paths.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Binds `addr` and waits until the socket is writable.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        // Prime write readiness so the first try_send_to does not spuriously
        // report WouldBlock.
        socket
            .writable()
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        info!("listening on UDP {}", socket.local_addr().unwrap_or(addr));
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives one datagram into `buf`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

impl DatagramTransport for UdpTransport {
    fn send_to(&self, dest: SocketAddr, envelope: &Envelope) -> Result<(), TransportError> {
        let bytes = encode_envelope(envelope)?;
        match self.socket.try_send_to(&bytes, dest) {
            Ok(_) => {
                trace!("sent {} ({} bytes) to {dest}", envelope.message.kind(), bytes.len());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock(dest)),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}
