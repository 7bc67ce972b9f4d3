//! The outbound datagram seam.
//!
//! The handshake engine never touches a socket.  It hands each outgoing
//! [`Envelope`] to a [`DatagramTransport`], which the node binary backs with a
//! UDP socket and tests back with [`RecordingTransport`].

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::protocol::codec::ProtocolError;
use crate::protocol::messages::Envelope;

/// Errors a transport can report for one send.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode datagram: {0}")]
    Encode(#[from] ProtocolError),

    #[error("socket send failed: {0}")]
    Io(#[from] std::io::Error),

    /// The socket buffer is full.  The datagram is dropped rather than
    /// waiting, since sends must never block the event loop.
    #[error("socket buffer full; datagram to {0} dropped")]
    WouldBlock(SocketAddr),
}

/// Sends one envelope as one datagram.
///
/// Implementations must not block: the engine calls this from inside event
/// bus handlers.
pub trait DatagramTransport: Send + Sync {
    /// Sends `envelope` to `dest`.
    fn send_to(&self, dest: SocketAddr, envelope: &Envelope) -> Result<(), TransportError>;
}

/// A transport that records every send instead of transmitting.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    /// Every `(destination, envelope)` passed to `send_to`, in order.
    pub sent: Mutex<Vec<(SocketAddr, Envelope)>>,
    /// When `true`, `send_to` fails without recording.
    pub should_fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Removes and returns everything sent so far.
    pub fn take(&self) -> Vec<(SocketAddr, Envelope)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DatagramTransport for RecordingTransport {
    fn send_to(&self, dest: SocketAddr, envelope: &Envelope) -> Result<(), TransportError> {
        if self.should_fail {
            return Err(TransportError::WouldBlock(dest));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((dest, envelope.clone()));
        Ok(())
    }
}
