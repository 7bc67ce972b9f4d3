//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`udp`** – The node's single UDP socket.  Implements
//!   [`hop_core::peering::DatagramTransport`] for outbound envelopes and
//!   exposes the receive half to the event loop.
//!
//! - **`interfaces`** – Enumerates the local IPv4 addresses advertised in
//!   `introduce`.

use std::net::SocketAddr;

use thiserror::Error;

pub mod interfaces;
pub mod udp;

/// Error type for socket setup.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enumerate network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),
}
