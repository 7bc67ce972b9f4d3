//! Peer discovery and addressing.
//!
//! - [`engine`] – The four-message handshake plus `connect` and `send`.
//! - [`directory`] – Peer records and the interface index.
//! - [`nicknames`] – Screen nickname → peer id.
//! - [`transport`] – The outbound datagram seam.

pub mod directory;
pub mod engine;
pub mod nicknames;
pub mod transport;

pub use directory::{DirectoryError, Peer, PeerDirectory};
pub use engine::{
    HandshakeEngine, HandshakePolicy, LocalEndpoint, MessageSender, PeerEvent, CONNECTED,
    HANDSHAKE_EXPIRED, INCOMING_CONNECTION,
};
pub use nicknames::{NicknameMap, SharedNicknames};
pub use transport::{DatagramTransport, RecordingTransport, TransportError};
