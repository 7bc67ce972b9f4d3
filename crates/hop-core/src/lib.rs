//! # hop-core
//!
//! Shared library for hopscreen: the in-process event bus, the peer handshake
//! engine, the JSON datagram protocol, the screen-edge layout, and key code
//! translation tables.
//!
//! Nothing in this crate opens a socket or touches the OS.  The handshake
//! engine talks to the network through the [`peering::DatagramTransport`]
//! trait, and the node binary supplies a UDP implementation.
//!
//! # How the pieces fit together (for beginners)
//!
//! hopscreen lets one keyboard and mouse drive several computers.  Each
//! machine runs a *node*.  Nodes find each other with a four-message
//! handshake (`introduce`, `connectionProbe`, `probeReply`, `assignId`), after
//! which each side knows a numeric id it can use to address the other.
//!
//! - **`event_bus`** – Every received datagram, and every local lifecycle
//!   notification such as `CONNECTED`, is published on an [`EventBus`] under a
//!   string name.  Components subscribe to the names they care about.
//!
//! - **`peering`** – The [`HandshakeEngine`] owns the peer directory, runs the
//!   handshake, and exposes `connect` and `send`.
//!
//! - **`protocol`** – The wire messages and the JSON codec.
//!
//! - **`domain`** – The static [`ScreenLayout`]: which edge of which screen
//!   leads to which neighbour, and the percent-based coordinate remap used when
//!   the cursor crosses.
//!
//! - **`keymap`** – Translation from forwarded capture key codes to USB HID
//!   usage ids, plus the held-modifier bookkeeping.

pub mod domain;
pub mod event_bus;
pub mod keymap;
pub mod peering;
pub mod protocol;

pub use domain::layout::{Edge, EdgeRule, LayoutError, ScreenEdges, ScreenLayout};
pub use event_bus::{EventBus, OwnerTag, SubscriptionToken};
pub use keymap::hid::HidKeyCode;
pub use peering::{
    DatagramTransport, HandshakeEngine, HandshakePolicy, LocalEndpoint, MessageSender,
    NicknameMap, Peer, PeerDirectory, PeerEvent, SharedNicknames, TransportError,
};
pub use protocol::codec::{decode_envelope, encode_envelope, ProtocolError};
pub use protocol::messages::{Envelope, Message, PeerId};
