//! Datagram message definitions.
//!
//! Every datagram carries exactly one JSON object.  The `type` field selects
//! the variant and the top-level `id` field is the receiver's identity for the
//! sender (see [`Envelope`]).
//!
//! | type             | fields                 |
//! |------------------|------------------------|
//! | introduce        | id, interfaces, port   |
//! | connectionProbe  | id, interface, port    |
//! | probeReply       | id, interface, port    |
//! | assignId         | id, myId               |
//! | REQUEST_NICKNAME | id, nickname           |
//! | coord            | id, x, y               |
//! | md / mu          | id                     |
//! | kd               | id, c, m               |
//! | ku               | id, c                  |
//! | wh               | id, y                  |

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Numeric identity a node assigns to one of its peers.
pub type PeerId = u32;

/// Event names for the handshake messages.
pub const INTRODUCE: &str = "introduce";
pub const CONNECTION_PROBE: &str = "connectionProbe";
pub const PROBE_REPLY: &str = "probeReply";
pub const ASSIGN_ID: &str = "assignId";

/// Event names for application messages.
pub const REQUEST_NICKNAME: &str = "REQUEST_NICKNAME";
pub const COORD: &str = "coord";
pub const MOUSE_DOWN: &str = "md";
pub const MOUSE_UP: &str = "mu";
pub const KEY_DOWN: &str = "kd";
pub const KEY_UP: &str = "ku";
pub const WHEEL: &str = "wh";

/// The payload of one datagram, discriminated by the JSON `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Initiator → responder: "here are all my addresses and my port".
    #[serde(rename = "introduce")]
    Introduce { interfaces: Vec<Ipv4Addr>, port: u16 },

    /// Responder → each advertised initiator address.
    #[serde(rename = "connectionProbe")]
    ConnectionProbe { interface: Ipv4Addr, port: u16 },

    /// Initiator → responder, echoing the address the probe was sent to.
    #[serde(rename = "probeReply")]
    ProbeReply { interface: Ipv4Addr, port: u16 },

    /// Responder → initiator: the id the responder assigned the initiator.
    #[serde(rename = "assignId")]
    AssignId {
        #[serde(rename = "myId")]
        my_id: PeerId,
    },

    /// Announces the sender's human-readable screen name.
    #[serde(rename = "REQUEST_NICKNAME")]
    RequestNickname { nickname: String },

    /// Accumulated cursor position on the receiving screen.
    #[serde(rename = "coord")]
    Coord { x: f64, y: f64 },

    #[serde(rename = "md")]
    MouseDown,

    #[serde(rename = "mu")]
    MouseUp,

    /// Key down: `c` is the capture key code, `m` the held modifier codes.
    #[serde(rename = "kd")]
    KeyDown {
        c: u8,
        #[serde(default)]
        m: Vec<u8>,
    },

    #[serde(rename = "ku")]
    KeyUp { c: u8 },

    /// Vertical scroll delta.
    #[serde(rename = "wh")]
    Scroll { y: f64 },
}

impl Message {
    /// Returns the wire `type` string, which doubles as the event bus name.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Introduce { .. } => INTRODUCE,
            Message::ConnectionProbe { .. } => CONNECTION_PROBE,
            Message::ProbeReply { .. } => PROBE_REPLY,
            Message::AssignId { .. } => ASSIGN_ID,
            Message::RequestNickname { .. } => REQUEST_NICKNAME,
            Message::Coord { .. } => COORD,
            Message::MouseDown => MOUSE_DOWN,
            Message::MouseUp => MOUSE_UP,
            Message::KeyDown { .. } => KEY_DOWN,
            Message::KeyUp { .. } => KEY_UP,
            Message::Scroll { .. } => WHEEL,
        }
    }
}

/// A message stamped with the `id` that addresses it.
///
/// For application messages `id` is the identity the *receiver* assigned to
/// the sender.  For handshake messages it is the initiator's id for the
/// responder, echoed through all four steps so the initiator can find its own
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: PeerId,
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    pub fn new(id: PeerId, message: Message) -> Self {
        Self { id, message }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
