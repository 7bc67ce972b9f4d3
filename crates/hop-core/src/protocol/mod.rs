//! Wire protocol: message definitions and the JSON datagram codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_envelope, encode_envelope, ProtocolError, MAX_DATAGRAM_SIZE};
pub use messages::{Envelope, Message, PeerId};
