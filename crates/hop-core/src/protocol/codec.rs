//! JSON codec for datagram envelopes.
//!
//! One [`Envelope`] per UDP datagram, encoded as a single JSON object.  Decode
//! failures are ordinary errors: the receive loop logs them and drops the
//! datagram rather than stopping.

use thiserror::Error;

use crate::protocol::messages::Envelope;

/// Largest datagram the codec will produce or accept (64 KiB).
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Errors that can occur while encoding or decoding a datagram.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The datagram exceeds [`MAX_DATAGRAM_SIZE`].
    #[error("datagram too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// The datagram is not valid JSON, has an unknown `type`, or is missing
    /// a required field.
    #[error("malformed datagram: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encodes `envelope` into the bytes of one datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails and
/// [`ProtocolError::TooLarge`] if the result would not fit in a datagram.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(envelope).map_err(ProtocolError::Encode)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::TooLarge {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(bytes)
}

/// Decodes the bytes of one datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLarge`] for oversized input and
/// [`ProtocolError::Malformed`] for anything that is not a valid envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::TooLarge {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    serde_json::from_slice(bytes).map_err(ProtocolError::Malformed)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
