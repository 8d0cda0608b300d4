//! Error types for the protocol layer.

/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value could not be serialized.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes could not be turned back into the expected type: malformed
    /// JSON, missing fields, unknown message types, or a board position
    /// outside `1..=9`.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded fine but breaks a protocol rule, e.g. a second
    /// `Handshake` or a request sent before the handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
