//! Codec trait and implementations for turning frames into bytes.
//!
//! The service never hard-codes a wire format; it asks a [`Codec`].
//! [`JsonCodec`] is the only one shipped, and the one browser clients
//! want anyway.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the bytes are malformed or don't
    /// match the expected type (including out-of-range positions).
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use tateti_protocol::{ClientMessage, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = Envelope::new(1, 0, ClientMessage::LeaveMatch);
///
/// let bytes = codec.encode(&frame).unwrap();
/// let decoded: Envelope<ClientMessage> = codec.decode(&bytes).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientMessage, Envelope, ServerMessage};

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<Envelope<ClientMessage>, _> =
            JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_wrong_shape_returns_error() {
        let result: Result<Envelope<ServerMessage>, _> =
            JsonCodec.decode(br#"{"seq":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_codec_encodes_heartbeat() {
        let frame = Envelope::new(2, 10, ClientMessage::Heartbeat { client_time: 77 });
        let bytes = JsonCodec.encode(&frame).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"Heartbeat\""));
        assert!(text.contains("77"));
    }
}
