//! Codec trait and the JSON implementation.
//!
//! CloudLink speaks JSON text frames. The [`Codec`] trait keeps the session
//! layer independent of that choice; [`JsonCodec`] is the only
//! implementation the server understands today.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ProtocolError;

/// Converts packets to frame bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into frame bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes frame bytes into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes an inbound frame into the raw packet that listeners match
    /// against. Anything other than a JSON object is rejected.
    fn decode_packet(&self, data: &[u8]) -> Result<Value, ProtocolError> {
        let packet: Value = self.decode(data)?;
        if !packet.is_object() {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected a packet object, got {packet}"
            )));
        }
        Ok(packet)
    }
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use cloudlink_protocol::{Codec, JsonCodec, Packet};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Packet::ping()).unwrap();
/// assert_eq!(bytes, br#"{"cmd":"ping","val":""}"#);
///
/// let packet = codec.decode_packet(&bytes).unwrap();
/// assert_eq!(packet["cmd"], "ping");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;

    #[test]
    fn test_encode_direct_nests_envelope() {
        let packet = Packet::direct(Packet::auth_password("bob", "hunter2"));

        let bytes = JsonCodec.encode(&packet).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["cmd"], "direct");
        assert_eq!(value["val"]["cmd"], "authpswd");
        assert_eq!(value["val"]["val"]["username"], "bob");
        assert_eq!(value["val"]["val"]["pswd"], "hunter2");
    }

    #[test]
    fn test_decode_packet_rejects_non_object() {
        let result = JsonCodec.decode_packet(b"[1, 2, 3]");

        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_packet_rejects_malformed_json() {
        let result = JsonCodec.decode_packet(b"{\"cmd\": ");

        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_packet_keeps_unknown_fields() {
        let packet = JsonCodec
            .decode_packet(br#"{"cmd":"statuscode","val":"I:100 | OK","listener":"x"}"#)
            .unwrap();

        assert_eq!(packet["listener"], "x");
    }
}
