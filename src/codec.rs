//! Encodes and decodes [`Message`] values to/from the bytes carried inside a
//! single websocket binary frame. The framing itself (one `Message` per
//! websocket frame) is handled by `tokio-tungstenite`; this module only
//! hides the in-frame byte layout, the way a RESP parser hides wire bytes
//! from the rest of a client/server pair.

use crate::error::{Error, Result};
use crate::message::Message;

/// Serializes a [`Message`] to the bytes carried in one websocket binary
/// frame.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(Error::Codec)
}

/// Deserializes a [`Message`] from the bytes of one websocket binary frame.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    bincode::deserialize(bytes).map_err(Error::Codec)
}
