//! Pluggable message serialization.
//!
//! The [`MessageCodec`] trait allows users to bring their own serialization
//! format (JSON, bincode, protobuf, messagepack, etc.) while streamrail
//! provides a default [`JsonCodec`] for debugging and getting started
//! quickly. The same codec instance serializes both wire envelopes and
//! typed application payloads in the stream adapters.
//!
//! # Example
//!
//! ```rust
//! use streamrail::{MessageCodec, JsonCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct MyEvent {
//!     id: u32,
//!     content: String,
//! }
//!
//! let codec = JsonCodec;
//! let event = MyEvent { id: 42, content: "hello".to_string() };
//!
//! let bytes = codec.encode(&event).unwrap();
//! let decoded: MyEvent = codec.decode(&bytes).unwrap();
//! assert_eq!(event, decoded);
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    #[error("encode error: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),

    /// Failed to decode bytes to a message.
    #[error("decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync>),
}

/// Pluggable message serialization format.
///
/// Implement this trait to use custom serialization formats (bincode,
/// protobuf, etc.). The trait requires `Clone + 'static` so codec instances
/// can be stored in endpoints and adapters.
///
/// # Serde Dependency
///
/// This trait uses serde's `Serialize` and `DeserializeOwned` bounds, which
/// means your message types must derive or implement serde traits.
pub trait MessageCodec: Clone + 'static {
    /// Encode a serializable message to bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes to a deserializable message.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
///
/// This is the default codec provided by streamrail. It's great for
/// debugging (human-readable wire traffic) but not the most compact format
/// for production use.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
