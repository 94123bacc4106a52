use fimp_core::Message;

use crate::error::Result;

pub mod json;

pub use self::json::JsonCodec;

/// Codec trait for turning envelopes into wire payloads and back
pub trait Codec: Send + Sync {
    /// Encode a message into bytes
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;

    /// Decode bytes into a message
    ///
    /// Optional identity fields absent from the payload are left empty.
    fn decode(&self, bytes: &[u8]) -> Result<Message>;
}
