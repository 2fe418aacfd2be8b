//! Codec adapter: turns values into transportable text and back.
//!
//! Every `payload` and `action` field on the wire is a string produced by the
//! codec, so the observer decodes them separately from the envelope.

use crate::error::RelayError;
use serde::Serialize;
use serde_json::Value;

/// Lossless value <-> text conversion used for message payloads.
pub trait Codec: Send + Sync {
    /// Encode a value as text.
    fn stringify(&self, value: &Value) -> Result<String, RelayError>;

    /// Decode text produced by [`Codec::stringify`] (or by the observer).
    fn parse(&self, text: &str) -> Result<Value, RelayError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn stringify(&self, value: &Value) -> Result<String, RelayError> {
        Ok(serde_json::to_string(value)?)
    }

    fn parse(&self, text: &str) -> Result<Value, RelayError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Encode any serializable value through `codec`.
pub fn stringify_with<T: Serialize>(codec: &dyn Codec, value: &T) -> Result<String, RelayError> {
    let value = serde_json::to_value(value)?;
    codec.stringify(&value)
}
