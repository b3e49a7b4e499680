//! Wire codec for RPC messages.
//!
//! Messages travel as JSON text; this module owns the mapping between the
//! in-memory [`CallMessage`]/[`CallbackMessage`] types and their wire
//! envelopes. Framing is a separate concern handled by
//! [`frame`](super::framer::frame) and
//! [`MessageFramer`](super::framer::MessageFramer).
//!
//! Decoding is strict about the envelope: the `type` discriminator must
//! match the expectation and required fields must be present, each
//! violation raising a local `Protocol` error naming the offending field.
//! Those errors are never transmitted; they only reach the local caller of
//! the decode operation.

use serde_json::{Map, Value};

use crate::protocol::error::{Result, TetherError};
use crate::protocol::messages::{CallMessage, CallbackMessage, ErrorDescriptor};

/// Codec for encoding/decoding RPC messages.
///
/// Currently only JSON is supported, but the enum allows for future
/// extensibility.
///
/// # Example
///
/// ```
/// use tether_common::transport::Codec;
/// use tether_common::CallMessage;
/// use serde_json::json;
///
/// let codec = Codec::new();
/// let call = CallMessage::new(1, "echo", vec![json!("hi")]);
///
/// let encoded = codec.encode_call(&call).unwrap();
/// let decoded = codec.decode_call(&encoded).unwrap();
/// assert_eq!(call, decoded);
/// ```
pub enum Codec {
    /// JSON codec (currently the only supported format)
    Json(JsonCodec),
}

impl Codec {
    pub fn new() -> Self {
        Codec::Json(JsonCodec)
    }

    pub fn encode_call(&self, call: &CallMessage) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode_call(call),
        }
    }

    pub fn decode_call(&self, data: &[u8]) -> Result<CallMessage> {
        match self {
            Codec::Json(_) => JsonCodec::decode_call(data),
        }
    }

    pub fn encode_callback(&self, callback: &CallbackMessage) -> Result<Vec<u8>> {
        match self {
            Codec::Json(_) => JsonCodec::encode_callback(callback),
        }
    }

    pub fn decode_callback(&self, data: &[u8]) -> Result<CallbackMessage> {
        match self {
            Codec::Json(_) => JsonCodec::decode_callback(data),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON codec for encoding/decoding RPC messages.
///
/// # Wire Envelopes
///
/// ```text
/// Call:     { "type":"call",     "mid": <int>, "name": <string>, "args": [<json>...] }
/// Callback: { "type":"callback", "mid": <int>, "ret": <json>|omitted, "err": {...}|omitted }
/// ```
///
/// In a callback the absence of `err` means success, even when `ret` is
/// itself absent or null.
pub struct JsonCodec;

impl JsonCodec {
    /// Encodes a call to its JSON envelope bytes.
    pub fn encode_call(call: &CallMessage) -> Result<Vec<u8>> {
        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::from("call"));
        envelope.insert("mid".to_string(), Value::from(call.id));
        envelope.insert("name".to_string(), Value::from(call.method.clone()));
        envelope.insert("args".to_string(), Value::Array(call.args.clone()));
        Ok(serde_json::to_vec(&Value::Object(envelope))?)
    }

    /// Decodes a call from its JSON envelope bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error when the payload is not JSON, the `type`
    /// discriminator is not `"call"`, or `mid`/`name`/`args` are missing or
    /// of the wrong shape. The error names the offending field.
    pub fn decode_call(data: &[u8]) -> Result<CallMessage> {
        let envelope = parse_envelope(data, "call")?;

        let id = require_mid(&envelope)?;
        let method = envelope
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("name"))?
            .to_string();
        let args = envelope
            .get("args")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("args"))?
            .clone();

        Ok(CallMessage { id, method, args })
    }

    /// Encodes a callback to its JSON envelope bytes. `ret` and `err` are
    /// omitted, not null, when absent.
    pub fn encode_callback(callback: &CallbackMessage) -> Result<Vec<u8>> {
        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::from("callback"));
        envelope.insert("mid".to_string(), Value::from(callback.id));
        if let Some(result) = &callback.result {
            envelope.insert("ret".to_string(), result.clone());
        }
        if let Some(error) = &callback.error {
            envelope.insert("err".to_string(), serde_json::to_value(error)?);
        }
        Ok(serde_json::to_vec(&Value::Object(envelope))?)
    }

    /// Decodes a callback from its JSON envelope bytes.
    ///
    /// A null `ret` or `err` is treated the same as an omitted one. The
    /// error descriptor, when present, must carry string `kind` and
    /// `message` fields; reconstruction into a typed error is the
    /// [`ErrorKindRegistry`](crate::protocol::kinds::ErrorKindRegistry)'s
    /// job and never happens here, so decoding cannot fail because of an
    /// unrecognized kind.
    pub fn decode_callback(data: &[u8]) -> Result<CallbackMessage> {
        let envelope = parse_envelope(data, "callback")?;

        let id = require_mid(&envelope)?;
        let result = envelope.get("ret").cloned();
        let error = match envelope.get("err") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let descriptor = value
                    .as_object()
                    .ok_or_else(|| TetherError::Protocol("field `err` is not an object".to_string()))?;
                let kind = descriptor
                    .get("kind")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing("err.kind"))?;
                let message = descriptor
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing("err.message"))?;
                Some(ErrorDescriptor::new(kind, message))
            }
        };

        Ok(CallbackMessage { id, result, error })
    }
}

/// Parses the JSON envelope and checks the `type` discriminator.
fn parse_envelope(data: &[u8], expected: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| TetherError::Protocol(format!("payload is not valid JSON: {e}")))?;
    let Value::Object(envelope) = value else {
        return Err(TetherError::Protocol(
            "payload is not a JSON object".to_string(),
        ));
    };

    match envelope.get("type").and_then(Value::as_str) {
        Some(kind) if kind == expected => Ok(envelope),
        Some(other) => Err(TetherError::Protocol(format!(
            "expected a \"{expected}\" message, got \"{other}\""
        ))),
        None => Err(missing("type")),
    }
}

fn require_mid(envelope: &Map<String, Value>) -> Result<u64> {
    envelope
        .get("mid")
        .and_then(Value::as_u64)
        .ok_or_else(|| missing("mid"))
}

fn missing(field: &str) -> TetherError {
    TetherError::Protocol(format!("missing field `{field}`"))
}
