//! Protocol message types.
//!
//! Two message kinds exist: a [`CallMessage`] travels from the calling peer
//! to the serving peer, and a [`CallbackMessage`] carries the outcome back.
//! Both live for exactly one round trip.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TetherError;
use super::kinds::kind;

/// Identifier correlating a call with its callback.
///
/// Unique among a connection's currently outstanding calls; allocated
/// monotonically and never reused within a connection instance.
pub type MessageId = u64;
pub type MethodName = String;

/// Ordered call arguments, each a JSON-compatible value.
pub type RpcArgs = Vec<Value>;

/// A call to a method exposed by a remote peer.
///
/// Created by the calling side per invocation and consumed exactly once by
/// the receiving dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    /// Identifier echoed back by the matching callback
    pub id: MessageId,
    /// Name of the method to invoke
    pub method: MethodName,
    /// Arguments passed to the method, in order
    pub args: RpcArgs,
}

impl CallMessage {
    pub fn new(id: MessageId, method: impl Into<String>, args: RpcArgs) -> Self {
        CallMessage {
            id,
            method: method.into(),
            args,
        }
    }
}

/// The outcome of a call, addressed back to the caller by message id.
///
/// Exactly one of `result`/`error` conveys the outcome: an absent `error`
/// means success even when `result` is itself absent or null.
///
/// # Example
///
/// ```
/// use tether_common::{CallbackMessage, ErrorDescriptor};
/// use serde_json::json;
///
/// let ok = CallbackMessage::success(7, json!({"pi": 3.14159}));
/// assert!(ok.error.is_none());
///
/// let failed = CallbackMessage::failure(7, ErrorDescriptor::new("error", "boom"));
/// assert!(failed.result.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackMessage {
    /// Identifier of the call this callback answers
    pub id: MessageId,
    /// Value the method resolved with (present on success)
    pub result: Option<Value>,
    /// Descriptor of the error the method rejected with (present on failure)
    pub error: Option<ErrorDescriptor>,
}

impl CallbackMessage {
    /// Creates a successful callback.
    pub fn success(id: MessageId, result: Value) -> Self {
        CallbackMessage {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed callback carrying the given error descriptor.
    pub fn failure(id: MessageId, error: ErrorDescriptor) -> Self {
        CallbackMessage {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Wire form of an error: a symbolic kind plus a human-readable message.
///
/// `kind` identifies an entry in the
/// [`ErrorKindRegistry`](super::kinds::ErrorKindRegistry) so the calling
/// side can rebuild a typed error; unknown kinds degrade to a generic error
/// that still carries both fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: String,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorDescriptor {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&TetherError> for ErrorDescriptor {
    /// Maps an error to its wire form.
    ///
    /// `Remote` kinds pass through unchanged; every variant without a
    /// dedicated kind serializes under the generic fallback kind with its
    /// display message.
    fn from(err: &TetherError) -> Self {
        match err {
            TetherError::MethodNotFound(method) => {
                Self::new(kind::METHOD_NOT_FOUND, method.clone())
            }
            TetherError::Validation(message) => Self::new(kind::VALIDATION, message.clone()),
            TetherError::Connection(message) => Self::new(kind::CONNECTION, message.clone()),
            TetherError::Remote { kind, message } => Self::new(kind.clone(), message.clone()),
            other => Self::new(kind::GENERIC, other.to_string()),
        }
    }
}
