use thiserror::Error;

use super::kinds::kind;

/// Error taxonomy of the tether runtime.
///
/// The split follows how each error travels:
///
/// - `Protocol` is raised locally by decode operations and is never put on
///   the wire.
/// - `Validation` is raised synchronously by constructors and registration
///   calls.
/// - `MethodNotFound`, `Remote`, `Validation` and `Connection` can cross the
///   wire as an [`ErrorDescriptor`](super::messages::ErrorDescriptor) and be
///   rebuilt on the calling side through the
///   [`ErrorKindRegistry`](super::kinds::ErrorKindRegistry).
/// - `TerminalReconnect` is delivered exactly once through a connection's
///   fatal-error notification when its reconnect budget runs out.
#[derive(Error, Debug)]
pub enum TetherError {
    /// Malformed frame or envelope. Local only, never transmitted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid constructor or registration arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// The called method name is not in the dispatcher's registry.
    #[error("no such method: {0}")]
    MethodNotFound(String),

    /// Reconstruction of an error thrown by a remote handler.
    ///
    /// `kind` passes through the wire unmodified so a relay (the load
    /// balancer) forwards backend failures without rewriting them.
    #[error("{message}")]
    Remote { kind: String, message: String },

    /// A call was attempted while the connection is unavailable, or a
    /// pending call was orphaned by connection teardown.
    #[error("connection error: {0}")]
    Connection(String),

    /// Reconnect attempts are exhausted. Raised exactly once per connection.
    #[error("reconnect attempts exhausted after {attempts} failures")]
    TerminalReconnect { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TetherError {
    /// Error raised by a method handler, carried to the caller as-is.
    ///
    /// The reconstructed copy on the calling side displays exactly
    /// `message`.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_common::TetherError;
    ///
    /// let err = TetherError::raised("oops");
    /// assert_eq!(err.to_string(), "oops");
    /// ```
    pub fn raised(message: impl Into<String>) -> Self {
        TetherError::Remote {
            kind: kind::GENERIC.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;
