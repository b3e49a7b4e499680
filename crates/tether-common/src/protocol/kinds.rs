//! Error kind registry.
//!
//! Maps symbolic error-kind names to constructors so that an
//! [`ErrorDescriptor`] received over the wire can be rebuilt into a typed
//! [`TetherError`] on the calling side. Adding a new kind is additive and
//! needs no protocol change; the registry always falls back to a generic
//! error for kinds it does not know, so envelope decoding never fails
//! because of an unrecognized kind.

use std::collections::HashMap;

use super::error::TetherError;
use super::messages::ErrorDescriptor;

/// Built-in kind names carried in [`ErrorDescriptor::kind`].
pub mod kind {
    /// The called method is not registered on the serving peer.
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    /// Invalid arguments, rejected by a handler.
    pub const VALIDATION: &str = "validation";
    /// A relay could not reach its backend.
    pub const CONNECTION: &str = "connection";
    /// Generic fallback for errors without a dedicated kind.
    pub const GENERIC: &str = "error";
}

/// Constructor rebuilding a typed error from its wire-transmitted message.
pub type ErrorCtor = fn(String) -> TetherError;

/// Registry of reconstructable error kinds.
///
/// # Example
///
/// ```
/// use tether_common::{ErrorDescriptor, ErrorKindRegistry, TetherError};
///
/// let mut kinds = ErrorKindRegistry::default();
/// kinds.register("quota_exceeded", |message| TetherError::Validation(message));
///
/// let err = kinds.reconstruct(&ErrorDescriptor::new("quota_exceeded", "too many calls"));
/// assert!(matches!(err, TetherError::Validation(_)));
///
/// // Unknown kinds degrade to a generic error keeping both fields.
/// let err = kinds.reconstruct(&ErrorDescriptor::new("out_of_cheese", "++?????++"));
/// assert!(matches!(err, TetherError::Remote { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct ErrorKindRegistry {
    kinds: HashMap<String, ErrorCtor>,
}

impl ErrorKindRegistry {
    /// Creates a registry with the built-in kinds registered.
    pub fn new() -> Self {
        let mut registry = ErrorKindRegistry {
            kinds: HashMap::new(),
        };
        registry.register(kind::METHOD_NOT_FOUND, TetherError::MethodNotFound);
        registry.register(kind::VALIDATION, TetherError::Validation);
        registry.register(kind::CONNECTION, TetherError::Connection);
        registry.register(kind::GENERIC, |message| TetherError::Remote {
            kind: kind::GENERIC.to_string(),
            message,
        });
        registry
    }

    /// Registers a constructor for a kind name. Additive; re-registering a
    /// name replaces the previous constructor.
    pub fn register(&mut self, kind: impl Into<String>, ctor: ErrorCtor) {
        self.kinds.insert(kind.into(), ctor);
    }

    /// Whether a kind name has a registered constructor.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Rebuilds a typed error from its wire form. Never fails: unknown
    /// kinds yield a generic error that still carries the original kind
    /// string and message as data.
    pub fn reconstruct(&self, descriptor: &ErrorDescriptor) -> TetherError {
        match self.kinds.get(&descriptor.kind) {
            Some(ctor) => ctor(descriptor.message.clone()),
            None => TetherError::Remote {
                kind: descriptor.kind.clone(),
                message: descriptor.message.clone(),
            },
        }
    }
}

impl Default for ErrorKindRegistry {
    fn default() -> Self {
        Self::new()
    }
}
