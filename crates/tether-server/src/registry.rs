//! Method registry and handler types.
//!
//! A [`MethodRegistry`] maps method names to async handlers. It is read on
//! every inbound call and written only by explicit registration calls; a
//! change takes effect immediately for calls dispatched afterwards (last
//! write wins). Readers never hold the lock across an await, so a handler
//! can itself add or remove methods.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use tether_common::protocol::{
    CallMessage, CallbackMessage, ErrorDescriptor, Result, TetherError,
};

/// An async-capable method handler.
///
/// Implemented for every `Fn(Vec<Value>) -> Future<Output = Result<Value>>`
/// closure, so plain async closures register directly via [`Methods`].
pub trait Method: Send + Sync {
    fn invoke(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut> Method for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn invoke(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value>> {
        Box::pin(self(args))
    }
}

/// A fluent collection of name → handler entries for registration.
///
/// # Example
///
/// ```
/// use tether_server::Methods;
/// use serde_json::json;
///
/// let methods = Methods::new()
///     .insert("echo", |mut args| async move { Ok(args.pop().unwrap_or(json!(null))) })
///     .insert("ping", |_args| async { Ok(json!("pong")) });
/// assert_eq!(methods.len(), 2);
/// ```
#[derive(Default, Clone)]
pub struct Methods {
    entries: HashMap<String, Arc<dyn Method>>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler under `name`. Inserting the same name twice keeps the
    /// later handler.
    pub fn insert<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.entries.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The set of methods a dispatcher executes on behalf of callers.
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn Method>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
        }
    }

    /// Merges the given methods into the registry.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error, synchronously and without touching the
    /// registry, if any method name is empty.
    pub fn add(&self, methods: Methods) -> Result<()> {
        validate_names(&methods)?;
        self.methods.write().extend(methods.entries);
        Ok(())
    }

    /// Deregisters methods by name. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when no names are given.
    pub fn remove<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        if names.is_empty() {
            return Err(TetherError::Validation(
                "provide at least one method name".to_string(),
            ));
        }

        let mut methods = self.methods.write();
        for name in names {
            methods.remove(&name);
        }
        Ok(())
    }

    /// Atomically replaces the entire registry with the given methods;
    /// equivalent to removing everything and then adding `methods`.
    pub fn replace(&self, methods: Methods) -> Result<()> {
        validate_names(&methods)?;
        *self.methods.write() = methods.entries;
        Ok(())
    }

    /// Looks a method up by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Method>> {
        self.methods.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    /// Dispatches a call against the registry and returns the callback to
    /// write back.
    ///
    /// An unregistered method name yields a `method_not_found` error
    /// callback; a handler error yields an error callback built from the
    /// error's kind and message. Dispatch itself never fails.
    pub async fn dispatch(&self, call: CallMessage) -> CallbackMessage {
        let CallMessage { id, method, args } = call;

        let Some(handler) = self.lookup(&method) else {
            tracing::debug!(%method, "call for unregistered method");
            let err = TetherError::MethodNotFound(method);
            return CallbackMessage::failure(id, ErrorDescriptor::from(&err));
        };

        match handler.invoke(args).await {
            Ok(value) => CallbackMessage::success(id, value),
            Err(e) => {
                tracing::debug!(%method, error = %e, "handler rejected");
                CallbackMessage::failure(id, ErrorDescriptor::from(&e))
            }
        }
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_names(methods: &Methods) -> Result<()> {
    if methods.entries.keys().any(|name| name.is_empty()) {
        return Err(TetherError::Validation(
            "method names must be non-empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_common::kind;

    fn echo_methods() -> Methods {
        Methods::new().insert("echo", |mut args| async move {
            Ok(args.pop().unwrap_or(json!(null)))
        })
    }

    #[tokio::test]
    async fn test_dispatch_invokes_registered_handler() {
        let registry = MethodRegistry::new();
        registry.add(echo_methods()).unwrap();

        let callback = registry
            .dispatch(CallMessage::new(1, "echo", vec![json!("hi")]))
            .await;

        assert_eq!(callback.result, Some(json!("hi")));
        assert!(callback.error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method_is_not_found() {
        let registry = MethodRegistry::new();

        let callback = registry.dispatch(CallMessage::new(2, "missing", vec![])).await;

        let error = callback.error.unwrap();
        assert_eq!(error.kind, kind::METHOD_NOT_FOUND);
        assert_eq!(error.message, "missing");
    }

    #[tokio::test]
    async fn test_dispatch_handler_error_becomes_descriptor() {
        let registry = MethodRegistry::new();
        registry
            .add(Methods::new().insert("bad", |_args| async { Err(TetherError::raised("oops")) }))
            .unwrap();

        let callback = registry.dispatch(CallMessage::new(3, "bad", vec![])).await;

        let error = callback.error.unwrap();
        assert_eq!(error.kind, kind::GENERIC);
        assert_eq!(error.message, "oops");
    }

    #[tokio::test]
    async fn test_remove_makes_method_not_found_again() {
        let registry = MethodRegistry::new();
        registry.add(echo_methods()).unwrap();
        assert!(registry.contains("echo"));

        registry.remove(["echo"]).unwrap();

        let callback = registry.dispatch(CallMessage::new(4, "echo", vec![])).await;
        assert_eq!(callback.error.unwrap().kind, kind::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_remove_with_no_names_is_rejected() {
        let registry = MethodRegistry::new();
        let err = registry.remove(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, TetherError::Validation(_)));
    }

    #[test]
    fn test_empty_method_name_is_rejected() {
        let registry = MethodRegistry::new();
        let methods = Methods::new().insert("", |_args| async { Ok(json!(null)) });
        let err = registry.add(methods).unwrap_err();
        assert!(matches!(err, TetherError::Validation(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_replace_swaps_the_whole_registry() {
        let registry = MethodRegistry::new();
        registry.add(echo_methods()).unwrap();

        registry
            .replace(Methods::new().insert("ping", |_args| async { Ok(json!("pong")) }))
            .unwrap();

        assert!(!registry.contains("echo"));
        assert!(registry.contains("ping"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registration_overwrites_existing_name() {
        let registry = MethodRegistry::new();
        registry
            .add(Methods::new().insert("answer", |_args| async { Ok(json!(1)) }))
            .unwrap();
        registry
            .add(Methods::new().insert("answer", |_args| async { Ok(json!(42)) }))
            .unwrap();

        let callback = registry.dispatch(CallMessage::new(5, "answer", vec![])).await;
        assert_eq!(callback.result, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_handler_returning_null_is_success() {
        let registry = MethodRegistry::new();
        registry
            .add(Methods::new().insert("void", |_args| async { Ok(json!(null)) }))
            .unwrap();

        let callback = registry.dispatch(CallMessage::new(6, "void", vec![])).await;
        assert!(callback.error.is_none());
        assert_eq!(callback.result, Some(json!(null)));
    }
}
