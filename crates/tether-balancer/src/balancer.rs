//! Round-robin relay dispatcher.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tether_client::{ConnectOptions, Connection, ConnectionState, ReconnectStrategy};
use tether_common::protocol::{
    CallMessage, CallbackMessage, ErrorDescriptor, ErrorKindRegistry, Result, TetherError,
};
use tether_common::transport::TcpServer;
use tether_server::{MethodRegistry, Methods};

/// Address of a backend dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Backend {
            host: host.into(),
            port,
        }
    }
}

/// Configuration for a [`LoadBalancer`].
///
/// Backend connections always retry forever; only the backoff shape is
/// configurable. The default strategy is `Linear(1)`.
#[derive(Debug, Clone)]
pub struct BalancerOptions {
    /// Base delay handed to the backend reconnect strategy
    pub reconnect_delay_base: Duration,
    /// Backoff strategy for backend reconnects
    pub reconnect_strategy: ReconnectStrategy,
    /// Registry used by backend connections to rebuild typed errors
    pub error_kinds: ErrorKindRegistry,
}

impl Default for BalancerOptions {
    fn default() -> Self {
        Self {
            reconnect_delay_base: Duration::from_millis(1000),
            reconnect_strategy: ReconnectStrategy::Linear(1),
            error_kinds: ErrorKindRegistry::default(),
        }
    }
}

/// A dispatcher that load-balances unmatched calls across backends.
///
/// Holds one [`Connection`] per backend, created with unlimited reconnect
/// attempts (a backend is retried forever, never given up on), plus its own
/// [`MethodRegistry`] for locally registered methods. Composition rather
/// than inheritance: the balancer implements its own dispatch on the shared
/// TCP server core and checks the local registry before delegating.
pub struct LoadBalancer {
    core: TcpServer,
    registry: Arc<MethodRegistry>,
    backends: Arc<Vec<Connection>>,
    next_index: Arc<AtomicUsize>,
}

impl LoadBalancer {
    /// Binds a load balancer on `0.0.0.0:port` and opens one connection per
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for an empty backend list or a backend
    /// with an empty host, before any connection is opened.
    pub async fn bind(
        backends: Vec<Backend>,
        port: u16,
        options: BalancerOptions,
    ) -> Result<Self> {
        if backends.is_empty() {
            return Err(TetherError::Validation(
                "provide at least one backend".to_string(),
            ));
        }
        for backend in &backends {
            if backend.host.is_empty() {
                return Err(TetherError::Validation(
                    "backend host must be a non-empty string".to_string(),
                ));
            }
        }

        let mut connections = Vec::with_capacity(backends.len());
        for backend in &backends {
            let connection = Connection::connect(
                &backend.host,
                backend.port,
                ConnectOptions {
                    max_reconnect_attempts: -1,
                    reconnect_delay_base: options.reconnect_delay_base,
                    reconnect_strategy: options.reconnect_strategy,
                    error_kinds: options.error_kinds.clone(),
                },
            )
            .await?;
            connections.push(connection);
        }

        let core = TcpServer::bind(&format!("0.0.0.0:{port}")).await?;
        Ok(Self {
            core,
            registry: Arc::new(MethodRegistry::new()),
            backends: Arc::new(connections),
            next_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.core.local_addr()
    }

    /// Exposes methods that execute on the balancer itself instead of being
    /// relayed.
    pub fn add_methods(&self, methods: Methods) -> Result<()> {
        self.registry.add(methods)
    }

    /// Un-exposes locally registered methods by name.
    pub fn remove_methods<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.remove(names)
    }

    /// Replaces the entire local registry with the given methods.
    pub fn set_methods(&self, methods: Methods) -> Result<()> {
        self.registry.replace(methods)
    }

    /// Number of configured backends.
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Current lifecycle state of every backend connection, in backend
    /// order.
    pub fn backend_states(&self) -> Vec<ConnectionState> {
        self.backends.iter().map(Connection::state).collect()
    }

    /// Runs the accept loop. Resolves only on a listener error.
    pub async fn run(&self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, backends = self.backends.len(), "load balancer listening");

        let registry = self.registry.clone();
        let backends = self.backends.clone();
        let next_index = self.next_index.clone();

        self.core
            .run_with_handler(move |call| {
                let registry = registry.clone();
                let backends = backends.clone();
                let next_index = next_index.clone();
                async move { Ok(dispatch(&registry, &backends, &next_index, call).await) }
            })
            .await
    }
}

/// Executes a call locally when its name is registered, relays it round
/// robin otherwise.
async fn dispatch(
    registry: &MethodRegistry,
    backends: &[Connection],
    next_index: &AtomicUsize,
    call: CallMessage,
) -> CallbackMessage {
    if registry.contains(&call.method) {
        return registry.dispatch(call).await;
    }

    // The cursor advances exactly once per relayed call, before the outcome
    // of the relay is known.
    let index = next_index.fetch_add(1, Ordering::Relaxed) % backends.len();
    let backend = &backends[index];

    let CallMessage { id, method, args } = call;
    tracing::debug!(%method, backend = index, "relaying call");

    match backend.call(&method, args).await {
        Ok(value) => CallbackMessage::success(id, value),
        Err(e) => CallbackMessage::failure(id, ErrorDescriptor::from(&e)),
    }
}
