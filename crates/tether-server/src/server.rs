//! The RPC dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use tether_common::protocol::Result;
use tether_common::transport::TcpServer;

use crate::registry::{MethodRegistry, Methods};

/// An RPC server that lets remote peers execute its exposed methods.
///
/// Each accepted connection gets its own message framer; calls decoded from
/// it are looked up in the registry and invoked on their own tasks, so
/// handlers complete out of order and callers correlate callbacks by
/// message id. Payloads that fail to decode as a call are logged and
/// ignored; the connection stays open.
///
/// # Example
///
/// ```no_run
/// use tether_server::{Methods, Server};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = Server::bind(4242).await?;
/// server.add_methods(Methods::new().insert("add", |args| async move {
///     Ok(json!(args.iter().filter_map(|v| v.as_i64()).sum::<i64>()))
/// }))?;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    core: TcpServer,
    registry: Arc<MethodRegistry>,
}

impl Server {
    /// Binds a server on `0.0.0.0:port`. Port 0 picks an ephemeral port,
    /// reported by [`local_addr`](Self::local_addr).
    pub async fn bind(port: u16) -> Result<Self> {
        let core = TcpServer::bind(&format!("0.0.0.0:{port}")).await?;
        Ok(Self {
            core,
            registry: Arc::new(MethodRegistry::new()),
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.core.local_addr()
    }

    /// Exposes methods to callers. Takes effect immediately, also for
    /// connections that are already open.
    pub fn add_methods(&self, methods: Methods) -> Result<()> {
        self.registry.add(methods)
    }

    /// Un-exposes methods by name.
    pub fn remove_methods<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.remove(names)
    }

    /// Replaces the entire current registry with the given methods.
    pub fn set_methods(&self, methods: Methods) -> Result<()> {
        self.registry.replace(methods)
    }

    /// Runs the accept loop. Resolves only on a listener error.
    pub async fn run(&self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "server listening");

        let registry = self.registry.clone();
        self.core
            .run_with_handler(move |call| {
                let registry = registry.clone();
                async move { Ok(registry.dispatch(call).await) }
            })
            .await
    }
}
