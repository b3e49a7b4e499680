//! TCP server core shared by dispatchers.
//!
//! [`TcpServer`] owns the listening socket and the per-connection plumbing:
//! one private [`MessageFramer`] per accepted connection, call decoding, and
//! a write queue that serializes callbacks back onto the socket. The actual
//! method dispatch is injected as a handler, so the plain server and the
//! load balancer share this loop.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::protocol::error::{Result, TetherError};
use crate::protocol::messages::{CallMessage, CallbackMessage, ErrorDescriptor};
use crate::transport::codec::JsonCodec;
use crate::transport::framer::{frame, MessageFramer};

const READ_BUFFER_SIZE: usize = 64 * 1024;
const WRITE_QUEUE_DEPTH: usize = 64;

/// Async TCP server core.
///
/// Accepts connections in a loop and spawns a task per connection. Each
/// decoded call is in turn dispatched on its own task, so a slow handler
/// never holds up the calls behind it and callbacks may complete out of
/// order; callers correlate by message id, not arrival order.
///
/// # Example
///
/// ```no_run
/// use tether_common::transport::TcpServer;
/// use tether_common::CallbackMessage;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = TcpServer::bind("0.0.0.0:4242").await?;
/// server
///     .run_with_handler(|call| async move {
///         Ok(CallbackMessage::success(call.id, json!("pong")))
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a TCP server bound to the given address.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:4242"); port 0
    ///   picks an ephemeral port, reported by [`local_addr`](Self::local_addr)
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| TetherError::Connection(format!("failed to bind to {bind_addr}: {e}")))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TetherError::Connection(format!("failed to get local addr: {e}")))
    }

    /// Runs the accept loop, dispatching every decoded call to `handler`.
    ///
    /// Each connection gets its own framer and processes calls until the
    /// peer closes. A handler error is turned into an error callback built
    /// from the error's kind and message, addressed to the call that caused
    /// it; it never tears down the connection.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(CallMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallbackMessage>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                TetherError::Connection(format!("failed to accept connection: {e}"))
            })?;

            tracing::debug!(%peer_addr, "connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                match handle_connection(stream, handler).await {
                    Ok(()) => tracing::debug!(%peer_addr, "connection closed by peer"),
                    Err(e) => tracing::warn!(%peer_addr, error = %e, "connection dropped"),
                }
            });
        }
    }
}

/// Serves a single connection until the peer closes it.
///
/// Callbacks complete out of order, so a dedicated writer task serializes
/// them onto the socket while the read half keeps feeding the framer.
async fn handle_connection<F, Fut>(stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(CallMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallbackMessage>> + Send + 'static,
{
    let (mut reader, mut writer) = stream.into_split();

    let (reply_tx, mut reply_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(async move {
        while let Some(framed) = reply_rx.recv().await {
            if let Err(e) = writer.write_all(&framed).await {
                tracing::debug!(error = %e, "write failed, closing connection writer");
                break;
            }
        }
    });

    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                drop(reply_tx);
                let _ = writer_task.await;
                return Err(TetherError::Io(e));
            }
        };

        let payloads = match framer.feed(&buf[..n]) {
            Ok(payloads) => payloads,
            Err(e) => {
                // An oversized length prefix leaves the stream unrecoverable.
                drop(reply_tx);
                let _ = writer_task.await;
                return Err(e);
            }
        };

        for payload in payloads {
            // Anything that does not decode as a call is logged and ignored;
            // the connection stays open and nothing is written back.
            let call = match JsonCodec::decode_call(&payload) {
                Ok(call) => call,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding payload that is not a call");
                    continue;
                }
            };

            let mid = call.id;
            let handler = handler.clone();
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let callback = match handler(call).await {
                    Ok(callback) => callback,
                    Err(e) => CallbackMessage::failure(mid, ErrorDescriptor::from(&e)),
                };

                match JsonCodec::encode_callback(&callback).and_then(|payload| frame(&payload)) {
                    Ok(framed) => {
                        let _ = reply_tx.send(framed).await;
                    }
                    Err(e) => tracing::error!(error = %e, mid, "failed to encode callback"),
                }
            });
        }
    }

    drop(reply_tx);
    let _ = writer_task.await;
    Ok(())
}
