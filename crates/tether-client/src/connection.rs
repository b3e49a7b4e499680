//! Client connection with automatic reconnection.
//!
//! A [`Connection`] owns one TCP connection to a remote dispatcher. Calls
//! are multiplexed over it: each call allocates a message id, registers a
//! waiter, and is settled when the callback carrying the same id arrives,
//! whatever order callbacks come back in.
//!
//! A single I/O task drives the socket through the connection's life:
//!
//! ```text
//! Connecting -> Connected -> (socket lost) -> Reconnecting -> Connected -> ...
//!                                                  |
//!                     (attempts exhausted) ------> Destroyed (terminal)
//! ```
//!
//! Calls attempted while `Reconnecting` or `Destroyed` fail immediately
//! without touching the socket. Calls pending when the socket drops are
//! settled with a connection error rather than left unresolved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex, Notify};

use tether_common::protocol::{
    CallMessage, ErrorKindRegistry, MessageId, Result, TetherError,
};
use tether_common::transport::{frame, JsonCodec, MessageFramer};

use crate::backoff::ReconnectStrategy;

/// Default bound on consecutive failed reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: i32 = 5;

/// Default base delay fed to the reconnect strategy.
pub const DEFAULT_RECONNECT_DELAY_BASE: Duration = Duration::from_millis(1000);

const READ_BUFFER_SIZE: usize = 64 * 1024;
const WRITE_QUEUE_DEPTH: usize = 64;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial connect in progress; calls are accepted and queued
    Connecting,
    /// Socket is up; calls flow
    Connected,
    /// Socket was lost; reconnect attempts are running, calls fail fast
    Reconnecting,
    /// Terminal; the connection will never carry a call again
    Destroyed,
}

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Consecutive failed reconnect attempts before giving up; -1 retries
    /// forever
    pub max_reconnect_attempts: i32,
    /// Base delay handed to the reconnect strategy
    pub reconnect_delay_base: Duration,
    /// Backoff strategy between failed attempts
    pub reconnect_strategy: ReconnectStrategy,
    /// Registry used to rebuild typed errors from received descriptors
    pub error_kinds: ErrorKindRegistry,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_base: DEFAULT_RECONNECT_DELAY_BASE,
            reconnect_strategy: ReconnectStrategy::default(),
            error_kinds: ErrorKindRegistry::default(),
        }
    }
}

/// Waiters keyed by the message id their callback will carry.
type PendingCalls = Mutex<HashMap<MessageId, oneshot::Sender<Result<Value>>>>;

/// State shared between the handle and the I/O task.
struct Inner {
    addr: String,
    options: ConnectOptions,
    state_tx: watch::Sender<ConnectionState>,
    next_id: AtomicU64,
    pending: PendingCalls,
    shutdown: Notify,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Settles every pending call with a connection error. Used when the
    /// socket drops, when the connection is destroyed, and when reconnect
    /// attempts run out; a call must never be left unresolved.
    async fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (mid, waiter) in drained {
            tracing::debug!(mid, reason, "settling orphaned call");
            let _ = waiter.send(Err(TetherError::Connection(reason.to_string())));
        }
    }

    /// Routes one reassembled payload to the pending call it answers.
    ///
    /// Payloads that do not decode as a callback, and callbacks whose id
    /// matches no pending call, are discarded silently; the protocol
    /// tolerates stray data without failing the connection.
    async fn complete(&self, payload: &[u8]) {
        let callback = match JsonCodec::decode_callback(payload) {
            Ok(callback) => callback,
            Err(e) => {
                tracing::trace!(error = %e, "discarding frame that is not a callback");
                return;
            }
        };

        let waiter = self.pending.lock().await.remove(&callback.id);
        let Some(waiter) = waiter else {
            tracing::trace!(mid = callback.id, "discarding callback with no pending call");
            return;
        };

        let outcome = match callback.error {
            Some(descriptor) => Err(self.options.error_kinds.reconstruct(&descriptor)),
            None => Ok(callback.result.unwrap_or(Value::Null)),
        };
        let _ = waiter.send(outcome);
    }
}

/// A client connection to a remote dispatcher.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Dropping the
/// handle tears down the I/O task.
///
/// # Example
///
/// ```no_run
/// use tether_client::{ConnectOptions, Connection};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::connect("127.0.0.1", 4242, ConnectOptions::default()).await?;
/// let greeting = conn.call("echo", vec![json!("hi")]).await?;
/// assert_eq!(greeting, json!("hi"));
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    inner: Arc<Inner>,
    out_tx: mpsc::Sender<Vec<u8>>,
    state_rx: watch::Receiver<ConnectionState>,
    fatal_rx: std::sync::Mutex<Option<oneshot::Receiver<TetherError>>>,
}

impl Connection {
    /// Creates a connection to `host:port` and starts connecting in the
    /// background.
    ///
    /// Construction itself does no network I/O: the returned handle is
    /// usable immediately and calls made while still `Connecting` are
    /// queued until the socket is up. Use [`ready`](Self::ready) to await
    /// the first successful connect.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for an empty host.
    pub async fn connect(host: &str, port: u16, options: ConnectOptions) -> Result<Self> {
        if host.is_empty() {
            return Err(TetherError::Validation("provide a host".to_string()));
        }

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (out_tx, out_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let (fatal_tx, fatal_rx) = oneshot::channel();

        let inner = Arc::new(Inner {
            addr: format!("{host}:{port}"),
            options,
            state_tx,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        });

        tokio::spawn(io_task(inner.clone(), out_rx, fatal_tx));

        Ok(Self {
            inner,
            out_tx,
            state_rx,
            fatal_rx: std::sync::Mutex::new(Some(fatal_rx)),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Waits until the connection is `Connected`.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` error if the connection reaches `Destroyed`
    /// first.
    pub async fn ready(&self) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        loop {
            match *state_rx.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Destroyed => {
                    return Err(TetherError::Connection(
                        "connection is destroyed".to_string(),
                    ))
                }
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(TetherError::Connection("connection is closed".to_string()));
            }
        }
    }

    /// Calls a remote method and waits for its outcome.
    ///
    /// Allocates the next message id (monotonically increasing, never
    /// reused within this connection), sends the call, and resolves with
    /// the returned value or the reconstructed error once the callback
    /// carrying the same id arrives. Callbacks for different calls may
    /// arrive in any order.
    ///
    /// # Errors
    ///
    /// Fails immediately with a `Connection` error, without any I/O, while
    /// the connection is `Reconnecting` or `Destroyed`.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        match self.state() {
            ConnectionState::Reconnecting => {
                return Err(TetherError::Connection(format!(
                    "cannot call {method}: connection is reconnecting"
                )))
            }
            ConnectionState::Destroyed => {
                return Err(TetherError::Connection(format!(
                    "cannot call {method}: connection is destroyed"
                )))
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }

        let mid = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = JsonCodec::encode_call(&CallMessage::new(mid, method, args))?;
        let framed = frame(&payload)?;

        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(mid, waiter_tx);

        if self.out_tx.send(framed).await.is_err() {
            self.inner.pending.lock().await.remove(&mid);
            return Err(TetherError::Connection("connection is closed".to_string()));
        }

        match waiter_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(TetherError::Connection(
                "connection dropped before the call completed".to_string(),
            )),
        }
    }

    /// Takes the one-shot fatal-error notification.
    ///
    /// The receiver resolves exactly once, with `TerminalReconnect`, if the
    /// connection ever exhausts its reconnect attempts. Returns `None` once
    /// taken.
    pub fn fatal(&self) -> Option<oneshot::Receiver<TetherError>> {
        self.fatal_rx.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Tears the connection down. Terminal: the state becomes `Destroyed`,
    /// pending calls are settled with a `Connection` error, and no fatal
    /// notification fires.
    pub async fn destroy(&self) {
        self.inner.set_state(ConnectionState::Destroyed);
        self.inner.shutdown.notify_one();
        self.inner.fail_pending("connection destroyed").await;
    }
}

/// Why the I/O task stopped.
enum Exit {
    /// `destroy()` was called
    Destroyed,
    /// The reconnect budget ran out after this many consecutive failures
    Exhausted(u32),
    /// The `Connection` handle was dropped
    HandleDropped,
}

/// What a reconnect cycle produced.
enum Reconnect {
    Stream(TcpStream),
    Exhausted(u32),
    Destroyed,
    HandleDropped,
}

/// Why a connected session ended.
enum Served {
    SocketClosed,
    Destroyed,
    HandleDropped,
}

/// Drives the socket for the whole life of a connection.
async fn io_task(
    inner: Arc<Inner>,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    fatal_tx: oneshot::Sender<TetherError>,
) {
    let exit = run_lifecycle(&inner, &mut out_rx).await;
    match exit {
        Exit::Destroyed => {
            inner.fail_pending("connection destroyed").await;
        }
        Exit::Exhausted(attempts) => {
            tracing::warn!(addr = %inner.addr, attempts, "reconnect attempts exhausted");
            inner.set_state(ConnectionState::Destroyed);
            inner.fail_pending("reconnect attempts exhausted").await;
            let _ = fatal_tx.send(TetherError::TerminalReconnect { attempts });
        }
        Exit::HandleDropped => {
            inner.set_state(ConnectionState::Destroyed);
            inner.fail_pending("connection closed").await;
        }
    }
}

async fn run_lifecycle(inner: &Arc<Inner>, out_rx: &mut mpsc::Receiver<Vec<u8>>) -> Exit {
    // Initial connect; a failure here enters the same reconnect machine as
    // a mid-life socket loss.
    let mut stream = tokio::select! {
        connected = TcpStream::connect(inner.addr.as_str()) => match connected {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::debug!(addr = %inner.addr, error = %e, "initial connect failed");
                None
            }
        },
        _ = inner.shutdown.notified() => return Exit::Destroyed,
    };

    loop {
        let active = match stream.take() {
            Some(active) => active,
            None => {
                inner.set_state(ConnectionState::Reconnecting);
                inner.fail_pending("connection lost").await;
                match reconnect(inner, out_rx).await {
                    Reconnect::Stream(active) => active,
                    Reconnect::Exhausted(attempts) => return Exit::Exhausted(attempts),
                    Reconnect::Destroyed => return Exit::Destroyed,
                    Reconnect::HandleDropped => return Exit::HandleDropped,
                }
            }
        };

        inner.set_state(ConnectionState::Connected);
        tracing::debug!(addr = %inner.addr, "connected");

        match serve_stream(inner, active, out_rx).await {
            Served::SocketClosed => {
                // Loop around into the reconnect machine.
            }
            Served::Destroyed => return Exit::Destroyed,
            Served::HandleDropped => return Exit::HandleDropped,
        }
    }
}

/// Retries the connect until it succeeds or the attempt budget runs out.
///
/// A successful reconnect resets the failure count by construction: the
/// count is local to one cycle and the next cycle starts at zero.
async fn reconnect(inner: &Inner, out_rx: &mut mpsc::Receiver<Vec<u8>>) -> Reconnect {
    let options = &inner.options;
    if options.max_reconnect_attempts == 0 {
        return Reconnect::Exhausted(0);
    }

    let mut failures: u32 = 0;
    loop {
        let connected = tokio::select! {
            connected = TcpStream::connect(inner.addr.as_str()) => connected,
            _ = inner.shutdown.notified() => return Reconnect::Destroyed,
        };

        match connected {
            Ok(stream) => return Reconnect::Stream(stream),
            Err(e) => {
                failures += 1;
                tracing::debug!(
                    addr = %inner.addr,
                    attempt = failures,
                    error = %e,
                    "reconnect attempt failed"
                );

                if options.max_reconnect_attempts >= 0
                    && failures >= options.max_reconnect_attempts as u32
                {
                    return Reconnect::Exhausted(failures);
                }

                let delay = options
                    .reconnect_strategy
                    .delay(failures, options.reconnect_delay_base);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    outgoing = out_rx.recv() => match outgoing {
                        // Frames queued before the loss answer calls that
                        // were already settled; drop them.
                        Some(_) => {}
                        None => return Reconnect::HandleDropped,
                    },
                    _ = inner.shutdown.notified() => return Reconnect::Destroyed,
                }
            }
        }
    }
}

/// Serves one connected socket until it closes or the connection ends.
async fn serve_stream(
    inner: &Arc<Inner>,
    stream: TcpStream,
    out_rx: &mut mpsc::Receiver<Vec<u8>>,
) -> Served {
    let (mut reader, mut writer) = stream.into_split();
    // One framer per socket; a reconnected stream starts clean.
    let mut framer = MessageFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(framed) => {
                    if let Err(e) = writer.write_all(&framed).await {
                        tracing::debug!(addr = %inner.addr, error = %e, "write failed");
                        return Served::SocketClosed;
                    }
                }
                None => return Served::HandleDropped,
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(addr = %inner.addr, "connection closed by peer");
                    return Served::SocketClosed;
                }
                Ok(n) => {
                    let payloads = match framer.feed(&buf[..n]) {
                        Ok(payloads) => payloads,
                        Err(e) => {
                            tracing::warn!(addr = %inner.addr, error = %e, "dropping connection");
                            return Served::SocketClosed;
                        }
                    };
                    for payload in payloads {
                        inner.complete(&payload).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(addr = %inner.addr, error = %e, "read failed");
                    return Served::SocketClosed;
                }
            },
            _ = inner.shutdown.notified() => return Served::Destroyed,
        }
    }
}
