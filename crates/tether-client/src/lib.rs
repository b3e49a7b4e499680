//! Tether Client
//!
//! This crate provides [`Connection`], the calling peer of the tether RPC
//! runtime: it owns one TCP connection to a remote dispatcher, multiplexes
//! any number of concurrent outstanding calls over it, correlates callbacks
//! by message id, and drives a reconnection state machine with a pluggable
//! backoff strategy.
//!
//! # Example
//!
//! ```no_run
//! use tether_client::{ConnectOptions, Connection};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::connect("127.0.0.1", 4242, ConnectOptions::default()).await?;
//! conn.ready().await?;
//!
//! let sum = conn.call("add", vec![json!(1), json!(2)]).await?;
//! assert_eq!(sum, json!(3));
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod connection;

pub use backoff::ReconnectStrategy;
pub use connection::{ConnectOptions, Connection, ConnectionState};
