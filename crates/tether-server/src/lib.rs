//! Tether Server
//!
//! This crate provides the serving peer of the tether RPC runtime: a
//! [`Server`] accepts inbound connections, decodes calls, looks the method
//! name up in its [`MethodRegistry`], invokes the handler, and writes the
//! outcome back as a callback.
//!
//! # Example
//!
//! ```no_run
//! use tether_server::{Methods, Server};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::bind(4242).await?;
//! server.add_methods(Methods::new().insert("echo", |mut args| async move {
//!     Ok(args.pop().unwrap_or(json!(null)))
//! }))?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod server;

pub use registry::{Method, MethodRegistry, Methods};
pub use server::Server;
