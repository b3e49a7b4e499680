//! Tether Transport Layer
//!
//! This module turns the protocol types into bytes on a TCP stream and back.
//!
//! # Architecture
//!
//! - **[`Codec`] / [`JsonCodec`]**: encode/decode Call and Callback
//!   envelopes to JSON
//! - **[`frame`] / [`MessageFramer`]**: the uniform 4-byte little-endian
//!   length prefix, and reassembly of whole messages from arbitrary TCP
//!   chunking
//! - **[`TcpServer`]**: the accept loop and per-connection plumbing shared
//!   by the dispatcher and the load balancer
//!
//! # Message Size Limits
//!
//! A maximum message size of 100 MB is enforced on both the framing and the
//! reassembly side to prevent memory exhaustion.

pub mod codec;
pub mod framer;
pub mod tcp_server;

pub use codec::{Codec, JsonCodec};
pub use framer::{frame, MessageFramer, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE};
pub use tcp_server::TcpServer;
