//! Tether Common Types and Transport
//!
//! This crate provides the core protocol definitions and the TCP transport
//! layer for the tether RPC runtime.
//!
//! # Overview
//!
//! Tether is a small RPC runtime: a peer exposes named methods over a TCP
//! connection and a remote peer invokes them as if they were local, receiving
//! a typed success value or a reconstructed error. This crate contains the
//! shared infrastructure used by every component:
//!
//! - **Protocol Layer**: Call/Callback message types, the error taxonomy and
//!   the error-kind registry used to rebuild errors on the calling side
//! - **Transport Layer**: the JSON wire codec, the message framer that
//!   reassembles whole messages from arbitrary TCP chunking, and the TCP
//!   server core shared by dispatchers
//!
//! # Wire Format
//!
//! Every message travels as a single frame:
//!
//! ```text
//! [4-byte length prefix as u32 little-endian] [UTF-8 JSON payload]
//! ```
//!
//! Payload shapes:
//!
//! ```text
//! Call:     { "type":"call",     "mid": <int>, "name": <string>, "args": [<json>...] }
//! Callback: { "type":"callback", "mid": <int>, "ret": <json>|omitted, "err": {...}|omitted }
//! ```
//!
//! # Example
//!
//! ```
//! use tether_common::CallMessage;
//! use tether_common::transport::JsonCodec;
//! use serde_json::json;
//!
//! let call = CallMessage::new(7, "add", vec![json!(1), json!(2)]);
//! let encoded = JsonCodec::encode_call(&call).unwrap();
//! let decoded = JsonCodec::decode_call(&encoded).unwrap();
//! assert_eq!(call, decoded);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
