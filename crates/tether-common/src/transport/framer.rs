//! Message framing over a byte stream.
//!
//! TCP delivers bytes, not messages: a single write may arrive split across
//! several reads, and several writes may arrive glued together in one read.
//! [`MessageFramer`] consumes the raw byte stream and emits complete message
//! payloads in arrival order, whatever the chunking.
//!
//! The sending-side counterpart is [`frame`], which prepends the 4-byte
//! little-endian length prefix. The prefix width is uniform for every
//! message kind.

use bytes::{Bytes, BytesMut};

use crate::protocol::error::{Result, TetherError};

/// Width of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum message size (100 MB), bounding what a peer can make us allocate.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Frames a payload for the wire: `[length as u32 little-endian] + [payload]`.
///
/// The length prefix always equals the exact byte length of the payload;
/// keeping that invariant is the sending side's responsibility and this is
/// the only place frames are built.
///
/// # Errors
///
/// Returns a `Protocol` error for payloads above [`MAX_MESSAGE_SIZE`].
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(TetherError::Protocol(format!(
            "message too large: {} bytes (max {} bytes)",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Reassembles complete message payloads from an arbitrarily chunked byte
/// stream.
///
/// State is an accumulation buffer plus the count of payload bytes still
/// needed to finish the message currently being assembled (`0` means the
/// next bytes are a new length prefix). The framer holds no cross-stream
/// state and is restartable indefinitely, but one instance must be dedicated
/// to exactly one connection.
///
/// # Example
///
/// ```
/// use tether_common::transport::{frame, MessageFramer};
///
/// let mut framer = MessageFramer::new();
/// let framed = frame(b"hello").unwrap();
///
/// // Whole frame in one chunk...
/// let messages = framer.feed(&framed).unwrap();
/// assert_eq!(&messages[0][..], b"hello");
///
/// // ...or one byte at a time; the result is identical.
/// let mut messages = Vec::new();
/// for byte in &framed {
///     messages.extend(framer.feed(&[*byte]).unwrap());
/// }
/// assert_eq!(&messages[0][..], b"hello");
/// ```
pub struct MessageFramer {
    /// Bytes accumulated from the stream, prefix stripped once parsed
    buffer: BytesMut,
    /// Payload bytes still needed; 0 means "expecting a new length prefix"
    needed: usize,
}

impl MessageFramer {
    pub fn new() -> Self {
        MessageFramer {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            needed: 0,
        }
    }

    /// Appends incoming bytes and drains every complete message.
    ///
    /// A chunk holding only part of a length prefix or payload leaves the
    /// partial data buffered for the next `feed`; a chunk holding several
    /// complete frames emits all of them, in order, from the same call.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error when a length prefix announces a message
    /// above [`MAX_MESSAGE_SIZE`]. The stream is unrecoverable past that
    /// point; the owner is expected to drop the connection.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        loop {
            if self.needed == 0 {
                if self.buffer.len() < LENGTH_PREFIX_SIZE {
                    break;
                }

                let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX_SIZE]);
                let length = u32::from_le_bytes(prefix) as usize;

                if length > MAX_MESSAGE_SIZE {
                    return Err(TetherError::Protocol(format!(
                        "message too large: {} bytes (max {} bytes)",
                        length, MAX_MESSAGE_SIZE
                    )));
                }

                let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);

                if length == 0 {
                    messages.push(Bytes::new());
                    continue;
                }
                self.needed = length;
            }

            if self.buffer.len() < self.needed {
                break;
            }

            let payload = self.buffer.split_to(self.needed).freeze();
            self.needed = 0;
            messages.push(payload);
        }

        Ok(messages)
    }

    /// Number of buffered bytes not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the framer sits exactly on a message boundary.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.needed == 0
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}
