//! Inbound reassembly of framed messages.
//!
//! Notifications from the remote arrive in MTU-sized pieces that have no
//! relation to message boundaries. [`FramingBuffer`] accumulates them and
//! hands complete messages to the caller using a pluggable [`Framer`].

use alloc::format;
use alloc::vec::Vec;

use crate::error::TransferError;

/// Splits one message off the front of a byte stream.
pub trait Framer: Send {
    /// Try to decode the first message in `buf`.
    ///
    /// Returns `Ok(Some((consumed, payload)))` when a complete frame is
    /// present, `Ok(None)` when more bytes are needed. An empty payload with a
    /// non-zero `consumed` skips bytes without producing a message.
    fn decode(&mut self, buf: &[u8]) -> Result<Option<(usize, Vec<u8>)>, TransferError>;
}

/// Messages terminated by a single sentinel byte.
///
/// The sentinel is not part of the payload and empty lines are skipped.
#[derive(Debug, Clone, Copy)]
pub struct DelimiterFramer {
    delimiter: u8,
}

impl DelimiterFramer {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Framer for DelimiterFramer {
    fn decode(&mut self, buf: &[u8]) -> Result<Option<(usize, Vec<u8>)>, TransferError> {
        Ok(buf
            .iter()
            .position(|&b| b == self.delimiter)
            .map(|pos| (pos + 1, buf[..pos].to_vec())))
    }
}

/// Messages prefixed by their length as a big-endian `u32`.
#[derive(Debug, Clone, Copy)]
pub struct LengthPrefixFramer {
    max_len: usize,
}

impl LengthPrefixFramer {
    const HEADER_LEN: usize = 4;

    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Framer for LengthPrefixFramer {
    fn decode(&mut self, buf: &[u8]) -> Result<Option<(usize, Vec<u8>)>, TransferError> {
        if buf.len() < Self::HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len == 0 {
            return Err(TransferError::MalformedFrame {
                reason: "zero-length frame".into(),
            });
        }
        if len > self.max_len {
            return Err(TransferError::MalformedFrame {
                reason: format!("frame length {} exceeds maximum {}", len, self.max_len),
            });
        }
        if buf.len() < Self::HEADER_LEN + len {
            return Ok(None);
        }
        let end = Self::HEADER_LEN + len;
        Ok(Some((end, buf[Self::HEADER_LEN..end].to_vec())))
    }
}

/// Accumulator plus read cursor for inbound chunks.
///
/// Bytes are kept in arrival order and only leave the buffer as part of a
/// decoded message. The one exception is an error: when the framer rejects
/// the stream, or the unframed remainder grows past `max_len`, the buffered
/// bytes are discarded so the next notification starts clean.
pub struct FramingBuffer<F: Framer> {
    buf: Vec<u8>,
    cursor: usize,
    framer: F,
    max_len: usize,
}

impl<F: Framer> FramingBuffer<F> {
    pub fn new(framer: F, max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            cursor: 0,
            framer,
            max_len,
        }
    }

    /// Append raw bytes from one notification.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Emit every complete message currently buffered, oldest first.
    ///
    /// Returns how many messages were emitted. A trailing partial message is
    /// kept for the next call.
    pub fn extract_all<E>(&mut self, mut emit: E) -> Result<usize, TransferError>
    where
        E: FnMut(Vec<u8>),
    {
        let mut emitted = 0;
        while self.cursor < self.buf.len() {
            match self.framer.decode(&self.buf[self.cursor..]) {
                Ok(Some((consumed, payload))) if consumed > 0 => {
                    self.cursor += consumed;
                    if !payload.is_empty() {
                        emit(payload);
                        emitted += 1;
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }
        self.compact();

        if self.pending() > self.max_len {
            self.clear();
            return Err(TransferError::InboundOverflow {
                limit: self.max_len,
            });
        }
        Ok(emitted)
    }

    /// Bytes buffered that do not yet form a complete message.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.buf.drain(..self.cursor);
        self.cursor = 0;
    }
}
