//! Data sources feeding the outbound queue.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::TransferError;

/// What kind of data a source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceKind {
    /// A payload handed over directly by the application.
    Memory,
    /// A file chosen by the user.
    File,
}

/// Random-access byte source: "read up to N bytes starting at offset".
pub trait ByteSource: Send {
    /// Read into `buf` starting at `offset`. Returns 0 at end of data.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String>;

    /// Total length, if known up front.
    fn len(&self) -> Option<u64>;

    fn kind(&self) -> SourceKind;
}

/// Source over an owned byte buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for MemorySource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, String> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }
}

/// Owns the armed source and its read cursor.
pub struct SourceAdapter {
    source: Box<dyn ByteSource>,
    cursor: u64,
    exhausted: bool,
}

impl SourceAdapter {
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            cursor: 0,
            exhausted: false,
        }
    }

    /// Rewind to the first byte. Called when an upload begins.
    pub fn reset_to_start(&mut self) {
        self.cursor = 0;
        self.exhausted = false;
    }

    /// Read the next slice of at most `max_bytes`.
    ///
    /// An empty vector means the source is exhausted. A short read from the
    /// underlying source is retried until the slice is full or the source
    /// reports end of data. End of data before the declared length is an
    /// error.
    pub fn next_slice(&mut self, max_bytes: usize) -> Result<Vec<u8>, TransferError> {
        if self.exhausted || max_bytes == 0 {
            return Ok(Vec::new());
        }
        let mut slice = vec![0u8; max_bytes];
        let mut filled = 0;
        while filled < max_bytes {
            let offset = self.cursor + filled as u64;
            let n = self
                .source
                .read_at(offset, &mut slice[filled..])
                .map_err(|reason| TransferError::SourceUnreadable { offset, reason })?;
            if n == 0 {
                if let Some(len) = self.source.len() {
                    if offset < len {
                        return Err(TransferError::SourceUnreadable {
                            offset,
                            reason: format!("source ended early, expected {} bytes", len),
                        });
                    }
                }
                self.exhausted = true;
                break;
            }
            filled += n;
        }
        slice.truncate(filled);
        self.cursor += filled as u64;
        if let Some(len) = self.source.len() {
            if self.cursor >= len {
                self.exhausted = true;
            }
        }
        Ok(slice)
    }

    /// True once a read has hit the end of the source.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Bytes handed out since the last rewind.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total_len(&self) -> Option<u64> {
        self.source.len()
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }
}
