//! Outbound chunk queue.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// FIFO of chunks waiting for the link, bounded to `depth` entries.
///
/// Chunks leave in the order they were pushed and are never merged or split
/// once queued.
#[derive(Debug)]
pub struct OutboundQueue {
    chunks: VecDeque<Vec<u8>>,
    depth: usize,
}

impl OutboundQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Whether another chunk fits without exceeding the depth.
    pub fn has_room(&self) -> bool {
        self.chunks.len() < self.depth
    }

    /// Queue a chunk. Returns the chunk back if the queue is full.
    pub fn push(&mut self, chunk: Vec<u8>) -> Result<(), Vec<u8>> {
        if !self.has_room() {
            return Err(chunk);
        }
        self.chunks.push_back(chunk);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
