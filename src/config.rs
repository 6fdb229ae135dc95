use core::time::Duration;

use crate::error::ConfigError;

/// Payload bytes carried by one GATT write on a default 23-byte ATT MTU.
pub const DEFAULT_CHUNK_SIZE: usize = 20;
/// Number of chunks the outbound queue holds ahead of the link.
pub const DEFAULT_FIFO_DEPTH: usize = 4;
/// Gap inserted after each acknowledged write before the next one.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(1);
/// How long a write may stay unacknowledged before it counts as failed.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum inbound bytes held while waiting for a frame to complete.
pub const DEFAULT_MAX_INBOUND_BUFFER: usize = 4096;
/// Default message terminator for text traffic.
pub const DEFAULT_DELIMITER: u8 = b'\n';

/// Tunables for one transfer session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Maximum bytes per outbound chunk (negotiated MTU payload).
    pub chunk_size: usize,
    /// Chunks buffered ahead of the link.
    pub fifo_depth: usize,
    /// Delay between an acknowledged write and the next credit check.
    pub pacing_delay: Duration,
    /// Per-write acknowledgement timeout; `None` waits forever.
    pub send_timeout: Option<Duration>,
    /// Inbound buffer limit before the partial frame is discarded.
    pub max_inbound_buffer: usize,
    /// Terminator used by the default delimiter framer.
    pub delimiter: u8,
    /// Credit assumed when the channel becomes ready.
    pub initial_credit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            fifo_depth: DEFAULT_FIFO_DEPTH,
            pacing_delay: DEFAULT_PACING_DELAY,
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
            max_inbound_buffer: DEFAULT_MAX_INBOUND_BUFFER,
            delimiter: DEFAULT_DELIMITER,
            initial_credit: true,
        }
    }
}

impl EngineConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_fifo_depth(mut self, fifo_depth: usize) -> Self {
        self.fifo_depth = fifo_depth;
        self
    }

    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Option<Duration>) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn with_max_inbound_buffer(mut self, max_inbound_buffer: usize) -> Self {
        self.max_inbound_buffer = max_inbound_buffer;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_initial_credit(mut self, initial_credit: bool) -> Self {
        self.initial_credit = initial_credit;
        self
    }

    /// Check that the configuration can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.fifo_depth == 0 {
            return Err(ConfigError::ZeroFifoDepth);
        }
        if self.max_inbound_buffer == 0 {
            return Err(ConfigError::ZeroInboundLimit);
        }
        Ok(())
    }
}
