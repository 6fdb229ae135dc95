//! Error types shared by the transfer engine and its collaborators.

use alloc::string::String;

/// Errors surfaced by a transfer session.
///
/// None of these abort the process; the engine reports them through
/// [`TransferEvent`](crate::core::events::TransferEvent) and leaves the
/// decision about what to do next to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The link reported that a chunk could not be written.
    SendFailed,
    /// A chunk write was never acknowledged within the configured timeout.
    SendTimeout,
    /// The data source could not be read mid-transfer.
    SourceUnreadable { offset: u64, reason: String },
    /// The link went away while an upload was running.
    Disconnected,
    /// Inbound bytes accumulated past the configured limit without a frame.
    InboundOverflow { limit: usize },
    /// The framer rejected the inbound byte stream.
    MalformedFrame { reason: String },
}

impl core::fmt::Display for TransferError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransferError::SendFailed => write!(f, "Chunk write failed"),
            TransferError::SendTimeout => write!(f, "Chunk write was not acknowledged in time"),
            TransferError::SourceUnreadable { offset, reason } => {
                write!(f, "Source unreadable at offset {}: {}", offset, reason)
            }
            TransferError::Disconnected => write!(f, "Link disconnected during upload"),
            TransferError::InboundOverflow { limit } => {
                write!(f, "Inbound buffer exceeded {} bytes without a complete frame", limit)
            }
            TransferError::MalformedFrame { reason } => write!(f, "Malformed frame: {}", reason),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransferError {}

/// Errors returned by [`EngineConfig::validate`](crate::config::EngineConfig::validate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunks must carry at least one byte.
    ZeroChunkSize,
    /// The outbound queue must hold at least one chunk.
    ZeroFifoDepth,
    /// The inbound buffer must be able to hold at least one byte.
    ZeroInboundLimit,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::ZeroChunkSize => write!(f, "chunk_size must be greater than zero"),
            ConfigError::ZeroFifoDepth => write!(f, "fifo_depth must be greater than zero"),
            ConfigError::ZeroInboundLimit => {
                write!(f, "max_inbound_buffer must be greater than zero")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
