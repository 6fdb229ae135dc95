use alloc::vec::Vec;

use crate::core::source::SourceKind;
use crate::error::TransferError;

/// Notifications delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// An upload began. `total_bytes` is known for memory and file sources.
    TransferStarted {
        source: SourceKind,
        total_bytes: Option<u64>,
    },
    /// A chunk was acknowledged; `bytes_sent` is cumulative.
    TransferProgress { bytes_sent: u64 },
    /// Every byte of the source was acknowledged.
    TransferCompleted { bytes_sent: u64 },
    /// The upload halted and needs an explicit restart.
    TransferFailed { reason: TransferError },
    /// One complete inbound message.
    MessageReceived(Vec<u8>),
    /// Inbound bytes were discarded because they could not be framed.
    ReceiveError { reason: TransferError },
}
