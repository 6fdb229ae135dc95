//! Link abstraction between a transfer session and a BLE VSP connection.

use crate::core::engine::SendTicket;

pub mod loopback;

/// Notifications raised by the link, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// VSP service and characteristics were discovered and validated.
    ChannelReady,
    /// Completion of a [`VspLink::write_chunk`] request.
    ChunkSent { ticket: SendTicket, ok: bool },
    /// Raw bytes from one RX notification.
    ChunkReceived(Vec<u8>),
    /// The remote's "buffer space available" flag changed.
    CreditChanged { old: bool, new: bool },
}

/// Write side of a VSP connection.
///
/// Writes are fire-and-forget: the link reports completion later as
/// [`LinkEvent::ChunkSent`] carrying the same ticket. An `Err` return means the
/// write was never issued.
#[async_trait::async_trait]
pub trait VspLink: Send + Sync {
    async fn write_chunk(&mut self, ticket: SendTicket, chunk: Vec<u8>) -> anyhow::Result<()>;
}
