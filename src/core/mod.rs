//! Transfer engine core (no_std compatible).
//!
//! Everything here is pure state-machine logic over `alloc` collections.
//! Timers, the BLE link and file access live in the std-only layers.

pub mod credit;
pub mod engine;
pub mod events;
pub mod fifo;
pub mod framing;
pub mod source;
pub mod state;

pub use credit::{CreditEdge, CreditTracker};
pub use engine::{Action, SendTicket, TransferEngine};
pub use events::TransferEvent;
pub use fifo::OutboundQueue;
pub use framing::{DelimiterFramer, Framer, FramingBuffer, LengthPrefixFramer};
pub use source::{ByteSource, MemorySource, SourceAdapter, SourceKind};
pub use state::{ControlOutcome, TransferState};
