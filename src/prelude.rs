//! Commonly used types and utilities for ease of import.

pub use crate::{
    ByteSource, ControlOutcome, EngineConfig, MemorySource, TransferEngine, TransferError,
    TransferEvent, TransferState,
};

#[cfg(feature = "std")]
pub use crate::{FileSource, Session, SessionHandle, SessionSnapshot};

#[cfg(feature = "std")]
pub use crate::transport::{loopback::LoopbackConfig, loopback::LoopbackLink, LinkEvent, VspLink};
