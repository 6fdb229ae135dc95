#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod config;
pub mod core;
mod error;
#[cfg(feature = "std")]
pub mod file_source;
#[cfg(feature = "std")]
mod logging;
pub mod prelude;
#[cfg(feature = "std")]
pub mod session;
#[cfg(feature = "std")]
pub mod transport;

pub use crate::core::*;
pub use config::*;
pub use error::{ConfigError, TransferError};
#[cfg(feature = "std")]
pub use file_source::FileSource;
#[cfg(feature = "std")]
pub use logging::init_logging;
#[cfg(feature = "std")]
pub use session::{Session, SessionHandle, SessionSnapshot};
#[cfg(feature = "std")]
pub use transport::{loopback::LoopbackLink, LinkEvent, VspLink};
