//! Upload lifecycle states and the outcome of control requests.

/// Where a session is in its upload lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferState {
    /// No source armed, or the channel is not yet usable.
    Idle,
    /// A source is armed and the VSP characteristics are valid.
    Ready,
    /// Chunks are being drained to the link.
    Uploading,
    /// The source was fully sent and acknowledged.
    Uploaded,
}

impl TransferState {
    /// Draining the outbound queue is only allowed in this state.
    pub fn is_uploading(self) -> bool {
        matches!(self, TransferState::Uploading)
    }
}

impl core::fmt::Display for TransferState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            TransferState::Idle => "idle",
            TransferState::Ready => "ready",
            TransferState::Uploading => "uploading",
            TransferState::Uploaded => "uploaded",
        };
        f.write_str(name)
    }
}

/// Result of a control request such as begin, reset or choose-source.
///
/// Requests that do not match an allowed transition never fail loudly; the
/// caller learns whether anything happened from this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlOutcome {
    /// The request changed the session.
    Applied,
    /// The session was already where the request would have put it.
    AlreadyInState,
    /// The request is not valid from the current state; nothing changed.
    Rejected,
}

impl ControlOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, ControlOutcome::Applied)
    }
}
