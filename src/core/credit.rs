//! Remote buffer-space tracking.
//!
//! The VSP device raises and lowers a single "buffer space available" flag.
//! Only the rising edge matters to the drain loop; everything else is kept
//! for reporting.

/// Direction of a credit transition as reported by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditEdge {
    /// false -> true: the remote can take more data.
    Rising,
    /// true -> false: the remote buffer is full.
    Falling,
    /// Old and new values are equal.
    Steady,
}

#[derive(Debug, Clone)]
pub struct CreditTracker {
    available: bool,
    initial: bool,
}

impl CreditTracker {
    pub fn new(initial: bool) -> Self {
        Self {
            available: initial,
            initial,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Apply a transition delivered by the link and classify it.
    ///
    /// The edge is computed from the delivered `old`/`new` pair, which is
    /// what the remote observed; the tracked value always follows `new`.
    pub fn on_change(&mut self, old: bool, new: bool) -> CreditEdge {
        if old != self.available {
            log::debug!(
                "credit change reported from {} but tracker held {}",
                old,
                self.available
            );
        }
        self.available = new;
        match (old, new) {
            (false, true) => CreditEdge::Rising,
            (true, false) => CreditEdge::Falling,
            _ => CreditEdge::Steady,
        }
    }

    /// Forget any remote state and return to the configured initial value.
    pub fn reset(&mut self) {
        self.available = self.initial;
    }
}
