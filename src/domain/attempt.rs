use crate::error::{FeeError, Result};
use std::fmt;

/// Lifecycle of one payment attempt.
///
/// `Requested -> OrderOpened -> Verifying -> {Committed | Rejected | AlreadyPaid}`.
/// `Rejected` is also reachable from `Requested` when the gateway fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Requested,
    OrderOpened,
    Verifying,
    Committed,
    Rejected,
    AlreadyPaid,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Committed | AttemptState::Rejected | AttemptState::AlreadyPaid
        )
    }

    pub fn can_advance_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Requested, OrderOpened)
                | (Requested, Rejected)
                | (OrderOpened, Verifying)
                | (Verifying, Committed)
                | (Verifying, Rejected)
                | (Verifying, AlreadyPaid)
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Requested => "requested",
            AttemptState::OrderOpened => "order_opened",
            AttemptState::Verifying => "verifying",
            AttemptState::Committed => "committed",
            AttemptState::Rejected => "rejected",
            AttemptState::AlreadyPaid => "already_paid",
        };
        f.write_str(name)
    }
}

/// Tracks the state of a single attempt and refuses illegal transitions.
#[derive(Debug)]
pub struct Attempt {
    state: AttemptState,
}

impl Attempt {
    /// A fresh attempt from the client's payment request.
    pub fn requested() -> Self {
        Self {
            state: AttemptState::Requested,
        }
    }

    /// An attempt resumed from a gateway callback for an already opened order.
    pub fn opened() -> Self {
        Self {
            state: AttemptState::OrderOpened,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn advance(&mut self, next: AttemptState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(FeeError::Internal(format!(
                "Illegal attempt transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "attempt transition");
        self.state = next;
        Ok(())
    }
}
