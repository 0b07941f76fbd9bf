/// Per-URL state definitions for tracking crawl progress
use std::fmt;

/// Represents the current state of a URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedState {
    // ===== Active States =====
    /// URL sits in the frontier and has not been attempted
    Pending,

    /// URL is being fetched by exactly one worker
    InFlight,

    // ===== Terminal States =====
    /// URL was fetched, validated and its artifact persisted
    Completed,

    /// URL exhausted its retries; recorded with a reason and timestamp
    Failed,
}

impl TrackedState {
    /// Returns true if the transition `self -> next` is allowed
    ///
    /// Allowed: Pending→InFlight, InFlight→Completed, InFlight→Failed.
    pub fn can_transition_to(&self, next: TrackedState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Completed)
                | (Self::InFlight, Self::Failed)
        )
    }

    /// Performs a transition, rejecting illegal ones
    pub fn transition(self, next: TrackedState) -> Result<TrackedState, crate::HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Converts the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TrackedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
