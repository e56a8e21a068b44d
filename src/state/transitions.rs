//! Forward-only transition table.

use crq_protocol::{ParseStateError, RequestState};

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot create a request in state {0}")]
    InvalidInitial(RequestState),

    #[error("invalid state transition from {from} to {to}")]
    Invalid { from: RequestState, to: RequestState },
}

/// Check a state change. `from` is `None` for a record being created.
///
/// Staying in the same state is not a transition and is always accepted.
pub fn check_transition(from: Option<RequestState>, to: RequestState) -> Result<(), TransitionError> {
    use RequestState::*;

    match from {
        None => match to {
            Uncommitted | Committed => Ok(()),
            Final => Err(TransitionError::InvalidInitial(to)),
        },
        Some(from) if from == to => Ok(()),
        Some(from) => match (from, to) {
            (Uncommitted, Committed) | (Committed, Final) => Ok(()),
            _ => Err(TransitionError::Invalid { from, to }),
        },
    }
}

/// Parse a transition origin: `new` for creation, otherwise a state name.
pub fn parse_origin(s: &str) -> Result<Option<RequestState>, ParseStateError> {
    if s == "new" {
        return Ok(None);
    }
    s.parse().map(Some)
}
