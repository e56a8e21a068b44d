//! Request state machine
//!
//! - Transitions: new → {Uncommitted, Committed}, Uncommitted → Committed,
//!   Committed → Final. Everything else is rejected.
//! - Per-transition field whitelist.

mod transitions;
mod whitelist;

pub use transitions::{check_transition, parse_origin, TransitionError};
pub use whitelist::{permitted_fields, ALWAYS_PERMITTED, PERMITTED_BEFORE_COMMIT};
