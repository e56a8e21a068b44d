//! CRQ Protocol Types
//!
//! Defines the container request entity and its wire encoding, the
//! field-tagged error taxonomy, and the contracts of the collaborators the
//! request core consumes (execution units, artifact storage, credentials,
//! persistence).

pub mod actor;
pub mod artifact;
pub mod constraints;
pub mod contract;
pub mod error;
pub mod field;
pub mod ids;
pub mod mount;
pub mod request;
pub mod unit;

pub use actor::{Actor, Privilege};
pub use artifact::{ArtifactRecord, ArtifactSlot};
pub use constraints::{ResourceLimits, RuntimeConstraints, SchedulingParameters};
pub use contract::{
    AdapterError, ArtifactError, ArtifactStore, Backends, Clock, CredentialValidator,
    ExecutionUnits, RequestStore, ResolveSpec, StoreError, SystemClock,
};
pub use error::{ErrorKind, FieldError, FieldErrors};
pub use field::RequestField;
pub use mount::Mount;
pub use request::{ContainerRequest, ParseStateError, RequestState};
pub use unit::{UnitSnapshot, UnitState};

/// Lowest accepted request priority.
pub const PRIORITY_MIN: i64 = 0;

/// Highest accepted request priority.
pub const PRIORITY_MAX: i64 = 1000;
