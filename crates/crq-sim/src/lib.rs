//! CRQ Simulation
//!
//! In-memory implementations of every collaborator the request core
//! consumes: request persistence, the execution-unit service, the
//! content-addressed artifact store, credential validation, and a manual
//! clock. Used by unit and integration tests and by `crq submit`.
//!
//! None of this is a production scheduler or storage service.

pub mod artifacts;
pub mod clock;
pub mod cluster;
pub mod credentials;
pub mod request_store;
pub mod units;

pub use artifacts::MemoryArtifactStore;
pub use clock::ManualClock;
pub use cluster::SimCluster;
pub use credentials::StaticCredentials;
pub use request_store::MemoryRequestStore;
pub use units::{FailureInjection, PriorityCall, SimUnits};
