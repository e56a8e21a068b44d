//! Container request core
//!
//! Admission, lifecycle and finalization of container requests: the state
//! machine and per-transition field whitelist, validation of the request
//! payload, binding to execution units, priority inheritance and
//! propagation, and publication of results when the bound unit finishes.
//!
//! The collaborators (request storage, execution units, artifact storage,
//! credentials, clock) are the traits in [`crq_protocol`].

pub mod binding;
pub mod config;
pub mod finalize;
pub mod pipeline;
pub mod priority;
pub mod state;
pub mod validate;

pub use config::{ConfigError, DeploymentConfig, EffectiveConfig};
pub use pipeline::{MutationError, MutationResult, RequestService};
