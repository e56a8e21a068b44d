//! Contracts of the collaborators the request core consumes.
//!
//! The core never reaches past these traits: the execution-unit service,
//! the content-addressed artifact store, credential validation, request
//! persistence, and the storage clock are all injected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::actor::Actor;
use crate::artifact::ArtifactRecord;
use crate::constraints::{RuntimeConstraints, SchedulingParameters};
use crate::mount::Mount;
use crate::request::ContainerRequest;
use crate::unit::UnitSnapshot;

/// Failure reported by the execution-unit or credential service.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{service} rejected the call: {message}")]
    Rejected { service: String, message: String },
}

/// Failure reported by request persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container request {0} not found")]
    NotFound(String),

    #[error("container request {0} already exists")]
    AlreadyExists(String),

    /// The persisted container count moved since the record was read.
    #[error("container request {uuid} changed concurrently: expected container_count {expected}, found {actual}")]
    Conflict {
        uuid: String,
        expected: i64,
        actual: i64,
    },

    #[error("request store unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Another artifact with the same owner already uses this name.
    #[error("artifact name already in use: {0}")]
    NameConflict(String),

    #[error("artifact {0} not found")]
    NotFound(String),

    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the resolver needs to find or create an execution unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveSpec {
    pub request_uuid: String,
    pub owner_uuid: String,
    pub command: Vec<String>,
    pub container_image: String,
    pub cwd: String,
    pub environment: BTreeMap<String, String>,
    pub mounts: BTreeMap<String, Mount>,
    pub secret_mounts: BTreeMap<String, Mount>,
    pub output_path: String,
    pub runtime_constraints: RuntimeConstraints,
    pub scheduling_parameters: SchedulingParameters,
    pub runtime_token: Option<String>,
    pub use_existing: bool,
    pub priority: i64,
}

impl ResolveSpec {
    pub fn from_request(cr: &ContainerRequest) -> Self {
        Self {
            request_uuid: cr.uuid.clone(),
            owner_uuid: cr.owner_uuid.clone(),
            command: cr.command.clone(),
            container_image: cr.container_image.clone(),
            cwd: cr.cwd.clone(),
            environment: cr.environment.clone(),
            mounts: cr.mounts.clone(),
            secret_mounts: cr.secret_mounts.clone(),
            output_path: cr.output_path.clone(),
            runtime_constraints: cr.runtime_constraints.clone(),
            scheduling_parameters: cr.scheduling_parameters.clone(),
            runtime_token: cr.runtime_token.clone(),
            use_existing: cr.use_existing,
            priority: cr.priority,
        }
    }
}

/// The execution-unit service.
pub trait ExecutionUnits: Send + Sync {
    /// Find a reusable unit for the spec or create a new one.
    fn resolve(&self, spec: &ResolveSpec, actor: &Actor) -> Result<String, AdapterError>;

    fn lookup(&self, uuid: &str) -> Result<Option<UnitSnapshot>, AdapterError>;

    /// Re-derive the unit's priority from every request bound to it.
    /// Idempotent.
    fn recompute_priority(&self, uuid: &str, actor: &Actor) -> Result<(), AdapterError>;
}

/// The content-addressed artifact store.
pub trait ArtifactStore: Send + Sync {
    /// Manifest stored under a content-address handle.
    fn manifest_text(&self, portable_data_hash: &str) -> Result<Option<String>, ArtifactError>;

    fn find(&self, uuid: &str) -> Result<Option<ArtifactRecord>, ArtifactError>;

    /// Create (no uuid yet) or update a record. Returns the saved record.
    fn save(&self, record: ArtifactRecord) -> Result<ArtifactRecord, ArtifactError>;

    /// Remove a record. Deleting an unknown uuid is not an error.
    fn delete(&self, uuid: &str) -> Result<(), ArtifactError>;
}

/// The credential service.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<bool, AdapterError>;
}

/// Request persistence.
pub trait RequestStore: Send + Sync {
    fn get(&self, uuid: &str) -> Result<Option<ContainerRequest>, StoreError>;

    fn insert(&self, record: &ContainerRequest) -> Result<(), StoreError>;

    /// Replace the stored record if its container count still equals
    /// `expected_container_count`; otherwise fail with `StoreError::Conflict`.
    fn update(&self, record: &ContainerRequest, expected_container_count: i64) -> Result<(), StoreError>;

    fn delete(&self, uuid: &str) -> Result<(), StoreError>;

    /// Highest priority among requests bound to the given unit.
    fn max_priority_bound_to(&self, container_uuid: &str) -> Result<Option<i64>, StoreError>;
}

/// Storage time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The collaborators wired into a request service.
#[derive(Clone)]
pub struct Backends {
    pub requests: Arc<dyn RequestStore>,
    pub units: Arc<dyn ExecutionUnits>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub credentials: Arc<dyn CredentialValidator>,
    pub clock: Arc<dyn Clock>,
}
