//! The container request entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constraints::{RuntimeConstraints, SchedulingParameters};
use crate::field::RequestField;
use crate::mount::Mount;

/// Request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestState {
    /// Draft; the full specification is still editable.
    Uncommitted,
    /// Bound to an execution unit; only priority remains editable.
    Committed,
    /// The execution unit finished; artifacts are published.
    Final,
}

impl RequestState {
    pub const ALL: [RequestState; 3] = [Self::Uncommitted, Self::Committed, Self::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncommitted => "Uncommitted",
            Self::Committed => "Committed",
            Self::Final => "Final",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a request state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid state {0:?}, expected one of Uncommitted, Committed, Final")]
pub struct ParseStateError(pub String);

impl FromStr for RequestState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

/// A request to run a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub uuid: String,
    pub owner_uuid: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Last user to change the request. System side effects leave it alone.
    pub modified_by: Option<String>,

    pub name: Option<String>,
    pub description: Option<String>,
    pub properties: BTreeMap<String, Value>,

    pub state: RequestState,
    /// Execution unit on whose behalf this request was created.
    pub requesting_container_uuid: Option<String>,
    /// Execution unit this request is bound to.
    pub container_uuid: Option<String>,
    /// Number of execution units this request has been bound to so far.
    pub container_count: i64,
    pub container_count_max: i64,
    pub priority: i64,

    pub command: Vec<String>,
    pub container_image: String,
    pub cwd: String,
    pub output_path: String,
    pub environment: BTreeMap<String, String>,
    pub mounts: BTreeMap<String, Mount>,
    pub secret_mounts: BTreeMap<String, Mount>,
    pub runtime_constraints: RuntimeConstraints,
    pub scheduling_parameters: SchedulingParameters,
    pub runtime_token: Option<String>,
    /// Allow the resolver to reuse an equivalent execution unit.
    pub use_existing: bool,

    pub output_name: Option<String>,
    /// Seconds the output artifact is kept; 0 keeps it indefinitely.
    pub output_ttl: i64,
    pub output_uuid: Option<String>,
    pub log_uuid: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
    pub filters: Option<String>,
}

impl ContainerRequest {
    /// An empty, not-yet-persisted request. Mutations are applied on top of
    /// this and defaults are filled in afterwards.
    pub fn blank(uuid: impl Into<String>, owner_uuid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uuid: uuid.into(),
            owner_uuid: owner_uuid.into(),
            created_at: now,
            modified_at: now,
            modified_by: None,
            name: None,
            description: None,
            properties: BTreeMap::new(),
            state: RequestState::Uncommitted,
            requesting_container_uuid: None,
            container_uuid: None,
            container_count: 0,
            container_count_max: 0,
            priority: 0,
            command: Vec::new(),
            container_image: String::new(),
            cwd: String::new(),
            output_path: String::new(),
            environment: BTreeMap::new(),
            mounts: BTreeMap::new(),
            secret_mounts: BTreeMap::new(),
            runtime_constraints: RuntimeConstraints::new(),
            scheduling_parameters: SchedulingParameters::new(),
            runtime_token: None,
            use_existing: true,
            output_name: None,
            output_ttl: 0,
            output_uuid: None,
            log_uuid: None,
            expires_at: None,
            filters: None,
        }
    }

    /// Wire value of one attribute.
    pub fn field_value(&self, field: RequestField) -> Value {
        fn json<T: Serialize>(v: &T) -> Value {
            serde_json::to_value(v).unwrap_or(Value::Null)
        }
        match field {
            RequestField::Uuid => json(&self.uuid),
            RequestField::OwnerUuid => json(&self.owner_uuid),
            RequestField::CreatedAt => json(&self.created_at),
            RequestField::ModifiedAt => json(&self.modified_at),
            RequestField::ModifiedBy => json(&self.modified_by),
            RequestField::Name => json(&self.name),
            RequestField::Description => json(&self.description),
            RequestField::Properties => json(&self.properties),
            RequestField::State => json(&self.state),
            RequestField::RequestingContainerUuid => json(&self.requesting_container_uuid),
            RequestField::ContainerUuid => json(&self.container_uuid),
            RequestField::ContainerCount => json(&self.container_count),
            RequestField::ContainerCountMax => json(&self.container_count_max),
            RequestField::Priority => json(&self.priority),
            RequestField::Command => json(&self.command),
            RequestField::ContainerImage => json(&self.container_image),
            RequestField::Cwd => json(&self.cwd),
            RequestField::OutputPath => json(&self.output_path),
            RequestField::Environment => json(&self.environment),
            RequestField::Mounts => json(&self.mounts),
            RequestField::SecretMounts => json(&self.secret_mounts),
            RequestField::RuntimeConstraints => json(&self.runtime_constraints),
            RequestField::SchedulingParameters => json(&self.scheduling_parameters),
            RequestField::RuntimeToken => json(&self.runtime_token),
            RequestField::UseExisting => json(&self.use_existing),
            RequestField::OutputName => json(&self.output_name),
            RequestField::OutputTtl => json(&self.output_ttl),
            RequestField::OutputUuid => json(&self.output_uuid),
            RequestField::LogUuid => json(&self.log_uuid),
            RequestField::ExpiresAt => json(&self.expires_at),
            RequestField::Filters => json(&self.filters),
        }
    }

    /// Attributes whose value differs from `other`.
    pub fn changed_fields(&self, other: &ContainerRequest) -> Vec<RequestField> {
        RequestField::ALL
            .iter()
            .copied()
            .filter(|f| self.field_value(*f) != other.field_value(*f))
            .collect()
    }

    /// True when secret attributes hold nothing.
    pub fn secrets_empty(&self) -> bool {
        self.secret_mounts.is_empty() && self.runtime_token.is_none()
    }

    /// Representation handed to API callers: every attribute except secrets.
    pub fn api_view(&self) -> Value {
        let view: Map<String, Value> = RequestField::ALL
            .iter()
            .filter(|f| !f.is_secret())
            .map(|f| (f.as_str().to_string(), self.field_value(*f)))
            .collect();
        Value::Object(view)
    }

    /// Representation safe for logs and audit records.
    pub fn logged_attributes(&self) -> Value {
        self.api_view()
    }
}
