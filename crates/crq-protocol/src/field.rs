//! Attribute names of the container request entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every attribute of a container request, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestField {
    Uuid,
    OwnerUuid,
    CreatedAt,
    ModifiedAt,
    ModifiedBy,
    Name,
    Description,
    Properties,
    State,
    RequestingContainerUuid,
    ContainerUuid,
    ContainerCount,
    ContainerCountMax,
    Priority,
    Command,
    ContainerImage,
    Cwd,
    OutputPath,
    Environment,
    Mounts,
    SecretMounts,
    RuntimeConstraints,
    SchedulingParameters,
    RuntimeToken,
    UseExisting,
    OutputName,
    OutputTtl,
    OutputUuid,
    LogUuid,
    ExpiresAt,
    Filters,
}

impl RequestField {
    /// All attributes in wire order.
    pub const ALL: &'static [RequestField] = &[
        Self::Uuid,
        Self::OwnerUuid,
        Self::CreatedAt,
        Self::ModifiedAt,
        Self::ModifiedBy,
        Self::Name,
        Self::Description,
        Self::Properties,
        Self::State,
        Self::RequestingContainerUuid,
        Self::ContainerUuid,
        Self::ContainerCount,
        Self::ContainerCountMax,
        Self::Priority,
        Self::Command,
        Self::ContainerImage,
        Self::Cwd,
        Self::OutputPath,
        Self::Environment,
        Self::Mounts,
        Self::SecretMounts,
        Self::RuntimeConstraints,
        Self::SchedulingParameters,
        Self::RuntimeToken,
        Self::UseExisting,
        Self::OutputName,
        Self::OutputTtl,
        Self::OutputUuid,
        Self::LogUuid,
        Self::ExpiresAt,
        Self::Filters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::OwnerUuid => "owner_uuid",
            Self::CreatedAt => "created_at",
            Self::ModifiedAt => "modified_at",
            Self::ModifiedBy => "modified_by",
            Self::Name => "name",
            Self::Description => "description",
            Self::Properties => "properties",
            Self::State => "state",
            Self::RequestingContainerUuid => "requesting_container_uuid",
            Self::ContainerUuid => "container_uuid",
            Self::ContainerCount => "container_count",
            Self::ContainerCountMax => "container_count_max",
            Self::Priority => "priority",
            Self::Command => "command",
            Self::ContainerImage => "container_image",
            Self::Cwd => "cwd",
            Self::OutputPath => "output_path",
            Self::Environment => "environment",
            Self::Mounts => "mounts",
            Self::SecretMounts => "secret_mounts",
            Self::RuntimeConstraints => "runtime_constraints",
            Self::SchedulingParameters => "scheduling_parameters",
            Self::RuntimeToken => "runtime_token",
            Self::UseExisting => "use_existing",
            Self::OutputName => "output_name",
            Self::OutputTtl => "output_ttl",
            Self::OutputUuid => "output_uuid",
            Self::LogUuid => "log_uuid",
            Self::ExpiresAt => "expires_at",
            Self::Filters => "filters",
        }
    }

    /// Attributes holding credentials. They are scrubbed at Final and never
    /// appear in API views or logs.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::SecretMounts | Self::RuntimeToken)
    }

    /// Attributes maintained by the system, never assigned by callers.
    pub fn is_system_maintained(&self) -> bool {
        matches!(
            self,
            Self::Uuid | Self::CreatedAt | Self::ModifiedAt | Self::ModifiedBy
        )
    }

    /// Attributes naming another object that the acting caller must be
    /// able to read once the mutation changes them.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::ContainerUuid | Self::OutputUuid | Self::LogUuid)
    }

    /// References that are exempt from the caller's read-permission check.
    /// Their target still has to exist.
    ///
    /// A request must be able to name its execution unit before the owner
    /// can see that unit, since visibility is granted through the request.
    pub fn skips_read_permission(&self) -> bool {
        matches!(self, Self::ContainerUuid)
    }
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown attribute: {}", s))
    }
}
