//! Caller identity and privilege.
//!
//! Every operation takes the acting caller explicitly. The system actor is
//! reserved for side effects the core performs on its own (priority
//! propagation, finalization) so audit trails can tell them apart from user
//! actions.

use serde::{Deserialize, Serialize};

use crate::ids;

/// Privilege level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Ordinary caller, bound by the per-transition whitelist.
    User,
    /// Administrator; may assign bindings and artifact references.
    Admin,
    /// The core itself.
    System,
}

/// The caller a mutation is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    uuid: String,
    privilege: Privilege,
    /// Execution unit whose runtime token authenticated this caller, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container_uuid: Option<String>,
}

impl Actor {
    pub fn user(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            privilege: Privilege::User,
            container_uuid: None,
        }
    }

    pub fn admin(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            privilege: Privilege::Admin,
            container_uuid: None,
        }
    }

    /// The system actor of a cluster.
    pub fn system(cluster_id: &str) -> Self {
        Self {
            uuid: ids::system_user_uuid(cluster_id),
            privilege: Privilege::System,
            container_uuid: None,
        }
    }

    /// Mark the caller as running inside the given execution unit.
    pub fn within_container(mut self, container_uuid: impl Into<String>) -> Self {
        self.container_uuid = Some(container_uuid.into());
        self
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn container_uuid(&self) -> Option<&str> {
        self.container_uuid.as_deref()
    }

    /// Admins and the system may act outside the ordinary whitelist.
    pub fn is_privileged(&self) -> bool {
        matches!(self.privilege, Privilege::Admin | Privilege::System)
    }

    pub fn is_system(&self) -> bool {
        self.privilege == Privilege::System
    }
}
