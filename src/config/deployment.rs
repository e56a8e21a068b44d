//! Typed deployment configuration.

use serde::{Deserialize, Serialize};

use crq_protocol::ids;

use super::defaults::BuiltinDefaults;
use super::effective::{ConfigError, EffectiveConfig};

/// Deployment settings consulted by the request service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub cluster_id: String,
    pub container_count_max: i64,
    pub preemptible_instances: bool,
    pub runtime_token_prefix: String,
    pub strict_token_prefix: bool,
    pub artifact_name_attempts: u32,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        let d = BuiltinDefaults::default();
        Self {
            cluster_id: d.cluster_id,
            container_count_max: d.container_count_max,
            preemptible_instances: d.preemptible_instances,
            runtime_token_prefix: d.runtime_token_prefix,
            strict_token_prefix: d.strict_token_prefix,
            artifact_name_attempts: d.artifact_name_attempts,
        }
    }
}

impl DeploymentConfig {
    /// Read the typed settings out of a validated effective config.
    /// Keys this type does not know are ignored.
    pub fn from_effective(effective: &EffectiveConfig) -> Result<Self, ConfigError> {
        serde_json::from_value(effective.config.clone())
            .map_err(|e| ConfigError::ValidationError(format!("invalid configuration: {}", e)))
    }

    /// Identity the service acts as for system-initiated work.
    pub fn system_user_uuid(&self) -> String {
        ids::system_user_uuid(&self.cluster_id)
    }
}
