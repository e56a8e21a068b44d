//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Cluster identifier used as the uuid prefix (default: "zzzzz")
    pub cluster_id: String,

    /// Maximum number of execution units one request may be bound to (default: 3)
    pub container_count_max: i64,

    /// Whether preemptible capacity may be requested (default: false)
    pub preemptible_instances: bool,

    /// Version prefix runtime tokens must carry (default: "v2/")
    pub runtime_token_prefix: String,

    /// Reject tokens without the prefix before asking the credential service (default: true)
    pub strict_token_prefix: bool,

    /// Attempts at a unique artifact name before giving up (default: 4)
    pub artifact_name_attempts: u32,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            cluster_id: "zzzzz".to_string(),
            container_count_max: 3,
            preemptible_instances: false,
            runtime_token_prefix: "v2/".to_string(),
            strict_token_prefix: true,
            artifact_name_attempts: 4,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "cluster_id": self.cluster_id,
            "container_count_max": self.container_count_max,
            "preemptible_instances": self.preemptible_instances,
            "runtime_token_prefix": self.runtime_token_prefix,
            "strict_token_prefix": self.strict_token_prefix,
            "artifact_name_attempts": self.artifact_name_attempts,
        })
    }
}
