//! Mount specifications.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A mount specification.
///
/// Typed members are checked on every mutation; members this version does
/// not know about are preserved in `extra` so the wire form round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portable_data_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,

    /// Size in bytes for scratch mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from_output: Option<bool>,

    /// Inline payload for json and text mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Mount {
    /// Members that must be strings when present.
    pub const STRING_MEMBERS: &'static [&'static str] = &[
        "kind",
        "portable_data_hash",
        "uuid",
        "device_type",
        "path",
        "commit",
        "repository_name",
        "git_url",
    ];

    /// Members that must be non-negative integers when present.
    pub const INTEGER_MEMBERS: &'static [&'static str] = &["capacity"];

    /// Members that must be booleans when present.
    pub const BOOLEAN_MEMBERS: &'static [&'static str] = &["writable", "exclude_from_output"];

    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }
}
