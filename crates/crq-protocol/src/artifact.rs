//! Artifact records materialized from execution unit output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The artifacts a finished request materializes, in publication order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSlot {
    Log,
    Output,
}

impl ArtifactSlot {
    pub const ALL: [ArtifactSlot; 2] = [ArtifactSlot::Log, ArtifactSlot::Output];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for ArtifactSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, owned artifact record in the content-addressed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Assigned by the store on first save.
    pub uuid: Option<String>,
    pub owner_uuid: String,
    pub name: String,
    pub portable_data_hash: String,
    pub manifest_text: String,
    pub properties: BTreeMap<String, Value>,
    pub trash_at: Option<DateTime<Utc>>,
    pub delete_at: Option<DateTime<Utc>>,
}

impl ArtifactRecord {
    /// A not-yet-saved record tagged with the slot and originating request.
    pub fn draft(owner_uuid: &str, name: &str, slot: ArtifactSlot, request_uuid: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("type".to_string(), Value::from(slot.as_str()));
        properties.insert("container_request".to_string(), Value::from(request_uuid));
        Self {
            uuid: None,
            owner_uuid: owner_uuid.to_string(),
            name: name.to_string(),
            portable_data_hash: String::new(),
            manifest_text: String::new(),
            properties,
            trash_at: None,
            delete_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_draft_tags() {
        let record = ArtifactRecord::draft(
            "zzzzz-tpzed-aaaaaaaaaaaaaaa",
            "Container output for request zzzzz-xvhdk-bbbbbbbbbbbbbbb",
            ArtifactSlot::Output,
            "zzzzz-xvhdk-bbbbbbbbbbbbbbb",
        );
        assert!(record.uuid.is_none());
        assert_eq!(record.properties["type"], json!("output"));
        assert_eq!(
            record.properties["container_request"],
            json!("zzzzz-xvhdk-bbbbbbbbbbbbbbb")
        );
    }

    #[test]
    fn test_slot_order() {
        assert_eq!(ArtifactSlot::ALL, [ArtifactSlot::Log, ArtifactSlot::Output]);
        assert_eq!(ArtifactSlot::Log.to_string(), "log");
    }
}
