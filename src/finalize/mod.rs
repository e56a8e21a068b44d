//! Finalization of requests whose execution unit has finished
//!
//! After every successful mutation the request service asks whether the
//! request is Committed and its unit terminal. If so it publishes the
//! unit's log and output and moves the request to Final as the system
//! actor. Re-running on a Final request is a no-op.

mod publish;
mod scrub;

pub use publish::{CollectionPublisher, PublishError, Published};
pub use scrub::scrub_secrets;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crq_protocol::{
    AdapterError, ArtifactStore, ContainerRequest, ExecutionUnits, RequestState, UnitSnapshot,
};

/// Finalization failures. Never surfaced to the caller whose mutation
/// triggered finalization.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("execution unit {0} not found")]
    UnitNotFound(String),
}

/// Decides on and prepares finalization.
pub struct FinalizationService<'a> {
    units: &'a dyn ExecutionUnits,
    publisher: CollectionPublisher<'a>,
}

impl<'a> FinalizationService<'a> {
    pub fn new(units: &'a dyn ExecutionUnits, artifacts: &'a dyn ArtifactStore, name_attempts: u32) -> Self {
        Self {
            units,
            publisher: CollectionPublisher::new(artifacts, name_attempts),
        }
    }

    /// The bound unit, if the request is Committed and that unit is
    /// terminal.
    pub fn terminal_unit(&self, record: &ContainerRequest) -> Result<Option<UnitSnapshot>, FinalizeError> {
        if record.state != RequestState::Committed {
            return Ok(None);
        }
        let Some(unit_uuid) = record.container_uuid.as_deref() else {
            return Ok(None);
        };
        let unit = self
            .units
            .lookup(unit_uuid)?
            .ok_or_else(|| FinalizeError::UnitNotFound(unit_uuid.to_string()))?;
        Ok(unit.is_terminal().then_some(unit))
    }

    /// Publish artifacts and return the patch that finalizes `record`.
    pub fn prepare(
        &self,
        record: &ContainerRequest,
        unit: &UnitSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>, FinalizeError> {
        let published = self.publisher.publish(record, unit, now)?;

        let mut patch = Map::new();
        patch.insert("state".to_string(), json!(RequestState::Final.as_str()));
        patch.insert("output_uuid".to_string(), json!(published.output_uuid));
        patch.insert("log_uuid".to_string(), json!(published.log_uuid));
        Ok(patch)
    }

    /// Delete the artifacts a prepared patch created when the patch itself
    /// could not be stored. Artifacts already recorded on `record` stay.
    pub fn discard(&self, record: &ContainerRequest, patch: &Map<String, Value>) {
        let created: Vec<String> = [("output_uuid", &record.output_uuid), ("log_uuid", &record.log_uuid)]
            .into_iter()
            .filter_map(|(key, current)| {
                let uuid = patch.get(key)?.as_str()?;
                (current.as_deref() != Some(uuid)).then(|| uuid.to_string())
            })
            .collect();
        self.publisher.discard(&record.uuid, &created);
    }
}
