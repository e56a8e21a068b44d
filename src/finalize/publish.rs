//! Publishing unit output and log as named artifacts.
//!
//! Artifact names are unique per owner. When the preferred name is taken
//! the publisher retries with a timestamped name, then with a timestamped
//! name plus a short random suffix, up to a bounded number of attempts.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crq_protocol::{ArtifactError, ArtifactRecord, ArtifactSlot, ArtifactStore, ContainerRequest, UnitSnapshot};

/// Publishing failures
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("artifact store error: {0}")]
    Store(#[from] ArtifactError),

    #[error("no manifest stored under {0}")]
    ManifestNotFound(String),

    #[error("no unique name for {name:?} after {attempts} attempts")]
    NamesExhausted { name: String, attempts: u32 },
}

/// Artifact uuids produced for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Published {
    pub log_uuid: Option<String>,
    pub output_uuid: Option<String>,
}

impl Published {
    pub fn get(&self, slot: ArtifactSlot) -> Option<&str> {
        match slot {
            ArtifactSlot::Log => self.log_uuid.as_deref(),
            ArtifactSlot::Output => self.output_uuid.as_deref(),
        }
    }

    fn set(&mut self, slot: ArtifactSlot, uuid: String) {
        match slot {
            ArtifactSlot::Log => self.log_uuid = Some(uuid),
            ArtifactSlot::Output => self.output_uuid = Some(uuid),
        }
    }
}

/// Turns unit results into artifacts owned by the request's owner.
pub struct CollectionPublisher<'a> {
    artifacts: &'a dyn ArtifactStore,
    name_attempts: u32,
}

impl<'a> CollectionPublisher<'a> {
    pub fn new(artifacts: &'a dyn ArtifactStore, name_attempts: u32) -> Self {
        Self {
            artifacts,
            name_attempts: name_attempts.max(1),
        }
    }

    /// Name an artifact gets when nothing else is asked for.
    pub fn default_name(slot: ArtifactSlot, request_uuid: &str) -> String {
        format!("Container {} for request {}", slot.as_str(), request_uuid)
    }

    /// Publish the log, then the output, of a finished unit.
    ///
    /// Starts from the uuids already on the request so a retry updates the
    /// same artifacts instead of creating new ones. Every manifest is read
    /// before anything is saved, and records created by a failed attempt
    /// are deleted again, so a failure leaves no artifact behind.
    pub fn publish(
        &self,
        request: &ContainerRequest,
        unit: &UnitSnapshot,
        now: DateTime<Utc>,
    ) -> Result<Published, PublishError> {
        let mut published = Published {
            log_uuid: request.log_uuid.clone(),
            output_uuid: request.output_uuid.clone(),
        };

        let mut staged = Vec::new();
        for slot in ArtifactSlot::ALL {
            if let Some(handle) = unit.handle(slot) {
                let record = self.stage(request, slot, handle, published.get(slot), now)?;
                staged.push((slot, record));
            }
        }

        let mut created = Vec::new();
        for (slot, record) in staged {
            let is_new = record.uuid.is_none();
            match self.save_with_unique_name(record, now) {
                Ok(saved) => {
                    let Some(uuid) = saved.uuid else {
                        self.discard(&request.uuid, &created);
                        return Err(ArtifactError::Unavailable("store returned a record without uuid".to_string()).into());
                    };
                    info!(request = %request.uuid, slot = slot.as_str(), artifact = %uuid, name = %saved.name, "Published artifact");
                    if is_new {
                        created.push(uuid.clone());
                    }
                    published.set(slot, uuid);
                }
                Err(e) => {
                    self.discard(&request.uuid, &created);
                    return Err(e);
                }
            }
        }

        Ok(published)
    }

    /// Build the record for one slot without saving it.
    fn stage(
        &self,
        request: &ContainerRequest,
        slot: ArtifactSlot,
        handle: &str,
        existing_uuid: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ArtifactRecord, PublishError> {
        let mut name = Self::default_name(slot, &request.uuid);
        let mut expires = None;
        if slot == ArtifactSlot::Output {
            if let Some(output_name) = &request.output_name {
                name = output_name.clone();
            }
            if request.output_ttl > 0 {
                expires = Some(now + Duration::seconds(request.output_ttl));
            }
        }

        let manifest_text = self
            .artifacts
            .manifest_text(handle)?
            .ok_or_else(|| PublishError::ManifestNotFound(handle.to_string()))?;

        let existing = match existing_uuid {
            Some(uuid) => self.artifacts.find(uuid)?,
            None => None,
        };
        let mut record = existing
            .unwrap_or_else(|| ArtifactRecord::draft(&request.owner_uuid, &name, slot, &request.uuid));
        record.portable_data_hash = handle.to_string();
        record.manifest_text = manifest_text;
        record.trash_at = expires;
        record.delete_at = expires;
        Ok(record)
    }

    /// Delete artifacts created for a publication that did not stick.
    pub fn discard(&self, request_uuid: &str, created: &[String]) {
        for uuid in created {
            match self.artifacts.delete(uuid) {
                Ok(()) => debug!(request = %request_uuid, artifact = %uuid, "Removed artifact of failed publication"),
                Err(e) => warn!(request = %request_uuid, artifact = %uuid, error = %e, "Could not remove artifact of failed publication"),
            }
        }
    }

    fn save_with_unique_name(
        &self,
        record: ArtifactRecord,
        now: DateTime<Utc>,
    ) -> Result<ArtifactRecord, PublishError> {
        let base = record.name.clone();
        let stamped = format!("{} ({})", base, now.to_rfc3339_opts(SecondsFormat::Millis, true));

        for attempt in 0..self.name_attempts {
            let name = match attempt {
                0 => base.clone(),
                1 => stamped.clone(),
                _ => format!("{} {}", stamped, &uuid::Uuid::new_v4().simple().to_string()[..8]),
            };
            let mut candidate = record.clone();
            candidate.name = name;
            match self.artifacts.save(candidate) {
                Ok(saved) => return Ok(saved),
                Err(ArtifactError::NameConflict(taken)) => {
                    debug!(name = %taken, attempt, "Artifact name taken");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PublishError::NamesExhausted {
            name: base,
            attempts: self.name_attempts,
        })
    }
}
