//! In-memory content-addressed artifact store.
//!
//! Manifests are stored under a portable data hash of the form
//! `<first 32 hex of sha256(manifest)>+<manifest length>`. Artifact names are
//! unique per owner, as in the real store.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use sha2::{Digest, Sha256};

use crq_protocol::{ids, ArtifactError, ArtifactRecord, ArtifactStore};

/// Thread-safe artifact store. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryArtifactStore {
    cluster_id: String,
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    manifests: BTreeMap<String, String>,
    records: BTreeMap<String, ArtifactRecord>,
    unavailable: bool,
    saves_left: Option<usize>,
}

impl MemoryArtifactStore {
    pub fn new(cluster_id: &str) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Portable data hash of a manifest.
    pub fn portable_data_hash(manifest_text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(manifest_text.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}+{}", &digest[..32], manifest_text.len())
    }

    /// Store a manifest and return its handle.
    pub fn put_manifest(&self, manifest_text: &str) -> String {
        let pdh = Self::portable_data_hash(manifest_text);
        self.write()
            .manifests
            .insert(pdh.clone(), manifest_text.to_string());
        pdh
    }

    /// Every artifact record, in uuid order.
    pub fn records(&self) -> Vec<ArtifactRecord> {
        self.read().records.values().cloned().collect()
    }

    /// Records whose `type` property equals `slot`.
    pub fn records_of_type(&self, slot: &str) -> Vec<ArtifactRecord> {
        self.read()
            .records
            .values()
            .filter(|r| r.properties.get("type").and_then(|v| v.as_str()) == Some(slot))
            .cloned()
            .collect()
    }

    /// Make every call fail as if the store were down. Bringing the store
    /// back also clears any pending `fail_saves_after`.
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut inner = self.write();
        inner.unavailable = unavailable;
        if !unavailable {
            inner.saves_left = None;
        }
    }

    /// Let `saves` more save calls through, then fail every save as an outage.
    pub fn fail_saves_after(&self, saves: usize) {
        self.write().saves_left = Some(saves);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(inner: &Inner) -> Result<(), ArtifactError> {
        if inner.unavailable {
            return Err(ArtifactError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn manifest_text(&self, portable_data_hash: &str) -> Result<Option<String>, ArtifactError> {
        let inner = self.read();
        Self::check_available(&inner)?;
        Ok(inner.manifests.get(portable_data_hash).cloned())
    }

    fn find(&self, uuid: &str) -> Result<Option<ArtifactRecord>, ArtifactError> {
        let inner = self.read();
        Self::check_available(&inner)?;
        Ok(inner.records.get(uuid).cloned())
    }

    fn save(&self, mut record: ArtifactRecord) -> Result<ArtifactRecord, ArtifactError> {
        let mut inner = self.write();
        Self::check_available(&inner)?;
        let saves_left = inner.saves_left;
        match saves_left {
            Some(0) => return Err(ArtifactError::Unavailable("simulated outage during save".to_string())),
            Some(n) => inner.saves_left = Some(n - 1),
            None => {}
        }

        let taken = inner.records.values().any(|other| {
            other.owner_uuid == record.owner_uuid
                && other.name == record.name
                && other.uuid != record.uuid
        });
        if taken {
            return Err(ArtifactError::NameConflict(record.name));
        }

        let uuid = match &record.uuid {
            Some(uuid) if inner.records.contains_key(uuid) => uuid.clone(),
            Some(uuid) => return Err(ArtifactError::NotFound(uuid.clone())),
            None => ids::generate(&self.cluster_id, ids::ARTIFACT_INFIX),
        };
        record.uuid = Some(uuid.clone());
        inner.records.insert(uuid, record.clone());
        Ok(record)
    }

    fn delete(&self, uuid: &str) -> Result<(), ArtifactError> {
        let mut inner = self.write();
        Self::check_available(&inner)?;
        inner.records.remove(uuid);
        Ok(())
    }
}
