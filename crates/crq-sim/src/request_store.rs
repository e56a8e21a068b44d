//! In-memory request persistence with compare-and-swap updates.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crq_protocol::{ContainerRequest, RequestState, RequestStore, StoreError};

/// Thread-safe request table. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRequestStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: BTreeMap<String, ContainerRequest>,
    unavailable: bool,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored request, in uuid order.
    pub fn all(&self) -> Vec<ContainerRequest> {
        self.read().rows.values().cloned().collect()
    }

    /// Committed requests bound to an execution unit.
    pub fn committed_bound_to(&self, container_uuid: &str) -> Vec<ContainerRequest> {
        self.read()
            .rows
            .values()
            .filter(|cr| {
                cr.state == RequestState::Committed
                    && cr.container_uuid.as_deref() == Some(container_uuid)
            })
            .cloned()
            .collect()
    }

    /// Overwrite a stored row without any checks, as a concurrent writer
    /// would.
    pub fn force_put(&self, record: ContainerRequest) {
        self.write().rows.insert(record.uuid.clone(), record);
    }

    /// Make every call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(inner: &Inner) -> Result<(), StoreError> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

impl RequestStore for MemoryRequestStore {
    fn get(&self, uuid: &str) -> Result<Option<ContainerRequest>, StoreError> {
        let inner = self.read();
        Self::check_available(&inner)?;
        Ok(inner.rows.get(uuid).cloned())
    }

    fn insert(&self, record: &ContainerRequest) -> Result<(), StoreError> {
        let mut inner = self.write();
        Self::check_available(&inner)?;
        if inner.rows.contains_key(&record.uuid) {
            return Err(StoreError::AlreadyExists(record.uuid.clone()));
        }
        inner.rows.insert(record.uuid.clone(), record.clone());
        Ok(())
    }

    fn update(&self, record: &ContainerRequest, expected_container_count: i64) -> Result<(), StoreError> {
        let mut inner = self.write();
        Self::check_available(&inner)?;
        let current = inner
            .rows
            .get(&record.uuid)
            .ok_or_else(|| StoreError::NotFound(record.uuid.clone()))?;
        if current.container_count != expected_container_count {
            return Err(StoreError::Conflict {
                uuid: record.uuid.clone(),
                expected: expected_container_count,
                actual: current.container_count,
            });
        }
        inner.rows.insert(record.uuid.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, uuid: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        Self::check_available(&inner)?;
        inner
            .rows
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(uuid.to_string()))
    }

    fn max_priority_bound_to(&self, container_uuid: &str) -> Result<Option<i64>, StoreError> {
        let inner = self.read();
        Self::check_available(&inner)?;
        Ok(inner
            .rows
            .values()
            .filter(|cr| cr.container_uuid.as_deref() == Some(container_uuid))
            .map(|cr| cr.priority)
            .max())
    }
}
