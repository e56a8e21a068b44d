//! Simulated execution-unit service.
//!
//! Resolution reuses an existing unit when the caller allows it and a unit
//! with the same canonical specification exists that has not failed.
//! Otherwise a new queued unit is created. The reuse key is the SHA-256 of
//! the JCS (RFC 8785) encoding of the execution-relevant part of the spec.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use crq_protocol::{
    ids, Actor, AdapterError, ExecutionUnits, ResolveSpec, UnitSnapshot, UnitState,
};

use crate::request_store::MemoryRequestStore;

const SERVICE: &str = "execution-unit service";

/// Failure injection configuration.
#[derive(Debug, Clone, Default)]
pub struct FailureInjection {
    /// Fail every resolve call.
    pub resolve_unavailable: bool,
    /// Fail every lookup call.
    pub lookup_unavailable: bool,
    /// Fail every priority recompute call.
    pub recompute_unavailable: bool,
}

/// A recorded priority recompute, for audit assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityCall {
    pub unit_uuid: String,
    pub actor_uuid: String,
}

/// Thread-safe simulated unit service. Clones share the same state.
#[derive(Debug, Clone)]
pub struct SimUnits {
    cluster_id: String,
    requests: MemoryRequestStore,
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    units: BTreeMap<String, SimUnit>,
    resolve_calls: usize,
    priority_calls: Vec<PriorityCall>,
    failure_injection: FailureInjection,
}

#[derive(Debug, Clone)]
struct SimUnit {
    snapshot: UnitSnapshot,
    reuse_key: Option<String>,
}

impl SimUnits {
    /// Units derive their priority from the requests in `requests`.
    pub fn new(cluster_id: &str, requests: MemoryRequestStore) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            requests,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Reuse key for a spec: hex SHA-256 of its canonical JSON.
    pub fn reuse_key(spec: &ResolveSpec) -> Result<String, AdapterError> {
        let material = json!({
            "command": spec.command,
            "container_image": spec.container_image,
            "cwd": spec.cwd,
            "environment": spec.environment,
            "mounts": spec.mounts,
            "output_path": spec.output_path,
            "runtime_constraints": spec.runtime_constraints,
            "scheduling_parameters": spec.scheduling_parameters,
        });
        let canonical = serde_json_canonicalizer::to_vec(&material).map_err(|e| {
            AdapterError::Rejected {
                service: SERVICE.to_string(),
                message: format!("cannot canonicalize spec: {}", e),
            }
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    // === Test controls ===

    pub fn set_failure_injection(&self, injection: FailureInjection) {
        self.write().failure_injection = injection;
    }

    /// Add a running unit that is not bound to any request, e.g. a parent
    /// whose processes submit child requests.
    pub fn spawn_running(&self) -> String {
        let uuid = ids::generate(&self.cluster_id, ids::UNIT_INFIX);
        let unit = SimUnit {
            snapshot: UnitSnapshot {
                uuid: uuid.clone(),
                state: UnitState::Running,
                priority: 0,
                output: None,
                log: None,
                exit_code: None,
            },
            reuse_key: None,
        };
        self.write().units.insert(uuid.clone(), unit);
        uuid
    }

    pub fn set_state(&self, uuid: &str, state: UnitState) {
        if let Some(unit) = self.write().units.get_mut(uuid) {
            unit.snapshot.state = state;
        }
    }

    /// Finish a unit with the given produced handles.
    pub fn complete(&self, uuid: &str, output: Option<&str>, log: Option<&str>, exit_code: i32) {
        if let Some(unit) = self.write().units.get_mut(uuid) {
            unit.snapshot.state = UnitState::Complete;
            unit.snapshot.output = output.map(str::to_string);
            unit.snapshot.log = log.map(str::to_string);
            unit.snapshot.exit_code = Some(exit_code);
        }
    }

    /// Cancel a unit, optionally leaving a partial log behind.
    pub fn cancel(&self, uuid: &str, log: Option<&str>) {
        if let Some(unit) = self.write().units.get_mut(uuid) {
            unit.snapshot.state = UnitState::Cancelled;
            unit.snapshot.log = log.map(str::to_string);
        }
    }

    pub fn snapshot(&self, uuid: &str) -> Option<UnitSnapshot> {
        self.read().units.get(uuid).map(|u| u.snapshot.clone())
    }

    pub fn unit_count(&self) -> usize {
        self.read().units.len()
    }

    pub fn resolve_calls(&self) -> usize {
        self.read().resolve_calls
    }

    pub fn priority_calls(&self) -> Vec<PriorityCall> {
        self.read().priority_calls.clone()
    }

    pub fn clear_priority_calls(&self) {
        self.write().priority_calls.clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn outage() -> AdapterError {
        AdapterError::Unavailable {
            service: SERVICE.to_string(),
            message: "simulated outage".to_string(),
        }
    }

    fn reusable(unit: &SimUnit, key: &str) -> bool {
        if unit.reuse_key.as_deref() != Some(key) {
            return false;
        }
        match unit.snapshot.state {
            UnitState::Cancelled => false,
            UnitState::Complete => unit.snapshot.exit_code == Some(0),
            _ => true,
        }
    }
}

impl ExecutionUnits for SimUnits {
    fn resolve(&self, spec: &ResolveSpec, actor: &Actor) -> Result<String, AdapterError> {
        let key = Self::reuse_key(spec)?;
        let mut inner = self.write();
        if inner.failure_injection.resolve_unavailable {
            return Err(Self::outage());
        }
        inner.resolve_calls += 1;

        if spec.use_existing {
            if let Some(existing) = inner.units.values().find(|u| Self::reusable(u, &key)) {
                let uuid = existing.snapshot.uuid.clone();
                debug!(unit = %uuid, request = %spec.request_uuid, actor = %actor.uuid(), "Reusing execution unit");
                return Ok(uuid);
            }
        }

        let uuid = ids::generate(&self.cluster_id, ids::UNIT_INFIX);
        inner.units.insert(
            uuid.clone(),
            SimUnit {
                snapshot: UnitSnapshot {
                    uuid: uuid.clone(),
                    state: UnitState::Queued,
                    priority: 0,
                    output: None,
                    log: None,
                    exit_code: None,
                },
                reuse_key: Some(key),
            },
        );
        debug!(unit = %uuid, request = %spec.request_uuid, actor = %actor.uuid(), "Created execution unit");
        Ok(uuid)
    }

    fn lookup(&self, uuid: &str) -> Result<Option<UnitSnapshot>, AdapterError> {
        let inner = self.read();
        if inner.failure_injection.lookup_unavailable {
            return Err(Self::outage());
        }
        Ok(inner.units.get(uuid).map(|u| u.snapshot.clone()))
    }

    fn recompute_priority(&self, uuid: &str, actor: &Actor) -> Result<(), AdapterError> {
        // Read requests before taking the unit lock; the two locks are
        // never held together.
        let effective = self
            .requests
            .committed_bound_to(uuid)
            .iter()
            .map(|cr| cr.priority)
            .max()
            .unwrap_or(0);

        let mut inner = self.write();
        if inner.failure_injection.recompute_unavailable {
            return Err(Self::outage());
        }
        inner.priority_calls.push(PriorityCall {
            unit_uuid: uuid.to_string(),
            actor_uuid: actor.uuid().to_string(),
        });
        let unit = inner
            .units
            .get_mut(uuid)
            .ok_or_else(|| AdapterError::NotFound(uuid.to_string()))?;
        if !unit.snapshot.state.is_terminal() {
            unit.snapshot.priority = effective;
        }
        Ok(())
    }
}
