//! Shared fixtures for the request service integration tests.

#![allow(dead_code)]

use crq::{DeploymentConfig, MutationError, RequestService};
use crq_protocol::{Actor, ContainerRequest, ErrorKind, FieldErrors};
use crq_sim::SimCluster;
use serde_json::{json, Map, Value};

pub const USER: &str = "zzzzz-tpzed-000000000000001";
pub const ADMIN: &str = "zzzzz-tpzed-00000000000000a";
pub const VALID_TOKEN: &str = "v2/zzzzz-gj3su-000000000000001/secret";

/// A request service wired to a fresh in-memory cluster.
pub struct Harness {
    pub cluster: SimCluster,
    pub service: RequestService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DeploymentConfig::default())
    }

    pub fn with_config(config: DeploymentConfig) -> Self {
        let cluster = SimCluster::new(&config.cluster_id);
        cluster.credentials.allow(VALID_TOKEN);
        let service = RequestService::new(config, cluster.backends());
        Self { cluster, service }
    }

    pub fn user(&self) -> Actor {
        Actor::user(USER)
    }

    pub fn admin(&self) -> Actor {
        Actor::admin(ADMIN)
    }

    pub fn create(&self, patch: Value) -> ContainerRequest {
        self.service
            .create(&object(patch), &self.user())
            .unwrap_or_else(|e| panic!("create failed: {}", e))
    }

    pub fn update(&self, uuid: &str, patch: Value) -> ContainerRequest {
        self.service
            .update(uuid, &object(patch), &self.user())
            .unwrap_or_else(|e| panic!("update failed: {}", e))
    }

    /// Errors of a create that must be rejected.
    pub fn create_rejected(&self, patch: Value) -> FieldErrors {
        rejected(self.service.create(&object(patch), &self.user()))
    }

    /// Errors of an update that must be rejected.
    pub fn update_rejected(&self, uuid: &str, patch: Value, actor: &Actor) -> FieldErrors {
        rejected(self.service.update(uuid, &object(patch), actor))
    }

    pub fn stored(&self, uuid: &str) -> ContainerRequest {
        self.service.get(uuid).unwrap()
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("patch must be an object, got {}", other),
    }
}

pub fn rejected(result: Result<ContainerRequest, MutationError>) -> FieldErrors {
    match result {
        Err(MutationError::Rejected(errors)) => errors,
        Err(other) => panic!("expected field errors, got {}", other),
        Ok(cr) => panic!("expected rejection, request {} was accepted", cr.uuid),
    }
}

pub fn assert_error(errors: &FieldErrors, field: &str, kind: ErrorKind) {
    assert!(errors.has(field, kind), "expected {} on {}, got: {}", kind, field, errors);
}

/// Minimal valid draft.
pub fn draft() -> Value {
    json!({
        "command": ["echo", "hello"],
        "container_image": "arvados/jobs",
        "output_path": "/out"
    })
}

/// Draft that can be committed as is.
pub fn committable() -> Value {
    with(draft(), json!({"runtime_constraints": {"vcpus": 1, "ram": 268435456}}))
}

/// Committable request, committed on creation.
pub fn committed() -> Value {
    with(committable(), json!({"state": "Committed"}))
}

/// Shallow-merge `extra` onto `base`.
pub fn with(base: Value, extra: Value) -> Value {
    let mut map = object(base);
    map.extend(object(extra));
    Value::Object(map)
}
