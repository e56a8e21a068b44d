//! Request lifecycle tests
//!
//! State transitions, unit binding and the container count, destroy, and
//! failure atomicity against the in-memory cluster.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::*;
use crq::{DeploymentConfig, MutationError, RequestService};
use crq_protocol::{
    Actor, Backends, ContainerRequest, ErrorKind, RequestState, RequestStore, StoreError, UnitState,
};
use crq_sim::{FailureInjection, MemoryRequestStore, SimCluster};
use serde_json::json;

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn test_create_uncommitted_then_commit() {
    let h = Harness::new();
    let cr = h.create(committable());
    assert_eq!(cr.state, RequestState::Uncommitted);
    assert!(cr.container_uuid.is_none());
    assert_eq!(cr.container_count, 0);

    let cr = h.update(&cr.uuid, json!({"state": "Committed"}));
    assert_eq!(cr.state, RequestState::Committed);
    assert!(cr.container_uuid.is_some());
    assert_eq!(cr.container_count, 1);
    assert_eq!(h.stored(&cr.uuid), cr);
}

#[test]
fn test_create_committed_in_one_step() {
    let h = Harness::new();
    let cr = h.create(committed());
    assert_eq!(cr.state, RequestState::Committed);
    assert_eq!(cr.container_count, 1);
    let unit = h.cluster.units.snapshot(cr.container_uuid.as_deref().unwrap()).unwrap();
    assert_eq!(unit.state, UnitState::Queued);
}

#[test]
fn test_create_final_is_rejected() {
    let h = Harness::new();
    let errors = h.create_rejected(with(committable(), json!({"state": "Final"})));
    assert_error(&errors, "state", ErrorKind::StateTransitionError);
    assert!(h.cluster.requests.all().is_empty());
}

#[test]
fn test_uncommitted_cannot_skip_to_final() {
    let h = Harness::new();
    let cr = h.create(committable());
    let errors = h.update_rejected(&cr.uuid, json!({"state": "Final"}), &h.user());
    assert_error(&errors, "state", ErrorKind::StateTransitionError);
    assert_eq!(h.stored(&cr.uuid).state, RequestState::Uncommitted);
}

#[test]
fn test_transitions_are_forward_only() {
    let h = Harness::new();
    let cr = h.create(committed());
    let errors = h.update_rejected(&cr.uuid, json!({"state": "Uncommitted"}), &h.admin());
    assert_error(&errors, "state", ErrorKind::StateTransitionError);

    h.cluster.units.cancel(cr.container_uuid.as_deref().unwrap(), None);
    let cr = h.update(&cr.uuid, json!({"name": "finished"}));
    assert_eq!(cr.state, RequestState::Final);

    for state in ["Uncommitted", "Committed"] {
        let errors = h.update_rejected(&cr.uuid, json!({ "state": state }), &h.admin());
        assert_error(&errors, "state", ErrorKind::StateTransitionError);
    }
}

#[test]
fn test_invalid_state_name() {
    let h = Harness::new();
    let errors = h.create_rejected(with(draft(), json!({"state": "Running"})));
    assert_error(&errors, "state", ErrorKind::ValidationError);
}

// =============================================================================
// Binding and container count
// =============================================================================

#[test]
fn test_container_count_cannot_be_set_directly() {
    let h = Harness::new();
    let errors = h.create_rejected(with(draft(), json!({"container_count": 1})));
    assert_error(&errors, "container_count", ErrorKind::ConflictError);

    let cr = h.create(committed());
    let errors = h.update_rejected(&cr.uuid, json!({"container_count": 2}), &h.admin());
    assert_error(&errors, "container_count", ErrorKind::ConflictError);
    assert_eq!(h.stored(&cr.uuid).container_count, 1);
}

#[test]
fn test_resupplying_current_count_is_not_a_change() {
    let h = Harness::new();
    let cr = h.create(committed());
    let cr = h.update(&cr.uuid, json!({"container_count": 1, "priority": 3}));
    assert_eq!(cr.container_count, 1);
    assert_eq!(cr.priority, 3);
}

#[test]
fn test_retry_after_cancel_increments_count() {
    let h = Harness::new();
    let cr = h.create(committed());
    let first = cr.container_uuid.clone().unwrap();

    // The unit is gone but the request is kept Committed for a retry.
    h.cluster.units.set_state(&first, UnitState::Cancelled);
    let cr = h
        .service
        .update(&cr.uuid, &object(json!({"container_uuid": null})), &h.admin())
        .unwrap();

    let second = cr.container_uuid.clone().unwrap();
    assert_ne!(first, second);
    assert_eq!(cr.container_count, 2);
    assert_eq!(cr.state, RequestState::Committed);
}

#[test]
fn test_unchanged_binding_keeps_count() {
    let h = Harness::new();
    let cr = h.create(committed());
    let cr = h.update(&cr.uuid, json!({"priority": 10}));
    let cr = h.update(&cr.uuid, json!({"name": "renamed"}));
    assert_eq!(cr.container_count, 1);
    assert_eq!(h.cluster.units.resolve_calls(), 1);
}

#[test]
fn test_container_count_max_is_enforced() {
    let h = Harness::with_config(DeploymentConfig {
        container_count_max: 1,
        ..DeploymentConfig::default()
    });
    let cr = h.create(committed());
    h.cluster.units.set_state(cr.container_uuid.as_deref().unwrap(), UnitState::Cancelled);
    let units_before = h.cluster.units.unit_count();

    let errors = h.update_rejected(&cr.uuid, json!({"container_uuid": null}), &h.admin());
    assert_error(&errors, "container_count", ErrorKind::ConflictError);
    assert_eq!(h.stored(&cr.uuid), cr);

    // The capped request was never sent to the resolver.
    assert_eq!(h.cluster.units.unit_count(), units_before);
    assert_eq!(h.cluster.units.resolve_calls(), 1);
}

#[test]
fn test_assigning_container_uuid_requires_privilege() {
    let h = Harness::new();
    let unit = h.cluster.units.spawn_running();

    let errors = h.create_rejected(with(draft(), json!({ "container_uuid": unit })));
    assert_error(&errors, "container_uuid", ErrorKind::FieldPermissionError);

    let cr = h.create(committed());
    let errors = h.update_rejected(&cr.uuid, json!({"container_uuid": null}), &h.user());
    assert_error(&errors, "container_uuid", ErrorKind::FieldPermissionError);

    let cr = h
        .service
        .create(&object(with(draft(), json!({ "container_uuid": unit }))), &h.admin())
        .unwrap();
    assert_eq!(cr.container_uuid.as_deref(), Some(unit.as_str()));
    assert_eq!(cr.container_count, 1);
}

#[test]
fn test_use_existing_reuses_unit() {
    let h = Harness::new();
    let a = h.create(committed());
    let b = h.create(committed());
    let c = h.create(with(committed(), json!({"use_existing": false})));

    assert_eq!(a.container_uuid, b.container_uuid);
    assert_ne!(a.container_uuid, c.container_uuid);
}

// =============================================================================
// Audit stamps
// =============================================================================

#[test]
fn test_audit_stamps() {
    let h = Harness::new();
    let cr = h.create(draft());
    assert_eq!(cr.created_at, SimCluster::epoch());
    assert_eq!(cr.modified_by.as_deref(), Some(USER));

    h.cluster.clock.advance_secs(60);
    let cr = h
        .service
        .update(&cr.uuid, &object(json!({"name": "by admin"})), &h.admin())
        .unwrap();
    assert_eq!(cr.created_at, SimCluster::epoch());
    assert_eq!(cr.modified_at, SimCluster::epoch() + chrono::Duration::seconds(60));
    assert_eq!(cr.modified_by.as_deref(), Some(ADMIN));
}

#[test]
fn test_system_fields_are_not_writable() {
    let h = Harness::new();
    let errors = h.create_rejected(with(
        draft(),
        json!({"uuid": "zzzzz-xvhdk-mine00000000000", "modified_by": ADMIN}),
    ));
    assert_error(&errors, "uuid", ErrorKind::FieldPermissionError);
    assert_error(&errors, "modified_by", ErrorKind::FieldPermissionError);
    assert!(errors.by_field()["uuid"][0].contains("maintained by the system"));
}

// =============================================================================
// Destroy
// =============================================================================

#[test]
fn test_destroy_zeroes_priority_first() {
    let h = Harness::new();
    let cr = h.create(with(committed(), json!({"priority": 10})));
    let unit = cr.container_uuid.clone().unwrap();
    assert_eq!(h.cluster.units.snapshot(&unit).unwrap().priority, 10);

    h.service.destroy(&cr.uuid, &h.user()).unwrap();

    assert_eq!(h.cluster.units.snapshot(&unit).unwrap().priority, 0);
    assert!(matches!(h.service.get(&cr.uuid), Err(MutationError::NotFound(_))));
}

#[test]
fn test_destroy_final_request() {
    let h = Harness::new();
    let cr = h.create(committed());
    h.cluster.units.cancel(cr.container_uuid.as_deref().unwrap(), None);
    let cr = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert_eq!(cr.state, RequestState::Final);

    h.service.destroy(&cr.uuid, &h.user()).unwrap();
    assert!(h.cluster.requests.all().is_empty());
}

// =============================================================================
// Failure atomicity
// =============================================================================

#[test]
fn test_resolver_failure_leaves_request_unchanged() {
    let h = Harness::new();
    let cr = h.create(committable());
    h.cluster.units.set_failure_injection(FailureInjection {
        resolve_unavailable: true,
        ..Default::default()
    });

    let err = h
        .service
        .update(&cr.uuid, &object(json!({"state": "Committed"})), &h.user())
        .unwrap_err();
    assert!(matches!(err, MutationError::Adapter(_)));
    assert_eq!(h.stored(&cr.uuid), cr);

    let err = h.service.create(&object(committed()), &h.user()).unwrap_err();
    assert!(matches!(err, MutationError::Adapter(_)));
    assert_eq!(h.cluster.requests.all().len(), 1);
}

#[test]
fn test_rejected_update_leaves_request_unchanged() {
    let h = Harness::new();
    let cr = h.create(draft());
    let errors = h.update_rejected(
        &cr.uuid,
        json!({"name": "kept?", "priority": 5000, "command": "echo"}),
        &h.user(),
    );
    assert_eq!(errors.len(), 2);
    assert_eq!(h.stored(&cr.uuid), cr);
}

/// Request store that lets another writer bind the request between the
/// service's read and its write.
struct RacingStore {
    inner: MemoryRequestStore,
    raced: AtomicBool,
}

impl RequestStore for RacingStore {
    fn get(&self, uuid: &str) -> Result<Option<ContainerRequest>, StoreError> {
        self.inner.get(uuid)
    }

    fn insert(&self, record: &ContainerRequest) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn update(&self, record: &ContainerRequest, expected: i64) -> Result<(), StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            if let Some(mut current) = self.inner.get(&record.uuid)? {
                current.container_uuid = Some("zzzzz-dz642-otherwriter0000".to_string());
                current.container_count += 1;
                self.inner.force_put(current);
            }
        }
        self.inner.update(record, expected)
    }

    fn delete(&self, uuid: &str) -> Result<(), StoreError> {
        self.inner.delete(uuid)
    }

    fn max_priority_bound_to(&self, container_uuid: &str) -> Result<Option<i64>, StoreError> {
        self.inner.max_priority_bound_to(container_uuid)
    }
}

#[test]
fn test_concurrent_binding_loses_with_conflict() {
    let cluster = SimCluster::new("zzzzz");
    let store = Arc::new(RacingStore {
        inner: cluster.requests.clone(),
        raced: AtomicBool::new(false),
    });
    let backends = Backends {
        requests: store,
        ..cluster.backends()
    };
    let service = RequestService::new(DeploymentConfig::default(), backends);
    let user = Actor::user(USER);

    let cr = service.create(&object(committable()), &user).unwrap();
    let errors = rejected(service.update(&cr.uuid, &object(json!({"state": "Committed"})), &user));

    assert_error(&errors, "container_count", ErrorKind::ConflictError);
    let stored = cluster.requests.get(&cr.uuid).unwrap().unwrap();
    assert_eq!(stored.container_uuid.as_deref(), Some("zzzzz-dz642-otherwriter0000"));
    assert_eq!(stored.container_count, 1);
}
