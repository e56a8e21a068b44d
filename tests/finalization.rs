//! Finalization, artifact publication and secret scrubbing tests

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use crq::{DeploymentConfig, MutationError, RequestService};
use crq_protocol::{Actor, Backends, ContainerRequest, ErrorKind, RequestState, RequestStore, StoreError};
use crq_sim::{MemoryArtifactStore, MemoryRequestStore, SimCluster};
use serde_json::json;

const OUTPUT_MANIFEST: &str = ". d41d8cd98f00b204e9800998ecf8427e+0 0:0:out.txt\n";
const LOG_MANIFEST: &str = ". d41d8cd98f00b204e9800998ecf8427e+0 0:0:stderr.txt\n";

/// A committed request carrying both kinds of secret.
fn secret_request(h: &Harness) -> crq_protocol::ContainerRequest {
    h.create(with(
        committed(),
        json!({
            "runtime_token": VALID_TOKEN,
            "secret_mounts": {"/etc/secret": {"kind": "text", "content": "hunter2"}}
        }),
    ))
}

/// Complete `unit` with both an output and a log.
fn complete(h: &Harness, unit: &str) {
    let output = h.cluster.artifacts.put_manifest(OUTPUT_MANIFEST);
    let log = h.cluster.artifacts.put_manifest(LOG_MANIFEST);
    h.cluster.units.complete(unit, Some(&output), Some(&log), 0);
}

// =============================================================================
// Publication
// =============================================================================

#[test]
fn test_completed_unit_finalizes_request() {
    let h = Harness::new();
    let cr = secret_request(&h);
    complete(&h, cr.container_uuid.as_deref().unwrap());

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert_eq!(finalized.state, RequestState::Final);
    assert!(finalized.secrets_empty());
    assert_eq!(h.stored(&cr.uuid), finalized);

    let outputs = h.cluster.artifacts.records_of_type("output");
    assert_eq!(outputs.len(), 1);
    let output = &outputs[0];
    assert_eq!(output.uuid, finalized.output_uuid);
    assert_eq!(output.owner_uuid, USER);
    assert_eq!(output.name, format!("Container output for request {}", cr.uuid));
    assert_eq!(output.properties["container_request"], json!(cr.uuid));
    assert_eq!(output.manifest_text, OUTPUT_MANIFEST);
    assert!(output.trash_at.is_none());

    let logs = h.cluster.artifacts.records_of_type("log");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].uuid, finalized.log_uuid);
}

#[test]
fn test_any_mutation_triggers_finalization() {
    let h = Harness::new();
    let cr = h.create(committed());
    complete(&h, cr.container_uuid.as_deref().unwrap());

    let after = h.update(&cr.uuid, json!({"name": "poke"}));
    assert_eq!(after.state, RequestState::Final);
    assert_eq!(after.name.as_deref(), Some("poke"));
}

#[test]
fn test_system_does_not_stamp_modified_by() {
    let h = Harness::new();
    let cr = h.create(committed());
    complete(&h, cr.container_uuid.as_deref().unwrap());
    h.cluster.clock.advance_secs(30);

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert_eq!(finalized.modified_by.as_deref(), Some(USER));
    assert_eq!(finalized.modified_at, SimCluster::epoch() + Duration::seconds(30));
}

#[test]
fn test_output_only_unit() {
    let h = Harness::new();
    let cr = h.create(committed());
    let output = h.cluster.artifacts.put_manifest(OUTPUT_MANIFEST);
    h.cluster
        .units
        .complete(cr.container_uuid.as_deref().unwrap(), Some(&output), None, 0);

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert!(finalized.output_uuid.is_some());
    assert!(finalized.log_uuid.is_none());
    assert_eq!(h.cluster.artifacts.records_of_type("output").len(), 1);
    assert!(h.cluster.artifacts.records_of_type("log").is_empty());
}

#[test]
fn test_cancelled_unit_keeps_partial_log() {
    let h = Harness::new();
    let cr = secret_request(&h);
    let log = h.cluster.artifacts.put_manifest(LOG_MANIFEST);
    h.cluster.units.cancel(cr.container_uuid.as_deref().unwrap(), Some(&log));

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert_eq!(finalized.state, RequestState::Final);
    assert!(finalized.output_uuid.is_none());
    assert!(finalized.log_uuid.is_some());
    assert!(finalized.secrets_empty());
}

#[test]
fn test_failed_unit_still_finalizes() {
    let h = Harness::new();
    let cr = h.create(committed());
    let log = h.cluster.artifacts.put_manifest(LOG_MANIFEST);
    h.cluster
        .units
        .complete(cr.container_uuid.as_deref().unwrap(), None, Some(&log), 1);

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert_eq!(finalized.state, RequestState::Final);
    assert!(finalized.log_uuid.is_some());
}

// =============================================================================
// Output naming and retention
// =============================================================================

#[test]
fn test_output_ttl_sets_expiry() {
    let h = Harness::new();
    let cr = h.create(with(committed(), json!({"output_ttl": 3600})));
    h.cluster.clock.advance_secs(100);
    complete(&h, cr.container_uuid.as_deref().unwrap());
    h.service.finalize_if_needed(&cr.uuid).unwrap();

    let output = &h.cluster.artifacts.records_of_type("output")[0];
    let expected = SimCluster::epoch() + Duration::seconds(3700);
    assert_eq!(output.trash_at, Some(expected));
    assert_eq!(output.delete_at, Some(expected));

    // The log is never given an expiry.
    assert!(h.cluster.artifacts.records_of_type("log")[0].trash_at.is_none());
}

#[test]
fn test_output_name_collision_gets_timestamp() {
    let h = Harness::new();
    let first = h.create(with(committed(), json!({"output_name": "results"})));
    let second = h.create(with(committed(), json!({"output_name": "results"})));
    assert_eq!(first.container_uuid, second.container_uuid);
    complete(&h, first.container_uuid.as_deref().unwrap());

    h.service.finalize_if_needed(&first.uuid).unwrap();
    h.service.finalize_if_needed(&second.uuid).unwrap();

    let mut names: Vec<String> = h
        .cluster
        .artifacts
        .records_of_type("output")
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["results", "results (2024-01-01T00:00:00.000Z)"]);
}

// =============================================================================
// Idempotence and retries
// =============================================================================

#[test]
fn test_finalization_is_idempotent() {
    let h = Harness::new();
    let cr = h.create(committed());
    complete(&h, cr.container_uuid.as_deref().unwrap());

    let finalized = h.service.finalize_if_needed(&cr.uuid).unwrap().unwrap();
    assert!(h.service.finalize_if_needed(&cr.uuid).unwrap().is_none());
    assert_eq!(h.cluster.artifacts.records().len(), 2);
    assert_eq!(h.stored(&cr.uuid), finalized);
}

#[test]
fn test_unfinished_unit_is_left_alone() {
    let h = Harness::new();
    let draft = h.create(committable());
    assert!(h.service.finalize_if_needed(&draft.uuid).unwrap().is_none());

    let cr = h.create(committed());
    assert!(h.service.finalize_if_needed(&cr.uuid).unwrap().is_none());
    assert_eq!(h.stored(&cr.uuid).state, RequestState::Committed);
}

#[test]
fn test_artifact_outage_is_retried_later() {
    let h = Harness::new();
    let cr = secret_request(&h);
    complete(&h, cr.container_uuid.as_deref().unwrap());
    h.cluster.artifacts.set_unavailable(true);

    let after = h.update(&cr.uuid, json!({"name": "first try"}));
    assert_eq!(after.state, RequestState::Committed);
    assert!(!h.stored(&cr.uuid).secrets_empty());

    h.cluster.artifacts.set_unavailable(false);
    let after = h.update(&cr.uuid, json!({"name": "second try"}));
    assert_eq!(after.state, RequestState::Final);
    assert!(after.secrets_empty());
}

#[test]
fn test_missing_manifest_is_reported() {
    let h = Harness::new();
    let cr = h.create(committed());
    h.cluster.units.complete(
        cr.container_uuid.as_deref().unwrap(),
        Some("00000000000000000000000000000000+0"),
        None,
        0,
    );

    let err = h.service.finalize_if_needed(&cr.uuid).unwrap_err();
    assert!(matches!(err, MutationError::Finalize(_)));
    assert_eq!(err.exit_code(), 6);
    assert_eq!(h.stored(&cr.uuid).state, RequestState::Committed);
}

#[test]
fn test_partial_publication_leaves_no_artifacts() {
    let h = Harness::new();
    let cr = h.create(committed());
    let log = h.cluster.artifacts.put_manifest(LOG_MANIFEST);
    let output = MemoryArtifactStore::portable_data_hash(OUTPUT_MANIFEST);
    h.cluster
        .units
        .complete(cr.container_uuid.as_deref().unwrap(), Some(&output), Some(&log), 0);

    for name in ["one", "two", "three"] {
        let after = h.update(&cr.uuid, json!({ "name": name }));
        assert_eq!(after.state, RequestState::Committed);
    }
    assert!(h.cluster.artifacts.records().is_empty());
    assert!(h.stored(&cr.uuid).log_uuid.is_none());

    // Once the output manifest shows up the next mutation finalizes.
    h.cluster.artifacts.put_manifest(OUTPUT_MANIFEST);
    let finalized = h.update(&cr.uuid, json!({"name": "four"}));
    assert_eq!(finalized.state, RequestState::Final);

    let logs = h.cluster.artifacts.records_of_type("log");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].name, format!("Container log for request {}", cr.uuid));
    assert_eq!(logs[0].uuid, finalized.log_uuid);
    assert_eq!(h.cluster.artifacts.records_of_type("output").len(), 1);
}

#[test]
fn test_outage_between_artifacts_is_rolled_back() {
    let h = Harness::new();
    let cr = h.create(committed());
    complete(&h, cr.container_uuid.as_deref().unwrap());
    h.cluster.artifacts.fail_saves_after(1);

    let after = h.update(&cr.uuid, json!({"name": "first try"}));
    assert_eq!(after.state, RequestState::Committed);
    assert!(h.cluster.artifacts.records().is_empty());

    h.cluster.artifacts.set_unavailable(false);
    let after = h.update(&cr.uuid, json!({"name": "second try"}));
    assert_eq!(after.state, RequestState::Final);
    assert_eq!(h.cluster.artifacts.records().len(), 2);
}

/// Request store that refuses to store Final records.
struct NoFinalStore {
    inner: MemoryRequestStore,
}

impl RequestStore for NoFinalStore {
    fn get(&self, uuid: &str) -> Result<Option<ContainerRequest>, StoreError> {
        self.inner.get(uuid)
    }

    fn insert(&self, record: &ContainerRequest) -> Result<(), StoreError> {
        self.inner.insert(record)
    }

    fn update(&self, record: &ContainerRequest, expected: i64) -> Result<(), StoreError> {
        if record.state == RequestState::Final {
            return Err(StoreError::Unavailable("read-only".to_string()));
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
fn test_unstored_finalization_removes_its_artifacts() {
    let cluster = SimCluster::new("zzzzz");
    let backends = Backends {
        requests: Arc::new(NoFinalStore {
            inner: cluster.requests.clone(),
        }),
        ..cluster.backends()
    };
    let service = RequestService::new(DeploymentConfig::default(), backends);
    let cr = service.create(&object(committed()), &Actor::user(USER)).unwrap();
    let output = cluster.artifacts.put_manifest(OUTPUT_MANIFEST);
    let log = cluster.artifacts.put_manifest(LOG_MANIFEST);
    cluster
        .units
        .complete(cr.container_uuid.as_deref().unwrap(), Some(&output), Some(&log), 0);

    let err = service.finalize_if_needed(&cr.uuid).unwrap_err();
    assert!(matches!(err, MutationError::Store(_)));
    assert!(cluster.artifacts.records().is_empty());
    assert_eq!(service.get(&cr.uuid).unwrap().state, RequestState::Committed);
}

#[test]
fn test_reused_finished_unit_finalizes_at_commit() {
    let h = Harness::new();
    let first = h.create(committed());
    complete(&h, first.container_uuid.as_deref().unwrap());
    h.service.finalize_if_needed(&first.uuid).unwrap();

    let second = h.create(committed());
    assert_eq!(second.container_uuid, first.container_uuid);
    assert_eq!(second.state, RequestState::Final);
    assert_eq!(h.cluster.artifacts.records_of_type("output").len(), 2);
}

// =============================================================================
// Final requests
// =============================================================================

#[test]
fn test_final_request_is_frozen() {
    let h = Harness::new();
    let cr = h.create(committed());
    complete(&h, cr.container_uuid.as_deref().unwrap());
    h.service.finalize_if_needed(&cr.uuid).unwrap();

    let errors = h.update_rejected(&cr.uuid, json!({"priority": 1}), &h.admin());
    assert_error(&errors, "priority", ErrorKind::FieldPermissionError);

    let errors = h.update_rejected(&cr.uuid, json!({"runtime_token": VALID_TOKEN}), &h.user());
    assert_error(&errors, "runtime_token", ErrorKind::FieldPermissionError);

    let renamed = h.update(&cr.uuid, json!({"name": "archived"}));
    assert_eq!(renamed.state, RequestState::Final);
    assert_eq!(renamed.name.as_deref(), Some("archived"));
}
