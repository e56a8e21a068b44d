//! Request mutation pipeline
//!
//! Every create, update and destroy runs the same ordered stages:
//!
//! 1. decode: apply the caller's attribute patch, checking wire types
//! 2. defaults: fill unset attributes of a new record
//! 3. lineage: record the requesting unit and seed priority (create only)
//! 4. scheduling defaults: preemptible for child requests being committed
//! 5. transition: the state change must be in the transition table
//! 6. permissions: every changed attribute must be whitelisted
//! 7. shape: presence, ranges, mount conflicts, commit-time constraints
//! 8. credentials: a new runtime token must validate
//! 9. reject if anything above failed
//! 10. binding: resolve the execution unit on commit and count it
//! 11. references: changed unit and artifact references must exist and be
//!     readable by the actor, except that any bound unit may be named
//! 12. reject if binding or references failed
//! 13. scrub: drop secrets of Final requests
//! 14. stamp: audit timestamps
//! 15. persist, compare-and-swap on the previously read container count
//! 16. propagate: recompute priority of the units involved
//! 17. finalize: if the bound unit is terminal, publish and move to Final
//!
//! Stages 16 and 17 run after the record is stored; their failures are
//! logged and never undo the mutation.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crq_protocol::{
    ids, Actor, AdapterError, Backends, ContainerRequest, ErrorKind, FieldErrors, RequestField,
    RequestState, StoreError,
};

use crate::binding::bind_container;
use crate::config::DeploymentConfig;
use crate::finalize::{scrub_secrets, FinalizationService, FinalizeError};
use crate::priority::{default_preemptible, seed_lineage, PriorityPropagator};
use crate::state::{check_transition, permitted_fields};
use crate::validate::{check_references, FieldValidator};

/// Mutation errors
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("request rejected: {0}")]
    Rejected(FieldErrors),

    #[error("request {0} not found")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("collaborator error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("finalization error: {0}")]
    Finalize(#[from] FinalizeError),
}

impl MutationError {
    /// Exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            MutationError::Rejected(_) => 2,
            MutationError::NotFound(_) => 3,
            MutationError::Store(_) => 4,
            MutationError::Adapter(_) => 5,
            MutationError::Finalize(_) => 6,
        }
    }

    /// The field violations, for a rejected mutation.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            MutationError::Rejected(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Result type for request mutations
pub type MutationResult<T> = Result<T, MutationError>;

/// The container request service.
pub struct RequestService {
    config: DeploymentConfig,
    backends: Backends,
    validator: FieldValidator,
    system: Actor,
}

impl RequestService {
    pub fn new(config: DeploymentConfig, backends: Backends) -> Self {
        let validator = FieldValidator::new(&config);
        let system = Actor::system(&config.cluster_id);
        Self {
            config,
            backends,
            validator,
            system,
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// The actor used for propagation and finalization.
    pub fn system_actor(&self) -> &Actor {
        &self.system
    }

    /// Attributes `actor` may change when moving from `previous` (`None`
    /// while creating) to `target`.
    pub fn permitted_fields(
        &self,
        previous: Option<RequestState>,
        target: RequestState,
        actor: &Actor,
    ) -> BTreeSet<RequestField> {
        permitted_fields(previous, target, actor)
    }

    pub fn get(&self, uuid: &str) -> MutationResult<ContainerRequest> {
        self.backends
            .requests
            .get(uuid)?
            .ok_or_else(|| MutationError::NotFound(uuid.to_string()))
    }

    /// Create a request owned by `actor` from an attribute patch.
    pub fn create(&self, patch: &Map<String, Value>, actor: &Actor) -> MutationResult<ContainerRequest> {
        self.apply(None, patch, actor)
    }

    pub fn update(
        &self,
        uuid: &str,
        patch: &Map<String, Value>,
        actor: &Actor,
    ) -> MutationResult<ContainerRequest> {
        let previous = self.get(uuid)?;
        self.apply(Some(previous), patch, actor)
    }

    /// Remove a request. Unless it is already Final its priority drops to
    /// zero first, so its unit stops being wanted on its behalf.
    pub fn destroy(&self, uuid: &str, actor: &Actor) -> MutationResult<()> {
        let record = self.get(uuid)?;
        if record.state != RequestState::Final {
            let mut patch = Map::new();
            patch.insert(RequestField::Priority.as_str().to_string(), json!(0));
            self.apply(Some(record), &patch, actor)?;
        }
        self.backends.requests.delete(uuid)?;
        info!(request = %uuid, actor = %actor.uuid(), "Destroyed request");
        Ok(())
    }

    /// Finalize the request if it is Committed and its unit is terminal.
    /// Returns the Final record when finalization happened.
    pub fn finalize_if_needed(&self, uuid: &str) -> MutationResult<Option<ContainerRequest>> {
        // Always work from the freshest stored copy.
        let record = self.get(uuid)?;
        let service = FinalizationService::new(
            self.backends.units.as_ref(),
            self.backends.artifacts.as_ref(),
            self.config.artifact_name_attempts,
        );
        let Some(unit) = service.terminal_unit(&record)? else {
            return Ok(None);
        };

        let patch = service.prepare(&record, &unit, self.backends.clock.now())?;
        let finalized = match self.apply(Some(record.clone()), &patch, &self.system) {
            Ok(finalized) => finalized,
            Err(e) => {
                service.discard(&record, &patch);
                return Err(e);
            }
        };
        info!(
            request = %finalized.uuid,
            unit = %unit.uuid,
            output = ?finalized.output_uuid,
            log = ?finalized.log_uuid,
            "Finalized request"
        );
        Ok(Some(finalized))
    }

    fn apply(
        &self,
        previous: Option<ContainerRequest>,
        patch: &Map<String, Value>,
        actor: &Actor,
    ) -> MutationResult<ContainerRequest> {
        let now = self.backends.clock.now();
        let mut errors = FieldErrors::new();

        let baseline = match &previous {
            Some(p) => p.clone(),
            None => ContainerRequest::blank(
                ids::generate(&self.config.cluster_id, ids::REQUEST_INFIX),
                actor.uuid(),
                now,
            ),
        };
        let mut record = baseline.clone();

        let supplied = self.validator.decode(&mut record, patch, &mut errors);

        if previous.is_none() {
            self.fill_defaults(&mut record, &supplied);
            seed_lineage(&mut record, actor, self.backends.requests.as_ref());
        }

        let previous_state = previous.as_ref().map(|p| p.state);
        if previous_state != Some(RequestState::Committed) {
            default_preemptible(&mut record, self.config.preemptible_instances);
        }

        if previous_state != Some(record.state) {
            if let Err(e) = check_transition(previous_state, record.state) {
                errors.add(RequestField::State.as_str(), ErrorKind::StateTransitionError, e.to_string());
            }
        }

        self.check_permissions(&record, &baseline, previous_state, &supplied, actor, &mut errors);
        self.validator.check_shape(&record, &mut errors);
        self.validator.check_credentials(
            &record,
            previous.as_ref(),
            self.backends.credentials.as_ref(),
            &mut errors,
        )?;
        Self::reject_if_any(&record, errors)?;

        let mut errors = FieldErrors::new();
        bind_container(
            &mut record,
            previous.as_ref(),
            self.backends.units.as_ref(),
            actor,
            &mut errors,
        )?;
        check_references(
            &record,
            &baseline,
            actor,
            self.backends.units.as_ref(),
            self.backends.artifacts.as_ref(),
            &mut errors,
        )?;
        Self::reject_if_any(&record, errors)?;

        if scrub_secrets(&mut record) {
            debug!(request = %record.uuid, "Scrubbed secrets");
        }

        record.modified_at = now;
        if !actor.is_system() {
            record.modified_by = Some(actor.uuid().to_string());
        }

        self.persist(&record, previous.as_ref())?;

        PriorityPropagator::new(self.backends.units.as_ref(), &self.system)
            .propagate(previous.as_ref(), &record);

        Ok(self.finalize_after_mutation(record))
    }

    fn fill_defaults(&self, record: &mut ContainerRequest, supplied: &BTreeSet<RequestField>) {
        if !supplied.contains(&RequestField::Cwd) {
            record.cwd = ".".to_string();
        }
        if !supplied.contains(&RequestField::ContainerCountMax) {
            record.container_count_max = self.config.container_count_max;
        }
    }

    /// Only attributes the caller supplied and actually changed are
    /// checked; values filled in by the pipeline itself are not.
    fn check_permissions(
        &self,
        record: &ContainerRequest,
        baseline: &ContainerRequest,
        previous_state: Option<RequestState>,
        supplied: &BTreeSet<RequestField>,
        actor: &Actor,
        errors: &mut FieldErrors,
    ) {
        let permitted = permitted_fields(previous_state, record.state, actor);

        for field in record.changed_fields(baseline) {
            if !supplied.contains(&field) {
                continue;
            }
            match field {
                RequestField::ContainerCount => {
                    errors.conflict(field.as_str(), "cannot be updated directly");
                }
                _ if field.is_system_maintained() => {
                    errors.permission(field.as_str(), "is maintained by the system");
                }
                _ if !permitted.contains(&field) => {
                    let message = match previous_state {
                        Some(state) => format!("cannot be modified in state {}", state),
                        None => "cannot be set when creating a request".to_string(),
                    };
                    errors.permission(field.as_str(), message);
                }
                RequestField::ContainerUuid if !actor.is_privileged() => {
                    errors.permission(field.as_str(), "can only be assigned by a privileged actor");
                }
                _ => {}
            }
        }
    }

    fn reject_if_any(record: &ContainerRequest, errors: FieldErrors) -> MutationResult<()> {
        errors.into_result().map_err(|errors| {
            debug!(request = %record.uuid, errors = %errors, "Rejected mutation");
            MutationError::Rejected(errors)
        })
    }

    fn persist(&self, record: &ContainerRequest, previous: Option<&ContainerRequest>) -> MutationResult<()> {
        let requests = &self.backends.requests;
        let result = match previous {
            None => requests.insert(record),
            Some(p) => requests.update(record, p.container_count),
        };
        match result {
            Ok(()) => {}
            Err(StoreError::Conflict { expected, actual, .. }) => {
                let mut errors = FieldErrors::new();
                errors.conflict(
                    RequestField::ContainerCount.as_str(),
                    format!("changed concurrently (expected {}, found {})", expected, actual),
                );
                return Err(MutationError::Rejected(errors));
            }
            Err(e) => return Err(e.into()),
        }

        match previous {
            None => info!(request = %record.uuid, state = %record.state, owner = %record.owner_uuid, "Created request"),
            Some(p) if p.state != record.state => {
                info!(request = %record.uuid, from = %p.state, to = %record.state, "Request state changed")
            }
            Some(_) => {}
        }
        debug!(request = %record.uuid, attributes = %record.logged_attributes(), "Stored request");
        Ok(())
    }

    fn finalize_after_mutation(&self, record: ContainerRequest) -> ContainerRequest {
        if record.state != RequestState::Committed {
            return record;
        }
        match self.finalize_if_needed(&record.uuid) {
            Ok(Some(finalized)) => finalized,
            Ok(None) => record,
            Err(e) => {
                warn!(request = %record.uuid, error = %e, "Finalization failed, will retry on next mutation");
                record
            }
        }
    }
}
