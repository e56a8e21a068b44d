//! Objects named by a request must exist and be readable by the caller.
//!
//! Only references this mutation changed are checked, including the unit
//! the binding stage just resolved. Execution units belong to the system,
//! so an unprivileged owner cannot read the unit its own request is bound
//! to; `container_uuid` therefore only needs to exist.

use crq_protocol::{
    Actor, AdapterError, ArtifactError, ArtifactStore, ContainerRequest, ExecutionUnits,
    FieldErrors, RequestField,
};

/// Who may read a referenced object.
enum Readers {
    Privileged,
    OwnerOrPrivileged(String),
}

impl Readers {
    fn admits(&self, actor: &Actor) -> bool {
        match self {
            Readers::Privileged => actor.is_privileged(),
            Readers::OwnerOrPrivileged(owner) => actor.is_privileged() || owner == actor.uuid(),
        }
    }
}

/// Check every reference attribute that differs between `baseline` and
/// `record`.
pub fn check_references(
    record: &ContainerRequest,
    baseline: &ContainerRequest,
    actor: &Actor,
    units: &dyn ExecutionUnits,
    artifacts: &dyn ArtifactStore,
    errors: &mut FieldErrors,
) -> Result<(), AdapterError> {
    for field in record.changed_fields(baseline) {
        if !field.is_reference() {
            continue;
        }
        let value = record.field_value(field);
        let Some(uuid) = value.as_str() else {
            continue;
        };

        let readers = match field {
            RequestField::ContainerUuid => units.lookup(uuid)?.map(|_| Readers::Privileged),
            _ => artifacts
                .find(uuid)
                .map_err(artifact_store_failure)?
                .map(|artifact| Readers::OwnerOrPrivileged(artifact.owner_uuid)),
        };

        match readers {
            None => errors.validation(field.as_str(), format!("{} does not exist", uuid)),
            Some(_) if field.skips_read_permission() => {}
            Some(readers) if !readers.admits(actor) => {
                errors.permission(field.as_str(), format!("{} is not readable by {}", uuid, actor.uuid()))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn artifact_store_failure(e: ArtifactError) -> AdapterError {
    AdapterError::Unavailable {
        service: "artifact store".to_string(),
        message: e.to_string(),
    }
}
