//! Binding a request to an execution unit.
//!
//! A Committed request without a unit is resolved through the execution
//! unit service. Every change of `container_uuid` to a new non-null value
//! counts against `container_count_max`. A request already at its cap is
//! not resolved at all, so a rejected mutation never creates a unit.

use tracing::debug;

use crq_protocol::{
    Actor, AdapterError, ContainerRequest, ErrorKind, ExecutionUnits, FieldErrors, RequestField,
    RequestState, ResolveSpec,
};

/// Resolve and count the binding of `record`.
///
/// Field violations go to `errors`; a failing unit service is returned as
/// an error and aborts the mutation.
pub fn bind_container(
    record: &mut ContainerRequest,
    previous: Option<&ContainerRequest>,
    units: &dyn ExecutionUnits,
    actor: &Actor,
    errors: &mut FieldErrors,
) -> Result<(), AdapterError> {
    let previous_unit = previous.and_then(|p| p.container_uuid.as_deref());

    if record.state == RequestState::Committed && record.container_uuid.is_none() {
        if at_cap(record) {
            cap_reached(record, errors);
            return Ok(());
        }
        let unit = units.resolve(&ResolveSpec::from_request(record), actor)?;
        let limits = record.runtime_constraints.resource_limits().ok();
        debug!(
            request = %record.uuid,
            unit = %unit,
            vcpus = ?limits.map(|l| l.vcpus),
            ram = ?limits.map(|l| l.ram),
            "Resolved execution unit"
        );
        record.container_uuid = Some(unit);
    }

    if let Some(unit) = record.container_uuid.as_deref() {
        if previous_unit != Some(unit) {
            if at_cap(record) {
                cap_reached(record, errors);
            } else {
                record.container_count += 1;
            }
        }
    }

    if record.state == RequestState::Committed && record.container_uuid.is_none() {
        errors.add(
            RequestField::ContainerUuid.as_str(),
            ErrorKind::ResolutionError,
            "has not been resolved to a container",
        );
    }

    Ok(())
}

fn at_cap(record: &ContainerRequest) -> bool {
    record.container_count >= record.container_count_max
}

fn cap_reached(record: &ContainerRequest, errors: &mut FieldErrors) {
    errors.conflict(
        RequestField::ContainerCount.as_str(),
        format!(
            "already bound {} times, container_count_max is {}",
            record.container_count, record.container_count_max
        ),
    );
}
