//! Checks on the merged request, after the patch has been applied.

use serde_json::Value;

use crq_protocol::{
    ContainerRequest, ErrorKind, FieldErrors, RequestField, RequestState, RuntimeConstraints,
    SchedulingParameters, PRIORITY_MAX, PRIORITY_MIN,
};

use super::decode::type_name;

/// Attributes that must hold a non-empty value in every state.
pub fn check_presence(record: &ContainerRequest, errors: &mut FieldErrors) {
    let blank = [
        (RequestField::Command, record.command.is_empty()),
        (RequestField::ContainerImage, record.container_image.is_empty()),
        (RequestField::Cwd, record.cwd.is_empty()),
        (RequestField::OutputPath, record.output_path.is_empty()),
    ];
    for (field, is_blank) in blank {
        if is_blank {
            errors.validation(field.as_str(), "can't be blank");
        }
    }
}

pub fn check_ranges(record: &ContainerRequest, errors: &mut FieldErrors) {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&record.priority) {
        errors.validation(
            RequestField::Priority.as_str(),
            format!("must be in [{}, {}], got {}", PRIORITY_MIN, PRIORITY_MAX, record.priority),
        );
    }
    if record.output_ttl < 0 {
        errors.validation(RequestField::OutputTtl.as_str(), "must be a non-negative integer");
    }
    if record.container_count_max < 1 {
        errors.validation(RequestField::ContainerCountMax.as_str(), "must be a positive integer");
    }
}

/// Secret mounts may not shadow regular mounts.
pub fn check_mount_conflict(record: &ContainerRequest, errors: &mut FieldErrors) {
    let overlapping: Vec<&str> = record
        .secret_mounts
        .keys()
        .filter(|k| record.mounts.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !overlapping.is_empty() {
        errors.conflict(
            RequestField::SecretMounts.as_str(),
            format!("conflict with non-secret mounts: {}", overlapping.join(", ")),
        );
    }
}

/// Resource requirements, enforced once the request is Committed.
pub fn check_runtime_constraints(rc: &RuntimeConstraints, target: RequestState, errors: &mut FieldErrors) {
    if target != RequestState::Committed {
        return;
    }
    if let Err(problems) = rc.resource_limits() {
        for problem in problems {
            errors.validation(RequestField::RuntimeConstraints.as_str(), problem);
        }
    }
}

/// Scheduling hints, enforced once the request is Committed.
pub fn check_scheduling_parameters(
    sp: &SchedulingParameters,
    target: RequestState,
    preemptible_allowed: bool,
    errors: &mut FieldErrors,
) {
    if target != RequestState::Committed {
        return;
    }
    let field = RequestField::SchedulingParameters.as_str();

    if sp.get(SchedulingParameters::PARTITIONS).is_some() && sp.partitions().is_none() {
        errors.validation(field, "partitions must be an array of strings");
    }

    match sp.preemptible() {
        Some(Value::Bool(true)) if !preemptible_allowed => errors.add(
            field,
            ErrorKind::ConfigurationError,
            "preemptible instances are not allowed",
        ),
        Some(Value::Bool(_)) | None => {}
        Some(other) => errors.validation(
            field,
            format!("preemptible must be a boolean but is {}", type_name(other)),
        ),
    }

    if sp.get(SchedulingParameters::MAX_RUN_TIME).is_some() && sp.max_run_time().is_none() {
        errors.validation(field, "max_run_time must be a non-negative integer");
    }
}
