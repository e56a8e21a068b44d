//! Which attributes a mutation may change.
//!
//! The set depends on the previous state (`None` while creating), the
//! target state, and whether the actor is privileged. `container_count`
//! never appears here: only binding moves it.

use std::collections::BTreeSet;

use crq_protocol::{Actor, RequestField, RequestState};

/// Changeable in every state.
pub const ALWAYS_PERMITTED: &[RequestField] = &[
    RequestField::OwnerUuid,
    RequestField::State,
    RequestField::Name,
    RequestField::Description,
    RequestField::Properties,
    RequestField::ExpiresAt,
];

/// Changeable while creating or while the previous state is Uncommitted.
pub const PERMITTED_BEFORE_COMMIT: &[RequestField] = &[
    RequestField::Command,
    RequestField::ContainerCountMax,
    RequestField::ContainerImage,
    RequestField::Cwd,
    RequestField::Environment,
    RequestField::Filters,
    RequestField::Mounts,
    RequestField::OutputPath,
    RequestField::Priority,
    RequestField::RuntimeToken,
    RequestField::RuntimeConstraints,
    RequestField::State,
    RequestField::ContainerUuid,
    RequestField::UseExisting,
    RequestField::SchedulingParameters,
    RequestField::SecretMounts,
    RequestField::OutputName,
    RequestField::OutputTtl,
];

/// Whitelist for one mutation.
pub fn permitted_fields(
    previous: Option<RequestState>,
    target: RequestState,
    actor: &Actor,
) -> BTreeSet<RequestField> {
    let mut permitted: BTreeSet<RequestField> = ALWAYS_PERMITTED.iter().copied().collect();

    if matches!(previous, None | Some(RequestState::Uncommitted)) {
        permitted.extend(PERMITTED_BEFORE_COMMIT.iter().copied());
    }

    match target {
        RequestState::Committed => {
            permitted.extend([
                RequestField::Priority,
                RequestField::ContainerCountMax,
                RequestField::ContainerUuid,
            ]);
            if actor.is_privileged() {
                permitted.insert(RequestField::LogUuid);
            }
        }
        RequestState::Final if previous == Some(RequestState::Committed) => {
            // Cancelling is priority 0 while still Committed; finishing
            // may still touch it.
            permitted.insert(RequestField::Priority);
            if actor.is_privileged() {
                permitted.extend([RequestField::OutputUuid, RequestField::LogUuid]);
            }
        }
        _ => {}
    }

    permitted
}
