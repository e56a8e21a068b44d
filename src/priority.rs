//! Priority inheritance and propagation.
//!
//! A request created from inside a running execution unit inherits the
//! highest priority among the requests bound to that unit. After every
//! mutation that changes state, priority or binding, the execution units
//! involved re-derive their own priority.

use tracing::{debug, warn};

use crq_protocol::{Actor, ContainerRequest, ExecutionUnits, RequestField, RequestState, RequestStore};

/// Attributes whose change can move a unit's priority.
const PRIORITY_INPUTS: &[RequestField] = &[
    RequestField::State,
    RequestField::Priority,
    RequestField::ContainerUuid,
];

/// Record the requesting unit and seed priority from it. Creation only.
///
/// Seeding is best effort: if the store cannot answer, the priority the
/// caller gave is kept.
pub fn seed_lineage(record: &mut ContainerRequest, actor: &Actor, requests: &dyn RequestStore) {
    let Some(parent) = actor.container_uuid() else {
        return;
    };
    record.requesting_container_uuid = Some(parent.to_string());

    match requests.max_priority_bound_to(parent) {
        Ok(max) => {
            record.priority = max.unwrap_or(0);
            debug!(request = %record.uuid, parent = %parent, priority = record.priority, "Seeded priority");
        }
        Err(e) => {
            warn!(request = %record.uuid, parent = %parent, error = %e, "Could not seed priority");
        }
    }
}

/// Ask for preemptible capacity on child requests when the deployment
/// allows it and the caller left the flag unset.
pub fn default_preemptible(record: &mut ContainerRequest, preemptible_allowed: bool) {
    if record.state == RequestState::Committed
        && preemptible_allowed
        && record.requesting_container_uuid.is_some()
        && record.scheduling_parameters.preemptible().is_none()
    {
        record.scheduling_parameters.set_preemptible(true);
    }
}

/// Recomputes execution-unit priority after mutations.
pub struct PriorityPropagator<'a> {
    units: &'a dyn ExecutionUnits,
    system: &'a Actor,
}

impl<'a> PriorityPropagator<'a> {
    pub fn new(units: &'a dyn ExecutionUnits, system: &'a Actor) -> Self {
        Self { units, system }
    }

    /// True when the mutation from `previous` to `current` can affect the
    /// priority of a unit. Creation always can.
    pub fn is_relevant(previous: Option<&ContainerRequest>, current: &ContainerRequest) -> bool {
        match previous {
            None => true,
            Some(p) => current
                .changed_fields(p)
                .iter()
                .any(|f| PRIORITY_INPUTS.contains(f)),
        }
    }

    /// Recompute the previous and current unit, each once. Returns the
    /// units that were recomputed successfully; failures are logged.
    pub fn propagate(&self, previous: Option<&ContainerRequest>, current: &ContainerRequest) -> Vec<String> {
        if !Self::is_relevant(previous, current) {
            return Vec::new();
        }

        let mut targets: Vec<&str> = Vec::with_capacity(2);
        for unit in [
            previous.and_then(|p| p.container_uuid.as_deref()),
            current.container_uuid.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !targets.contains(&unit) {
                targets.push(unit);
            }
        }

        let mut recomputed = Vec::with_capacity(targets.len());
        for unit in targets {
            match self.units.recompute_priority(unit, self.system) {
                Ok(()) => recomputed.push(unit.to_string()),
                Err(e) => {
                    warn!(request = %current.uuid, unit = %unit, error = %e, "Priority propagation failed");
                }
            }
        }
        recomputed
    }
}
