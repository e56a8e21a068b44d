//! Field validation
//!
//! Every check appends to a shared `FieldErrors` so a rejected mutation
//! reports all of its problems at once:
//! - `decode`: wire types of the supplied attributes
//! - `shape`: presence, ranges, mount conflicts, commit-time constraints
//! - `token`: runtime token prefix and credential service
//! - `references`: referenced units and artifacts exist and are readable

mod decode;
mod references;
mod shape;
mod token;

pub use decode::apply_patch;
pub use references::check_references;
pub use shape::{
    check_mount_conflict, check_presence, check_ranges, check_runtime_constraints,
    check_scheduling_parameters,
};
pub use token::{check_token, TokenPolicy};

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crq_protocol::{AdapterError, ContainerRequest, CredentialValidator, FieldErrors, RequestField};

use crate::config::DeploymentConfig;

/// Validation settings derived from the deployment configuration.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    preemptible_allowed: bool,
    token_policy: TokenPolicy,
}

impl FieldValidator {
    pub fn new(config: &DeploymentConfig) -> Self {
        Self {
            preemptible_allowed: config.preemptible_instances,
            token_policy: TokenPolicy {
                prefix: config.runtime_token_prefix.clone(),
                strict_prefix: config.strict_token_prefix,
            },
        }
    }

    /// Apply a caller's patch; see [`apply_patch`].
    pub fn decode(
        &self,
        record: &mut ContainerRequest,
        patch: &Map<String, Value>,
        errors: &mut FieldErrors,
    ) -> BTreeSet<RequestField> {
        apply_patch(record, patch, errors)
    }

    /// Checks on the merged record. Commit-time checks apply when the
    /// record's state is Committed.
    pub fn check_shape(&self, record: &ContainerRequest, errors: &mut FieldErrors) {
        check_presence(record, errors);
        check_ranges(record, errors);
        check_mount_conflict(record, errors);
        check_runtime_constraints(&record.runtime_constraints, record.state, errors);
        check_scheduling_parameters(
            &record.scheduling_parameters,
            record.state,
            self.preemptible_allowed,
            errors,
        );
    }

    /// Validate the runtime token if this mutation set or changed it.
    pub fn check_credentials(
        &self,
        record: &ContainerRequest,
        previous: Option<&ContainerRequest>,
        credentials: &dyn CredentialValidator,
        errors: &mut FieldErrors,
    ) -> Result<(), AdapterError> {
        let Some(token) = record.runtime_token.as_deref() else {
            return Ok(());
        };
        if previous.and_then(|p| p.runtime_token.as_deref()) == Some(token) {
            return Ok(());
        }
        check_token(token, &self.token_policy, credentials, errors)
    }
}
