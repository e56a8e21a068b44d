//! Secret removal on finalization.

use crq_protocol::{ContainerRequest, RequestState};

/// Clear secret attributes if the request is Final. Returns true when
/// anything was removed.
pub fn scrub_secrets(record: &mut ContainerRequest) -> bool {
    if record.state != RequestState::Final {
        return false;
    }
    let had_secrets = !record.secrets_empty();
    record.secret_mounts.clear();
    record.runtime_token = None;
    had_secrets
}
