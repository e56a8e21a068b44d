//! Object identifiers.
//!
//! Identifiers look like `<cluster>-<type infix>-<15 alphanumerics>`.

/// Type infix for container requests.
pub const REQUEST_INFIX: &str = "xvhdk";

/// Type infix for execution units.
pub const UNIT_INFIX: &str = "dz642";

/// Type infix for artifacts (collections).
pub const ARTIFACT_INFIX: &str = "4zz18";

/// Type infix for users.
pub const USER_INFIX: &str = "tpzed";

/// Generate a fresh identifier for an object of the given type.
pub fn generate(cluster_id: &str, infix: &str) -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", cluster_id, infix, &simple[..15])
}

/// Identifier of the system user of a cluster.
pub fn system_user_uuid(cluster_id: &str) -> String {
    format!("{}-{}-000000000000000", cluster_id, USER_INFIX)
}

/// True when `uuid` is shaped like an identifier of the given type.
pub fn has_infix(uuid: &str, infix: &str) -> bool {
    let mut parts = uuid.split('-');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(cluster), Some(kind), Some(tail), None) => {
            cluster.len() == 5
                && kind == infix
                && tail.len() == 15
                && tail.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        }
        _ => false,
    }
}
