//! Field-tagged error taxonomy.
//!
//! A rejected mutation reports every violation it found, each tagged with
//! the attribute it concerns and the class of failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Error classes returned for rejected mutations.
///
/// These names are stable and used by callers for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Wrong datatype, missing required value, or malformed shape.
    ValidationError,
    /// The requested state is not reachable from the current state.
    StateTransitionError,
    /// The attribute may not be changed by this mutation.
    FieldPermissionError,
    /// Overlapping mount keys or a container count mismatch.
    ConflictError,
    /// A commit could not be bound to an execution unit.
    ResolutionError,
    /// The runtime token is malformed or failed validation.
    CredentialError,
    /// The request asks for something the deployment does not allow.
    ConfigurationError,
}

impl ErrorKind {
    /// Returns the stable string representation of the error class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::StateTransitionError => "StateTransitionError",
            Self::FieldPermissionError => "FieldPermissionError",
            Self::ConflictError => "ConflictError",
            Self::ResolutionError => "ResolutionError",
            Self::CredentialError => "CredentialError",
            Self::ConfigurationError => "ConfigurationError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violation, tagged by attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Attribute the violation concerns.
    pub field: String,
    /// Class of failure.
    pub kind: ErrorKind,
    /// Human-readable, single-line message. Never contains secret values.
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.field, self.message)
    }
}

/// All violations found while checking one mutation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn add(&mut self, field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn validation(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ErrorKind::ValidationError, message);
    }

    pub fn permission(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ErrorKind::FieldPermissionError, message);
    }

    pub fn conflict(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ErrorKind::ConflictError, message);
    }

    /// Move every violation of `other` into this set.
    pub fn extend(&mut self, other: FieldErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// True if any violation has the given class.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    /// True if any violation of the given class concerns `field`.
    pub fn has(&self, field: &str, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind && e.field == field)
    }

    /// Violations grouped by attribute, in attribute order.
    pub fn by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for e in &self.0 {
            grouped
                .entry(e.field.clone())
                .or_default()
                .push(format!("{}: {}", e.kind, e.message));
        }
        grouped
    }

    /// Ok when empty, otherwise the collected violations.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_str() {
        assert_eq!(ErrorKind::ConflictError.as_str(), "ConflictError");
        assert_eq!(
            serde_json::to_value(ErrorKind::CredentialError).unwrap(),
            serde_json::json!("CredentialError")
        );
    }

    #[test]
    fn test_collects_without_short_circuit() {
        let mut errors = FieldErrors::new();
        errors.validation("command", "must be an array of strings");
        errors.conflict("secret_mounts", "conflict with non-secret mounts");
        errors.validation("command", "must not be empty");

        assert_eq!(errors.len(), 3);
        assert!(errors.has("secret_mounts", ErrorKind::ConflictError));
        assert!(!errors.has("secret_mounts", ErrorKind::ValidationError));

        let grouped = errors.by_field();
        assert_eq!(grouped["command"].len(), 2);
        assert!(grouped["command"][0].starts_with("ValidationError"));
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());

        let mut errors = FieldErrors::new();
        errors.permission("log_uuid", "cannot be modified in this state");
        let err = errors.into_result().unwrap_err();
        assert!(err.to_string().contains("FieldPermissionError log_uuid"));
    }
}
