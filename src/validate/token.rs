//! Runtime token checks.

use crq_protocol::{AdapterError, CredentialValidator, ErrorKind, FieldErrors, RequestField};

/// How runtime tokens are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Version prefix every token must start with, e.g. `v2/`.
    pub prefix: String,
    /// Reject unprefixed tokens locally. When false they go straight to
    /// the credential service.
    pub strict_prefix: bool,
}

/// Check a token that was set or changed by this mutation.
///
/// A token the credential service rejects is a field error; the service
/// being unreachable is an `AdapterError` and fails the whole mutation.
pub fn check_token(
    token: &str,
    policy: &TokenPolicy,
    credentials: &dyn CredentialValidator,
    errors: &mut FieldErrors,
) -> Result<(), AdapterError> {
    let field = RequestField::RuntimeToken.as_str();

    if policy.strict_prefix && !token.starts_with(&policy.prefix) {
        errors.add(
            field,
            ErrorKind::CredentialError,
            format!("not a {} token", policy.prefix.trim_end_matches('/')),
        );
        return Ok(());
    }

    if !credentials.validate(token)? {
        errors.add(field, ErrorKind::CredentialError, "failed validation");
    }
    Ok(())
}
