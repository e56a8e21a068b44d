//! Static credential validation.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crq_protocol::{AdapterError, CredentialValidator};

/// Accepts exactly the tokens it was given, or everything.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    valid: HashSet<String>,
    accept_all: bool,
    unavailable: bool,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator that accepts any token.
    pub fn accept_all() -> Self {
        let creds = Self::default();
        creds.write().accept_all = true;
        creds
    }

    pub fn allow(&self, token: impl Into<String>) {
        self.write().valid.insert(token.into());
    }

    pub fn revoke(&self, token: &str) {
        self.write().valid.remove(token);
    }

    /// Make every validation call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialValidator for StaticCredentials {
    fn validate(&self, token: &str) -> Result<bool, AdapterError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if inner.unavailable {
            return Err(AdapterError::Unavailable {
                service: "credential service".to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(inner.accept_all || inner.valid.contains(token))
    }
}
