use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::config::{
    AWS_ACCESS_KEY_ID_VAR, AWS_DEFAULT_REGION_VAR, AWS_SECRET_ACCESS_KEY_VAR,
    AWS_SESSION_TOKEN_VAR,
};

/// Credential record handed out by the platform for a single role.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub region: String,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Destination for refreshed credentials.
///
/// Only the credential provider writes through a sink. Implementations are not
/// required to make the write atomic.
pub trait CredentialSink: Send + Sync {
    fn publish(&self, credentials: &CredentialSet);
}

/// Writes credentials into the process environment under the names cloud SDK
/// clients read (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`,
/// `AWS_DEFAULT_REGION`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialSink;

impl CredentialSink for EnvCredentialSink {
    fn publish(&self, credentials: &CredentialSet) {
        std::env::set_var(AWS_ACCESS_KEY_ID_VAR, &credentials.access_key_id);
        std::env::set_var(AWS_SECRET_ACCESS_KEY_VAR, &credentials.secret_access_key);
        std::env::set_var(AWS_SESSION_TOKEN_VAR, &credentials.session_token);
        std::env::set_var(AWS_DEFAULT_REGION_VAR, &credentials.region);
    }
}

/// Keeps the most recent credentials in memory. Useful for tests and for hosts that
/// hand credentials to SDK clients directly.
#[derive(Debug, Default)]
pub struct InMemoryCredentialSink {
    current: Mutex<Option<CredentialSet>>,
    writes: AtomicUsize,
}

impl InMemoryCredentialSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<CredentialSet> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CredentialSink for InMemoryCredentialSink {
    fn publish(&self, credentials: &CredentialSet) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}
