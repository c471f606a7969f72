use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{TrackerError, TrackerResult};

/// Opaque session token proving the user signed in
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        BearerToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Shared holder for the current credential
///
/// Issued and revoked by the auth collaborator; every backend call takes
/// its token from here and is refused locally when there is none.
#[derive(Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<BearerToken>>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let credentials = Self::new();
        credentials.set(token);
        credentials
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = if token.trim().is_empty() {
            None
        } else {
            Some(BearerToken(token))
        };
    }

    pub fn revoke(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_signed_in(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current token, or `AuthRequired`
    pub fn bearer(&self) -> TrackerResult<BearerToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TrackerError::AuthRequired)
    }
}
