//! Session token cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{DescargaError, Result};

/// A bearer token issued by the authentication service.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is still usable at `now` with `margin` to spare.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        chrono::Duration::from_std(margin)
            .ok()
            .and_then(|margin| now.checked_add_signed(margin))
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Holds at most one token, shared by every call of a client.
///
/// Concurrent refreshes both reach the service; the last one stored wins.
#[derive(Debug)]
pub struct AuthManager {
    token: Mutex<Option<AuthToken>>,
    lifetime: Duration,
    safety_margin: Duration,
}

impl AuthManager {
    pub fn new(lifetime: Duration, safety_margin: Duration) -> Self {
        Self {
            token: Mutex::new(None),
            lifetime,
            safety_margin,
        }
    }

    /// The cached token value, if it is valid at `now`.
    pub fn cached(&self, now: DateTime<Utc>) -> Option<String> {
        self.token
            .lock()
            .as_ref()
            .filter(|token| token.is_valid_at(now, self.safety_margin))
            .map(|token| token.value().to_string())
    }

    /// Cache a freshly issued token, expiring `lifetime` after `issued_at`.
    pub fn store(&self, value: String, issued_at: DateTime<Utc>) -> Result<AuthToken> {
        let lifetime = chrono::Duration::from_std(self.lifetime)
            .map_err(|e| DescargaError::Config(format!("token lifetime out of range: {e}")))?;
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| DescargaError::Config("token lifetime out of range".to_string()))?;
        let token = AuthToken::new(value, expires_at);
        *self.token.lock() = Some(token.clone());
        tracing::debug!(expires_at = %token.expires_at, "Session token cached");
        Ok(token)
    }

    /// Return the cached token or obtain a new one with `issue`.
    ///
    /// The lock is not held while `issue` runs.
    pub fn token_with(&self, issue: impl FnOnce() -> Result<String>) -> Result<String> {
        if let Some(token) = self.cached(Utc::now()) {
            return Ok(token);
        }
        let value = issue()?;
        let token = self.store(value, Utc::now())?;
        Ok(token.value)
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        *self.token.lock() = None;
    }
}
