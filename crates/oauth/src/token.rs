//! Access tokens and their persisted slot
//!
//! `expiration_time` and `refresh_time` are unix timestamps in milliseconds
//! (absolute, not deltas). An expiration of 0 means the token never expires.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{PreferenceStore, preference_key};

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// OAuth 1.0a access token (or request token) and its secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth1AccessToken {
    pub token: String,
    pub secret: String,
}

impl OAuth1AccessToken {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    /// Valid iff both token and secret are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.secret.is_empty()
    }

    /// Read `oauth_token` / `oauth_token_secret` from a form response.
    pub fn set_response(&mut self, params: &HashMap<String, String>) {
        self.token = params.get("oauth_token").cloned().unwrap_or_default();
        self.secret = params.get("oauth_token_secret").cloned().unwrap_or_default();
    }
}

/// OAuth 2.0 access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OAuth2AccessToken {
    pub token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scopes: Vec<String>,
    /// Unix milliseconds; 0 = never expires
    pub expiration_time: u64,
    /// Unix milliseconds when the token was issued or last refreshed
    pub refresh_time: u64,
}

impl OAuth2AccessToken {
    /// A bare token that never expires, stamped as refreshed now.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_time: now_millis(),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_millis())
    }

    /// Validity at a given unix-millisecond instant.
    pub fn is_valid_at(&self, now: u64) -> bool {
        !self.token.is_empty() && (self.expiration_time == 0 || now <= self.expiration_time)
    }

    /// Valid, and every scope in `required` was granted.
    pub fn is_valid_for_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.is_valid()
            && required
                .iter()
                .all(|scope| self.scopes.iter().any(|s| s == scope.as_ref()))
    }

    /// Fill from a token-endpoint or redirect response.
    ///
    /// Leaves the token untouched when `access_token` is absent or empty.
    /// `expires_in` (seconds) becomes an absolute expiration captured now;
    /// absence means the token never expires.
    pub fn set_response(&mut self, params: &HashMap<String, String>) {
        self.set_response_at(params, now_millis());
    }

    pub(crate) fn set_response_at(&mut self, params: &HashMap<String, String>, now: u64) {
        let token = params.get("access_token").cloned().unwrap_or_default();
        if token.is_empty() {
            return;
        }
        self.token = token;
        self.token_type = params.get("token_type").cloned().unwrap_or_default();
        self.refresh_time = now;
        self.expiration_time = match params.get("expires_in") {
            // Unparseable values count as zero seconds; huge ones saturate.
            Some(secs) => {
                let secs = secs.trim().parse::<u64>().unwrap_or(0);
                now.saturating_add(secs.saturating_mul(1000))
            }
            None => 0,
        };
        self.refresh_token = params.get("refresh_token").cloned().unwrap_or_default();
        self.scopes = params
            .get("scope")
            .map(|s| s.split(' ').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
    }
}

/// Authorization state derived from a client's current token.
///
/// Transitions are driven by the host: a login stores a token
/// (`NoToken` -> `Valid`), time passes (`Valid` -> `Expired`), and
/// `clear_access_token` returns to `NoToken`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Valid,
    Expired,
}

impl TokenState {
    /// Status label for logging and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::NoToken => "no_token",
            TokenState::Valid => "valid",
            TokenState::Expired => "expired",
        }
    }
}

/// The client's current token plus where it is persisted.
///
/// Readers get an `Arc` snapshot and observe either the old or the new token
/// in full. The write lock is held across the store write so the in-memory
/// token and the persisted copy change together.
pub(crate) struct TokenSlot<T> {
    current: RwLock<Option<Arc<T>>>,
    store: Arc<dyn PreferenceStore>,
    key: Option<String>,
}

impl<T> TokenSlot<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create the slot and restore any token persisted under the profile.
    ///
    /// An empty profile name disables persistence.
    pub(crate) fn restore(store: Arc<dyn PreferenceStore>, prefix: &str, profile: &str) -> Self {
        let key = (!profile.is_empty()).then(|| preference_key(prefix, profile));
        let current = key.as_deref().and_then(|key| match store.get(key) {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(token) => {
                    debug!(key, "restored access token");
                    Some(Arc::new(token))
                }
                Err(e) => {
                    warn!(key, error = %e, "ignoring unreadable persisted token");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted token");
                None
            }
        });
        Self {
            current: RwLock::new(current),
            store,
            key,
        }
    }

    pub(crate) fn get(&self) -> Option<Arc<T>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a new token (or none) and persist the change.
    pub(crate) fn replace(&self, token: Option<T>) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = token.map(Arc::new);
        self.save(current.as_deref());
    }

    fn save(&self, token: Option<&T>) {
        let Some(key) = self.key.as_deref() else {
            return;
        };
        let value = match token.map(serde_json::to_value).transpose() {
            Ok(v) => v.unwrap_or(serde_json::Value::Null),
            Err(e) => {
                warn!(key, error = %e, "failed to serialize access token");
                return;
            }
        };
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "failed to persist access token");
        }
    }
}
