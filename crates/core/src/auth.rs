//! Account authorization and the shared token cache
//!
//! The cache holds a single token. It is trusted until the server reports it
//! expired; the retry layer is responsible for invalidating it.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Long-lived account credentials exchanged for an [`AuthToken`]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Application key ID (also known as account ID for master keys)
    pub key_id: String,
    pub key_name: Option<String>,
    pub app_key: String,
}

impl Credentials {
    pub fn new(key_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_name: None,
            app_key: app_key.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key_id.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("key_name", &self.key_name)
            .field("app_key", &"<redacted>")
            .finish()
    }
}

/// Restrictions attached to the key that was authorized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    #[serde(default)]
    pub bucket_id: Option<String>,

    #[serde(default)]
    pub bucket_name: Option<String>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub name_prefix: Option<String>,
}

/// Result of a successful `b2_authorize_account`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub account_id: String,
    pub authorization_token: String,
    pub api_url: String,
    #[serde(alias = "downloadURL")]
    pub download_url: String,

    #[serde(default)]
    pub allowed: Allowed,

    #[serde(default)]
    pub absolute_minimum_part_size: u64,

    #[serde(default)]
    pub recommended_part_size: u64,

    /// When this client received the token
    #[serde(skip, default = "Timestamp::now")]
    pub authorized_at: Timestamp,
}

impl AuthToken {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.allowed.capabilities.iter().any(|c| c == capability)
    }

    /// Same server-issued token, regardless of when it was received
    pub fn same_token(&self, other: &AuthToken) -> bool {
        self.authorization_token == other.authorization_token
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("account_id", &self.account_id)
            .field("authorization_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("allowed", &self.allowed)
            .field("recommended_part_size", &self.recommended_part_size)
            .field("authorized_at", &self.authorized_at)
            .finish()
    }
}

/// Single-slot cache for the current account token
///
/// `get`, `set` and `invalidate` all take the same lock, so a reader sees
/// either a complete token or none. A separate async gate serializes
/// re-authorization so that concurrent callers finding the slot empty
/// trigger one authorize call between them.
#[derive(Debug, Default)]
pub struct AuthCache {
    slot: Mutex<Option<AuthToken>>,
    refresh: tokio::sync::Mutex<()>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current token, if any
    pub fn get(&self) -> Option<AuthToken> {
        self.lock().clone()
    }

    pub fn set(&self, token: AuthToken) {
        *self.lock() = Some(token);
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    /// Clear the slot only if it still holds `stale`
    ///
    /// Returns true when the token was removed. A caller whose request failed
    /// with an old token must not discard a newer one set in the meantime.
    pub fn invalidate_token(&self, stale: &AuthToken) -> bool {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(current) if current.same_token(stale) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Wait for exclusive right to re-authorize
    pub async fn lock_refresh(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    fn lock(&self) -> MutexGuard<'_, Option<AuthToken>> {
        // The slot is replaced wholesale, so a panic elsewhere cannot leave it torn.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
