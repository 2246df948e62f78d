//! Mock implementations of the auth collaborator traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::auth::traits::{BrowserTrait, KeychainTrait};
use crate::auth::types::OAuthToken;

const ACCESS_PREFIX: &str = "access.";
const REFRESH_PREFIX: &str = "refresh.";
const METADATA_PREFIX: &str = "metadata.";

type StorageData = Arc<Mutex<HashMap<String, String>>>;

fn lock_map(storage: &StorageData) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory keychain provider for deterministic tests.
///
/// Mirrors the key layout a platform keychain backend would use: separate
/// access/refresh entries plus a JSON metadata entry per account.
#[derive(Debug, Clone, Default)]
pub struct MockKeychainProvider {
    storage: StorageData,
}

impl MockKeychainProvider {
    /// Create an empty mock keychain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, across all networks.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        lock_map(&self.storage).len()
    }
}

#[async_trait]
impl KeychainTrait for MockKeychainProvider {
    async fn save_tokens(&self, network: &str, tokens: &OAuthToken) -> Result<(), String> {
        let mut storage = lock_map(&self.storage);

        storage.insert(format!("{ACCESS_PREFIX}{network}"), tokens.access_token.clone());

        if let Some(refresh) = tokens.refresh_token.as_ref() {
            storage.insert(format!("{REFRESH_PREFIX}{network}"), refresh.clone());
        } else {
            storage.remove(&format!("{REFRESH_PREFIX}{network}"));
        }

        let metadata = serde_json::json!({
            "token_type": tokens.token_type,
            "scope": tokens.scope,
            "expires_at": tokens.expires_at.map(|dt| dt.timestamp()),
        });
        let metadata_str = serde_json::to_string(&metadata).map_err(|err| err.to_string())?;
        storage.insert(format!("{METADATA_PREFIX}{network}"), metadata_str);

        Ok(())
    }

    async fn load_tokens(&self, network: &str) -> Option<OAuthToken> {
        let storage = lock_map(&self.storage);

        let access_token = storage.get(&format!("{ACCESS_PREFIX}{network}"))?.clone();
        let refresh_token = storage.get(&format!("{REFRESH_PREFIX}{network}")).cloned();

        let metadata: serde_json::Value = storage
            .get(&format!("{METADATA_PREFIX}{network}"))
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        let mut token = OAuthToken::new(access_token, refresh_token, None, None);
        token.expires_at = metadata
            .get("expires_at")
            .and_then(serde_json::Value::as_i64)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        token.scope = metadata
            .get("scope")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        if let Some(token_type) = metadata.get("token_type").and_then(serde_json::Value::as_str) {
            token.token_type = token_type.to_string();
        }

        Some(token)
    }

    async fn clear_tokens(&self, network: &str) -> Result<(), String> {
        let mut storage = lock_map(&self.storage);
        storage.remove(&format!("{ACCESS_PREFIX}{network}"));
        storage.remove(&format!("{REFRESH_PREFIX}{network}"));
        storage.remove(&format!("{METADATA_PREFIX}{network}"));
        Ok(())
    }

    async fn has_tokens(&self, network: &str) -> bool {
        lock_map(&self.storage).contains_key(&format!("{ACCESS_PREFIX}{network}"))
    }
}

/// Browser double that records opened URLs.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockBrowser {
    /// Create a browser double with an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All URLs passed to `open_url`, oldest first.
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// The most recently opened URL, if any.
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.opened
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl BrowserTrait for MockBrowser {
    fn open_url(&self, url: &str) {
        self.opened
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(url.to_string());
    }
}
