use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use thiserror::Error;

/// Key under which the management access token is stored.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Path fragment that marks a request as a management request.
pub const MANAGEMENT_PATH_MARKER: &str = "management";

/// Shared key/value store for credentials populated at runtime.
///
/// Clones share the same map. Reads and writes go through a read/write lock so
/// concurrent requests never observe a torn update.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key)
    }

    /// Returns the `Authorization` value to inject for `path`.
    ///
    /// `Ok(None)` means the path is not a management path and must be left alone.
    pub fn management_authorization(&self, path: &str) -> Result<Option<String>, TokenError> {
        if !is_management_path(path) {
            return Ok(None);
        }
        let token = self
            .get(ACCESS_TOKEN_KEY)
            .ok_or(TokenError::Unset(ACCESS_TOKEN_KEY))?;
        Ok(Some(format!("Bearer {token}")))
    }
}

pub fn is_management_path(path: &str) -> bool {
    path.contains(MANAGEMENT_PATH_MARKER)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token '{0}' has not been stored")]
    Unset(&'static str),
}
