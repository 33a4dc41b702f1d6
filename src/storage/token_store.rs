//! Credential pair storage under two fixed keys.

use std::fmt;
use std::sync::Arc;

use super::{KeyValueStore, MemoryStore};
use crate::error::Result;

/// Storage key of the access credential.
pub const ACCESS_TOKEN_KEY: &str = "jwt";

/// Storage key of the refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// An access/refresh credential pair. Both values are opaque.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Short-lived bearer credential.
    pub access: String,
    /// Longer-lived credential exchanged for a new access credential.
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Reads and writes the current credentials in persisted storage.
///
/// Has no notion of expiry: a stale access credential is only discovered when
/// the server rejects it.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Create a token store on top of a storage backend.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Create a token store backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn get_access(&self) -> Result<Option<String>> {
        self.backend.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn set_access(&self, token: &str) -> Result<()> {
        self.backend.set(ACCESS_TOKEN_KEY, token).await
    }

    pub async fn get_refresh(&self) -> Result<Option<String>> {
        self.backend.get(REFRESH_TOKEN_KEY).await
    }

    pub async fn set_refresh(&self, token: &str) -> Result<()> {
        self.backend.set(REFRESH_TOKEN_KEY, token).await
    }

    /// Replace both credentials in one backend write.
    pub async fn set_pair(&self, pair: &CredentialPair) -> Result<()> {
        self.backend
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access.as_str()),
                (REFRESH_TOKEN_KEY, pair.refresh.as_str()),
            ])
            .await
    }

    /// Snapshot of the stored pair, if both halves are present.
    pub async fn pair(&self) -> Result<Option<CredentialPair>> {
        let access = self.get_access().await?;
        let refresh = self.get_refresh().await?;
        Ok(access
            .zip(refresh)
            .map(|(access, refresh)| CredentialPair { access, refresh }))
    }

    /// Remove both credentials.
    pub async fn clear(&self) -> Result<()> {
        self.backend.remove(ACCESS_TOKEN_KEY).await?;
        self.backend.remove(REFRESH_TOKEN_KEY).await
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}
