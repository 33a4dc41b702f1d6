//! System keyring-based credential storage (feature-gated).

use async_trait::async_trait;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

const SERVICE_NAME: &str = "rota-client";

/// Storage using the system keyring (Secret Service / Keychain / Credential Manager).
///
/// Each key becomes one keyring entry under the `rota-client` service.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Create a new keyring store under the default service name.
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Create a keyring store under a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| Error::Keyring(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Keyring(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| Error::Keyring(e.to_string()))?;
        debug!(key, "Entry saved to keyring");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => {
                debug!(key, "Entry removed from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Keyring(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
