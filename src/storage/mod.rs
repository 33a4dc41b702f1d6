//! Persisted key-value storage for credentials.
//!
//! Provides the [`KeyValueStore`] trait, its backends, and the
//! [`TokenStore`] that owns the two credential keys:
//! - [`FileStore`] - JSON file with 0600 permissions
//! - [`MemoryStore`] - In-memory (testing, ephemeral sessions)
//! - [`CallbackStore`] - User-provided callbacks
//! - [`KeyringStore`] - System keyring (feature-gated)

mod callback;
mod file;
mod memory;
mod token_store;

#[cfg(feature = "system-keyring")]
mod keyring;

use async_trait::async_trait;

pub use callback::CallbackStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use token_store::{ACCESS_TOKEN_KEY, CredentialPair, REFRESH_TOKEN_KEY, TokenStore};

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringStore;

use crate::error::Result;

/// Trait for persisted string storage backends.
///
/// Values are opaque strings; backends perform no validation.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Store several entries at once.
    ///
    /// Backends that can write all entries in one operation override this.
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Name of this storage backend.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Blanket impl for `Arc<T>`.
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }
    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_many(entries).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Blanket impl for `Box<T>`.
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }
    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_many(entries).await
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
