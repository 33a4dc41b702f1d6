//! File-based credential storage with secure permissions.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// File-based storage: one JSON object of string entries, written with 0600
/// permissions.
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Create storage at the specified path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Create storage at the default path: `~/.config/rota-client/credentials.json`
    pub fn default_path() -> Result<Self> {
        Ok(Self::new(default_file_path()?))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::storage_io(&self.path, e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| Error::StorageSerialization(e.to_string()))
    }

    fn write_all(&self, data: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::storage_io(parent, e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(data)
            .map_err(|e| Error::StorageSerialization(e.to_string()))?;
        std::fs::write(&self.path, &content)
            .map_err(|e| Error::storage_io(&self.path, e.to_string()))?;

        // Set 0600 permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)
                .map_err(|e| Error::storage_io(&self.path, format!("chmod: {}", e)))?;
        }

        debug!(path = %self.path.display(), entries = data.len(), "Credentials written");
        Ok(())
    }
}

/// Default credentials file location.
pub(crate) fn default_file_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("Cannot determine config directory".into()))?;
    Ok(config_dir.join("rota-client").join("credentials.json"))
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let data = self.read_all()?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)]).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.read_all()?;
        if data.remove(key).is_some() {
            self.write_all(&data)?;
        }
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.read_all()?;
        for (key, value) in entries {
            data.insert((*key).to_string(), (*value).to_string());
        }
        self.write_all(&data)
    }

    fn name(&self) -> &str {
        "file"
    }
}
