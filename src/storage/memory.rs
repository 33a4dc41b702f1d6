//! In-memory credential storage.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::Result;

/// In-memory storage, for tests and sessions that should not outlive the
/// process.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store pre-populated with the given entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();

        assert!(store.get("jwt").await.unwrap().is_none());

        store.set("jwt", "abc").await.unwrap();
        assert_eq!(store.get("jwt").await.unwrap().as_deref(), Some("abc"));

        store.remove("jwt").await.unwrap();
        assert!(store.get("jwt").await.unwrap().is_none());

        // Removing twice is fine.
        store.remove("jwt").await.unwrap();
    }

    #[tokio::test]
    async fn test_with_entries() {
        let store = MemoryStore::with_entries([("a", "1"), ("b", "2")]);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
