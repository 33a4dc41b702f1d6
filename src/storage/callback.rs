//! Callback-based storage for user-provided persistence.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::KeyValueStore;
use crate::error::Result;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

type GetFn = dyn Fn(String) -> BoxFuture<Option<String>> + Send + Sync;
type SetFn = dyn Fn(String, String) -> BoxFuture<()> + Send + Sync;
type RemoveFn = dyn Fn(String) -> BoxFuture<()> + Send + Sync;

/// Storage backed by user-provided async callbacks.
pub struct CallbackStore {
    get_fn: Arc<GetFn>,
    set_fn: Arc<SetFn>,
    remove_fn: Arc<RemoveFn>,
}

impl CallbackStore {
    /// Create from async closures.
    pub fn new<G, S, R>(get: G, set: S, remove: R) -> Self
    where
        G: Fn(String) -> BoxFuture<Option<String>> + Send + Sync + 'static,
        S: Fn(String, String) -> BoxFuture<()> + Send + Sync + 'static,
        R: Fn(String) -> BoxFuture<()> + Send + Sync + 'static,
    {
        Self {
            get_fn: Arc::new(get),
            set_fn: Arc::new(set),
            remove_fn: Arc::new(remove),
        }
    }
}

#[async_trait]
impl KeyValueStore for CallbackStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (self.get_fn)(key.to_string()).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (self.set_fn)(key.to_string(), value.to_string()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (self.remove_fn)(key.to_string()).await
    }

    fn name(&self) -> &str {
        "callback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_callback_store_delegates() {
        let backing: Arc<Mutex<HashMap<String, String>>> = Arc::default();

        let get_map = Arc::clone(&backing);
        let set_map = Arc::clone(&backing);
        let remove_map = Arc::clone(&backing);

        let store = CallbackStore::new(
            move |key| {
                let value = get_map.lock().unwrap().get(&key).cloned();
                Box::pin(async move { Ok(value) })
            },
            move |key, value| {
                set_map.lock().unwrap().insert(key, value);
                Box::pin(async { Ok(()) })
            },
            move |key| {
                remove_map.lock().unwrap().remove(&key);
                Box::pin(async { Ok(()) })
            },
        );

        store.set("jwt", "a").await.unwrap();
        assert_eq!(backing.lock().unwrap().get("jwt").map(String::as_str), Some("a"));
        assert_eq!(store.get("jwt").await.unwrap().as_deref(), Some("a"));

        store.remove("jwt").await.unwrap();
        assert!(store.get("jwt").await.unwrap().is_none());
        assert_eq!(store.name(), "callback");
    }
}
