//! In-memory local store.

use super::LocalStore;
use crate::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory [`LocalStore`].
///
/// Clones share state. Writes can be made to fail for testing the
/// "remote succeeded, mirror failed" paths.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    inner: Arc<Mutex<MemoryLocalInner>>,
}

#[derive(Debug, Default)]
struct MemoryLocalInner {
    values: BTreeMap<String, String>,
    writes: usize,
    fail_next_set: Option<String>,
}

impl MemoryLocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLocalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw value of a key.
    pub fn value(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    /// Every stored key.
    pub fn keys(&self) -> Vec<String> {
        self.lock().values.keys().cloned().collect()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().values.is_empty()
    }

    /// Successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Cause the next `set` to fail with the given message.
    pub fn fail_next_set(&self, message: &str) {
        self.lock().fail_next_set = Some(message.to_string());
    }
}

impl Clone for MemoryLocalStore {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if let Some(message) = inner.fail_next_set.take() {
            return Err(StorageError::Io {
                key: key.to_string(),
                message,
            });
        }
        inner.values.insert(key.to_string(), value);
        inner.writes += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().values.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryLocalStore::new();
        store.set("a", "1".into()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".into()));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn prefix_listing() {
        let store = MemoryLocalStore::new();
        store.set("handled-deleted:a", "1".into()).await.unwrap();
        store.set("handled-deleted:b", "2".into()).await.unwrap();
        store.set("active-session-id", "a".into()).await.unwrap();

        let keys = store.keys_with_prefix("handled-deleted:").await.unwrap();
        assert_eq!(keys, vec!["handled-deleted:a", "handled-deleted:b"]);
    }

    #[tokio::test]
    async fn fail_next_set_is_consumed_once() {
        let store = MemoryLocalStore::new();
        store.fail_next_set("disk full");
        assert!(matches!(
            store.set("a", "1".into()).await,
            Err(StorageError::Io { .. })
        ));
        assert!(store.set("a", "1".into()).await.is_ok());
    }
}
