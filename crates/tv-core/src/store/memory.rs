//! In-memory artifact store

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::validate_key;
use crate::error::StoreError;
use crate::traits::{AccessPolicy, ArtifactStore};

/// Artifact store held entirely in memory
///
/// Used by tests and dry runs; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<String, (Bytes, AccessPolicy)>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
        }
    }

    /// Access policy an object was written with
    pub fn policy(&self, key: &str) -> Option<AccessPolicy> {
        self.objects.get(key).map(|entry| entry.value().1)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.objects
            .get(key)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, policy: AccessPolicy) -> Result<(), StoreError> {
        validate_key(key)?;
        self.objects.insert(key.to_string(), (body, policy));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_sorted_and_prefixed() {
        let store = MemoryStore::new();
        for key in ["p/CSR2/b.conf", "p/CSR1/b.conf", "p/CSR1/a.conf", "other/x.conf"] {
            store
                .put(key, Bytes::from_static(b"x"), AccessPolicy::OwnerFullControl)
                .await
                .unwrap();
        }

        let keys = store.list("p/CSR1/").await.unwrap();
        assert_eq!(keys, vec!["p/CSR1/a.conf", "p/CSR1/b.conf"]);
        assert_eq!(store.policy("p/CSR1/a.conf"), Some(AccessPolicy::OwnerFullControl));
    }

    #[tokio::test]
    async fn test_delete_absent_key_succeeds() {
        let store = MemoryStore::new();
        assert!(store.delete("p/missing.conf").await.is_ok());
        assert!(matches!(
            store.get("p/missing.conf").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
