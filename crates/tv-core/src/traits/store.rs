//! Artifact store trait
//!
//! The object store is the only channel between the hub controller and the
//! tunnel agents. Implementations must make `delete` of an absent key a
//! success so that a consumed artifact can be deleted again harmlessly.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::StoreError;

/// Access policy applied to every written object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    /// Only the store owner may read or modify the object
    #[default]
    OwnerFullControl,
}

/// Durable key/value object store holding tunnel intent artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List keys starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch an object body
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Create or overwrite an object
    async fn put(&self, key: &str, body: Bytes, policy: AccessPolicy) -> Result<(), StoreError>;

    /// Delete an object; deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, body: Bytes, policy: AccessPolicy) -> Result<(), StoreError> {
        (**self).put(key, body, policy).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}
