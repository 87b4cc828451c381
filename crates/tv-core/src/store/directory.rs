//! Directory-backed artifact store
//!
//! Object keys map one-to-one onto relative file paths beneath a root
//! directory. Writes go to a hidden temporary file that is renamed into
//! place, so a reader never observes a half-written artifact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::validate_key;
use crate::error::StoreError;
use crate::traits::{AccessPolicy, ArtifactStore};

/// Prefix of in-flight temporary files; never listed
const TEMP_PREFIX: &str = ".tmp-";

/// Artifact store rooted at a local (or shared-mount) directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    /// Recursively collect every stored key
    async fn walk(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(TEMP_PREFIX) {
                    continue;
                }
                let key = format!("{}{}", key_prefix, name);
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else {
                    keys.push(key);
                }
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .walk()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, body: Bytes, policy: AccessPolicy) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        let temp = parent.join(format!("{}{}", TEMP_PREFIX, file_name));

        tokio::fs::write(&temp, &body).await?;
        apply_policy(&temp, policy).await?;
        tokio::fs::rename(&temp, &path).await?;

        tracing::debug!("Stored {} ({} bytes)", key, body.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn apply_policy(path: &Path, policy: AccessPolicy) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match policy {
        AccessPolicy::OwnerFullControl => 0o600,
    };
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn apply_policy(_path: &Path, _policy: AccessPolicy) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        store
            .put(
                "vpnconfigs/CSR1/us-east-1-vpn-2.conf",
                Bytes::from_static(b"<b/>"),
                AccessPolicy::OwnerFullControl,
            )
            .await
            .unwrap();
        store
            .put(
                "vpnconfigs/CSR1/us-east-1-vpn-1.conf",
                Bytes::from_static(b"<a/>"),
                AccessPolicy::OwnerFullControl,
            )
            .await
            .unwrap();

        let keys = store.list("vpnconfigs/CSR1/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "vpnconfigs/CSR1/us-east-1-vpn-1.conf",
                "vpnconfigs/CSR1/us-east-1-vpn-2.conf"
            ]
        );

        let body = store.get("vpnconfigs/CSR1/us-east-1-vpn-1.conf").await.unwrap();
        assert_eq!(body.as_ref(), b"<a/>");

        store.delete("vpnconfigs/CSR1/us-east-1-vpn-1.conf").await.unwrap();
        store.delete("vpnconfigs/CSR1/us-east-1-vpn-1.conf").await.unwrap();
        assert_eq!(store.list("vpnconfigs/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("never-created"));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.get("vpnconfigs/none.conf").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_escaping_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        let result = store
            .put("../outside.conf", Bytes::new(), AccessPolicy::OwnerFullControl)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_objects_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        store
            .put("p/x.conf", Bytes::from_static(b"x"), AccessPolicy::OwnerFullControl)
            .await
            .unwrap();

        let mode = std::fs::metadata(dir.path().join("p").join("x.conf"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
