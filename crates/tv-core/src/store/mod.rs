//! Artifact store implementations

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::error::StoreError;

/// Reject keys that are empty or could escape a store root
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("vpnconfigs/CSR1/us-east-1-vpn-1.conf").is_ok());
        for bad in ["", "/abs", "dir/", "a//b", "../escape", "a/./b", "a\\b"] {
            assert!(validate_key(bad).is_err(), "{bad} should be rejected");
        }
    }
}
