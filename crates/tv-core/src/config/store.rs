//! Artifact store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where tunnel intent artifacts are exchanged
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the directory-backed object store
    pub root: PathBuf,

    /// Key prefix under which all artifacts are written
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: super::default_config_dir().join("artifacts"),
            prefix: "vpnconfigs".to_string(),
        }
    }
}
