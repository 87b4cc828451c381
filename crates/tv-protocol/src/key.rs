//! Object-store key layout
//!
//! Artifacts live at `<prefix>/<endpointLabel>/<region>-<connectionId>.conf`.
//! Grouping by endpoint label lets each router list only the artifacts
//! addressed to it.

use std::fmt;

/// File suffix of every artifact object
pub const ARTIFACT_SUFFIX: &str = ".conf";

/// Location of one artifact in the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    /// Store-wide prefix
    pub prefix: String,
    /// Router endpoint label
    pub endpoint_label: String,
    /// Inventory region of the connection
    pub region: String,
    /// VPN connection identifier
    pub connection_id: String,
}

impl ArtifactKey {
    /// Create a new key
    pub fn new(
        prefix: impl Into<String>,
        endpoint_label: impl Into<String>,
        region: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            endpoint_label: endpoint_label.into(),
            region: region.into(),
            connection_id: connection_id.into(),
        }
    }

    /// Render the full object key
    pub fn render(&self) -> String {
        format!(
            "{}{}-{}{}",
            endpoint_prefix(&self.prefix, &self.endpoint_label),
            self.region,
            self.connection_id,
            ARTIFACT_SUFFIX
        )
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Listing prefix for all artifacts addressed to one endpoint
pub fn endpoint_prefix(prefix: &str, endpoint_label: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/", endpoint_label)
    } else {
        format!("{}/{}/", prefix, endpoint_label)
    }
}
