//! Hub controller errors

use thiserror::Error;

use tv_core::error::StoreError;
use tv_protocol::ArtifactError;

use crate::inventory::InventoryError;

/// Errors that abort a hub reconciliation pass
#[derive(Error, Debug)]
pub enum HubError {
    /// A listing failed; nothing was changed this pass
    #[error("Inventory unavailable while listing {scope}: {source}")]
    InventoryUnavailable {
        scope: String,
        #[source]
        source: InventoryError,
    },

    /// A create/delete/describe call failed part way through a change
    #[error("Inventory call failed ({action}): {source}")]
    Inventory {
        action: String,
        #[source]
        source: InventoryError,
    },

    /// The connection document could not be turned into an artifact
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// The artifact could not be written
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl HubError {
    /// Wrap a listing failure
    pub fn unavailable(scope: impl Into<String>, source: InventoryError) -> Self {
        HubError::InventoryUnavailable {
            scope: scope.into(),
            source,
        }
    }

    /// Wrap a failure of a mutating or describe call
    pub fn inventory(action: impl Into<String>, source: InventoryError) -> Self {
        HubError::Inventory {
            action: action.into(),
            source,
        }
    }
}
