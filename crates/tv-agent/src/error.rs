//! Tunnel agent errors

use thiserror::Error;

use tv_core::error::StoreError;
use tv_protocol::ArtifactError;

use crate::allocator::AllocationError;
use crate::router::{BuildError, RouterError};

/// Failure while applying one artifact
///
/// Only [`AgentError::Store`] raised while listing artifacts ends a pass;
/// every other failure is confined to the artifact that caused it.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Router API rejected a step or could not be reached
    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    /// No tunnel ID left
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// A router object was incomplete
    #[error("Router object error: {0}")]
    Build(#[from] BuildError),

    /// Artifact could not be parsed
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Artifact store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
