//! tv-agent: Transit VPN tunnel agent
//!
//! The agent runs beside one hub router. It reads the tunnel intent
//! artifacts addressed to its endpoint label from the object store and
//! drives the router's tunnel, interface and route configuration to match.

pub mod allocator;
pub mod error;
pub mod reconciler;
pub mod router;

pub use allocator::AllocationError;
pub use error::AgentError;
pub use reconciler::{ArtifactOutcome, PassReport, RouterReconciler};
pub use router::{BuildError, MemoryRouter, RestconfClient, RouterApi, RouterError, TunnelBinding};
