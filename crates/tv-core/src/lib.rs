//! tv-core: Core abstractions and configuration for the transit VPN hub
//!
//! This crate provides the configuration structures, error types, and the
//! artifact store shared by the hub controller and the tunnel agent.

pub mod config;
pub mod error;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{ConfigError, StoreError};
pub use traits::{AccessPolicy, ArtifactStore};
pub use types::{Region, TunnelId};
