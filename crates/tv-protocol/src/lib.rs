//! tv-protocol: Tunnel intent contract for the transit VPN hub
//!
//! This crate defines the durable artifact exchanged between the hub
//! controller and the tunnel agents through the object store. The hub
//! never talks to a router directly; it writes one artifact per VPN
//! connection and each agent reconciles its router against them.

pub mod artifact;
pub mod codec;
pub mod connection;
pub mod error;
pub mod key;

pub use artifact::{IntentStatus, TransitConfig, TunnelIntentArtifact};
pub use connection::{ConnectionConfig, TunnelEndpoint, TunnelPayload};
pub use error::ArtifactError;
pub use key::{endpoint_prefix, ArtifactKey, ARTIFACT_SUFFIX};
