//! Router configuration collaborator
//!
//! The agent drives the router through a declarative configuration API
//! addressed by object path. [`RouterApi`] is the seam; [`RestconfClient`]
//! talks to a real router and [`MemoryRouter`] stands in for one in tests
//! and dry runs.
//!
//! The router is the only record of which tunnel IDs are in use. Nothing
//! here caches its state between calls.

pub mod memory;
pub mod objects;
pub mod restconf;

use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::IpNet;
use thiserror::Error;

use tv_core::TunnelId;

pub use memory::{MemoryRouter, RouterOperation};
pub use objects::{BuildError, InterfaceObject, RouteObject, TunnelObject};
pub use restconf::RestconfClient;

/// Errors from the router configuration API
#[derive(Error, Debug)]
pub enum RouterError {
    /// The router answered with a non-success status
    #[error("Router API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never got an answer
    #[error("Router transport error: {0}")]
    Transport(String),

    /// The answer could not be understood
    #[error("Router response decode error: {0}")]
    Decode(String),

    /// Client credentials could not be loaded
    #[error("Router credentials error: {0}")]
    Credentials(String),
}

impl RouterError {
    /// Whether the router reported the object as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, RouterError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for RouterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RouterError::Decode(e.to_string())
        } else {
            RouterError::Transport(e.to_string())
        }
    }
}

/// A configured tunnel and the peer it is bound to
///
/// A binding is incomplete when only part of the tunnel exists on the
/// router, e.g. the encapsulation object of a split layout without its
/// crypto object. Its ID stays reserved for the same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelBinding {
    pub id: TunnelId,
    pub remote_addr: Ipv4Addr,
    pub complete: bool,
}

impl TunnelBinding {
    /// Binding of a fully configured tunnel
    pub fn new(id: TunnelId, remote_addr: Ipv4Addr) -> Self {
        Self {
            id,
            remote_addr,
            complete: true,
        }
    }

    /// Binding of a tunnel missing some of its objects
    pub fn incomplete(id: TunnelId, remote_addr: Ipv4Addr) -> Self {
        Self {
            id,
            remote_addr,
            complete: false,
        }
    }
}

/// Router configuration API consumed by the tunnel agent
///
/// Puts are idempotent upserts. Deleting an absent object fails with a
/// non-success status, except that `delete_tunnel` treats parts of the
/// tunnel that are already gone as removed.
#[async_trait]
pub trait RouterApi: Send + Sync {
    /// Tunnels currently configured, read live
    async fn list_tunnels(&self) -> Result<Vec<TunnelBinding>, RouterError>;

    /// Create or replace a tunnel with its crypto
    async fn put_tunnel(&self, tunnel: &TunnelObject) -> Result<(), RouterError>;

    /// Create or replace a tunnel interface
    async fn put_interface(&self, interface: &InterfaceObject) -> Result<(), RouterError>;

    /// Create or replace a static route
    async fn put_route(&self, route: &RouteObject) -> Result<(), RouterError>;

    /// Remove a tunnel interface
    async fn delete_interface(&self, name: &str) -> Result<(), RouterError>;

    /// Remove every object of a tunnel; success is the authoritative
    /// teardown signal
    async fn delete_tunnel(&self, id: TunnelId) -> Result<(), RouterError>;

    /// Remove the static route to a destination
    async fn delete_route(&self, destination: &IpNet) -> Result<(), RouterError>;
}
