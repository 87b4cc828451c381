//! Router reconciler
//!
//! Applies every artifact addressed to this router's endpoint label, one at
//! a time and in listing order:
//!
//! - `create`: if a tunnel is fully bound to the artifact's remote peer,
//!   nothing is written. Otherwise allocate a tunnel ID (the peer's own if a
//!   partly created tunnel already holds one, else the lowest free one) and
//!   push the tunnel, its interface and the spoke route. Create artifacts
//!   stay in the store.
//! - `delete`: remove the interface, the tunnel and the route of the bound
//!   tunnel, then delete the artifact. Interface and route failures are only
//!   logged; the artifact is kept when the tunnel removal fails. With no
//!   bound tunnel there is nothing to remove and the artifact is deleted.
//!
//! A failing artifact never stops the others.

use std::sync::Arc;

use tv_core::config::AgentConfig;
use tv_core::{ArtifactStore, TunnelId};
use tv_protocol::{endpoint_prefix, IntentStatus, TunnelIntentArtifact};

use crate::allocator;
use crate::error::AgentError;
use crate::router::{InterfaceObject, RouteObject, RouterApi, TunnelObject};

/// What happened to one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// A new tunnel was configured
    Created(TunnelId),
    /// The peer already had a tunnel
    AlreadyPresent(TunnelId),
    /// The tunnel was removed and the artifact deleted
    Removed(TunnelId),
    /// No tunnel was bound; the artifact was deleted
    AlreadyAbsent,
}

/// Summary of one pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Artifacts that were applied, by key
    pub applied: Vec<(String, ArtifactOutcome)>,
    /// Artifacts that could not be parsed and were left in place
    pub malformed: Vec<String>,
    /// Artifacts whose processing failed
    pub failed: Vec<(String, AgentError)>,
}

impl PassReport {
    /// Number of artifacts looked at
    pub fn total(&self) -> usize {
        self.applied.len() + self.malformed.len() + self.failed.len()
    }
}

/// The tunnel agent's reconciliation logic
pub struct RouterReconciler {
    config: AgentConfig,
    router: Arc<dyn RouterApi>,
    store: Arc<dyn ArtifactStore>,
}

impl RouterReconciler {
    /// Create a new reconciler
    pub fn new(config: AgentConfig, router: Arc<dyn RouterApi>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            router,
            store,
        }
    }

    /// Apply every artifact addressed to this endpoint
    pub async fn run_pass(&self) -> Result<PassReport, AgentError> {
        let prefix = endpoint_prefix(&self.config.store.prefix, &self.config.endpoint_label);
        let keys = self.store.list(&prefix).await?;
        tracing::debug!("Found {} artifacts under {}", keys.len(), prefix);

        let mut report = PassReport::default();
        for key in keys {
            let artifact = match self.load(&key).await {
                Ok(artifact) => artifact,
                Err(AgentError::Artifact(e)) => {
                    tracing::warn!("Skipping malformed artifact {}: {}", key, e);
                    report.malformed.push(key);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Failed to read artifact {}: {}", key, e);
                    report.failed.push((key, e));
                    continue;
                }
            };

            match self.apply(&key, &artifact).await {
                Ok(outcome) => report.applied.push((key, outcome)),
                Err(e) => {
                    tracing::error!(
                        "Failed to {} tunnel for peer {} ({}): {}",
                        artifact.status(),
                        artifact.remote_peer(),
                        key,
                        e
                    );
                    report.failed.push((key, e));
                }
            }
        }

        Ok(report)
    }

    async fn load(&self, key: &str) -> Result<TunnelIntentArtifact, AgentError> {
        let body = self.store.get(key).await?;
        Ok(TunnelIntentArtifact::from_bytes(&body)?)
    }

    /// Apply one artifact
    pub async fn apply(
        &self,
        key: &str,
        artifact: &TunnelIntentArtifact,
    ) -> Result<ArtifactOutcome, AgentError> {
        match artifact.status() {
            IntentStatus::Create => self.create(artifact).await,
            IntentStatus::Delete => self.delete(key, artifact).await,
        }
    }

    async fn create(&self, artifact: &TunnelIntentArtifact) -> Result<ArtifactOutcome, AgentError> {
        let peer = artifact.remote_peer();
        let bindings = self.router.list_tunnels().await?;

        match allocator::binding(&bindings, peer) {
            Some(binding) if binding.complete => {
                tracing::debug!("Peer {} already bound to tunnel {}", peer, binding.id);
                return Ok(ArtifactOutcome::AlreadyPresent(binding.id));
            }
            Some(binding) => {
                tracing::info!("Tunnel {} to {} is incomplete, configuring it again", binding.id, peer);
            }
            None => {}
        }

        let id = allocator::allocate(&bindings, peer, self.config.max_tunnels)?;
        let tunnel = TunnelObject::builder()
            .id(id)
            .local_addr(artifact.transit.customer_local_ip)
            .remote_addr(peer)
            .local_identity(artifact.tunnel.customer_gateway.outside_ip)
            .pre_shared_key(artifact.tunnel.pre_shared_key.clone())
            .ike(&self.config.ike)
            .build()?;

        tracing::info!("Creating tunnel {} to {}", id, peer);
        self.router.put_tunnel(&tunnel).await?;
        self.put_interface_and_route(artifact, id).await?;

        tracing::info!(
            "Tunnel {} to {} is up for {}",
            id,
            peer,
            artifact.transit.spoke_subnet
        );
        Ok(ArtifactOutcome::Created(id))
    }

    async fn put_interface_and_route(
        &self,
        artifact: &TunnelIntentArtifact,
        id: TunnelId,
    ) -> Result<(), AgentError> {
        let name = id.interface_name(&self.config.router.interface_prefix);
        let interface = InterfaceObject::builder()
            .name(name.clone())
            .address(artifact.interface_address())
            .build()?;
        let route = RouteObject::builder()
            .destination(artifact.transit.spoke_subnet)
            .next_hop(artifact.tunnel.vpn_gateway.inside_ip)
            .interface(name)
            .build()?;

        self.router.put_interface(&interface).await?;
        self.router.put_route(&route).await?;
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
        artifact: &TunnelIntentArtifact,
    ) -> Result<ArtifactOutcome, AgentError> {
        let peer = artifact.remote_peer();
        let bindings = self.router.list_tunnels().await?;

        let Some(id) = allocator::lookup(&bindings, peer) else {
            tracing::info!("No tunnel bound to {}, removing artifact {}", peer, key);
            self.store.delete(key).await?;
            return Ok(ArtifactOutcome::AlreadyAbsent);
        };

        let name = id.interface_name(&self.config.router.interface_prefix);
        tracing::info!("Deleting {} and tunnel {} to {}", name, id, peer);

        if let Err(e) = self.router.delete_interface(&name).await {
            tracing::warn!("Failed to delete interface {}: {}", name, e);
        }
        let tunnel_result = self.router.delete_tunnel(id).await;
        let subnet = artifact.transit.spoke_subnet;
        if let Err(e) = self.router.delete_route(&subnet).await {
            tracing::warn!("Failed to delete route to {}: {}", subnet, e);
        }

        // Only a removed tunnel consumes the artifact
        tunnel_result?;
        self.store.delete(key).await?;

        tracing::info!("Tunnel {} to {} removed, artifact {} deleted", id, peer, key);
        Ok(ArtifactOutcome::Removed(id))
    }
}
