//! Hub reconciler
//!
//! Brings VPN connections into agreement with gateway tags, one gateway per
//! pass. Regions are visited in the inventory's listing order and gateways
//! in listing order within a region; the first gateway that needs a change
//! is handled and the pass returns immediately.
//!
//! Three changes exist:
//! - **Provision**: a spoke gateway without hub connections gets one
//!   customer gateway, one VPN connection per provisioned endpoint label and
//!   a `create` artifact per connection.
//! - **Restore**: a spoke whose connections exist but whose `create`
//!   artifacts do not (the artifact write failed after the connection was
//!   created) gets the missing artifacts written again.
//! - **Decommission**: a non-spoke gateway with hub connections gets a
//!   `delete` artifact per connection, then the connections are deleted and
//!   the customer gateway removal is attempted.
//!
//! The reconciler holds no state between passes. Overlapping passes are not
//! excluded; they rely on the inventory and store calls being idempotent.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use ipnet::IpNet;

use tv_core::config::HubConfig;
use tv_core::error::StoreError;
use tv_core::{AccessPolicy, ArtifactStore, Region};
use tv_protocol::{ArtifactKey, IntentStatus, TransitConfig, TunnelIntentArtifact};

use crate::error::HubError;
use crate::inventory::{ConnectionRecord, GatewayRecord, Inventory, InventoryError, Tag};
use crate::scanner::{InventoryScanner, RegionSnapshot};

/// Name tag of the hub's customer gateway
pub const CUSTOMER_GATEWAY_NAME: &str = "Transit VPC Endpoint";

/// What a single gateway needs this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayChange {
    /// Already in agreement, or not configured for the hub at all
    None,
    /// Spoke without connections
    Provision,
    /// Spoke with connections; their artifacts must exist
    Restore,
    /// Connections left over from a former spoke
    Decommission,
}

/// Decide what a gateway needs, from its tags and its hub connections
pub fn plan(gateway: &GatewayRecord, snapshot: &RegionSnapshot, config: &HubConfig) -> GatewayChange {
    // Untagged gateways have never been configured for the hub
    if gateway.tags.is_none() {
        return GatewayChange::None;
    }

    let is_spoke = gateway.is_spoke(&config.hub_tag, &config.hub_tag_value);
    let has_connections = snapshot.connections_for(&gateway.id).next().is_some();

    match (is_spoke, has_connections) {
        (true, false) => GatewayChange::Provision,
        (true, true) => GatewayChange::Restore,
        (false, true) => GatewayChange::Decommission,
        (false, false) => GatewayChange::None,
    }
}

/// Result of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// No gateway needed a change
    Idle,
    /// Connections were created and `create` artifacts written
    Provisioned {
        region: Region,
        gateway_id: String,
        connections: Vec<String>,
    },
    /// Missing `create` artifacts of existing connections were rewritten
    Restored {
        region: Region,
        gateway_id: String,
        connections: Vec<String>,
    },
    /// `delete` artifacts were written and connections deleted
    Decommissioned {
        region: Region,
        gateway_id: String,
        connections: Vec<String>,
    },
}

/// The hub controller's reconciliation logic
pub struct HubReconciler {
    config: HubConfig,
    inventory: Arc<dyn Inventory>,
    store: Arc<dyn ArtifactStore>,
    scanner: InventoryScanner,
}

impl HubReconciler {
    /// Create a new reconciler
    pub fn new(
        config: HubConfig,
        inventory: Arc<dyn Inventory>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let marker = Tag::new(config.hub_tag.clone(), config.hub_tag_value.clone());
        let scanner = InventoryScanner::new(Arc::clone(&inventory), marker);
        Self {
            config,
            inventory,
            store,
            scanner,
        }
    }

    /// Run one pass, handling at most one gateway
    pub async fn run_pass(&self) -> Result<PassOutcome, HubError> {
        let account_id = self.account_id().await?;

        for region in self.scanner.regions().await? {
            let snapshot = self.scanner.scan(&region).await?;

            for gateway in &snapshot.gateways {
                let outcome = match plan(gateway, &snapshot, &self.config) {
                    GatewayChange::None => continue,
                    GatewayChange::Provision => {
                        self.provision(&account_id, &snapshot, gateway).await?
                    }
                    GatewayChange::Restore => {
                        self.restore(&account_id, &snapshot, gateway).await?
                    }
                    GatewayChange::Decommission => {
                        self.decommission(&account_id, &snapshot, gateway).await?
                    }
                };

                if let Some(outcome) = outcome {
                    return Ok(outcome);
                }
            }
        }

        tracing::debug!("No gateway needs a change");
        Ok(PassOutcome::Idle)
    }

    async fn account_id(&self) -> Result<String, HubError> {
        if let Some(account_id) = &self.config.account_id {
            return Ok(account_id.clone());
        }
        self.inventory
            .account_id()
            .await
            .map_err(|e| HubError::unavailable("account", e))
    }

    /// Create connections for a new spoke
    ///
    /// Returns `None` when the spoke's address block cannot be resolved, in
    /// which case nothing was created and scanning continues.
    async fn provision(
        &self,
        account_id: &str,
        snapshot: &RegionSnapshot,
        gateway: &GatewayRecord,
    ) -> Result<Option<PassOutcome>, HubError> {
        let region = &snapshot.region;

        let Some(network_id) = gateway.primary_network() else {
            tracing::warn!(
                "Spoke gateway {} in {} has no attached network, skipping",
                gateway.id,
                region
            );
            return Ok(None);
        };
        let spoke_subnet = self
            .inventory
            .network_cidr(region, network_id)
            .await
            .map_err(|e| HubError::inventory(format!("describe network {}", network_id), e))?;

        tracing::info!(
            "Provisioning spoke {} in {} ({} via {})",
            gateway.id,
            region,
            spoke_subnet,
            network_id
        );

        let customer_gateway_id = self
            .inventory
            .create_customer_gateway(region, self.config.customer_gateway_ip, self.config.bgp_asn)
            .await
            .map_err(|e| HubError::inventory("create customer gateway", e))?;
        self.inventory
            .tag_resource(
                region,
                &customer_gateway_id,
                &[Tag::new("Name", CUSTOMER_GATEWAY_NAME)],
            )
            .await
            .map_err(|e| HubError::inventory(format!("tag {}", customer_gateway_id), e))?;

        let mut connections = Vec::new();
        for label in self.config.endpoints.provisioned() {
            let connection_id = self
                .connect(account_id, region, gateway, &customer_gateway_id, label, spoke_subnet)
                .await?;
            connections.push(connection_id);
        }

        Ok(Some(PassOutcome::Provisioned {
            region: region.clone(),
            gateway_id: gateway.id.clone(),
            connections,
        }))
    }

    /// Finish a provisioning that stopped half way
    ///
    /// Rewrites the `create` artifacts missing for a spoke's connections and
    /// creates the connections missing for provisioned endpoint labels.
    /// Returns `None` when nothing is missing, or when the spoke's address
    /// block cannot be resolved.
    async fn restore(
        &self,
        account_id: &str,
        snapshot: &RegionSnapshot,
        gateway: &GatewayRecord,
    ) -> Result<Option<PassOutcome>, HubError> {
        let region = &snapshot.region;

        let mut labels = BTreeSet::new();
        let mut missing = Vec::new();
        for record in snapshot.connections_for(&gateway.id) {
            let label = self
                .config
                .endpoints
                .resolve(record.tag(&self.config.endpoint_tag))
                .to_string();
            let key = ArtifactKey::new(&self.config.store.prefix, &label, region.as_str(), &record.id);
            match self.store.get(&key.render()).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => missing.push((record, label.clone())),
                Err(e) => return Err(e.into()),
            }
            labels.insert(label);
        }
        let unconnected: Vec<&str> = self
            .config
            .endpoints
            .provisioned()
            .into_iter()
            .filter(|label| !labels.contains(*label))
            .collect();
        if missing.is_empty() && unconnected.is_empty() {
            return Ok(None);
        }

        let Some(network_id) = gateway.primary_network() else {
            tracing::warn!(
                "Spoke gateway {} in {} has no attached network, cannot restore artifacts",
                gateway.id,
                region
            );
            return Ok(None);
        };
        let spoke_subnet = self
            .inventory
            .network_cidr(region, network_id)
            .await
            .map_err(|e| HubError::inventory(format!("describe network {}", network_id), e))?;

        let mut connections = Vec::new();
        for (record, label) in missing {
            tracing::warn!(
                "VPN connection {} of {} has no artifact, writing it again",
                record.id,
                gateway.id
            );
            let document = self.configuration(region, &record.id).await?;
            self.emit(
                account_id,
                region,
                &label,
                &record.id,
                &document,
                spoke_subnet,
                IntentStatus::Create,
            )
            .await?;
            connections.push(record.id.clone());
        }

        if let Some(record) = snapshot.connections_for(&gateway.id).next() {
            for label in unconnected {
                tracing::warn!("Spoke {} has no connection on {}, creating it", gateway.id, label);
                let connection_id = self
                    .connect(
                        account_id,
                        region,
                        gateway,
                        &record.customer_gateway_id,
                        label,
                        spoke_subnet,
                    )
                    .await?;
                connections.push(connection_id);
            }
        }

        Ok(Some(PassOutcome::Restored {
            region: region.clone(),
            gateway_id: gateway.id.clone(),
            connections,
        }))
    }

    /// Tear down the connections of a former spoke
    ///
    /// Returns `None` when the spoke's address block can be resolved neither
    /// from the inventory nor from a previously written artifact.
    async fn decommission(
        &self,
        account_id: &str,
        snapshot: &RegionSnapshot,
        gateway: &GatewayRecord,
    ) -> Result<Option<PassOutcome>, HubError> {
        let region = &snapshot.region;
        let records: Vec<&ConnectionRecord> = snapshot.connections_for(&gateway.id).collect();

        tracing::info!(
            "Decommissioning {} in {} ({} connections)",
            gateway.id,
            region,
            records.len()
        );

        // Resolve everything before the first side effect
        let mut teardown = Vec::new();
        for record in records {
            let label = self
                .config
                .endpoints
                .resolve(record.tag(&self.config.endpoint_tag))
                .to_string();
            let document = self.configuration(region, &record.id).await?;
            let key = ArtifactKey::new(&self.config.store.prefix, &label, region.as_str(), &record.id);

            let Some(spoke_subnet) = self.spoke_subnet(region, gateway, &key).await? else {
                tracing::warn!(
                    "Cannot resolve spoke subnet for {} ({}), skipping gateway {}",
                    record.id,
                    key,
                    gateway.id
                );
                return Ok(None);
            };
            teardown.push((record, label, document, spoke_subnet));
        }

        let mut connections = Vec::new();
        let mut customer_gateways = BTreeSet::new();
        for (record, label, document, spoke_subnet) in teardown {
            self.emit(
                account_id,
                region,
                &label,
                &record.id,
                &document,
                spoke_subnet,
                IntentStatus::Delete,
            )
            .await?;

            match self.inventory.delete_vpn_connection(region, &record.id).await {
                Ok(()) => tracing::info!("Deleted VPN connection {}", record.id),
                Err(InventoryError::Conflict(reason)) | Err(InventoryError::NotFound(reason)) => {
                    tracing::info!("VPN connection {} already gone: {}", record.id, reason)
                }
                Err(e) => {
                    return Err(HubError::inventory(
                        format!("delete VPN connection {}", record.id),
                        e,
                    ))
                }
            }

            customer_gateways.insert(record.customer_gateway_id.clone());
            connections.push(record.id.clone());
        }

        for customer_gateway_id in customer_gateways {
            match self
                .inventory
                .delete_customer_gateway(region, &customer_gateway_id)
                .await
            {
                Ok(()) => tracing::info!("Deleted customer gateway {}", customer_gateway_id),
                Err(InventoryError::Conflict(reason)) => {
                    tracing::info!(
                        "Customer gateway {} still in use: {}",
                        customer_gateway_id,
                        reason
                    )
                }
                Err(e) => tracing::warn!(
                    "Failed to delete customer gateway {}: {}",
                    customer_gateway_id,
                    e
                ),
            }
        }

        Ok(Some(PassOutcome::Decommissioned {
            region: region.clone(),
            gateway_id: gateway.id.clone(),
            connections,
        }))
    }

    /// Create, tag and record one VPN connection of a spoke
    async fn connect(
        &self,
        account_id: &str,
        region: &Region,
        gateway: &GatewayRecord,
        customer_gateway_id: &str,
        label: &str,
        spoke_subnet: IpNet,
    ) -> Result<String, HubError> {
        let connection_id = self
            .inventory
            .create_vpn_connection(region, &gateway.id, customer_gateway_id)
            .await
            .map_err(|e| HubError::inventory(format!("create VPN connection for {}", gateway.id), e))?;

        let tags = [
            Tag::new("Name", format!("{}-to-Transit-VPC {}", gateway.id, label)),
            Tag::new(self.config.hub_tag.clone(), self.config.hub_tag_value.clone()),
            Tag::new(self.config.endpoint_tag.clone(), label),
        ];
        self.inventory
            .tag_resource(region, &connection_id, &tags)
            .await
            .map_err(|e| HubError::inventory(format!("tag {}", connection_id), e))?;

        let document = self.configuration(region, &connection_id).await?;
        self.emit(
            account_id,
            region,
            label,
            &connection_id,
            &document,
            spoke_subnet,
            IntentStatus::Create,
        )
        .await?;

        tracing::info!(
            "Created VPN connection {} for {} on {}",
            connection_id,
            gateway.id,
            label
        );
        Ok(connection_id)
    }

    async fn configuration(&self, region: &Region, connection_id: &str) -> Result<String, HubError> {
        self.inventory
            .connection_configuration(region, connection_id)
            .await
            .map_err(|e| HubError::inventory(format!("describe VPN connection {}", connection_id), e))
    }

    /// Spoke address block for a teardown
    ///
    /// Prefers the live network; a detached gateway falls back to the
    /// subnet recorded in the connection's existing artifact.
    async fn spoke_subnet(
        &self,
        region: &Region,
        gateway: &GatewayRecord,
        key: &ArtifactKey,
    ) -> Result<Option<IpNet>, HubError> {
        if let Some(network_id) = gateway.primary_network() {
            let cidr = self
                .inventory
                .network_cidr(region, network_id)
                .await
                .map_err(|e| HubError::inventory(format!("describe network {}", network_id), e))?;
            return Ok(Some(cidr));
        }

        match self.store.get(&key.render()).await {
            Ok(body) => match TunnelIntentArtifact::from_bytes(&body) {
                Ok(artifact) => Ok(Some(artifact.transit.spoke_subnet)),
                Err(e) => {
                    tracing::warn!("Existing artifact {} is malformed: {}", key, e);
                    Ok(None)
                }
            },
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit(
        &self,
        account_id: &str,
        region: &Region,
        label: &str,
        connection_id: &str,
        document: &str,
        spoke_subnet: IpNet,
        status: IntentStatus,
    ) -> Result<(), HubError> {
        let transit = TransitConfig {
            account_id: account_id.to_string(),
            vpn_endpoint: label.to_string(),
            spoke_subnet,
            customer_local_ip: self.config.hub_local_ip,
            status,
        };
        let artifact = TunnelIntentArtifact::from_connection_config(document, transit)?;
        let key = ArtifactKey::new(&self.config.store.prefix, label, region.as_str(), connection_id);

        self.store
            .put(
                &key.render(),
                Bytes::from(artifact.to_xml()?),
                AccessPolicy::OwnerFullControl,
            )
            .await?;

        tracing::info!("Wrote {} artifact {}", status, key);
        Ok(())
    }
}
