//! Fixture inventory
//!
//! An in-memory stand-in for the cloud inventory API. It behaves like the
//! real API where the hub depends on it (idempotent customer gateway
//! creation, in-use conflicts, state filtering) and can be persisted to a
//! JSON snapshot so the hub binary can run against a lab inventory.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use tv_core::Region;
use tv_protocol::{ConnectionConfig, TunnelEndpoint, TunnelPayload};

use super::{
    ConnectionRecord, ConnectionState, GatewayRecord, GatewayState, Inventory, InventoryError, Tag,
};

/// Serializable contents of a fixture inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Account the hub runs in
    pub account_id: String,
    /// Regions in listing order
    pub regions: Vec<RegionInventory>,
    /// Counter behind generated resource identifiers
    #[serde(default)]
    pub next_id: u64,
}

/// Resources of one region
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionInventory {
    pub name: Region,
    #[serde(default)]
    pub gateways: Vec<GatewayRecord>,
    /// Address block per network identifier
    #[serde(default)]
    pub networks: BTreeMap<String, IpNet>,
    #[serde(default)]
    pub customer_gateways: Vec<CustomerGatewayRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    /// Simulate an API outage for every call in this region
    #[serde(default)]
    pub unavailable: bool,
}

/// A hub-side customer gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerGatewayRecord {
    pub id: String,
    pub public_ip: Ipv4Addr,
    pub bgp_asn: u32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// In-memory inventory
#[derive(Debug, Default)]
pub struct FixtureInventory {
    state: Mutex<InventorySnapshot>,
}

impl FixtureInventory {
    /// Create an empty inventory for `account_id`
    pub fn new(account_id: impl Into<String>) -> Self {
        Self::from_snapshot(InventorySnapshot {
            account_id: account_id.into(),
            ..InventorySnapshot::default()
        })
    }

    /// Create an inventory from snapshot contents
    pub fn from_snapshot(snapshot: InventorySnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    /// Load a JSON snapshot from disk
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        let snapshot: InventorySnapshot = serde_json::from_slice(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Persist the current contents as a JSON snapshot
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = {
            let state = self.state.lock().await;
            serde_json::to_vec_pretty(&*state)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> InventorySnapshot {
        self.state.lock().await.clone()
    }

    /// Add a region at the end of the listing order
    pub async fn add_region(&self, region: impl Into<Region>) {
        let region = region.into();
        let mut state = self.state.lock().await;
        if !state.regions.iter().any(|r| r.name == region) {
            state.regions.push(RegionInventory {
                name: region,
                ..RegionInventory::default()
            });
        }
    }

    /// Register a network and its address block
    pub async fn add_network(&self, region: &Region, network_id: &str, cidr: IpNet) {
        let mut state = self.state.lock().await;
        if let Some(r) = region_mut(&mut state, region) {
            r.networks.insert(network_id.to_string(), cidr);
        }
    }

    /// Add or replace a gateway
    pub async fn put_gateway(&self, gateway: GatewayRecord) {
        let mut state = self.state.lock().await;
        if let Some(r) = region_mut(&mut state, &gateway.region.clone()) {
            r.gateways.retain(|g| g.id != gateway.id);
            r.gateways.push(gateway);
        }
    }

    /// Replace a gateway's tags
    pub async fn set_gateway_tags(
        &self,
        region: &Region,
        gateway_id: &str,
        tags: Option<BTreeMap<String, String>>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(gateway) = region_mut(&mut state, region)
            .and_then(|r| r.gateways.iter_mut().find(|g| g.id == gateway_id))
        {
            gateway.tags = tags;
        }
    }

    /// Toggle a simulated outage for a region
    pub async fn set_unavailable(&self, region: &Region, unavailable: bool) {
        let mut state = self.state.lock().await;
        if let Some(r) = region_mut(&mut state, region) {
            r.unavailable = unavailable;
        }
    }

    /// VPN connections of a region that have not been deleted
    pub async fn live_connections(&self, region: &Region) -> Vec<ConnectionRecord> {
        let state = self.state.lock().await;
        state
            .regions
            .iter()
            .find(|r| &r.name == region)
            .map(|r| {
                r.connections
                    .iter()
                    .filter(|c| c.state != ConnectionState::Deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Customer gateways of a region
    pub async fn customer_gateways(&self, region: &Region) -> Vec<CustomerGatewayRecord> {
        let state = self.state.lock().await;
        state
            .regions
            .iter()
            .find(|r| &r.name == region)
            .map(|r| r.customer_gateways.clone())
            .unwrap_or_default()
    }
}

fn region_mut<'a>(state: &'a mut InventorySnapshot, region: &Region) -> Option<&'a mut RegionInventory> {
    state.regions.iter_mut().find(|r| &r.name == region)
}

/// Look up a region, failing like the API would during an outage
fn available_region<'a>(
    state: &'a mut InventorySnapshot,
    region: &Region,
) -> Result<&'a mut RegionInventory, InventoryError> {
    let r = region_mut(state, region)
        .ok_or_else(|| InventoryError::Unavailable(format!("unknown region {}", region)))?;
    if r.unavailable {
        return Err(InventoryError::Unavailable(format!("region {} is not responding", region)));
    }
    Ok(r)
}

fn next_id(state: &mut InventorySnapshot, kind: &str) -> String {
    state.next_id += 1;
    format!("{}-{:08x}", kind, state.next_id)
}

/// Generate the configuration document the API returns for a new connection
fn render_configuration(
    seq: u64,
    connection_id: &str,
    customer_gateway: &CustomerGatewayRecord,
    gateway_id: &str,
) -> Result<String, InventoryError> {
    let tunnel = |n: u8| -> TunnelPayload {
        let block = ((seq * 2 + n as u64) % 64) as u8;
        TunnelPayload {
            customer_gateway: TunnelEndpoint::new(
                customer_gateway.public_ip,
                Ipv4Addr::new(169, 254, block, 2),
            ),
            vpn_gateway: TunnelEndpoint::new(
                Ipv4Addr::new(52, n + 1, (seq >> 8) as u8, seq as u8),
                Ipv4Addr::new(169, 254, block, 1),
            ),
            pre_shared_key: format!("psk_{}_{}", connection_id.replace('-', "_"), n),
        }
    };

    ConnectionConfig {
        connection_id: connection_id.to_string(),
        customer_gateway_id: customer_gateway.id.clone(),
        vpn_gateway_id: gateway_id.to_string(),
        tunnels: vec![tunnel(0), tunnel(1)],
    }
    .to_xml()
    .map_err(|e| InventoryError::Unavailable(e.to_string()))
}

#[async_trait]
impl Inventory for FixtureInventory {
    async fn account_id(&self) -> Result<String, InventoryError> {
        let state = self.state.lock().await;
        if state.account_id.is_empty() {
            return Err(InventoryError::Unavailable("no account in execution context".to_string()));
        }
        Ok(state.account_id.clone())
    }

    async fn list_regions(&self) -> Result<Vec<Region>, InventoryError> {
        let state = self.state.lock().await;
        Ok(state.regions.iter().map(|r| r.name.clone()).collect())
    }

    async fn list_gateways(
        &self,
        region: &Region,
        states: &[GatewayState],
    ) -> Result<Vec<GatewayRecord>, InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;
        Ok(r.gateways
            .iter()
            .filter(|g| states.contains(&g.state))
            .cloned()
            .collect())
    }

    async fn list_connections(
        &self,
        region: &Region,
        states: &[ConnectionState],
        tag: &Tag,
    ) -> Result<Vec<ConnectionRecord>, InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;
        Ok(r.connections
            .iter()
            .filter(|c| states.contains(&c.state) && c.tag(&tag.key) == Some(tag.value.as_str()))
            .cloned()
            .collect())
    }

    async fn create_customer_gateway(
        &self,
        region: &Region,
        public_ip: Ipv4Addr,
        bgp_asn: u32,
    ) -> Result<String, InventoryError> {
        let mut state = self.state.lock().await;
        available_region(&mut state, region)?;
        let id = next_id(&mut state, "cgw");
        let r = available_region(&mut state, region)?;

        if let Some(existing) = r
            .customer_gateways
            .iter()
            .find(|c| c.public_ip == public_ip && c.bgp_asn == bgp_asn)
        {
            return Ok(existing.id.clone());
        }

        r.customer_gateways.push(CustomerGatewayRecord {
            id: id.clone(),
            public_ip,
            bgp_asn,
            tags: BTreeMap::new(),
        });
        Ok(id)
    }

    async fn delete_customer_gateway(&self, region: &Region, id: &str) -> Result<(), InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;

        let in_use = r
            .connections
            .iter()
            .any(|c| c.customer_gateway_id == id && c.state != ConnectionState::Deleted);
        if in_use {
            return Err(InventoryError::Conflict(format!(
                "customer gateway {} has existing VPN connections",
                id
            )));
        }

        let before = r.customer_gateways.len();
        r.customer_gateways.retain(|c| c.id != id);
        if r.customer_gateways.len() == before {
            return Err(InventoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn create_vpn_connection(
        &self,
        region: &Region,
        gateway_id: &str,
        customer_gateway_id: &str,
    ) -> Result<String, InventoryError> {
        let mut state = self.state.lock().await;
        available_region(&mut state, region)?;
        let id = next_id(&mut state, "vpn");
        let seq = state.next_id;
        let r = available_region(&mut state, region)?;

        if !r.gateways.iter().any(|g| g.id == gateway_id) {
            return Err(InventoryError::NotFound(gateway_id.to_string()));
        }
        let customer_gateway = r
            .customer_gateways
            .iter()
            .find(|c| c.id == customer_gateway_id)
            .ok_or_else(|| InventoryError::NotFound(customer_gateway_id.to_string()))?;

        let configuration = render_configuration(seq, &id, customer_gateway, gateway_id)?;
        r.connections.push(ConnectionRecord {
            id: id.clone(),
            gateway_id: gateway_id.to_string(),
            customer_gateway_id: customer_gateway_id.to_string(),
            state: ConnectionState::Available,
            tags: BTreeMap::new(),
            configuration,
        });
        Ok(id)
    }

    async fn delete_vpn_connection(&self, region: &Region, id: &str) -> Result<(), InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;
        let connection = r
            .connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))?;
        if connection.state == ConnectionState::Deleted {
            return Err(InventoryError::Conflict(format!("{} is already deleted", id)));
        }
        connection.state = ConnectionState::Deleted;
        Ok(())
    }

    async fn connection_configuration(
        &self,
        region: &Region,
        id: &str,
    ) -> Result<String, InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;
        r.connections
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.configuration.clone())
            .ok_or_else(|| InventoryError::NotFound(id.to_string()))
    }

    async fn network_cidr(&self, region: &Region, network_id: &str) -> Result<IpNet, InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;
        r.networks
            .get(network_id)
            .copied()
            .ok_or_else(|| InventoryError::NotFound(network_id.to_string()))
    }

    async fn tag_resource(&self, region: &Region, id: &str, tags: &[Tag]) -> Result<(), InventoryError> {
        let mut state = self.state.lock().await;
        let r = available_region(&mut state, region)?;

        let target = if let Some(c) = r.connections.iter_mut().find(|c| c.id == id) {
            &mut c.tags
        } else if let Some(c) = r.customer_gateways.iter_mut().find(|c| c.id == id) {
            &mut c.tags
        } else if let Some(g) = r.gateways.iter_mut().find(|g| g.id == id) {
            g.tags.get_or_insert_with(BTreeMap::new)
        } else {
            return Err(InventoryError::NotFound(id.to_string()));
        };

        for tag in tags {
            target.insert(tag.key.clone(), tag.value.clone());
        }
        Ok(())
    }
}
