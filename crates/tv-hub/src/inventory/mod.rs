//! Cloud inventory collaborator
//!
//! The inventory is the source of truth for which gateways want spoke
//! connectivity. The hub reads gateways and VPN connections from it and
//! creates or deletes customer gateways and VPN connections through it.
//!
//! Implementations are expected to behave idempotently where the cloud API
//! does: creating a customer gateway with an address/ASN pair that already
//! exists returns the existing gateway, deleting an absent VPN connection is
//! harmless, and deleting a customer gateway still in use fails with
//! [`InventoryError::Conflict`].

pub mod fixture;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tv_core::Region;

pub use fixture::FixtureInventory;

/// Errors reported by the inventory collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// The API could not be reached or returned a server-side failure
    #[error("Inventory API unavailable: {0}")]
    Unavailable(String),

    /// The resource already exists, is still in use, or is already gone
    #[error("Resource conflict: {0}")]
    Conflict(String),

    /// The referenced resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Lifecycle state of a virtual private gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Pending,
    Available,
    Attached,
    Detached,
    Deleting,
    Deleted,
}

/// Lifecycle state of a VPN connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Available,
    Deleting,
    Deleted,
}

/// A key/value resource tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One cloud-side network gateway, read fresh on every pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRecord {
    /// Gateway identifier (e.g. `vgw-1`)
    pub id: String,
    /// Region the gateway lives in
    pub region: Region,
    /// Lifecycle state
    pub state: GatewayState,
    /// Tags; `None` when the gateway has never been tagged
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    /// Identifiers of attached networks, in attachment order
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl GatewayRecord {
    /// Value of a tag, if the gateway carries it
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(String::as_str)
    }

    /// Whether the gateway is tagged as a spoke
    ///
    /// An empty or missing tag value never matches.
    pub fn is_spoke(&self, hub_tag: &str, hub_tag_value: &str) -> bool {
        match self.tag(hub_tag) {
            Some(value) => !value.is_empty() && value == hub_tag_value,
            None => false,
        }
    }

    /// The attached network whose address block is the spoke subnet
    pub fn primary_network(&self) -> Option<&str> {
        self.attachments.first().map(String::as_str)
    }
}

/// An existing VPN connection between a gateway and the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connection identifier (e.g. `vpn-0a1b`)
    pub id: String,
    /// Gateway the connection belongs to
    pub gateway_id: String,
    /// Customer gateway (hub side) the connection terminates on
    pub customer_gateway_id: String,
    /// Lifecycle state
    pub state: ConnectionState,
    /// Tags, including the hub marker and the endpoint label
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Configuration document returned by the inventory
    pub configuration: String,
}

impl ConnectionRecord {
    /// Value of a tag, if present
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Inventory API consumed by the hub controller
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Account the hub runs in
    async fn account_id(&self) -> Result<String, InventoryError>;

    /// All regions, in the provider's fixed listing order
    async fn list_regions(&self) -> Result<Vec<Region>, InventoryError>;

    /// Gateways in `region` whose state is one of `states`
    async fn list_gateways(
        &self,
        region: &Region,
        states: &[GatewayState],
    ) -> Result<Vec<GatewayRecord>, InventoryError>;

    /// VPN connections in `region` whose state is one of `states` and which carry `tag`
    async fn list_connections(
        &self,
        region: &Region,
        states: &[ConnectionState],
        tag: &Tag,
    ) -> Result<Vec<ConnectionRecord>, InventoryError>;

    /// Create (or return the existing) `ipsec.1` customer gateway for an address/ASN pair
    async fn create_customer_gateway(
        &self,
        region: &Region,
        public_ip: Ipv4Addr,
        bgp_asn: u32,
    ) -> Result<String, InventoryError>;

    /// Delete a customer gateway; fails with `Conflict` while connections reference it
    async fn delete_customer_gateway(&self, region: &Region, id: &str) -> Result<(), InventoryError>;

    /// Create a static-routes-only `ipsec.1` VPN connection
    async fn create_vpn_connection(
        &self,
        region: &Region,
        gateway_id: &str,
        customer_gateway_id: &str,
    ) -> Result<String, InventoryError>;

    /// Delete a VPN connection
    async fn delete_vpn_connection(&self, region: &Region, id: &str) -> Result<(), InventoryError>;

    /// Configuration document of a VPN connection
    async fn connection_configuration(&self, region: &Region, id: &str)
        -> Result<String, InventoryError>;

    /// Address block of a network
    async fn network_cidr(&self, region: &Region, network_id: &str) -> Result<IpNet, InventoryError>;

    /// Attach tags to any resource
    async fn tag_resource(&self, region: &Region, id: &str, tags: &[Tag])
        -> Result<(), InventoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(tags: Option<&[(&str, &str)]>) -> GatewayRecord {
        GatewayRecord {
            id: "vgw-1".to_string(),
            region: Region::from("us-east-1"),
            state: GatewayState::Attached,
            tags: tags.map(|pairs| {
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            }),
            attachments: vec!["vpc-1".to_string()],
        }
    }

    #[test]
    fn test_is_spoke_requires_exact_value() {
        assert!(gateway(Some(&[("hub-tag", "spoke")])).is_spoke("hub-tag", "spoke"));
        assert!(!gateway(Some(&[("hub-tag", "retired")])).is_spoke("hub-tag", "spoke"));
        assert!(!gateway(Some(&[("other", "spoke")])).is_spoke("hub-tag", "spoke"));
        assert!(!gateway(None).is_spoke("hub-tag", "spoke"));
    }

    #[test]
    fn test_empty_tag_value_is_not_spoke() {
        assert!(!gateway(Some(&[("hub-tag", "")])).is_spoke("hub-tag", ""));
    }

    #[test]
    fn test_gateway_state_wire_format() {
        let json = serde_json::to_string(&GatewayState::Attached).unwrap();
        assert_eq!(json, "\"attached\"");
    }
}
