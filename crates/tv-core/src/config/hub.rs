//! Hub controller configuration

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::StoreConfig;
use crate::error::ConfigError;

/// Configuration for the hub controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Account written into artifacts; resolved from the inventory when unset
    pub account_id: Option<String>,

    /// Tag key marking a gateway as a spoke
    pub hub_tag: String,

    /// Tag value that makes a gateway a spoke; anything else means "not a spoke"
    pub hub_tag_value: String,

    /// Tag key recording which endpoint a VPN connection terminates on
    pub endpoint_tag: String,

    /// Endpoint labels of the hub routers
    pub endpoints: EndpointLabels,

    /// Public address of the hub routers, registered as the customer gateway
    pub customer_gateway_ip: Ipv4Addr,

    /// ASN registered with the customer gateway
    pub bgp_asn: u32,

    /// Hub router's private address, written as `customer_local_ip`
    pub hub_local_ip: Ipv4Addr,

    /// Artifact store
    pub store: StoreConfig,

    /// Time between reconciliation passes
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// JSON snapshot backing the fixture inventory
    pub inventory_snapshot: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            hub_tag: "transitvpc:spoke".to_string(),
            hub_tag_value: "true".to_string(),
            endpoint_tag: "transitvpc:endpoint".to_string(),
            endpoints: EndpointLabels::default(),
            customer_gateway_ip: Ipv4Addr::UNSPECIFIED,
            bgp_asn: 65000,
            hub_local_ip: Ipv4Addr::UNSPECIFIED,
            store: StoreConfig::default(),
            poll_interval: Duration::from_secs(60),
            inventory_snapshot: super::default_config_dir().join("inventory.json"),
        }
    }
}

impl HubConfig {
    /// Reject configurations a pass could not act on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub_tag.is_empty() {
            return Err(ConfigError::MissingField("hub_tag".to_string()));
        }
        if self.hub_tag_value.is_empty() {
            return Err(ConfigError::MissingField("hub_tag_value".to_string()));
        }
        if self.customer_gateway_ip.is_unspecified() {
            return Err(ConfigError::MissingField("customer_gateway_ip".to_string()));
        }
        if self.hub_local_ip.is_unspecified() {
            return Err(ConfigError::MissingField("hub_local_ip".to_string()));
        }
        if self.endpoints.primary == self.endpoints.secondary {
            return Err(ConfigError::Invalid(
                "primary and secondary endpoint labels must differ".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// The fixed two-label endpoint scheme
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointLabels {
    /// Label of the first hub router
    pub primary: String,

    /// Label of the second hub router
    pub secondary: String,

    /// Provision a connection to both routers instead of only the primary
    pub redundant: bool,
}

impl Default for EndpointLabels {
    fn default() -> Self {
        Self {
            primary: "CSR1".to_string(),
            secondary: "CSR2".to_string(),
            redundant: false,
        }
    }
}

impl EndpointLabels {
    /// Labels that receive a VPN connection when a spoke is provisioned
    pub fn provisioned(&self) -> Vec<&str> {
        if self.redundant {
            vec![self.primary.as_str(), self.secondary.as_str()]
        } else {
            vec![self.primary.as_str()]
        }
    }

    /// Label for an existing connection given its endpoint tag
    ///
    /// Anything other than the primary label, including a missing tag,
    /// resolves to the secondary label.
    pub fn resolve(&self, tag_value: Option<&str>) -> &str {
        match tag_value {
            Some(value) if value == self.primary => &self.primary,
            _ => &self.secondary,
        }
    }
}
