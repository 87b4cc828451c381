//! Tunnel agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::StoreConfig;
use crate::error::ConfigError;

/// Configuration for the tunnel agent running beside one hub router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Endpoint label of the router this agent drives; selects which artifacts it consumes
    pub endpoint_label: String,

    /// Artifact store
    pub store: StoreConfig,

    /// Router configuration API
    pub router: RouterConfig,

    /// IKE parameters pushed with every tunnel
    pub ike: IkeProfile,

    /// Tunnel IDs are allocated from `0..max_tunnels`
    pub max_tunnels: u32,

    /// Time between reconciliation passes
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint_label: "CSR1".to_string(),
            store: StoreConfig::default(),
            router: RouterConfig::default(),
            ike: IkeProfile::default(),
            max_tunnels: 4096,
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl AgentConfig {
    /// Reject configurations a pass could not act on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_label.is_empty() {
            return Err(ConfigError::MissingField("endpoint_label".to_string()));
        }
        if self.max_tunnels == 0 {
            return Err(ConfigError::Invalid("max_tunnels must be at least 1".to_string()));
        }
        if self.router.base_url.is_empty() {
            return Err(ConfigError::MissingField("router.base_url".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Router configuration API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Base URL of the RESTCONF data tree
    pub base_url: String,

    /// How the agent authenticates to the router
    pub transport: RouterTransport,

    /// Object layout of the router's tunnel model
    pub layout: RouterLayout,

    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Tunnel interface name prefix; the tunnel ID is appended
    pub interface_prefix: String,

    /// Route table holding the spoke routes
    pub route_table: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/restconf/data".to_string(),
            transport: RouterTransport::Plain,
            layout: RouterLayout::Combined,
            timeout: Duration::from_secs(30),
            interface_prefix: "ipsec".to_string(),
            route_table: "ipv4-VRF:0".to_string(),
        }
    }
}

/// Authentication to the router API
///
/// Earlier router releases expose the API unauthenticated on localhost;
/// later ones require a client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RouterTransport {
    /// No transport credentials
    #[default]
    Plain,
    /// Mutual TLS
    MutualTls {
        /// PEM bundle used to verify the router's certificate
        ca_cert: PathBuf,
        /// PEM file holding the client certificate followed by its private key
        client_identity: PathBuf,
    },
}

/// How the router models a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterLayout {
    /// One IPSec tunnel object carries both the addresses and the crypto
    #[default]
    Combined,
    /// An IP-in-IP encapsulation object carries the addresses and a
    /// separate IPSec object carries the crypto
    Split,
}

/// IKE settings pushed with every tunnel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IkeProfile {
    /// IKE major version
    pub version: u8,
    /// IKE role of the hub router
    pub role: String,
    /// Key renewal mode
    pub key_renewal: String,
    /// IKE SA lifetime in seconds
    pub lifetime: u32,
    /// Child SA lifetime in seconds
    pub child_lifetime: u32,
    /// Encryption algorithm of the IKE and child proposals
    pub encryption: String,
    /// Integrity algorithm of the IKE and child proposals
    pub integrity: String,
    /// Diffie-Hellman group of the IKE and child proposals
    pub dh_group: String,
}

impl Default for IkeProfile {
    fn default() -> Self {
        Self {
            version: 1,
            role: "initiator-only".to_string(),
            key_renewal: "reauth".to_string(),
            lifetime: 14400,
            child_lifetime: 3600,
            encryption: "aes128".to_string(),
            integrity: "sha1".to_string(),
            dh_group: "modp1024".to_string(),
        }
    }
}
