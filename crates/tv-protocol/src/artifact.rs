//! Tunnel intent artifact
//!
//! One artifact exists per VPN connection. It carries the inventory's
//! connection document verbatim plus an appended `transit_vpc_config`
//! block stating which router endpoint owns the tunnel, the spoke network
//! behind it, and whether the tunnel should exist (`create`) or be torn
//! down (`delete`).
//!
//! The markup is parsed exactly once, into typed fields, when an artifact
//! is read. Nothing downstream walks XML.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::connection::{TunnelPayload, INSIDE_PREFIX_LEN};
use crate::error::ArtifactError;

/// Lifecycle action a router must perform for an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    /// The tunnel should exist
    Create,
    /// The tunnel should be removed and the artifact consumed
    Delete,
}

impl IntentStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Create => "create",
            IntentStatus::Delete => "delete",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(IntentStatus::Create),
            "delete" => Ok(IntentStatus::Delete),
            other => Err(ArtifactError::UnknownStatus(other.to_string())),
        }
    }
}

/// The hub-authored `transit_vpc_config` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitConfig {
    /// Account owning the spoke
    pub account_id: String,
    /// Router endpoint label (e.g. `CSR1`)
    pub vpn_endpoint: String,
    /// Address block of the spoke network
    pub spoke_subnet: IpNet,
    /// Hub router's local (private) address for the tunnel
    pub customer_local_ip: Ipv4Addr,
    /// Requested lifecycle action
    pub status: IntentStatus,
}

/// A parsed tunnel intent artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelIntentArtifact {
    /// Connection identifier from the document root, when present
    pub connection_id: Option<String>,
    /// Hub-authored block
    pub transit: TransitConfig,
    /// First tunnel of the connection document
    pub tunnel: TunnelPayload,
    /// Inventory document without any transit block
    connection_config: String,
}

impl TunnelIntentArtifact {
    /// Build an artifact from an inventory connection document
    ///
    /// Any transit block already present in `config` is replaced.
    pub fn from_connection_config(
        config: &str,
        transit: TransitConfig,
    ) -> Result<Self, ArtifactError> {
        let scanned = codec::scan(config)?;
        let tunnel = scanned.tunnel.into_payload()?;
        Ok(Self {
            connection_id: scanned.connection_id,
            transit,
            tunnel,
            connection_config: scanned.markup,
        })
    }

    /// Parse a serialized artifact
    pub fn parse(markup: &str) -> Result<Self, ArtifactError> {
        let scanned = codec::scan(markup)?;
        let transit = scanned.transit.into_config()?;
        let tunnel = scanned.tunnel.into_payload()?;
        Ok(Self {
            connection_id: scanned.connection_id,
            transit,
            tunnel,
            connection_config: scanned.markup,
        })
    }

    /// Parse a serialized artifact from raw object bytes
    pub fn from_bytes(body: &[u8]) -> Result<Self, ArtifactError> {
        let markup =
            std::str::from_utf8(body).map_err(|e| ArtifactError::Malformed(e.to_string()))?;
        Self::parse(markup)
    }

    /// Serialize: the inventory document with the transit block appended to its root
    pub fn to_xml(&self) -> Result<String, ArtifactError> {
        codec::append_transit(&self.connection_config, &self.transit)
    }

    /// Requested lifecycle action
    pub fn status(&self) -> IntentStatus {
        self.transit.status
    }

    /// Address of the remote peer; identifies the router tunnel bound to this artifact
    pub fn remote_peer(&self) -> Ipv4Addr {
        self.tunnel.vpn_gateway.outside_ip
    }

    /// Address for the router's tunnel interface
    pub fn interface_address(&self) -> Ipv4Net {
        Ipv4Net::new_assert(self.tunnel.customer_gateway.inside_ip, INSIDE_PREFIX_LEN)
    }

    /// The original inventory document
    pub fn connection_config(&self) -> &str {
        &self.connection_config
    }
}
