//! Typed router configuration objects
//!
//! Each object kind the agent pushes has a builder that checks every
//! required field before the object can exist. Serialization produces the
//! router's RESTCONF JSON (kebab-case keys).

use std::net::Ipv4Addr;

use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use thiserror::Error;

use tv_core::config::IkeProfile;
use tv_core::TunnelId;

/// A router object could not be built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A required field was never set
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field was set to a value the router would reject
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// One IKE or child SA proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Proposal {
    pub name: String,
    pub encryption_algorithm: String,
    pub integrity_algorithm: String,
    pub dh_group: String,
}

/// Address identity of one IKE peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerIdentity {
    pub peer: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Ipv4Addr,
}

/// One authentication round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRound {
    pub number: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub psk: String,
}

/// Authentication of one IKE peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerAuthentication {
    pub peer: String,
    pub round: Vec<AuthRound>,
}

/// Child SA settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildSa {
    pub name: String,
    pub lifetime: u32,
    pub proposal: Vec<Proposal>,
}

/// IKE settings of a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct IkeSettings {
    pub key_renewal: String,
    pub role: String,
    pub version: u8,
    pub lifetime: u32,
    pub proposals: Vec<Proposal>,
    pub identity: Vec<PeerIdentity>,
    pub authentication: Vec<PeerAuthentication>,
    pub child: Vec<ChildSa>,
}

/// Crypto section of a tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Crypto {
    pub config_type: String,
    pub ike: IkeSettings,
}

/// An IPSec tunnel carrying its addresses and crypto
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TunnelObject {
    pub instance: u32,
    /// Hub router's local address
    pub local_addr: Ipv4Addr,
    /// Spoke gateway's public address
    pub remote_addr: Ipv4Addr,
    pub crypto: Crypto,
}

/// Encapsulation-only tunnel, used when the router keeps crypto separate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncapsulationObject {
    pub instance: u32,
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
}

/// Crypto-only tunnel, used when the router keeps encapsulation separate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptoObject {
    pub instance: u32,
    pub crypto: Crypto,
}

/// `{"tunnel": ...}` request body
#[derive(Debug, Serialize)]
pub struct TunnelDocument<'a, T> {
    pub tunnel: &'a T,
}

impl TunnelObject {
    /// Start building a tunnel
    pub fn builder() -> TunnelBuilder {
        TunnelBuilder::default()
    }

    /// Router-local tunnel ID
    pub fn id(&self) -> TunnelId {
        TunnelId::new(self.instance)
    }

    /// Addresses only, for routers with a separate encapsulation object
    pub fn encapsulation(&self) -> EncapsulationObject {
        EncapsulationObject {
            instance: self.instance,
            source_address: self.local_addr,
            destination_address: self.remote_addr,
        }
    }

    /// Crypto only, for routers with a separate encapsulation object
    pub fn crypto_only(&self) -> CryptoObject {
        CryptoObject {
            instance: self.instance,
            crypto: self.crypto.clone(),
        }
    }
}

/// Builder for [`TunnelObject`]
#[derive(Debug, Clone, Default)]
pub struct TunnelBuilder {
    id: Option<TunnelId>,
    local_addr: Option<Ipv4Addr>,
    remote_addr: Option<Ipv4Addr>,
    local_identity: Option<Ipv4Addr>,
    pre_shared_key: Option<String>,
    ike: Option<IkeProfile>,
}

impl TunnelBuilder {
    pub fn id(mut self, id: TunnelId) -> Self {
        self.id = Some(id);
        self
    }

    /// Hub router's local address
    pub fn local_addr(mut self, addr: Ipv4Addr) -> Self {
        self.local_addr = Some(addr);
        self
    }

    /// Spoke gateway's public address; also its IKE identity
    pub fn remote_addr(mut self, addr: Ipv4Addr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Hub's public address, used as the local IKE identity
    pub fn local_identity(mut self, addr: Ipv4Addr) -> Self {
        self.local_identity = Some(addr);
        self
    }

    pub fn pre_shared_key(mut self, psk: impl Into<String>) -> Self {
        self.pre_shared_key = Some(psk.into());
        self
    }

    pub fn ike(mut self, profile: &IkeProfile) -> Self {
        self.ike = Some(profile.clone());
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<TunnelObject, BuildError> {
        let id = self.id.ok_or(BuildError::MissingField("instance"))?;
        let local_addr = self.local_addr.ok_or(BuildError::MissingField("local-addr"))?;
        let remote_addr = self.remote_addr.ok_or(BuildError::MissingField("remote-addr"))?;
        let local_identity = self
            .local_identity
            .ok_or(BuildError::MissingField("identity"))?;
        let psk = self.pre_shared_key.ok_or(BuildError::MissingField("psk"))?;
        let ike = self.ike.ok_or(BuildError::MissingField("ike"))?;

        if psk.is_empty() {
            return Err(BuildError::Invalid {
                field: "psk",
                reason: "pre-shared key is empty".to_string(),
            });
        }
        if remote_addr.is_unspecified() {
            return Err(BuildError::Invalid {
                field: "remote-addr",
                reason: "unspecified address".to_string(),
            });
        }

        let proposal = Proposal {
            name: "1".to_string(),
            encryption_algorithm: ike.encryption.clone(),
            integrity_algorithm: ike.integrity.clone(),
            dh_group: ike.dh_group.clone(),
        };
        let round = |psk: &str| {
            vec![AuthRound {
                number: 1,
                kind: "psk".to_string(),
                psk: psk.to_string(),
            }]
        };

        Ok(TunnelObject {
            instance: id.get(),
            local_addr,
            remote_addr,
            crypto: Crypto {
                config_type: "ike".to_string(),
                ike: IkeSettings {
                    key_renewal: ike.key_renewal.clone(),
                    role: ike.role.clone(),
                    version: ike.version,
                    lifetime: ike.lifetime,
                    proposals: vec![proposal.clone()],
                    identity: vec![
                        PeerIdentity {
                            peer: "local".to_string(),
                            kind: "address".to_string(),
                            value: local_identity,
                        },
                        PeerIdentity {
                            peer: "remote".to_string(),
                            kind: "address".to_string(),
                            value: remote_addr,
                        },
                    ],
                    authentication: vec![
                        PeerAuthentication {
                            peer: "local".to_string(),
                            round: round(&psk),
                        },
                        PeerAuthentication {
                            peer: "remote".to_string(),
                            round: round(&psk),
                        },
                    ],
                    child: vec![ChildSa {
                        name: "1".to_string(),
                        lifetime: ike.child_lifetime,
                        proposal: vec![proposal],
                    }],
                },
            },
        })
    }
}

/// A tunnel interface with its point-to-point address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceObject {
    pub name: String,
    pub address: Ipv4Net,
}

#[derive(Serialize)]
struct InterfaceDocument<'a> {
    interface: [InterfaceEntry<'a>; 1],
}

#[derive(Serialize)]
struct InterfaceEntry<'a> {
    name: &'a str,
    ipv4: InterfaceIpv4,
}

#[derive(Serialize)]
struct InterfaceIpv4 {
    enabled: bool,
    forwarding: bool,
    address: InterfaceAddress,
}

#[derive(Serialize)]
struct InterfaceAddress {
    ip: Vec<String>,
}

impl Serialize for InterfaceObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        InterfaceDocument {
            interface: [InterfaceEntry {
                name: &self.name,
                ipv4: InterfaceIpv4 {
                    enabled: true,
                    forwarding: false,
                    address: InterfaceAddress {
                        ip: vec![self.address.to_string()],
                    },
                },
            }],
        }
        .serialize(serializer)
    }
}

impl InterfaceObject {
    /// Start building an interface
    pub fn builder() -> InterfaceBuilder {
        InterfaceBuilder::default()
    }
}

/// Builder for [`InterfaceObject`]
#[derive(Debug, Clone, Default)]
pub struct InterfaceBuilder {
    name: Option<String>,
    address: Option<Ipv4Net>,
}

impl InterfaceBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn address(mut self, address: Ipv4Net) -> Self {
        self.address = Some(address);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<InterfaceObject, BuildError> {
        let name = self.name.ok_or(BuildError::MissingField("name"))?;
        let address = self.address.ok_or(BuildError::MissingField("ipv4.address"))?;
        if name.is_empty() {
            return Err(BuildError::Invalid {
                field: "name",
                reason: "interface name is empty".to_string(),
            });
        }
        Ok(InterfaceObject { name, address })
    }
}

/// A static route to a spoke network through a tunnel interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteObject {
    pub destination: IpNet,
    /// Spoke gateway's inside address
    pub next_hop: Ipv4Addr,
    pub interface: String,
}

#[derive(Serialize)]
struct RouteDocument<'a> {
    route: [RouteEntry<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct RouteEntry<'a> {
    destination_prefix: String,
    next_hop: NextHop<'a>,
}

#[derive(Serialize)]
struct NextHop<'a> {
    hop: [Hop<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Hop<'a> {
    hop_id: u32,
    ipv4_address: Ipv4Addr,
    if_name: &'a str,
}

impl Serialize for RouteObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RouteDocument {
            route: [RouteEntry {
                destination_prefix: self.destination.to_string(),
                next_hop: NextHop {
                    hop: [Hop {
                        hop_id: 1,
                        ipv4_address: self.next_hop,
                        if_name: &self.interface,
                    }],
                },
            }],
        }
        .serialize(serializer)
    }
}

impl RouteObject {
    /// Start building a route
    pub fn builder() -> RouteBuilder {
        RouteBuilder::default()
    }
}

/// Builder for [`RouteObject`]
#[derive(Debug, Clone, Default)]
pub struct RouteBuilder {
    destination: Option<IpNet>,
    next_hop: Option<Ipv4Addr>,
    interface: Option<String>,
}

impl RouteBuilder {
    pub fn destination(mut self, destination: IpNet) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn next_hop(mut self, next_hop: Ipv4Addr) -> Self {
        self.next_hop = Some(next_hop);
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<RouteObject, BuildError> {
        let destination = self
            .destination
            .ok_or(BuildError::MissingField("destination-prefix"))?;
        let next_hop = self.next_hop.ok_or(BuildError::MissingField("ipv4-address"))?;
        let interface = self.interface.ok_or(BuildError::MissingField("if-name"))?;
        if !matches!(destination, IpNet::V4(_)) {
            return Err(BuildError::Invalid {
                field: "destination-prefix",
                reason: format!("{} is not an IPv4 prefix", destination),
            });
        }
        Ok(RouteObject {
            destination,
            next_hop,
            interface,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tunnel() -> TunnelObject {
        TunnelObject::builder()
            .id(TunnelId::new(0))
            .local_addr(Ipv4Addr::new(10, 255, 0, 10))
            .remote_addr(Ipv4Addr::new(52, 1, 1, 1))
            .local_identity(Ipv4Addr::new(203, 0, 113, 10))
            .pre_shared_key("psk")
            .ike(&IkeProfile::default())
            .build()
            .unwrap()
    }

    #[test]
    fn test_tunnel_missing_field() {
        let err = TunnelObject::builder()
            .id(TunnelId::new(0))
            .local_addr(Ipv4Addr::new(10, 255, 0, 10))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingField("remote-addr"));
    }

    #[test]
    fn test_tunnel_rejects_empty_psk() {
        let err = TunnelObject::builder()
            .id(TunnelId::new(0))
            .local_addr(Ipv4Addr::new(10, 255, 0, 10))
            .remote_addr(Ipv4Addr::new(52, 1, 1, 1))
            .local_identity(Ipv4Addr::new(203, 0, 113, 10))
            .pre_shared_key("")
            .ike(&IkeProfile::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Invalid { field: "psk", .. }));
    }

    #[test]
    fn test_tunnel_json_shape() {
        let value = serde_json::to_value(TunnelDocument { tunnel: &tunnel() }).unwrap();
        let t = &value["tunnel"];
        assert_eq!(t["instance"], json!(0));
        assert_eq!(t["local-addr"], json!("10.255.0.10"));
        assert_eq!(t["remote-addr"], json!("52.1.1.1"));

        let ike = &t["crypto"]["ike"];
        assert_eq!(t["crypto"]["config-type"], json!("ike"));
        assert_eq!(ike["key-renewal"], json!("reauth"));
        assert_eq!(ike["role"], json!("initiator-only"));
        assert_eq!(ike["version"], json!(1));
        assert_eq!(ike["lifetime"], json!(14400));
        assert_eq!(
            ike["proposals"][0],
            json!({
                "name": "1",
                "encryption-algorithm": "aes128",
                "integrity-algorithm": "sha1",
                "dh-group": "modp1024"
            })
        );
        assert_eq!(
            ike["identity"][0],
            json!({"peer": "local", "type": "address", "value": "203.0.113.10"})
        );
        assert_eq!(ike["identity"][1]["value"], json!("52.1.1.1"));
        assert_eq!(
            ike["authentication"][1],
            json!({"peer": "remote", "round": [{"number": 1, "type": "psk", "psk": "psk"}]})
        );
        assert_eq!(ike["child"][0]["lifetime"], json!(3600));
    }

    #[test]
    fn test_split_objects() {
        let t = tunnel();
        let encap = serde_json::to_value(t.encapsulation()).unwrap();
        assert_eq!(
            encap,
            json!({"instance": 0, "source-address": "10.255.0.10", "destination-address": "52.1.1.1"})
        );

        let crypto = serde_json::to_value(t.crypto_only()).unwrap();
        assert!(crypto.get("remote-addr").is_none());
        assert_eq!(crypto["crypto"]["config-type"], json!("ike"));
    }

    #[test]
    fn test_interface_json_shape() {
        let interface = InterfaceObject::builder()
            .name("ipsec0")
            .address("169.254.10.2/30".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&interface).unwrap(),
            json!({"interface": [{
                "name": "ipsec0",
                "ipv4": {"enabled": true, "forwarding": false, "address": {"ip": ["169.254.10.2/30"]}}
            }]})
        );
    }

    #[test]
    fn test_route_json_shape() {
        let route = RouteObject::builder()
            .destination("10.1.0.0/16".parse().unwrap())
            .next_hop(Ipv4Addr::new(169, 254, 10, 1))
            .interface("ipsec0")
            .build()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&route).unwrap(),
            json!({"route": [{
                "destination-prefix": "10.1.0.0/16",
                "next-hop": {"hop": [{"hop-id": 1, "ipv4-address": "169.254.10.1", "if-name": "ipsec0"}]}
            }]})
        );
    }

    #[test]
    fn test_route_requires_ipv4_destination() {
        let err = RouteObject::builder()
            .destination("2001:db8::/32".parse().unwrap())
            .next_hop(Ipv4Addr::new(169, 254, 10, 1))
            .interface("ipsec0")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Invalid { field: "destination-prefix", .. }));
    }
}
