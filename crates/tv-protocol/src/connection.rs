//! Inventory connection configuration document
//!
//! When a VPN connection is created the inventory hands back an opaque
//! configuration document describing both ends of each IPSec tunnel. The
//! hub copies that document verbatim into the artifact; only the fields a
//! router needs are lifted out into [`TunnelPayload`].
//!
//! [`ConnectionConfig`] renders the same document shape, which is what the
//! fixture inventory returns and what tests build artifacts from.

use std::net::Ipv4Addr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

/// Prefix length of the point-to-point inside network of every tunnel
pub const INSIDE_PREFIX_LEN: u8 = 30;

const _: () = assert!(INSIDE_PREFIX_LEN <= 32);

/// One side of an IPSec tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelEndpoint {
    /// Public address terminating IKE/ESP
    pub outside_ip: Ipv4Addr,
    /// Address inside the tunnel's /30
    pub inside_ip: Ipv4Addr,
}

impl TunnelEndpoint {
    /// Create a new endpoint
    pub fn new(outside_ip: Ipv4Addr, inside_ip: Ipv4Addr) -> Self {
        Self {
            outside_ip,
            inside_ip,
        }
    }
}

/// The router-relevant part of one IPSec tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelPayload {
    /// Hub side (the inventory calls it the customer gateway)
    pub customer_gateway: TunnelEndpoint,
    /// Spoke side virtual private gateway
    pub vpn_gateway: TunnelEndpoint,
    /// IKE pre-shared key
    pub pre_shared_key: String,
}

/// Full configuration document for one VPN connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// VPN connection identifier
    pub connection_id: String,
    /// Customer gateway identifier
    pub customer_gateway_id: String,
    /// Virtual private gateway identifier
    pub vpn_gateway_id: String,
    /// Tunnels in inventory order; routers only use the first
    pub tunnels: Vec<TunnelPayload>,
}

impl ConnectionConfig {
    /// Render the document in the inventory's markup
    pub fn to_xml(&self) -> Result<String, ArtifactError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("vpn_connection");
        root.push_attribute(("id", self.connection_id.as_str()));
        writer.write_event(Event::Start(root))?;
        text_element(&mut writer, "customer_gateway_id", &self.customer_gateway_id)?;
        text_element(&mut writer, "vpn_gateway_id", &self.vpn_gateway_id)?;
        text_element(&mut writer, "vpn_connection_type", "ipsec.1")?;

        for tunnel in &self.tunnels {
            writer.write_event(Event::Start(BytesStart::new("ipsec_tunnel")))?;
            endpoint_element(&mut writer, "customer_gateway", &tunnel.customer_gateway)?;
            endpoint_element(&mut writer, "vpn_gateway", &tunnel.vpn_gateway)?;

            writer.write_event(Event::Start(BytesStart::new("ike")))?;
            text_element(&mut writer, "authentication_protocol", "sha1")?;
            text_element(&mut writer, "encryption_protocol", "aes-128-cbc")?;
            text_element(&mut writer, "lifetime", "28800")?;
            text_element(&mut writer, "perfect_forward_secrecy", "group2")?;
            text_element(&mut writer, "mode", "main")?;
            text_element(&mut writer, "pre_shared_key", &tunnel.pre_shared_key)?;
            writer.write_event(Event::End(BytesEnd::new("ike")))?;

            writer.write_event(Event::Start(BytesStart::new("ipsec")))?;
            text_element(&mut writer, "protocol", "esp")?;
            text_element(&mut writer, "authentication_protocol", "hmac-sha1-96")?;
            text_element(&mut writer, "encryption_protocol", "aes-128-cbc")?;
            text_element(&mut writer, "lifetime", "3600")?;
            text_element(&mut writer, "mode", "tunnel")?;
            writer.write_event(Event::End(BytesEnd::new("ipsec")))?;

            writer.write_event(Event::End(BytesEnd::new("ipsec_tunnel")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("vpn_connection")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| ArtifactError::Malformed(e.to_string()))
    }
}

fn endpoint_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    endpoint: &TunnelEndpoint,
) -> Result<(), ArtifactError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;

    writer.write_event(Event::Start(BytesStart::new("tunnel_outside_address")))?;
    text_element(writer, "ip_address", &endpoint.outside_ip.to_string())?;
    writer.write_event(Event::End(BytesEnd::new("tunnel_outside_address")))?;

    writer.write_event(Event::Start(BytesStart::new("tunnel_inside_address")))?;
    text_element(writer, "ip_address", &endpoint.inside_ip.to_string())?;
    text_element(writer, "network_mask", "255.255.255.252")?;
    text_element(writer, "network_cidr", &INSIDE_PREFIX_LEN.to_string())?;
    writer.write_event(Event::End(BytesEnd::new("tunnel_inside_address")))?;

    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Write `<name>value</name>`
pub(crate) fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), ArtifactError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
