//! Single-pass XML codec for tunnel intent artifacts
//!
//! [`scan`] walks the document once, lifting the handful of fields the
//! artifact needs into typed slots and, at the same time, re-emitting the
//! document minus any `transit_vpc_config` block. [`append_transit`] does
//! the reverse: it re-emits a document and writes a fresh transit block
//! just before the root element closes.

use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::IpNet;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::artifact::{IntentStatus, TransitConfig};
use crate::connection::{text_element, TunnelEndpoint, TunnelPayload};
use crate::error::ArtifactError;

/// Element holding the hub-authored fields
pub const TRANSIT_ELEMENT: &str = "transit_vpc_config";

/// Result of a single pass over a document
#[derive(Debug, Default)]
pub(crate) struct Scanned {
    /// Document re-emitted without (or with a fresh) transit block
    pub markup: String,
    /// `id` attribute of the root element
    pub connection_id: Option<String>,
    pub transit: TransitFields,
    pub tunnel: TunnelFields,
}

/// Raw text of the transit block's children
#[derive(Debug, Default)]
pub(crate) struct TransitFields {
    present: bool,
    account_id: Option<String>,
    vpn_endpoint: Option<String>,
    spoke_subnet: Option<String>,
    customer_local_ip: Option<String>,
    status: Option<String>,
}

/// Raw text of the first `ipsec_tunnel`
#[derive(Debug, Default)]
pub(crate) struct TunnelFields {
    customer_outside: Option<String>,
    customer_inside: Option<String>,
    vpn_outside: Option<String>,
    vpn_inside: Option<String>,
    pre_shared_key: Option<String>,
}

impl TransitFields {
    pub(crate) fn into_config(self) -> Result<TransitConfig, ArtifactError> {
        if !self.present {
            return Err(ArtifactError::MissingField(TRANSIT_ELEMENT));
        }
        let account_id = require(self.account_id, "account_id")?;
        let vpn_endpoint = require(self.vpn_endpoint, "vpn_endpoint")?;
        let spoke_subnet = parse_field::<IpNet>(self.spoke_subnet, "spoke_subnet")?;
        let customer_local_ip = parse_field::<Ipv4Addr>(self.customer_local_ip, "customer_local_ip")?;
        let status = require(self.status, "status")?.parse::<IntentStatus>()?;

        Ok(TransitConfig {
            account_id,
            vpn_endpoint,
            spoke_subnet,
            customer_local_ip,
            status,
        })
    }
}

impl TunnelFields {
    pub(crate) fn into_payload(self) -> Result<TunnelPayload, ArtifactError> {
        Ok(TunnelPayload {
            customer_gateway: TunnelEndpoint::new(
                parse_field(self.customer_outside, "customer_gateway/tunnel_outside_address")?,
                parse_field(self.customer_inside, "customer_gateway/tunnel_inside_address")?,
            ),
            vpn_gateway: TunnelEndpoint::new(
                parse_field(self.vpn_outside, "vpn_gateway/tunnel_outside_address")?,
                parse_field(self.vpn_inside, "vpn_gateway/tunnel_inside_address")?,
            ),
            pre_shared_key: require(self.pre_shared_key, "ike/pre_shared_key")?,
        })
    }
}

fn require(value: Option<String>, field: &'static str) -> Result<String, ArtifactError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ArtifactError::MissingField(field))
}

fn parse_field<T: FromStr>(value: Option<String>, field: &'static str) -> Result<T, ArtifactError> {
    let raw = require(value, field)?;
    raw.parse::<T>()
        .map_err(|_| ArtifactError::InvalidValue { field, value: raw })
}

/// Scan a document, stripping any transit block from the re-emitted markup
pub(crate) fn scan(markup: &str) -> Result<Scanned, ArtifactError> {
    rewrite(markup, None)
}

/// Re-emit `markup` with `transit` as the last child of the root element
pub(crate) fn append_transit(markup: &str, transit: &TransitConfig) -> Result<String, ArtifactError> {
    Ok(rewrite(markup, Some(transit))?.markup)
}

fn rewrite(markup: &str, append: Option<&TransitConfig>) -> Result<Scanned, ArtifactError> {
    let mut reader = Reader::from_str(markup);
    let mut writer = Writer::new(Vec::new());
    let mut scanned = Scanned::default();

    // Open element names from the root down
    let mut path: Vec<String> = Vec::new();
    // Depth at which a transit block being skipped was opened
    let mut skipping: Option<usize> = None;
    // Count of ipsec_tunnel elements directly under the root
    let mut tunnels_seen = 0usize;
    let mut text = String::new();
    let mut saw_root = false;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Eof => break,
            Event::Start(start) => {
                let name = element_name(start)?;
                if path.is_empty() {
                    saw_root = true;
                    scanned.connection_id = root_id(start)?;
                }
                if path.len() == 1 && name == "ipsec_tunnel" {
                    tunnels_seen += 1;
                }
                if path.len() == 1 && name == TRANSIT_ELEMENT && skipping.is_none() {
                    scanned.transit.present = true;
                    skipping = Some(path.len());
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(start) => {
                if path.is_empty() {
                    saw_root = true;
                }
                if path.len() == 1 && element_name(start)? == TRANSIT_ELEMENT {
                    scanned.transit.present = true;
                    continue;
                }
            }
            Event::Text(content) => {
                let unescaped = content
                    .unescape()
                    .map_err(|e| ArtifactError::Malformed(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::CData(content) => {
                text.push_str(&String::from_utf8_lossy(content.as_ref()));
            }
            Event::End(_) => {
                record_field(&path, tunnels_seen, text.trim(), &mut scanned);
                text.clear();

                if path.len() == 1 {
                    if let Some(transit) = append {
                        write_transit(&mut writer, transit)?;
                    }
                }
                path.pop();

                if skipping == Some(path.len()) {
                    skipping = None;
                    continue;
                }
            }
            _ => {}
        }

        if skipping.is_none() {
            writer.write_event(event)?;
        }
    }

    if !saw_root {
        return Err(ArtifactError::Malformed("document has no root element".to_string()));
    }
    if !path.is_empty() {
        return Err(ArtifactError::Malformed(format!("unclosed element <{}>", path.join("/"))));
    }

    scanned.markup =
        String::from_utf8(writer.into_inner()).map_err(|e| ArtifactError::Malformed(e.to_string()))?;
    Ok(scanned)
}

/// Assign the text of a just-closed leaf to its slot, if it has one
fn record_field(path: &[String], tunnels_seen: usize, value: &str, scanned: &mut Scanned) {
    if value.is_empty() {
        return;
    }
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    let value = Some(value.to_string());

    match segments.as_slice() {
        [_, TRANSIT_ELEMENT, "account_id"] => scanned.transit.account_id = value,
        [_, TRANSIT_ELEMENT, "vpn_endpoint"] => scanned.transit.vpn_endpoint = value,
        [_, TRANSIT_ELEMENT, "spoke_subnet"] => scanned.transit.spoke_subnet = value,
        [_, TRANSIT_ELEMENT, "customer_local_ip"] => scanned.transit.customer_local_ip = value,
        [_, TRANSIT_ELEMENT, "status"] => scanned.transit.status = value,
        // Routers only ever use the first tunnel of a connection
        [_, "ipsec_tunnel", rest @ ..] if tunnels_seen == 1 => match rest {
            ["customer_gateway", "tunnel_outside_address", "ip_address"] => {
                scanned.tunnel.customer_outside = value
            }
            ["customer_gateway", "tunnel_inside_address", "ip_address"] => {
                scanned.tunnel.customer_inside = value
            }
            ["vpn_gateway", "tunnel_outside_address", "ip_address"] => {
                scanned.tunnel.vpn_outside = value
            }
            ["vpn_gateway", "tunnel_inside_address", "ip_address"] => {
                scanned.tunnel.vpn_inside = value
            }
            ["ike", "pre_shared_key"] => scanned.tunnel.pre_shared_key = value,
            _ => {}
        },
        _ => {}
    }
}

fn write_transit(writer: &mut Writer<Vec<u8>>, transit: &TransitConfig) -> Result<(), ArtifactError> {
    writer.write_event(Event::Start(BytesStart::new(TRANSIT_ELEMENT)))?;
    text_element(writer, "account_id", &transit.account_id)?;
    text_element(writer, "vpn_endpoint", &transit.vpn_endpoint)?;
    text_element(writer, "spoke_subnet", &transit.spoke_subnet.to_string())?;
    text_element(writer, "customer_local_ip", &transit.customer_local_ip.to_string())?;
    text_element(writer, "status", transit.status.as_str())?;
    writer.write_event(Event::End(BytesEnd::new(TRANSIT_ELEMENT)))?;
    Ok(())
}

fn element_name(start: &BytesStart<'_>) -> Result<String, ArtifactError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(|e| ArtifactError::Malformed(e.to_string()))
}

fn root_id(start: &BytesStart<'_>) -> Result<Option<String>, ArtifactError> {
    let attribute = start
        .try_get_attribute("id")
        .map_err(|e| ArtifactError::Malformed(e.to_string()))?;
    attribute
        .map(|attr| {
            attr.unescape_value()
                .map(|v| v.into_owned())
                .map_err(|e| ArtifactError::Malformed(e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<vpn_connection id="vpn-9"><ipsec_tunnel><customer_gateway><tunnel_outside_address><ip_address>198.51.100.7</ip_address></tunnel_outside_address><tunnel_inside_address><ip_address>169.254.1.2</ip_address></tunnel_inside_address></customer_gateway><vpn_gateway><tunnel_outside_address><ip_address>34.1.2.3</ip_address></tunnel_outside_address><tunnel_inside_address><ip_address>169.254.1.1</ip_address></tunnel_inside_address></vpn_gateway><ike><pre_shared_key><![CDATA[psk<1>]]></pre_shared_key></ike></ipsec_tunnel></vpn_connection>"#;

    #[test]
    fn test_scan_reads_first_tunnel() {
        let scanned = scan(MINIMAL).unwrap();
        let tunnel = scanned.tunnel.into_payload().unwrap();
        assert_eq!(tunnel.vpn_gateway.outside_ip, Ipv4Addr::new(34, 1, 2, 3));
        assert_eq!(tunnel.customer_gateway.inside_ip, Ipv4Addr::new(169, 254, 1, 2));
        assert_eq!(tunnel.pre_shared_key, "psk<1>");
        assert_eq!(scanned.connection_id.as_deref(), Some("vpn-9"));
        assert!(!scanned.transit.present);
    }

    #[test]
    fn test_scan_without_root_fails() {
        assert!(matches!(scan("   "), Err(ArtifactError::Malformed(_))));
    }

    #[test]
    fn test_missing_psk_is_reported() {
        let without_psk = MINIMAL.replace("<![CDATA[psk<1>]]>", "");
        let err = scan(&without_psk).unwrap().tunnel.into_payload().unwrap_err();
        assert!(matches!(err, ArtifactError::MissingField("ike/pre_shared_key")));
    }

    #[test]
    fn test_nested_transit_element_is_not_the_block() {
        // Only a direct child of the root counts
        let nested = MINIMAL.replace(
            "<ike>",
            "<ike><transit_vpc_config><status>create</status></transit_vpc_config>",
        );
        let scanned = scan(&nested).unwrap();
        assert!(!scanned.transit.present);
    }
}
