//! RESTCONF client
//!
//! Talks JSON to the router's RESTCONF data tree. Object paths:
//!
//! - tunnels: `ipsec-config/tunnel={id}` (plus `ipip-config/tunnel={id}`
//!   for the split layout)
//! - interfaces: `interfaces-config/interface={name}`
//! - routes: `route-table-config/static-routes/route-table={table}/ipv4-routes/route={prefix}`
//!   with the prefix URL-encoded
//!
//! Transport credentials come from [`RouterTransport`]; nothing else in the
//! agent knows whether the router is authenticated.
//!
//! In the split layout a tunnel is bound to its peer through the `ipip`
//! object, which is written first and removed last. The binding is only
//! complete once the `ipsec` object with the same instance exists too.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tv_core::config::{RouterConfig, RouterLayout, RouterTransport};
use tv_core::TunnelId;

use super::objects::TunnelDocument;
use super::{InterfaceObject, RouteObject, RouterApi, RouterError, TunnelBinding, TunnelObject};

const IPSEC_CONFIG: &str = "ipsec-config";
const IPIP_CONFIG: &str = "ipip-config";

/// Listing of a tunnel container, e.g. `{"ipsec-config": {"tunnel": [...]}}`
#[derive(Debug, Default, Deserialize)]
struct TunnelListing {
    #[serde(rename = "ipsec-config", alias = "ipip-config", default)]
    config: Option<TunnelTable>,
}

#[derive(Debug, Default, Deserialize)]
struct TunnelTable {
    #[serde(default)]
    tunnel: Vec<ListedTunnel>,
}

#[derive(Debug, Deserialize)]
struct ListedTunnel {
    instance: u32,
    #[serde(rename = "remote-addr", alias = "destination-address", default)]
    remote_addr: Option<Ipv4Addr>,
}

/// Router API client speaking RESTCONF over HTTP(S)
pub struct RestconfClient {
    http: reqwest::Client,
    base_url: String,
    layout: RouterLayout,
    route_table: String,
}

impl RestconfClient {
    /// Build a client for the configured router
    pub fn new(config: &RouterConfig) -> Result<Self, RouterError> {
        let builder = reqwest::Client::builder().timeout(config.timeout);

        let builder = match &config.transport {
            RouterTransport::Plain => builder,
            RouterTransport::MutualTls {
                ca_cert,
                client_identity,
            } => {
                let ca_pem = std::fs::read(ca_cert).map_err(|e| {
                    RouterError::Credentials(format!("Failed to read {:?}: {}", ca_cert, e))
                })?;
                let identity_pem = std::fs::read(client_identity).map_err(|e| {
                    RouterError::Credentials(format!("Failed to read {:?}: {}", client_identity, e))
                })?;

                let ca = reqwest::Certificate::from_pem(&ca_pem)
                    .map_err(|e| RouterError::Credentials(format!("Invalid CA certificate: {}", e)))?;
                let identity = reqwest::Identity::from_pem(&identity_pem).map_err(|e| {
                    RouterError::Credentials(format!("Invalid client identity: {}", e))
                })?;

                builder
                    .use_rustls_tls()
                    .add_root_certificate(ca)
                    .identity(identity)
            }
        };

        let http = builder
            .build()
            .map_err(|e| RouterError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            layout: config.layout,
            route_table: config.route_table.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn route_path(&self, destination: &IpNet) -> String {
        format!(
            "route-table-config/static-routes/route-table={}/ipv4-routes/route={}",
            self.route_table,
            urlencoding::encode(&destination.to_string())
        )
    }

    async fn get<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, RouterError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(T::default());
        }
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RouterError::Status {
                status: status.as_u16(),
                body,
            });
        }
        // An empty container comes back as an empty body
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&body).map_err(|e| RouterError::Decode(format!("{}: {}", path, e)))
    }

    async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), RouterError> {
        tracing::debug!("PUT {}", path);
        let response = self.http.put(self.url(path)).json(body).send().await?;
        check(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), RouterError> {
        tracing::debug!("DELETE {}", path);
        let response = self.http.delete(self.url(path)).send().await?;
        check(response).await
    }
}

async fn check(response: reqwest::Response) -> Result<(), RouterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RouterError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RouterApi for RestconfClient {
    async fn list_tunnels(&self) -> Result<Vec<TunnelBinding>, RouterError> {
        let ipsec: TunnelListing = self.get(IPSEC_CONFIG).await?;
        let ipsec = ipsec.config.unwrap_or_default().tunnel;

        let bindings = match self.layout {
            RouterLayout::Combined => ipsec
                .into_iter()
                .filter_map(|t| {
                    t.remote_addr
                        .map(|addr| TunnelBinding::new(TunnelId::new(t.instance), addr))
                })
                .collect(),
            RouterLayout::Split => {
                let crypto: BTreeSet<u32> = ipsec.iter().map(|t| t.instance).collect();
                let ipip: TunnelListing = self.get(IPIP_CONFIG).await?;
                ipip.config
                    .unwrap_or_default()
                    .tunnel
                    .into_iter()
                    .filter_map(|t| {
                        let id = TunnelId::new(t.instance);
                        t.remote_addr.map(|addr| {
                            if crypto.contains(&t.instance) {
                                TunnelBinding::new(id, addr)
                            } else {
                                TunnelBinding::incomplete(id, addr)
                            }
                        })
                    })
                    .collect()
            }
        };
        Ok(bindings)
    }

    async fn put_tunnel(&self, tunnel: &TunnelObject) -> Result<(), RouterError> {
        let id = tunnel.instance;
        match self.layout {
            RouterLayout::Combined => {
                self.put(
                    &format!("{}/tunnel={}", IPSEC_CONFIG, id),
                    &TunnelDocument { tunnel },
                )
                .await
            }
            RouterLayout::Split => {
                self.put(
                    &format!("{}/tunnel={}", IPIP_CONFIG, id),
                    &TunnelDocument {
                        tunnel: &tunnel.encapsulation(),
                    },
                )
                .await?;
                self.put(
                    &format!("{}/tunnel={}", IPSEC_CONFIG, id),
                    &TunnelDocument {
                        tunnel: &tunnel.crypto_only(),
                    },
                )
                .await
            }
        }
    }

    async fn put_interface(&self, interface: &InterfaceObject) -> Result<(), RouterError> {
        self.put(
            &format!("interfaces-config/interface={}", interface.name),
            interface,
        )
        .await
    }

    async fn put_route(&self, route: &RouteObject) -> Result<(), RouterError> {
        self.put(&self.route_path(&route.destination), route).await
    }

    async fn delete_interface(&self, name: &str) -> Result<(), RouterError> {
        self.delete(&format!("interfaces-config/interface={}", name))
            .await
    }

    async fn delete_tunnel(&self, id: TunnelId) -> Result<(), RouterError> {
        let crypto = format!("{}/tunnel={}", IPSEC_CONFIG, id);
        match self.layout {
            RouterLayout::Combined => self.delete(&crypto).await,
            RouterLayout::Split => {
                // The ipip object still binds the peer; it decides the outcome
                match self.delete(&crypto).await {
                    Err(e) if e.is_not_found() => {
                        tracing::debug!("{} already removed", crypto);
                    }
                    result => result?,
                }
                self.delete(&format!("{}/tunnel={}", IPIP_CONFIG, id)).await
            }
        }
    }

    async fn delete_route(&self, destination: &IpNet) -> Result<(), RouterError> {
        self.delete(&self.route_path(destination)).await
    }
}
