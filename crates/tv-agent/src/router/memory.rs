//! In-memory router
//!
//! Keeps tunnels, interfaces and routes in maps and records every call in
//! order. Any operation can be made to fail to exercise partial failures.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use ipnet::IpNet;
use tokio::sync::Mutex;

use tv_core::TunnelId;

use super::{InterfaceObject, RouteObject, RouterApi, RouterError, TunnelBinding, TunnelObject};

/// Router API calls, for call logs and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouterOperation {
    ListTunnels,
    PutTunnel,
    PutInterface,
    PutRoute,
    DeleteInterface,
    DeleteTunnel,
    DeleteRoute,
}

#[derive(Debug, Default)]
struct RouterState {
    tunnels: BTreeMap<u32, TunnelObject>,
    interfaces: BTreeMap<String, InterfaceObject>,
    routes: BTreeMap<IpNet, RouteObject>,
    failing: BTreeSet<RouterOperation>,
    calls: Vec<RouterOperation>,
}

impl RouterState {
    fn call(&mut self, op: RouterOperation) -> Result<(), RouterError> {
        self.calls.push(op);
        if self.failing.contains(&op) {
            return Err(RouterError::Status {
                status: 500,
                body: format!("{:?} failed", op),
            });
        }
        Ok(())
    }
}

fn not_found(path: String) -> RouterError {
    RouterError::Status {
        status: 404,
        body: format!("{} does not exist", path),
    }
}

/// Router fake holding its configuration in memory
#[derive(Debug, Default)]
pub struct MemoryRouter {
    state: Mutex<RouterState>,
}

impl MemoryRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an operation fail (or succeed again) until changed
    pub async fn set_failing(&self, op: RouterOperation, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
    }

    pub async fn tunnels(&self) -> Vec<TunnelObject> {
        self.state.lock().await.tunnels.values().cloned().collect()
    }

    pub async fn interfaces(&self) -> Vec<InterfaceObject> {
        self.state.lock().await.interfaces.values().cloned().collect()
    }

    pub async fn routes(&self) -> Vec<RouteObject> {
        self.state.lock().await.routes.values().cloned().collect()
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<RouterOperation> {
        self.state.lock().await.calls.clone()
    }

    /// Forget the call log
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl RouterApi for MemoryRouter {
    async fn list_tunnels(&self) -> Result<Vec<TunnelBinding>, RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::ListTunnels)?;
        Ok(state
            .tunnels
            .values()
            .map(|t| TunnelBinding::new(t.id(), t.remote_addr))
            .collect())
    }

    async fn put_tunnel(&self, tunnel: &TunnelObject) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::PutTunnel)?;
        state.tunnels.insert(tunnel.instance, tunnel.clone());
        Ok(())
    }

    async fn put_interface(&self, interface: &InterfaceObject) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::PutInterface)?;
        state
            .interfaces
            .insert(interface.name.clone(), interface.clone());
        Ok(())
    }

    async fn put_route(&self, route: &RouteObject) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::PutRoute)?;
        state.routes.insert(route.destination, route.clone());
        Ok(())
    }

    async fn delete_interface(&self, name: &str) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::DeleteInterface)?;
        state
            .interfaces
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("interface {}", name)))
    }

    async fn delete_tunnel(&self, id: TunnelId) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::DeleteTunnel)?;
        state
            .tunnels
            .remove(&id.get())
            .map(|_| ())
            .ok_or_else(|| not_found(format!("tunnel {}", id)))
    }

    async fn delete_route(&self, destination: &IpNet) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        state.call(RouterOperation::DeleteRoute)?;
        state
            .routes
            .remove(destination)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("route {}", destination)))
    }
}
