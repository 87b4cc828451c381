//! Inventory scanner
//!
//! Reads the per-region view the hub reconciler diffs against. A region is
//! read all-or-nothing: if either listing fails the whole snapshot is
//! discarded.

use std::sync::Arc;

use tv_core::Region;

use crate::error::HubError;
use crate::inventory::{
    ConnectionRecord, ConnectionState, GatewayRecord, GatewayState, Inventory, Tag,
};

/// Gateway states worth reconciling
pub const GATEWAY_STATES: [GatewayState; 3] = [
    GatewayState::Available,
    GatewayState::Attached,
    GatewayState::Detached,
];

/// Connection states that still count as "has connections"
pub const CONNECTION_STATES: [ConnectionState; 3] = [
    ConnectionState::Available,
    ConnectionState::Pending,
    ConnectionState::Deleting,
];

/// One region's gateways and hub-owned connections
#[derive(Debug, Clone)]
pub struct RegionSnapshot {
    pub region: Region,
    /// Gateways in inventory listing order
    pub gateways: Vec<GatewayRecord>,
    /// Connections carrying the hub marker tag
    pub connections: Vec<ConnectionRecord>,
}

impl RegionSnapshot {
    /// Hub-owned connections of one gateway
    pub fn connections_for<'a>(
        &'a self,
        gateway_id: &'a str,
    ) -> impl Iterator<Item = &'a ConnectionRecord> + 'a {
        self.connections
            .iter()
            .filter(move |c| c.gateway_id == gateway_id)
    }
}

/// Read-only view over the inventory
pub struct InventoryScanner {
    inventory: Arc<dyn Inventory>,
    marker: Tag,
}

impl InventoryScanner {
    /// Create a new scanner filtering connections on the hub marker tag
    pub fn new(inventory: Arc<dyn Inventory>, marker: Tag) -> Self {
        Self { inventory, marker }
    }

    /// Regions in the inventory's fixed listing order
    pub async fn regions(&self) -> Result<Vec<Region>, HubError> {
        self.inventory
            .list_regions()
            .await
            .map_err(|e| HubError::unavailable("regions", e))
    }

    /// Snapshot one region
    pub async fn scan(&self, region: &Region) -> Result<RegionSnapshot, HubError> {
        let gateways = self
            .inventory
            .list_gateways(region, &GATEWAY_STATES)
            .await
            .map_err(|e| HubError::unavailable(format!("gateways in {}", region), e))?;

        let connections = self
            .inventory
            .list_connections(region, &CONNECTION_STATES, &self.marker)
            .await
            .map_err(|e| HubError::unavailable(format!("connections in {}", region), e))?;

        tracing::debug!(
            "Scanned {}: {} gateways, {} hub connections",
            region,
            gateways.len(),
            connections.len()
        );

        Ok(RegionSnapshot {
            region: region.clone(),
            gateways,
            connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::FixtureInventory;

    #[tokio::test]
    async fn test_scan_filters_gateway_states() {
        let inventory = Arc::new(FixtureInventory::new("123456789012"));
        let region = Region::from("us-east-1");
        inventory.add_region(region.clone()).await;
        for (id, state) in [
            ("vgw-live", GatewayState::Attached),
            ("vgw-gone", GatewayState::Deleted),
            ("vgw-new", GatewayState::Pending),
        ] {
            inventory
                .put_gateway(GatewayRecord {
                    id: id.to_string(),
                    region: region.clone(),
                    state,
                    tags: None,
                    attachments: Vec::new(),
                })
                .await;
        }

        let scanner = InventoryScanner::new(inventory, Tag::new("transitvpc:spoke", "true"));
        let snapshot = scanner.scan(&region).await.unwrap();

        let ids: Vec<_> = snapshot.gateways.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["vgw-live"]);
    }

    #[tokio::test]
    async fn test_scan_fails_whole_region() {
        let inventory = Arc::new(FixtureInventory::new("123456789012"));
        let region = Region::from("us-east-1");
        inventory.add_region(region.clone()).await;
        inventory.set_unavailable(&region, true).await;

        let scanner = InventoryScanner::new(inventory, Tag::new("transitvpc:spoke", "true"));
        let err = scanner.scan(&region).await.unwrap_err();
        assert!(matches!(err, HubError::InventoryUnavailable { .. }));
    }
}
