//! tv-hub: Transit VPN hub controller
//!
//! The hub controller watches the cloud inventory for gateways tagged as
//! spokes. When a spoke appears it creates the VPN connections to the hub
//! routers and writes a tunnel intent artifact per connection; when a spoke
//! is untagged it writes `delete` artifacts and removes the connections.
//! Routers pick the artifacts up through the object store.

pub mod error;
pub mod inventory;
pub mod reconciler;
pub mod scanner;

pub use error::HubError;
pub use inventory::{FixtureInventory, Inventory, InventoryError};
pub use reconciler::{GatewayChange, HubReconciler, PassOutcome};
pub use scanner::{InventoryScanner, RegionSnapshot};
