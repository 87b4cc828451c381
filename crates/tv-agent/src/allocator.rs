//! Tunnel ID allocator
//!
//! Tunnel IDs are small router-local integers. The allocator keeps no
//! counter: every decision is made against the router's live tunnel list,
//! so manual changes on the router and agent restarts are picked up.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use thiserror::Error;

use tv_core::TunnelId;

use crate::router::TunnelBinding;

/// No tunnel ID could be allocated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Every ID in `0..max` is taken
    #[error("All {max} tunnel IDs are in use")]
    Exhausted { max: u32 },
}

/// Binding of `peer`, complete or not
pub fn binding(bindings: &[TunnelBinding], peer: Ipv4Addr) -> Option<&TunnelBinding> {
    bindings.iter().find(|b| b.remote_addr == peer)
}

/// Tunnel ID already bound to `peer`, if any
pub fn lookup(bindings: &[TunnelBinding], peer: Ipv4Addr) -> Option<TunnelId> {
    binding(bindings, peer).map(|b| b.id)
}

/// Smallest ID in `0..max` not in `used`
pub fn next_free(
    used: impl IntoIterator<Item = TunnelId>,
    max: u32,
) -> Result<TunnelId, AllocationError> {
    let used: BTreeSet<u32> = used.into_iter().map(|id| id.get()).collect();
    (0..max)
        .find(|candidate| !used.contains(candidate))
        .map(TunnelId::new)
        .ok_or(AllocationError::Exhausted { max })
}

/// ID for `peer`: its existing binding, else the smallest free ID
pub fn allocate(
    bindings: &[TunnelBinding],
    peer: Ipv4Addr,
    max: u32,
) -> Result<TunnelId, AllocationError> {
    match lookup(bindings, peer) {
        Some(id) => Ok(id),
        None => next_free(bindings.iter().map(|b| b.id), max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(ids: &[u32]) -> Vec<TunnelBinding> {
        ids.iter()
            .map(|&id| TunnelBinding::new(TunnelId::new(id), Ipv4Addr::new(52, 0, 0, id as u8)))
            .collect()
    }

    #[test]
    fn test_fills_lowest_gap() {
        let peer = Ipv4Addr::new(198, 51, 100, 1);
        assert_eq!(allocate(&bindings(&[0, 1, 3]), peer, 4096), Ok(TunnelId::new(2)));
    }

    #[test]
    fn test_empty_router_starts_at_zero() {
        let peer = Ipv4Addr::new(198, 51, 100, 1);
        assert_eq!(allocate(&[], peer, 4096), Ok(TunnelId::new(0)));
    }

    #[test]
    fn test_bound_peer_keeps_its_id() {
        let bound = bindings(&[5]);
        let peer = bound[0].remote_addr;
        assert_eq!(allocate(&bound, peer, 4096), Ok(TunnelId::new(5)));
        assert_eq!(lookup(&bound, peer), Some(TunnelId::new(5)));
        assert_eq!(lookup(&bound, Ipv4Addr::new(198, 51, 100, 1)), None);
    }

    #[test]
    fn test_incomplete_binding_keeps_its_id() {
        let peer = Ipv4Addr::new(198, 51, 100, 1);
        let bound = vec![
            TunnelBinding::new(TunnelId::new(0), Ipv4Addr::new(52, 0, 0, 0)),
            TunnelBinding::incomplete(TunnelId::new(1), peer),
        ];
        assert_eq!(allocate(&bound, peer, 4096), Ok(TunnelId::new(1)));
        assert!(!binding(&bound, peer).unwrap().complete);

        // Nobody else gets the reserved ID
        let other = Ipv4Addr::new(198, 51, 100, 2);
        assert_eq!(allocate(&bound, other, 4096), Ok(TunnelId::new(2)));
    }

    #[test]
    fn test_exhaustion_never_wraps() {
        let peer = Ipv4Addr::new(198, 51, 100, 1);
        assert_eq!(
            allocate(&bindings(&[0, 1, 2]), peer, 3),
            Err(AllocationError::Exhausted { max: 3 })
        );
    }

    #[test]
    fn test_ids_outside_range_are_ignored() {
        let used = [TunnelId::new(10), TunnelId::new(0)];
        assert_eq!(next_free(used, 2), Ok(TunnelId::new(1)));
    }
}
