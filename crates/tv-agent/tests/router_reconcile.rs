//! Router reconciliation scenarios over the in-memory router and store

use std::net::Ipv4Addr;
use std::sync::Arc;

use bytes::Bytes;

use tv_agent::reconciler::ArtifactOutcome;
use tv_agent::router::RouterOperation;
use tv_agent::{AgentError, MemoryRouter, RouterReconciler};
use tv_core::config::AgentConfig;
use tv_core::store::MemoryStore;
use tv_core::{AccessPolicy, ArtifactStore, TunnelId};
use tv_protocol::{
    ConnectionConfig, IntentStatus, TransitConfig, TunnelEndpoint, TunnelIntentArtifact,
    TunnelPayload,
};

const CUSTOMER_INSIDE: Ipv4Addr = Ipv4Addr::new(169, 254, 10, 2);
const VGW_INSIDE: Ipv4Addr = Ipv4Addr::new(169, 254, 10, 1);

fn artifact_body(connection_id: &str, peer: Ipv4Addr, subnet: &str, status: IntentStatus) -> Bytes {
    let document = ConnectionConfig {
        connection_id: connection_id.to_string(),
        customer_gateway_id: "cgw-1".to_string(),
        vpn_gateway_id: "vgw-1".to_string(),
        tunnels: vec![TunnelPayload {
            customer_gateway: TunnelEndpoint::new(Ipv4Addr::new(203, 0, 113, 10), CUSTOMER_INSIDE),
            vpn_gateway: TunnelEndpoint::new(peer, VGW_INSIDE),
            pre_shared_key: format!("psk_{}", connection_id),
        }],
    }
    .to_xml()
    .unwrap();

    let transit = TransitConfig {
        account_id: "123456789012".to_string(),
        vpn_endpoint: "CSR1".to_string(),
        spoke_subnet: subnet.parse().unwrap(),
        customer_local_ip: Ipv4Addr::new(10, 255, 0, 10),
        status,
    };
    let artifact = TunnelIntentArtifact::from_connection_config(&document, transit).unwrap();
    Bytes::from(artifact.to_xml().unwrap())
}

struct Harness {
    router: Arc<MemoryRouter>,
    store: Arc<MemoryStore>,
    reconciler: RouterReconciler,
}

fn harness() -> Harness {
    let router = Arc::new(MemoryRouter::new());
    let store = Arc::new(MemoryStore::new());
    let reconciler = RouterReconciler::new(AgentConfig::default(), router.clone(), store.clone());
    Harness {
        router,
        store,
        reconciler,
    }
}

async fn put(store: &MemoryStore, key: &str, body: Bytes) {
    store
        .put(key, body, AccessPolicy::OwnerFullControl)
        .await
        .unwrap();
}

const KEY: &str = "vpnconfigs/CSR1/us-east-1-vpn-1.conf";
const PEER: Ipv4Addr = Ipv4Addr::new(52, 1, 1, 1);

#[tokio::test]
async fn test_end_to_end_create() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;

    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::Created(TunnelId::new(0)))]
    );

    let tunnels = h.router.tunnels().await;
    assert_eq!(tunnels.len(), 1);
    assert_eq!(tunnels[0].instance, 0);
    assert_eq!(tunnels[0].remote_addr, PEER);
    assert_eq!(tunnels[0].local_addr, Ipv4Addr::new(10, 255, 0, 10));

    let interfaces = h.router.interfaces().await;
    assert_eq!(interfaces.len(), 1);
    assert_eq!(interfaces[0].name, "ipsec0");
    assert_eq!(interfaces[0].address.to_string(), "169.254.10.2/30");

    let routes = h.router.routes().await;
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].destination.to_string(), "10.1.0.0/16");
    assert_eq!(routes[0].interface, "ipsec0");
    assert_eq!(routes[0].next_hop, VGW_INSIDE);

    // Create artifacts are kept
    assert_eq!(h.store.list("vpnconfigs/").await.unwrap(), vec![KEY.to_string()]);
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;

    h.reconciler.run_pass().await.unwrap();
    h.router.clear_calls().await;
    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::AlreadyPresent(TunnelId::new(0)))]
    );
    // The bound peer is observed and nothing is written
    assert_eq!(h.router.calls().await, vec![RouterOperation::ListTunnels]);
    assert_eq!(h.router.tunnels().await.len(), 1);
    assert_eq!(h.router.interfaces().await.len(), 1);
    assert_eq!(h.router.routes().await.len(), 1);
}

#[tokio::test]
async fn test_failed_tunnel_put_is_retried_next_pass() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;

    h.router.set_failing(RouterOperation::PutTunnel, true).await;
    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, AgentError::Router(_)));
    assert!(h.router.tunnels().await.is_empty());
    assert!(h.router.interfaces().await.is_empty());

    h.router.set_failing(RouterOperation::PutTunnel, false).await;
    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::Created(TunnelId::new(0)))]
    );
    assert_eq!(h.router.tunnels().await.len(), 1);
    assert_eq!(h.router.interfaces().await.len(), 1);
    assert_eq!(h.router.routes().await.len(), 1);
}

#[tokio::test]
async fn test_end_to_end_delete() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;
    h.reconciler.run_pass().await.unwrap();

    // The hub rewrites the same key as a delete
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Delete)).await;
    h.router.clear_calls().await;
    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::Removed(TunnelId::new(0)))]
    );
    assert_eq!(
        h.router.calls().await,
        vec![
            RouterOperation::ListTunnels,
            RouterOperation::DeleteInterface,
            RouterOperation::DeleteTunnel,
            RouterOperation::DeleteRoute,
        ]
    );
    assert!(h.router.tunnels().await.is_empty());
    assert!(h.router.interfaces().await.is_empty());
    assert!(h.router.routes().await.is_empty());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Delete)).await;

    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::AlreadyAbsent)]
    );
    assert_eq!(h.router.calls().await, vec![RouterOperation::ListTunnels]);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_failed_tunnel_delete_keeps_artifact() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;
    h.reconciler.run_pass().await.unwrap();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Delete)).await;

    h.router.set_failing(RouterOperation::DeleteTunnel, true).await;
    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(report.failed.len(), 1);
    assert_eq!(h.store.len(), 1);
    // Interface and route removal were still attempted
    assert!(h.router.interfaces().await.is_empty());
    assert!(h.router.routes().await.is_empty());
    assert_eq!(h.router.tunnels().await.len(), 1);

    h.router.set_failing(RouterOperation::DeleteTunnel, false).await;
    let report = h.reconciler.run_pass().await.unwrap();
    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::Removed(TunnelId::new(0)))]
    );
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_interface_and_route_failures_do_not_block_teardown() {
    let h = harness();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;
    h.reconciler.run_pass().await.unwrap();
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Delete)).await;

    h.router.set_failing(RouterOperation::DeleteInterface, true).await;
    h.router.set_failing(RouterOperation::DeleteRoute, true).await;
    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(
        report.applied,
        vec![(KEY.to_string(), ArtifactOutcome::Removed(TunnelId::new(0)))]
    );
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_artifacts_get_distinct_tunnels() {
    let h = harness();
    let peers = [
        Ipv4Addr::new(52, 1, 1, 1),
        Ipv4Addr::new(52, 1, 1, 2),
        Ipv4Addr::new(52, 1, 1, 3),
    ];
    for (i, peer) in peers.iter().enumerate() {
        put(
            &h.store,
            &format!("vpnconfigs/CSR1/us-east-1-vpn-{}.conf", i),
            artifact_body(&format!("vpn-{}", i), *peer, &format!("10.{}.0.0/16", i + 1), IntentStatus::Create),
        )
        .await;
    }

    h.reconciler.run_pass().await.unwrap();

    let ids: Vec<u32> = h.router.tunnels().await.iter().map(|t| t.instance).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    let names: Vec<String> = h.router.interfaces().await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["ipsec0", "ipsec1", "ipsec2"]);
}

#[tokio::test]
async fn test_freed_id_is_reused() {
    let h = harness();
    let first = "vpnconfigs/CSR1/us-east-1-vpn-a.conf";
    let second = "vpnconfigs/CSR1/us-east-1-vpn-b.conf";
    put(&h.store, first, artifact_body("vpn-a", Ipv4Addr::new(52, 1, 1, 1), "10.1.0.0/16", IntentStatus::Create)).await;
    put(&h.store, second, artifact_body("vpn-b", Ipv4Addr::new(52, 1, 1, 2), "10.2.0.0/16", IntentStatus::Create)).await;
    h.reconciler.run_pass().await.unwrap();

    put(&h.store, first, artifact_body("vpn-a", Ipv4Addr::new(52, 1, 1, 1), "10.1.0.0/16", IntentStatus::Delete)).await;
    h.reconciler.run_pass().await.unwrap();

    let third = "vpnconfigs/CSR1/us-east-1-vpn-c.conf";
    put(&h.store, third, artifact_body("vpn-c", Ipv4Addr::new(52, 1, 1, 3), "10.3.0.0/16", IntentStatus::Create)).await;
    let report = h.reconciler.run_pass().await.unwrap();

    assert!(report
        .applied
        .contains(&(third.to_string(), ArtifactOutcome::Created(TunnelId::new(0)))));
}

#[tokio::test]
async fn test_malformed_artifact_is_skipped_and_kept() {
    let h = harness();
    let bad = "vpnconfigs/CSR1/us-east-1-vpn-0.conf";
    put(&h.store, bad, Bytes::from_static(b"<vpn_connection><oops")).await;
    put(&h.store, KEY, artifact_body("vpn-1", PEER, "10.1.0.0/16", IntentStatus::Create)).await;

    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(report.malformed, vec![bad.to_string()]);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_only_own_endpoint_is_consumed() {
    let h = harness();
    put(
        &h.store,
        "vpnconfigs/CSR2/us-east-1-vpn-2.conf",
        artifact_body("vpn-2", PEER, "10.1.0.0/16", IntentStatus::Create),
    )
    .await;

    let report = h.reconciler.run_pass().await.unwrap();

    assert_eq!(report.total(), 0);
    assert!(h.router.tunnels().await.is_empty());
}

#[tokio::test]
async fn test_exhausted_ids_fail_only_that_artifact() {
    let router = Arc::new(MemoryRouter::new());
    let store = Arc::new(MemoryStore::new());
    let config = AgentConfig {
        max_tunnels: 1,
        ..AgentConfig::default()
    };
    let reconciler = RouterReconciler::new(config, router.clone(), store.clone());

    put(&store, "vpnconfigs/CSR1/us-east-1-vpn-a.conf", artifact_body("vpn-a", Ipv4Addr::new(52, 1, 1, 1), "10.1.0.0/16", IntentStatus::Create)).await;
    put(&store, "vpnconfigs/CSR1/us-east-1-vpn-b.conf", artifact_body("vpn-b", Ipv4Addr::new(52, 1, 1, 2), "10.2.0.0/16", IntentStatus::Create)).await;

    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, AgentError::Allocation(_)));
    assert_eq!(router.tunnels().await.len(), 1);
}
