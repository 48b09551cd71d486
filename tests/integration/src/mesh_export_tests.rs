//! End-to-end export through standard, aggregator and gateway nodes
//!
//! Pipelines are driven directly; datagrams move between nodes through
//! recording transports.

use crate::test_utils::*;
use meshflow_core::{Encoding, MeshAddress, NodeConfig, Role};
use meshflow_ipfix::{CompactMessage, MessageKind, SOURCE_NODE_ADDRESS_ID};
use meshflow_mesh::{ExportPipeline, NodeRuntime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::info;

#[tokio::test]
async fn test_two_level_mesh_reaches_collector() {
    init_tracing();

    info!("Step 1: children account traffic and report in compact form");
    let mut child_a = standard_node("fd00::1", Encoding::Compact, 10);
    let mut child_b = standard_node("fd00::1", Encoding::Compact, 10);
    child_a.on_traffic(addr("fd00::a"), 100);
    child_a.on_traffic(addr("fd00::a"), 50);
    child_a.on_traffic(addr("fd00::b"), 10);
    child_b.on_traffic(addr("fd00::c"), 7);
    child_a.on_tick(1_000);
    child_b.on_tick(1_000);

    info!("Step 2: aggregator merges both children and its own table");
    let mut aggregator = aggregator_node("fd00::ff");
    let delivered = relay(child_a.transport_mut().drain(), addr("fd00::2"), &mut aggregator)
        + relay(child_b.transport_mut().drain(), addr("fd00::3"), &mut aggregator);
    assert_eq!(delivered, 4);
    assert_eq!(aggregator.aggregation().record_count(), 3);
    aggregator.on_traffic(addr("fd00::d"), 1);
    aggregator.on_tick(1_001);

    let upstream = aggregator.transport_mut().drain();
    assert_eq!(upstream.len(), 2, "one template and one data message");
    let data = CompactMessage::parse(&upstream[1].payload).unwrap();
    assert_eq!(data.kind(), MessageKind::Data);
    assert_eq!(data.record_count(), 4);

    info!("Step 3: gateway expands and tags for the collector");
    let mut gateway = gateway_node("fd00::100");
    relay(upstream, addr("fd00::1"), &mut gateway);
    let exported = gateway.transport_mut().drain();
    assert_eq!(exported.len(), 2);
    assert!(exported
        .iter()
        .all(|datagram| datagram.destination.port == COLLECTOR_PORT));

    info!("Step 4: collector decodes every flow");
    let mut collector = Collector::new();
    collector.receive_all(&exported).unwrap();
    assert_eq!(collector.sequences(), &[1, 2]);
    assert_eq!(collector.flows().len(), 4);
    assert!(collector
        .flows()
        .iter()
        .all(|flow| flow.source == Some(addr("fd00::1"))));
    assert_eq!(collector.octets_for(addr("fd00::a")), 150);
    assert_eq!(collector.octets_for(addr("fd00::c")), 7);
    assert_eq!(collector.octets_for(addr("fd00::d")), 1);
    let a = collector
        .flows()
        .iter()
        .find(|flow| flow.destination == Some(addr("fd00::a")))
        .unwrap();
    assert_eq!(a.packets, 2);

    let template = collector.template(256).unwrap();
    assert_eq!(template.fields.last().unwrap().id, SOURCE_NODE_ADDRESS_ID);
}

#[tokio::test]
async fn test_templates_survive_data_only_cycles() {
    init_tracing();

    let mut child = standard_node("fd00::1", Encoding::Compact, 10);
    let mut aggregator = aggregator_node("fd00::ff");
    let mut gateway = gateway_node("fd00::100");
    let mut collector = Collector::new();

    for cycle in 0..3u64 {
        child.on_traffic(addr("fd00::a"), 10 + cycle);
        child.on_tick(cycle as u32);
        relay(child.transport_mut().drain(), addr("fd00::2"), &mut aggregator);
        aggregator.on_tick(cycle as u32);
        relay(aggregator.transport_mut().drain(), addr("fd00::1"), &mut gateway);
        collector
            .receive_all(&gateway.transport_mut().drain())
            .unwrap();
    }

    // One template message on the first cycle, then data only.
    assert_eq!(collector.sequences(), &[1, 2, 3, 4]);
    assert_eq!(collector.octets_for(addr("fd00::a")), 10 + 11 + 12);
    assert_eq!(aggregator.next_sequence(), 5);
    assert_eq!(child.next_sequence(), 5);
}

#[tokio::test]
async fn test_gateway_keeps_children_apart() {
    init_tracing();

    let mut gateway = gateway_node("fd00::100");
    let children = ["fd00::2", "fd00::3"];
    for (i, child_addr) in children.iter().enumerate() {
        let mut child = standard_node("fd00::ff", Encoding::Compact, 4);
        child.on_traffic(addr("fd00::a"), 100 * (i as u64 + 1));
        child.on_tick(0);
        relay(child.transport_mut().drain(), addr(child_addr), &mut gateway);
    }

    let exported = gateway.transport_mut().drain();
    // Every compact message is forwarded individually.
    assert_eq!(exported.len(), 4);
    let mut collector = Collector::new();
    collector.receive_all(&exported).unwrap();
    assert_eq!(collector.sequences(), &[1, 2, 3, 4]);

    let by_source = |source: &str| -> Vec<u64> {
        collector
            .flows()
            .iter()
            .filter(|flow| flow.source == Some(addr(source)))
            .map(|flow| flow.octets)
            .collect()
    };
    assert_eq!(by_source("fd00::2"), vec![100]);
    assert_eq!(by_source("fd00::3"), vec![200]);
}

#[tokio::test]
async fn test_full_encoding_straight_to_collector() {
    init_tracing();

    let mut node = standard_node("fd00::100", Encoding::Full, 2);
    node.on_traffic(addr("fd00::a"), 10);
    node.on_traffic(addr("fd00::b"), 20);
    assert!(node.on_traffic(addr("fd00::c"), 5).is_rejected());
    node.on_traffic(addr("fd00::a"), 3);
    node.on_tick(0);

    let mut collector = Collector::new();
    collector
        .receive_all(&node.transport_mut().drain())
        .unwrap();
    assert_eq!(collector.sequences(), &[1, 2]);
    assert_eq!(collector.flows().len(), 2);
    assert_eq!(collector.octets_for(addr("fd00::a")), 13);
    assert_eq!(collector.octets_for(addr("fd00::b")), 20);
    assert!(collector.flows().iter().all(|flow| flow.source.is_none()));
    assert_eq!(node.stats().rejected_flows, 1);
}

#[tokio::test]
async fn test_random_traffic_totals_reach_collector() {
    init_tracing();

    let mut rng = StdRng::seed_from_u64(0x1f1f);
    let destinations: Vec<MeshAddress> = (1..=8)
        .map(|i| addr(&format!("fd00::{:x}", 0x1000 + i)))
        .collect();
    let mut children: Vec<_> = (0..3)
        .map(|_| standard_node("fd00::1", Encoding::Compact, 10))
        .collect();
    let mut aggregator = aggregator_node("fd00::ff");
    let mut gateway = gateway_node("fd00::100");
    let mut collector = Collector::new();
    let mut expected: HashMap<MeshAddress, (u64, u64)> = HashMap::new();

    for cycle in 0..4u32 {
        for child in children.iter_mut() {
            for _ in 0..rng.gen_range(0..40) {
                let destination = destinations[rng.gen_range(0..destinations.len())];
                let bytes = rng.gen_range(40..=1500u64);
                // Eight destinations never fill a ten-flow table.
                assert!(!child.on_traffic(destination, bytes).is_rejected());
                let totals = expected.entry(destination).or_default();
                totals.0 += bytes;
                totals.1 += 1;
            }
        }
        for (i, child) in children.iter_mut().enumerate() {
            child.on_tick(cycle);
            let sender = addr(&format!("fd00::{:x}", i + 2));
            relay(child.transport_mut().drain(), sender, &mut aggregator);
        }
        aggregator.on_tick(cycle);
        relay(aggregator.transport_mut().drain(), addr("fd00::1"), &mut gateway);
        collector
            .receive_all(&gateway.transport_mut().drain())
            .unwrap();
    }

    assert_eq!(aggregator.stats().dropped_payloads, 0);
    assert_eq!(gateway.stats().dropped_payloads, 0);
    for destination in &destinations {
        let (octets, packets) = expected.get(destination).copied().unwrap_or_default();
        assert_eq!(collector.octets_for(*destination), octets);
        let collected_packets: u64 = collector
            .flows()
            .iter()
            .filter(|flow| flow.destination == Some(*destination))
            .map(|flow| flow.packets)
            .sum();
        assert_eq!(collected_packets, packets);
    }
}

#[tokio::test]
async fn test_bad_child_does_not_spoil_cycle() {
    init_tracing();

    let mut aggregator = aggregator_node("fd00::ff");
    let mut child = standard_node("fd00::1", Encoding::Compact, 10);
    child.on_traffic(addr("fd00::a"), 64);
    child.on_tick(0);

    aggregator.on_datagram(&[0xA2, 0x00, 0x01, 0x00, 0x09, 0xFF, 0xFF, 0xFF, 0xFF], addr("fd00::9"));
    relay(child.transport_mut().drain(), addr("fd00::2"), &mut aggregator);
    aggregator.on_tick(0);

    assert_eq!(aggregator.stats().dropped_payloads, 1);
    let mut gateway = gateway_node("fd00::100");
    relay(aggregator.transport_mut().drain(), addr("fd00::1"), &mut gateway);
    let mut collector = Collector::new();
    collector
        .receive_all(&gateway.transport_mut().drain())
        .unwrap();
    assert_eq!(collector.octets_for(addr("fd00::a")), 64);
}

/// Bind an IPv6 loopback socket, or skip when the host has no IPv6 loopback
async fn loopback_socket() -> Option<UdpSocket> {
    match UdpSocket::bind("[::1]:0").await {
        Ok(socket) => Some(socket),
        Err(e) => {
            info!(error = %e, "IPv6 loopback unavailable, skipping");
            None
        }
    }
}

fn loopback_config(role: Role, next_hop_port: u16) -> NodeConfig {
    let mut config = node_config("fd00::1", role, "::1");
    config.transport.listen_port = 0;
    config.transport.upstream_port = next_hop_port;
    config.transport.collector_port = next_hop_port;
    config.export.interval_secs = 1;
    config
}

#[tokio::test]
async fn test_runtime_gateway_over_udp() {
    init_tracing();
    let Some(collector_socket) = loopback_socket().await else {
        return;
    };
    let collector_port = collector_socket.local_addr().unwrap().port();

    let runtime = NodeRuntime::bind(&loopback_config(Role::Gateway, collector_port))
        .await
        .unwrap();
    let gateway_port = runtime.local_addr().unwrap().port();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(runtime.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut child = standard_node("::1", Encoding::Compact, 4);
    child.on_traffic(addr("fd00::a"), 1500);
    child.on_tick(0);
    let child_socket = loopback_socket().await.unwrap();
    let mut collector = Collector::new();
    for datagram in child.transport_mut().drain() {
        child_socket
            .send_to(&datagram.payload, ("::1", gateway_port))
            .await
            .unwrap();
        let mut buf = vec![0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(5), collector_socket.recv_from(&mut buf))
            .await
            .expect("gateway forwarded the message")
            .unwrap();
        collector.receive(&buf[..len]).unwrap();
    }

    let _ = stop_tx.send(());
    task.await.unwrap().unwrap();

    assert_eq!(collector.octets_for(addr("fd00::a")), 1500);
    assert_eq!(collector.flows()[0].source, Some(MeshAddress::from(std::net::Ipv6Addr::LOCALHOST)));
}

#[tokio::test]
async fn test_runtime_standard_exports_observed_traffic() {
    init_tracing();
    let Some(upstream_socket) = loopback_socket().await else {
        return;
    };
    let upstream_port = upstream_socket.local_addr().unwrap().port();

    let runtime = NodeRuntime::bind(&loopback_config(Role::Standard, upstream_port))
        .await
        .unwrap();
    let traffic = runtime.traffic_handle();
    assert!(traffic.observe(addr("fd00::a"), 400));
    traffic.observe_wait(addr("fd00::b"), 40).await.unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(runtime.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut kinds = Vec::new();
    let mut records = 0;
    let mut buf = vec![0u8; 2048];
    for _ in 0..2 {
        let (len, _) = timeout(Duration::from_secs(5), upstream_socket.recv_from(&mut buf))
            .await
            .expect("node exported on its first period")
            .unwrap();
        let message = CompactMessage::parse(&buf[..len]).unwrap();
        kinds.push(message.kind());
        if message.kind() == MessageKind::Data {
            records = message.record_count();
        }
    }

    let _ = stop_tx.send(());
    task.await.unwrap().unwrap();

    assert_eq!(kinds, vec![MessageKind::Template, MessageKind::Data]);
    assert_eq!(records, 2);
}
