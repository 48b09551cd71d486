//! Test utilities for multi-node export scenarios
//!
//! Nodes are wired together by hand: every pipeline sends into a
//! [`RecordingTransport`], and [`relay`] hands the captured datagrams to the
//! next hop as if the mesh had delivered them.

use meshflow_core::{Encoding, MeshAddress, NodeConfig, Role};
use meshflow_flow::elements::{
    DESTINATION_IPV6_ADDRESS_ID, OCTET_DELTA_COUNT_ID, PACKET_DELTA_COUNT_ID,
};
use meshflow_ipfix::{decode_message, CodecResult, TemplateRecord, SOURCE_NODE_ADDRESS_ID};
use meshflow_mesh::{
    AggregatorPipeline, Endpoint, ExportPipeline, GatewayPipeline, RecordingTransport,
    SentDatagram, StandardPipeline,
};
use std::collections::HashMap;

/// Collector port used by every scenario
pub const COLLECTOR_PORT: u16 = 4739;

/// Mesh port used by every scenario
pub const MESH_PORT: u16 = 1230;

/// Parse a mesh address literal
pub fn addr(s: &str) -> MeshAddress {
    s.parse().expect("valid mesh address literal")
}

/// Install a test subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Configuration for a node reporting to `next_hop`
pub fn node_config(address: &str, role: Role, next_hop: &str) -> NodeConfig {
    let mut config = NodeConfig::default_config(addr(address), role);
    match role {
        Role::Gateway => config.transport.collector = Some(addr(next_hop)),
        Role::Standard | Role::Aggregator => config.transport.upstream = Some(addr(next_hop)),
    }
    config
}

/// Standard node sending to `upstream` with the given encoding
pub fn standard_node(
    upstream: &str,
    encoding: Encoding,
    flow_capacity: usize,
) -> StandardPipeline<RecordingTransport> {
    let mut config = node_config("fd00::2", Role::Standard, upstream);
    config.export.encoding = encoding;
    config.export.flow_capacity = flow_capacity;
    StandardPipeline::new(
        &config.export,
        Endpoint::new(addr(upstream), MESH_PORT),
        RecordingTransport::new(),
    )
    .expect("standard node config fits")
}

/// Aggregator node sending to `upstream`
pub fn aggregator_node(upstream: &str) -> AggregatorPipeline<RecordingTransport> {
    let config = node_config("fd00::1", Role::Aggregator, upstream);
    AggregatorPipeline::new(
        &config.export,
        Endpoint::new(addr(upstream), MESH_PORT),
        RecordingTransport::new(),
    )
    .expect("aggregator config fits")
}

/// Gateway node sending to `collector`
pub fn gateway_node(collector: &str) -> GatewayPipeline<RecordingTransport> {
    let config = node_config("fd00::ff", Role::Gateway, collector);
    GatewayPipeline::new(
        &config.export,
        Endpoint::new(addr(collector), COLLECTOR_PORT),
        RecordingTransport::new(),
    )
}

/// Deliver captured datagrams to `to` as coming from `sender`; returns how many
pub fn relay(datagrams: Vec<SentDatagram>, sender: MeshAddress, to: &mut dyn ExportPipeline) -> usize {
    let count = datagrams.len();
    for datagram in datagrams {
        to.on_datagram(&datagram.payload, sender);
    }
    count
}

/// One flow record as seen by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectedFlow {
    /// Node that reported the flow, when the gateway tagged it
    pub source: Option<MeshAddress>,
    /// Flow key, when the full address was exported
    pub destination: Option<MeshAddress>,
    /// Bytes
    pub octets: u64,
    /// Packets
    pub packets: u64,
}

/// Minimal IPFIX collector: learns templates and decodes flow records
#[derive(Debug, Default)]
pub struct Collector {
    templates: HashMap<u16, TemplateRecord>,
    sequences: Vec<u32>,
    flows: Vec<CollectedFlow>,
}

impl Collector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one full IPFIX message
    pub fn receive(&mut self, payload: &[u8]) -> CodecResult<()> {
        let message = decode_message(payload)?;
        self.sequences.push(message.header.sequence_number);
        for template in message.templates() {
            self.templates.insert(template.template_id, template.clone());
        }
        for (template_id, template) in &self.templates {
            for body in message.data_sets(*template_id) {
                for record in template.records(body)? {
                    self.flows.push(collect_flow(template, record));
                }
            }
        }
        Ok(())
    }

    /// Decode every captured datagram
    pub fn receive_all(&mut self, datagrams: &[SentDatagram]) -> CodecResult<()> {
        for datagram in datagrams {
            self.receive(&datagram.payload)?;
        }
        Ok(())
    }

    /// Templates learned so far
    pub fn template(&self, template_id: u16) -> Option<&TemplateRecord> {
        self.templates.get(&template_id)
    }

    /// Sequence numbers in arrival order
    pub fn sequences(&self) -> &[u32] {
        &self.sequences
    }

    /// Flow records decoded so far
    pub fn flows(&self) -> &[CollectedFlow] {
        &self.flows
    }

    /// Total bytes reported for `destination`
    pub fn octets_for(&self, destination: MeshAddress) -> u64 {
        self.flows
            .iter()
            .filter(|flow| flow.destination == Some(destination))
            .map(|flow| flow.octets)
            .sum()
    }
}

fn collect_flow(template: &TemplateRecord, record: &[u8]) -> CollectedFlow {
    let mut flow = CollectedFlow {
        source: None,
        destination: None,
        octets: 0,
        packets: 0,
    };
    for (spec, value) in template.field_values(record) {
        match spec.id {
            DESTINATION_IPV6_ADDRESS_ID => flow.destination = address_value(value),
            SOURCE_NODE_ADDRESS_ID => flow.source = address_value(value),
            OCTET_DELTA_COUNT_ID => flow.octets = unsigned_value(value),
            PACKET_DELTA_COUNT_ID => flow.packets = unsigned_value(value),
            _ => {}
        }
    }
    flow
}

fn address_value(value: &[u8]) -> Option<MeshAddress> {
    let octets: [u8; 16] = value.try_into().ok()?;
    Some(MeshAddress::from(std::net::Ipv6Addr::from(octets)))
}

fn unsigned_value(value: &[u8]) -> u64 {
    value.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}
