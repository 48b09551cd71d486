//! Information elements of a flow record and the flow template.
//!
//! Each field kind is a unit struct implementing [`ValueProducer`]; adding
//! a field means adding a struct and registering it, never touching the
//! codec.

use crate::table::FlowRecord;
use meshflow_ipfix::{
    write_unsigned, CodecResult, InformationElement, Template, ValueProducer,
    MESHFLOW_ENTERPRISE_ID,
};
use std::sync::Arc;

/// IANA `octetDeltaCount`
pub const OCTET_DELTA_COUNT_ID: u16 = 1;
/// IANA `packetDeltaCount`
pub const PACKET_DELTA_COUNT_ID: u16 = 2;
/// IANA `destinationIPv6Address`
pub const DESTINATION_IPV6_ADDRESS_ID: u16 = 28;
/// Private `destinationNodeId`
pub const DESTINATION_NODE_ID_ID: u16 = 32770;

/// Width of the exported byte counter
pub const OCTET_DELTA_COUNT_SIZE: u16 = 4;
/// Width of the exported packet counter
pub const PACKET_DELTA_COUNT_SIZE: u16 = 4;

/// Bytes towards the destination this cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct OctetDeltaCount;

impl ValueProducer<FlowRecord> for OctetDeltaCount {
    fn produce(&self, record: &FlowRecord, out: &mut [u8]) {
        write_unsigned(record.byte_count, out)
    }
}

/// Packets towards the destination this cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDeltaCount;

impl ValueProducer<FlowRecord> for PacketDeltaCount {
    fn produce(&self, record: &FlowRecord, out: &mut [u8]) {
        write_unsigned(record.packet_count, out)
    }
}

/// Full 16-octet destination address
#[derive(Debug, Clone, Copy, Default)]
pub struct DestinationAddress;

impl ValueProducer<FlowRecord> for DestinationAddress {
    fn produce(&self, record: &FlowRecord, out: &mut [u8]) {
        out.copy_from_slice(&record.destination.octets())
    }
}

/// 2-octet node id of the destination
#[derive(Debug, Clone, Copy, Default)]
pub struct DestinationNodeId;

impl ValueProducer<FlowRecord> for DestinationNodeId {
    fn produce(&self, record: &FlowRecord, out: &mut [u8]) {
        out.copy_from_slice(&record.destination.node_id().to_be_bytes())
    }
}

/// `destinationIPv6Address` element
pub fn destination_address() -> CodecResult<InformationElement<FlowRecord>> {
    InformationElement::new(DESTINATION_IPV6_ADDRESS_ID, 16, 0, DestinationAddress)
}

/// `destinationNodeId` element
pub fn destination_node_id() -> CodecResult<InformationElement<FlowRecord>> {
    InformationElement::new(DESTINATION_NODE_ID_ID, 2, MESHFLOW_ENTERPRISE_ID, DestinationNodeId)
}

/// `octetDeltaCount` element
pub fn octet_delta_count() -> CodecResult<InformationElement<FlowRecord>> {
    InformationElement::new(
        OCTET_DELTA_COUNT_ID,
        OCTET_DELTA_COUNT_SIZE,
        0,
        OctetDeltaCount,
    )
}

/// `packetDeltaCount` element
pub fn packet_delta_count() -> CodecResult<InformationElement<FlowRecord>> {
    InformationElement::new(
        PACKET_DELTA_COUNT_ID,
        PACKET_DELTA_COUNT_SIZE,
        0,
        PacketDeltaCount,
    )
}

/// Flow template: destination, bytes, packets.
///
/// With `compact_destination` the destination is exported as its 2-octet
/// node id instead of the full address.
pub fn flow_template(template_id: u16, compact_destination: bool) -> CodecResult<Template<FlowRecord>> {
    let destination = if compact_destination {
        destination_node_id()?
    } else {
        destination_address()?
    };
    Template::new(template_id)?
        .with_element(Arc::new(destination))?
        .with_element(Arc::new(octet_delta_count()?))?
        .with_element(Arc::new(packet_delta_count()?))
}
