//! Flow accounting for the MeshFlow flow export system.
//!
//! This crate provides the bounded flow table, the information elements
//! and template that export it, and the exporter statistics record.

pub mod elements;
pub mod error;
pub mod stats;
pub mod table;

pub use elements::{flow_template, DestinationAddress, DestinationNodeId, OctetDeltaCount, PacketDeltaCount};
pub use error::{FlowError, FlowResult};
pub use stats::{stats_template, ExporterStats, STATS_TEMPLATE_ID};
pub use table::{FlowRecord, FlowTable, UpdateOutcome, DEFAULT_FLOW_CAPACITY};
