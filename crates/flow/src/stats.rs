//! Exporter self-reporting.
//!
//! A node can append one record describing its own exporting process to
//! every data message, under a template of its own.

use meshflow_ipfix::{
    write_unsigned, CodecResult, InformationElement, RecordSource, Template,
    MESHFLOW_ENTERPRISE_ID,
};
use std::sync::Arc;

/// Template id of the statistics record
pub const STATS_TEMPLATE_ID: u16 = 257;

/// Private `observedPackets`
pub const OBSERVED_PACKETS_ID: u16 = 32800;
/// Private `rejectedFlows`
pub const REJECTED_FLOWS_ID: u16 = 32801;
/// Private `messagesSent`
pub const MESSAGES_SENT_ID: u16 = 32802;
/// Private `sendFailures`
pub const SEND_FAILURES_ID: u16 = 32803;
/// Private `droppedPayloads`
pub const DROPPED_PAYLOADS_ID: u16 = 32804;

const COUNTER_SIZE: u16 = 4;

/// Counters of one exporting process since startup; all wrap at 2^32
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExporterStats {
    /// Traffic observations received
    pub observed_packets: u32,
    /// Observations dropped because the flow table was full
    pub rejected_flows: u32,
    /// Messages handed to the transport successfully
    pub messages_sent: u32,
    /// Messages the transport failed to send
    pub send_failures: u32,
    /// Inbound payloads dropped as malformed or not fitting
    pub dropped_payloads: u32,
}

impl ExporterStats {
    /// Count one traffic observation
    pub fn record_observation(&mut self, rejected: bool) {
        self.observed_packets = self.observed_packets.wrapping_add(1);
        if rejected {
            self.rejected_flows = self.rejected_flows.wrapping_add(1);
        }
    }

    /// Count one send attempt
    pub fn record_send(&mut self, ok: bool) {
        if ok {
            self.messages_sent = self.messages_sent.wrapping_add(1);
        } else {
            self.send_failures = self.send_failures.wrapping_add(1);
        }
    }

    /// Count one dropped inbound payload
    pub fn record_dropped_payload(&mut self) {
        self.dropped_payloads = self.dropped_payloads.wrapping_add(1);
    }
}

impl RecordSource<ExporterStats> for ExporterStats {
    fn record_count(&self) -> usize {
        1
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&ExporterStats)) {
        visitor(self)
    }
}

fn counter(
    id: u16,
    read: fn(&ExporterStats) -> u32,
) -> CodecResult<Arc<InformationElement<ExporterStats>>> {
    InformationElement::new(
        id,
        COUNTER_SIZE,
        MESHFLOW_ENTERPRISE_ID,
        move |stats: &ExporterStats, out: &mut [u8]| write_unsigned(read(stats) as u64, out),
    )
    .map(Arc::new)
}

/// Template of the statistics record
pub fn stats_template(template_id: u16) -> CodecResult<Template<ExporterStats>> {
    Template::new(template_id)?
        .with_element(counter(OBSERVED_PACKETS_ID, |s| s.observed_packets)?)?
        .with_element(counter(REJECTED_FLOWS_ID, |s| s.rejected_flows)?)?
        .with_element(counter(MESSAGES_SENT_ID, |s| s.messages_sent)?)?
        .with_element(counter(SEND_FAILURES_ID, |s| s.send_failures)?)?
        .with_element(counter(DROPPED_PAYLOADS_ID, |s| s.dropped_payloads)?)
}
