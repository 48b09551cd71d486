//! Collector-facing exporter.
//!
//! Every compact message arriving from the mesh is expanded to the full
//! encoding, tagged with the sender's mesh address, and forwarded to the
//! collector on its own. Gateways keep no flow table.

use crate::pipeline::{payload_prefix, send_counted, ExportPipeline};
use crate::transport::{Endpoint, Transport};
use meshflow_core::{ExportConfig, MeshAddress, Role};
use meshflow_flow::{ExporterStats, UpdateOutcome};
use meshflow_ipfix::{transcode, CompactMessage, ExportBuffer, ExportContext};
use tracing::{trace, warn};

/// Output buffer size: the largest message the full header can describe
pub const GATEWAY_BUFFER_LEN: usize = u16::MAX as usize;

/// Gateway role pipeline
#[derive(Debug)]
pub struct GatewayPipeline<T> {
    transport: T,
    collector: Endpoint,
    ctx: ExportContext,
    buf: ExportBuffer,
    stats: ExporterStats,
}

impl<T: Transport> GatewayPipeline<T> {
    /// Build the pipeline
    pub fn new(config: &ExportConfig, collector: Endpoint, transport: T) -> Self {
        Self {
            transport,
            collector,
            ctx: ExportContext::new(config.domain_id),
            buf: ExportBuffer::with_capacity(GATEWAY_BUFFER_LEN),
            stats: ExporterStats::default(),
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T: Transport> ExportPipeline for GatewayPipeline<T> {
    fn role(&self) -> Role {
        Role::Gateway
    }

    fn on_tick(&mut self, _export_time: u32) {
        trace!(
            sent = self.stats.messages_sent,
            dropped = self.stats.dropped_payloads,
            "Gateway tick"
        );
    }

    fn on_datagram(&mut self, payload: &[u8], sender: MeshAddress) {
        let expanded = CompactMessage::parse(payload).and_then(|message| {
            transcode(
                &message,
                &mut self.buf,
                &mut self.ctx,
                meshflow_ipfix::export_time_now(),
                Some(sender),
            )
        });
        match expanded {
            Ok(bytes) => {
                send_counted(
                    &mut self.transport,
                    &mut self.stats,
                    bytes,
                    self.collector,
                    "transcoded",
                );
            }
            Err(e) => {
                self.stats.record_dropped_payload();
                warn!(
                    %sender,
                    len = payload.len(),
                    prefix = %payload_prefix(payload),
                    error = %e,
                    "Mesh payload dropped"
                );
            }
        }
    }

    /// Gateways account no traffic; every observation is reported rejected.
    fn on_traffic(&mut self, destination: MeshAddress, _bytes: u64) -> UpdateOutcome {
        trace!(%destination, "Gateway ignores traffic observation");
        UpdateOutcome::Rejected
    }

    fn stats(&self) -> ExporterStats {
        self.stats
    }

    fn next_sequence(&self) -> u32 {
        self.ctx.sequence_number()
    }
}
