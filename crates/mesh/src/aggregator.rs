//! Fan-in exporter.
//!
//! Children send compact messages. Their data sets are merged per template
//! into the cycle's [`AggregationBuffer`] as they arrive, their templates
//! are retained, and on every tick the node adds its own table snapshot and
//! forwards everything upstream as at most one template message and one
//! data message.

use crate::error::ExportResult;
use crate::pipeline::{payload_prefix, send_counted, ExportPipeline, LocalExport, TemplateSchedule};
use crate::transport::{Endpoint, Transport};
use meshflow_core::{Encoding, ExportConfig, MeshAddress, Role};
use meshflow_flow::{ExporterStats, FlowTable, UpdateOutcome};
use meshflow_ipfix::{
    AggregationBuffer, CompactMessage, ExportBuffer, ExportContext, MessageKind,
    MessageWriter, DEFAULT_MAX_TEMPLATES,
};
use tracing::{debug, trace, warn};

/// Aggregator role pipeline
#[derive(Debug)]
pub struct AggregatorPipeline<T> {
    transport: T,
    upstream: Endpoint,
    local: LocalExport,
    ctx: ExportContext,
    buf: ExportBuffer,
    scratch: ExportBuffer,
    aggregation: AggregationBuffer,
    schedule: TemplateSchedule,
    stats: ExporterStats,
}

impl<T: Transport> AggregatorPipeline<T> {
    /// Build the pipeline; fails when the node's own table cannot fit one message
    pub fn new(config: &ExportConfig, upstream: Endpoint, transport: T) -> ExportResult<Self> {
        let local = LocalExport::from_config(config, Encoding::Compact)?;
        Ok(Self {
            transport,
            upstream,
            local,
            ctx: ExportContext::new(config.domain_id),
            buf: ExportBuffer::with_capacity(config.max_message_size),
            scratch: ExportBuffer::with_capacity(config.max_message_size),
            aggregation: AggregationBuffer::new(DEFAULT_MAX_TEMPLATES, config.max_message_size),
            schedule: TemplateSchedule::new(config.template_refresh_ticks),
            stats: ExporterStats::default(),
        })
    }

    /// Local flow table
    pub fn table(&self) -> &FlowTable {
        &self.local.table
    }

    /// Payloads merged so far this cycle
    pub fn aggregation(&self) -> &AggregationBuffer {
        &self.aggregation
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn merge_payload(&mut self, payload: &[u8]) -> ExportResult<usize> {
        let message = CompactMessage::parse(payload)?;
        Ok(self.aggregation.merge(&message)?)
    }

    /// Encode the node's own templates or data as a compact message into
    /// scratch storage and merge it like any child's payload.
    fn merge_local(&mut self, kind: MessageKind, export_time: u32) -> ExportResult<usize> {
        let counters = self.stats;
        let local = &self.local;
        let mut writer = MessageWriter::begin(
            &mut self.scratch,
            // The scratch message is never sent; it does not consume a sequence number.
            &mut ExportContext::new(self.ctx.domain_id()),
            Encoding::Compact,
            kind,
            export_time,
        )?;
        match kind {
            MessageKind::Template => local.write_templates(&mut writer)?,
            MessageKind::Data => local.write_data(&mut writer, &counters)?,
        }
        let bytes = writer.finish()?;
        let message = CompactMessage::parse(bytes)?;
        Ok(self.aggregation.merge(&message)?)
    }

    fn forward(&mut self, kind: MessageKind, export_time: u32) {
        let aggregation = &self.aggregation;
        let encoded = MessageWriter::begin(
            &mut self.buf,
            &mut self.ctx,
            Encoding::Compact,
            kind,
            export_time,
        )
        .and_then(|mut writer| {
            match kind {
                MessageKind::Template => aggregation.write_templates(&mut writer)?,
                MessageKind::Data => aggregation.write_data(&mut writer)?,
            }
            writer.finish()
        });
        match encoded {
            Ok(bytes) => {
                let what = match kind {
                    MessageKind::Template => "aggregated template",
                    MessageKind::Data => "aggregated data",
                };
                send_counted(&mut self.transport, &mut self.stats, bytes, self.upstream, what);
            }
            Err(e) => warn!(error = %e, "Failed to encode aggregated message"),
        }
    }
}

impl<T: Transport> ExportPipeline for AggregatorPipeline<T> {
    fn role(&self) -> Role {
        Role::Aggregator
    }

    fn on_tick(&mut self, export_time: u32) {
        if self.schedule.tick() {
            if let Err(e) = self.merge_local(MessageKind::Template, export_time) {
                warn!(error = %e, "Own templates could not be added");
            }
        }
        if self.local.has_data() {
            match self.merge_local(MessageKind::Data, export_time) {
                Ok(records) => trace!(records, "Own flow table merged"),
                Err(e) => {
                    self.stats.record_dropped_payload();
                    warn!(error = %e, flows = self.local.table.len(), "Own flow table dropped");
                }
            }
        }
        self.local.table.flush();

        debug!(
            templates = self.aggregation.template_count(),
            sets = self.aggregation.data_set_count(),
            records = self.aggregation.record_count(),
            "Forwarding aggregated payloads"
        );
        if self.aggregation.template_count() > 0 {
            self.forward(MessageKind::Template, export_time);
        }
        if !self.aggregation.is_empty() {
            self.forward(MessageKind::Data, export_time);
        }
        self.aggregation.reset();
    }

    fn on_datagram(&mut self, payload: &[u8], sender: MeshAddress) {
        match self.merge_payload(payload) {
            Ok(records) => trace!(%sender, records, "Child payload merged"),
            Err(e) => {
                self.stats.record_dropped_payload();
                warn!(
                    %sender,
                    len = payload.len(),
                    prefix = %payload_prefix(payload),
                    error = %e,
                    "Child payload dropped"
                );
            }
        }
    }

    fn on_traffic(&mut self, destination: MeshAddress, bytes: u64) -> UpdateOutcome {
        self.local.observe(destination, bytes, &mut self.stats)
    }

    fn stats(&self) -> ExporterStats {
        self.stats
    }

    fn next_sequence(&self) -> u32 {
        self.ctx.sequence_number()
    }
}
