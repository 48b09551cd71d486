//! Leaf exporter.
//!
//! Accumulates traffic into the flow table between ticks. On every tick it
//! encodes the table in the configured encoding, sends it upstream and
//! flushes the table whether or not the send succeeded.

use crate::error::ExportResult;
use crate::pipeline::{send_counted, ExportPipeline, LocalExport, TemplateSchedule};
use crate::transport::{Endpoint, Transport};
use meshflow_core::{Encoding, ExportConfig, MeshAddress, Role};
use meshflow_flow::{ExporterStats, FlowTable, UpdateOutcome};
use meshflow_ipfix::{ExportBuffer, ExportContext, MessageKind, MessageWriter};
use tracing::{debug, trace, warn};

/// Standard role pipeline
#[derive(Debug)]
pub struct StandardPipeline<T> {
    transport: T,
    upstream: Endpoint,
    encoding: Encoding,
    local: LocalExport,
    ctx: ExportContext,
    buf: ExportBuffer,
    schedule: TemplateSchedule,
    stats: ExporterStats,
}

impl<T: Transport> StandardPipeline<T> {
    /// Build the pipeline; fails when a full table cannot fit one message
    pub fn new(config: &ExportConfig, upstream: Endpoint, transport: T) -> ExportResult<Self> {
        let local = LocalExport::from_config(config, config.encoding)?;
        Ok(Self {
            transport,
            upstream,
            encoding: config.encoding,
            local,
            ctx: ExportContext::new(config.domain_id),
            buf: ExportBuffer::with_capacity(config.max_message_size),
            schedule: TemplateSchedule::new(config.template_refresh_ticks),
            stats: ExporterStats::default(),
        })
    }

    /// Local flow table
    pub fn table(&self) -> &FlowTable {
        &self.local.table
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn send_templates(&mut self, export_time: u32) {
        let encoded = MessageWriter::begin(
            &mut self.buf,
            &mut self.ctx,
            self.encoding,
            MessageKind::Template,
            export_time,
        )
        .and_then(|mut writer| {
            self.local.write_templates(&mut writer)?;
            writer.finish()
        });
        match encoded {
            Ok(bytes) => {
                send_counted(
                    &mut self.transport,
                    &mut self.stats,
                    bytes,
                    self.upstream,
                    "template",
                );
            }
            Err(e) => warn!(error = %e, "Failed to encode template message"),
        }
    }

    fn send_data(&mut self, export_time: u32) {
        if !self.local.has_data() {
            trace!("Flow table empty, no data message this cycle");
            return;
        }
        let flows = self.local.table.len();
        let counters = self.stats;
        let encoded = MessageWriter::begin(
            &mut self.buf,
            &mut self.ctx,
            self.encoding,
            MessageKind::Data,
            export_time,
        )
        .and_then(|mut writer| {
            self.local.write_data(&mut writer, &counters)?;
            writer.finish()
        });
        match encoded {
            Ok(bytes) => {
                debug!(flows, len = bytes.len(), "Exporting flow table");
                send_counted(
                    &mut self.transport,
                    &mut self.stats,
                    bytes,
                    self.upstream,
                    "data",
                );
            }
            Err(e) => warn!(error = %e, flows, "Failed to encode data message"),
        }
    }
}

impl<T: Transport> ExportPipeline for StandardPipeline<T> {
    fn role(&self) -> Role {
        Role::Standard
    }

    fn on_tick(&mut self, export_time: u32) {
        if self.schedule.tick() {
            self.send_templates(export_time);
        }
        self.send_data(export_time);
        self.local.table.flush();
    }

    fn on_datagram(&mut self, payload: &[u8], sender: MeshAddress) {
        trace!(%sender, len = payload.len(), "Standard node ignores inbound datagram");
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
