//! Role pipelines.
//!
//! Each role is an independent [`ExportPipeline`] driven by three events:
//! timer ticks, inbound datagrams and traffic observations. Handlers run
//! to completion, so an encode never interleaves with a table mutation.

use crate::aggregator::AggregatorPipeline;
use crate::error::{ExportError, ExportResult};
use crate::gateway::GatewayPipeline;
use crate::standard::StandardPipeline;
use crate::transport::{Endpoint, Transport};
use meshflow_core::{Encoding, ExportConfig, MeshAddress, NodeConfig, Role};
use meshflow_flow::{
    flow_template, stats_template, ExporterStats, FlowRecord, FlowTable, UpdateOutcome,
    STATS_TEMPLATE_ID,
};
use meshflow_ipfix::{
    data_message_len, template_message_len, CodecResult, MessageWriter, Template,
};
use tracing::{debug, info, warn};

/// Per-role export state machine
pub trait ExportPipeline {
    /// Role this pipeline implements
    fn role(&self) -> Role;

    /// Periodic export; `export_time` is seconds since the UNIX epoch
    fn on_tick(&mut self, export_time: u32);

    /// Inbound datagram from `sender`
    fn on_datagram(&mut self, payload: &[u8], sender: MeshAddress);

    /// Traffic observed towards `destination`
    fn on_traffic(&mut self, destination: MeshAddress, bytes: u64) -> UpdateOutcome;

    /// Counters since startup
    fn stats(&self) -> ExporterStats;

    /// Sequence number the next generated message will carry
    fn next_sequence(&self) -> u32;
}

/// Build the pipeline for the configured role
pub fn build_pipeline<T>(config: &NodeConfig, transport: T) -> ExportResult<Box<dyn ExportPipeline + Send>>
where
    T: Transport + Send + 'static,
{
    let pipeline: Box<dyn ExportPipeline + Send> = match config.node.role {
        Role::Standard => {
            let upstream = upstream(config)?;
            Box::new(StandardPipeline::new(&config.export, upstream, transport)?)
        }
        Role::Aggregator => {
            let upstream = upstream(config)?;
            Box::new(AggregatorPipeline::new(&config.export, upstream, transport)?)
        }
        Role::Gateway => {
            let collector = config
                .transport
                .collector
                .map(|address| Endpoint::new(address, config.transport.collector_port))
                .ok_or_else(|| ExportError::Config("gateway requires a collector".to_string()))?;
            Box::new(GatewayPipeline::new(&config.export, collector, transport))
        }
    };
    info!(
        role = %config.node.role,
        address = %config.node.address,
        "Export pipeline ready"
    );
    Ok(pipeline)
}

fn upstream(config: &NodeConfig) -> ExportResult<Endpoint> {
    config
        .transport
        .upstream
        .map(|address| Endpoint::new(address, config.transport.upstream_port))
        .ok_or_else(|| ExportError::Config(format!("{} role requires an upstream", config.node.role)))
}

/// Template refresh schedule: due on the first tick, then every `every` ticks
#[derive(Debug, Clone)]
pub(crate) struct TemplateSchedule {
    every: u64,
    ticks: u64,
}

impl TemplateSchedule {
    pub(crate) fn new(every: u32) -> Self {
        Self {
            every: u64::from(every.max(1)),
            ticks: 0,
        }
    }

    /// Advance one tick, reporting whether templates are due on it
    pub(crate) fn tick(&mut self) -> bool {
        let due = self.ticks % self.every == 0;
        self.ticks += 1;
        due
    }
}

/// The node's own flow accounting and the templates exporting it
#[derive(Debug)]
pub(crate) struct LocalExport {
    pub(crate) table: FlowTable,
    pub(crate) flows: Template<FlowRecord>,
    pub(crate) stats: Option<Template<ExporterStats>>,
}

impl LocalExport {
    /// Build from config, checking that a full table fits one message
    pub(crate) fn from_config(config: &ExportConfig, encoding: Encoding) -> ExportResult<Self> {
        if config.export_stats && config.template_id == STATS_TEMPLATE_ID {
            return Err(ExportError::Config(format!(
                "template id {} is reserved for exporter statistics",
                STATS_TEMPLATE_ID
            )));
        }
        let local = Self {
            table: FlowTable::new(config.flow_capacity)?,
            flows: flow_template(config.template_id, config.compact_destination)?,
            stats: if config.export_stats {
                Some(stats_template(STATS_TEMPLATE_ID)?)
            } else {
                None
            },
        };

        let needed = local
            .template_message_len(encoding)
            .max(local.data_message_len(encoding));
        if needed > config.max_message_size {
            return Err(ExportError::BufferOverflow {
                needed,
                capacity: config.max_message_size,
            });
        }
        Ok(local)
    }

    /// Worst-case template message length
    pub(crate) fn template_message_len(&self, encoding: Encoding) -> usize {
        let mut specifiers = vec![self.flows.specifiers_len()];
        if let Some(stats) = &self.stats {
            specifiers.push(stats.specifiers_len());
        }
        template_message_len(encoding, &specifiers)
    }

    /// Worst-case data message length: a full table plus the stats record
    pub(crate) fn data_message_len(&self, encoding: Encoding) -> usize {
        let mut sets = vec![(self.table.capacity(), self.flows.record_width())];
        if let Some(stats) = &self.stats {
            sets.push((1, stats.record_width()));
        }
        data_message_len(encoding, &sets)
    }

    /// Whether a data message would carry anything
    pub(crate) fn has_data(&self) -> bool {
        !self.table.is_empty() || self.stats.is_some()
    }

    pub(crate) fn write_templates(&self, writer: &mut MessageWriter<'_>) -> CodecResult<()> {
        writer.template_set(&self.flows)?;
        if let Some(stats) = &self.stats {
            writer.template_set(stats)?;
        }
        Ok(())
    }

    pub(crate) fn write_data(
        &self,
        writer: &mut MessageWriter<'_>,
        counters: &ExporterStats,
    ) -> CodecResult<()> {
        if !self.table.is_empty() {
            writer.data_set(&self.flows, &self.table)?;
        }
        if let Some(stats) = &self.stats {
            writer.data_set(stats, counters)?;
        }
        Ok(())
    }

    /// Account one observation
    pub(crate) fn observe(
        &mut self,
        destination: MeshAddress,
        bytes: u64,
        counters: &mut ExporterStats,
    ) -> UpdateOutcome {
        let outcome = self.table.update(destination, bytes);
        counters.record_observation(outcome.is_rejected());
        if outcome.is_rejected() {
            warn!(
                %destination,
                bytes,
                capacity = self.table.capacity(),
                "Flow table full, observation dropped"
            );
        }
        outcome
    }
}

/// Send one message and count the outcome; failures are not retried
pub(crate) fn send_counted<T: Transport>(
    transport: &mut T,
    counters: &mut ExporterStats,
    payload: &[u8],
    destination: Endpoint,
    what: &'static str,
) -> bool {
    match transport.send(payload, destination) {
        Ok(()) => {
            counters.record_send(true);
            debug!(%destination, len = payload.len(), "{} message sent", what);
            true
        }
        Err(e) => {
            counters.record_send(false);
            warn!(%destination, error = %e, "Failed to send {} message", what);
            false
        }
    }
}

/// Short hex prefix of a payload for log lines
pub(crate) fn payload_prefix(payload: &[u8]) -> String {
    hex::encode(&payload[..payload.len().min(16)])
}
