//! Configuration management for MeshFlow nodes.

use crate::error::{CoreError, CoreResult};
use crate::types::{Encoding, MeshAddress, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest template id available for data templates
pub const MIN_TEMPLATE_ID: u16 = 256;
/// Highest template id representable in the compact encoding
pub const MAX_COMPACT_TEMPLATE_ID: u16 = 511;
/// Largest flow table the compact record count can describe
pub const MAX_FLOW_CAPACITY: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    pub address: MeshAddress,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_encoding")]
    pub encoding: Encoding,
    #[serde(default = "default_flow_capacity")]
    pub flow_capacity: usize,
    #[serde(default = "default_template_id")]
    pub template_id: u16,
    #[serde(default = "default_domain_id")]
    pub domain_id: u32,
    #[serde(default = "default_template_refresh_ticks")]
    pub template_refresh_ticks: u32,
    /// Export the 2-byte node id instead of the full destination address
    #[serde(default)]
    pub compact_destination: bool,
    #[serde(default)]
    pub export_stats: bool,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub upstream: Option<MeshAddress>,
    #[serde(default = "default_listen_port")]
    pub upstream_port: u16,
    #[serde(default)]
    pub collector: Option<MeshAddress>,
    #[serde(default = "default_collector_port")]
    pub collector_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_encoding() -> Encoding {
    Encoding::Compact
}

fn default_flow_capacity() -> usize {
    10
}

fn default_template_id() -> u16 {
    MIN_TEMPLATE_ID
}

fn default_domain_id() -> u32 {
    1
}

fn default_template_refresh_ticks() -> u32 {
    10
}

fn default_max_message_size() -> usize {
    1280
}

fn default_listen_port() -> u16 {
    1230
}

fn default_collector_port() -> u16 {
    4739
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            encoding: default_encoding(),
            flow_capacity: default_flow_capacity(),
            template_id: default_template_id(),
            domain_id: default_domain_id(),
            template_refresh_ticks: default_template_refresh_ticks(),
            compact_destination: false,
            export_stats: false,
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            upstream: None,
            upstream_port: default_listen_port(),
            collector: None,
            collector_port: default_collector_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl NodeConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML configuration document
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration for a node with the given role
    pub fn default_config(address: MeshAddress, role: Role) -> Self {
        Self {
            node: NodeSection { address, role },
            export: ExportConfig::default(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Check value ranges and role requirements
    pub fn validate(&self) -> CoreResult<()> {
        let export = &self.export;

        if export.flow_capacity == 0 || export.flow_capacity > MAX_FLOW_CAPACITY {
            return Err(CoreError::Config(format!(
                "flow_capacity must be within 1..={}, got {}",
                MAX_FLOW_CAPACITY, export.flow_capacity
            )));
        }
        if export.interval_secs == 0 {
            return Err(CoreError::Config("interval_secs must be positive".into()));
        }
        if export.template_refresh_ticks == 0 {
            return Err(CoreError::Config(
                "template_refresh_ticks must be positive".into(),
            ));
        }
        if export.template_id < MIN_TEMPLATE_ID {
            return Err(CoreError::Config(format!(
                "template_id must be at least {}, got {}",
                MIN_TEMPLATE_ID, export.template_id
            )));
        }
        let compact_used = self.node.role != Role::Standard || export.encoding == Encoding::Compact;
        if compact_used && export.template_id > MAX_COMPACT_TEMPLATE_ID {
            return Err(CoreError::Config(format!(
                "template_id {} cannot be carried by the compact encoding (max {})",
                export.template_id, MAX_COMPACT_TEMPLATE_ID
            )));
        }
        if export.max_message_size < 64 || export.max_message_size > u16::MAX as usize {
            return Err(CoreError::Config(format!(
                "max_message_size must be within 64..={}, got {}",
                u16::MAX,
                export.max_message_size
            )));
        }

        match self.node.role {
            Role::Gateway if self.transport.collector.is_none() => Err(CoreError::Config(
                "gateway role requires transport.collector".into(),
            )),
            Role::Standard | Role::Aggregator if self.transport.upstream.is_none() => {
                Err(CoreError::Config(format!(
                    "{} role requires transport.upstream",
                    self.node.role
                )))
            }
            _ => Ok(()),
        }
    }
}
