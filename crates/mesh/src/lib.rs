//! MeshFlow Mesh - Role Pipelines and Node Runtime
//!
//! Moves flow exports through the mesh towards the collector.
//!
//! # Core Components
//!
//! - **Standard**: accounts local traffic and exports it every period
//! - **Aggregator**: merges its children's compact reports into one upstream message
//! - **Gateway**: expands compact reports to full IPFIX for the collector
//! - **Runtime**: single-task event loop over ticks, datagrams and traffic
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use meshflow_core::NodeConfig;
//! use meshflow_mesh::NodeRuntime;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NodeConfig::from_file("node.toml")?;
//! let runtime = NodeRuntime::bind(&config).await?;
//! let traffic = runtime.traffic_handle();
//! traffic.observe("fd00::a".parse()?, 1280);
//! runtime.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod aggregator;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod runtime;
pub mod standard;
pub mod transport;

// Re-export main types
pub use aggregator::AggregatorPipeline;
pub use error::{ExportError, ExportResult};
pub use gateway::GatewayPipeline;
pub use pipeline::{build_pipeline, ExportPipeline};
pub use runtime::{dispatch, NodeRuntime, PipelineEvent, TrafficHandle, TrafficSample};
pub use standard::StandardPipeline;
pub use transport::{Endpoint, RecordingTransport, SentDatagram, Transport, UdpTransport};
