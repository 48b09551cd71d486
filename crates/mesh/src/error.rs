//! Error types for MeshFlow export pipelines.

use meshflow_core::CoreError;
use meshflow_flow::FlowError;
use meshflow_ipfix::CodecError;
use thiserror::Error;

/// Errors that can occur while building or running an export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The datagram transport could not be created; fatal for the pipeline
    #[error("Transport unavailable on port {port}: {source}")]
    TransportUnavailable {
        /// Local port the transport tried to bind
        port: u16,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Configured limits cannot hold a full export
    #[error("Buffer overflow: {needed} bytes needed, {capacity} available")]
    BufferOverflow {
        /// Worst-case message size
        needed: usize,
        /// Configured maximum message size
        capacity: usize,
    },

    /// Encoding or decoding failure
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Flow table failure
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// Datagram send or receive failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration rejected by validation
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// The node runtime is no longer accepting events
    #[error("Node runtime has stopped")]
    RuntimeStopped,
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
