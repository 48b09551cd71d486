//! Error types for flow accounting.

use meshflow_core::MeshAddress;
use thiserror::Error;

/// Errors that can occur while accounting flows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    /// New destination while every slot is taken
    #[error("Flow table full ({capacity} flows): {destination} not tracked")]
    TableFull {
        /// Destination that could not be inserted
        destination: MeshAddress,
        /// Table capacity
        capacity: usize,
    },

    /// Capacity outside the supported range
    #[error("Invalid flow table capacity: {0}")]
    InvalidCapacity(usize),
}

/// Result type for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;
