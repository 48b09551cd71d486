//! Core functionality for the MeshFlow flow export system.
//!
//! This crate provides the fundamental types, configuration and logging
//! used across the MeshFlow workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{ExportConfig, LoggingConfig, NodeConfig, NodeSection, TransportConfig};
pub use error::{CoreError, CoreResult};
pub use types::{Encoding, MeshAddress, Role};
