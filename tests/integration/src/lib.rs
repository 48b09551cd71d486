//! Integration tests for multi-node export
//!
//! This test suite validates:
//! - Standard nodes reporting through an aggregator and a gateway
//! - Collector-side decoding of everything the gateway emits
//! - Sequence numbering across roles
//! - Configuration documents for every role

pub mod test_utils;

#[cfg(test)]
mod config_tests;

#[cfg(test)]
mod mesh_export_tests;
