//! Exporter-wide message state threaded through every encode.

use std::time::{SystemTime, UNIX_EPOCH};

/// IPFIX protocol version written in full headers
pub const IPFIX_VERSION: u16 = 10;

/// First sequence number handed out
pub const INITIAL_SEQUENCE: u32 = 1;

/// Default observation domain
pub const DEFAULT_DOMAIN_ID: u32 = 1;

/// Sequence numbering and identity of one exporting process.
///
/// Owned by a pipeline for the node's uptime. The sequence number advances
/// once per generated message of any kind and wraps at 2^32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportContext {
    sequence_number: u32,
    domain_id: u32,
    version: u16,
}

impl ExportContext {
    /// Context for `domain_id`, starting at [`INITIAL_SEQUENCE`]
    pub fn new(domain_id: u32) -> Self {
        Self::with_sequence(domain_id, INITIAL_SEQUENCE)
    }

    /// Context resuming at an explicit sequence number
    pub fn with_sequence(domain_id: u32, sequence_number: u32) -> Self {
        Self {
            sequence_number,
            domain_id,
            version: IPFIX_VERSION,
        }
    }

    /// Sequence number the next message will carry
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Observation domain
    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    /// Protocol version
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Claim the sequence number for a new message and advance
    pub fn next_sequence(&mut self) -> u32 {
        let current = self.sequence_number;
        self.sequence_number = current.wrapping_add(1);
        current
    }
}

impl Default for ExportContext {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_ID)
    }
}

/// Seconds since the UNIX epoch, truncated to the 32-bit header field
pub fn export_time_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}
