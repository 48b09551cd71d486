//! Error types for MeshFlow IPFIX encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding, decoding, merging or transcoding messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Encoded message would exceed the fixed output buffer
    #[error("Buffer overflow: {needed} bytes needed, {capacity} available")]
    BufferOverflow {
        /// Bytes the write required in total
        needed: usize,
        /// Fixed capacity of the buffer
        capacity: usize,
    },

    /// Input ended before a complete structure could be read
    #[error("Truncated input: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Message header is inconsistent
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Set header or body is inconsistent
    #[error("Malformed set {set_id}: {reason}")]
    MalformedSet {
        /// Set identifier as found on the wire
        set_id: u16,
        /// What was wrong
        reason: String,
    },

    /// Information element definition rejected
    #[error("Invalid information element {id}: {reason}")]
    InvalidElement {
        /// Element id
        id: u16,
        /// What was wrong
        reason: String,
    },

    /// Template definition rejected
    #[error("Invalid template {id}: {reason}")]
    InvalidTemplate {
        /// Template id
        id: u16,
        /// What was wrong
        reason: String,
    },

    /// Records of different widths cannot share a set
    #[error("Record width mismatch for template {template_id}: expected {expected}, got {actual}")]
    RecordWidthMismatch {
        /// Template id
        template_id: u16,
        /// Width already established
        expected: usize,
        /// Width offered
        actual: usize,
    },

    /// Record count exceeds what the encoding can describe
    #[error("Too many records for template {template_id}: {count} (max {max})")]
    TooManyRecords {
        /// Template id
        template_id: u16,
        /// Requested count
        count: usize,
        /// Encoding limit
        max: usize,
    },

    /// Record source yielded a different number of records than it announced
    #[error("Record count changed during encode of template {template_id}: announced {announced}, produced {produced}")]
    RecordCountMismatch {
        /// Template id
        template_id: u16,
        /// Snapshot taken before serialization
        announced: usize,
        /// Records actually visited
        produced: usize,
    },

    /// A set was added to a message of the other kind
    #[error("Cannot add a {set} set to a {message} message")]
    KindMismatch {
        /// Kind of the set being written
        set: &'static str,
        /// Kind of the message under construction
        message: &'static str,
    },

    /// Template id cannot be represented in the compact encoding
    #[error("Template id {0} is outside the compact range 256..=511")]
    TemplateOutOfCompactRange(u16),

    /// No free slot for another template in a fixed-size structure
    #[error("Template slots exhausted: cannot track template {0}")]
    TemplateSlotsExhausted(u16),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
