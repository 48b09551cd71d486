//! Template-driven IPFIX codec for the MeshFlow flow export system.
//!
//! This crate serializes arbitrary record types through ordered templates of
//! information elements, in the full IPFIX encoding or in the compact
//! on-mesh encoding, and provides the receive-side operations of the mesh:
//! parsing, merging of compact payloads and compact to full transcoding.
//! It knows nothing about flows.

pub mod aggregate;
pub mod buffer;
pub mod codec;
pub mod context;
pub mod decode;
pub mod element;
pub mod error;
pub mod template;
pub mod transcode;

pub use aggregate::{AggregationBuffer, DEFAULT_MAX_TEMPLATES};
pub use buffer::ExportBuffer;
pub use codec::{
    compact_set_id, data_message_len, encode_message, header_len, set_header_len,
    template_id_from_compact, template_message_len, MessageKind, MessageWriter, RawSet,
    COMPACT_HEADER_LEN, COMPACT_SET_HEADER_LEN, HEADER_LEN, MAX_COMPACT_COUNT,
    MAX_COMPACT_TEMPLATE_ID, SET_HEADER_LEN,
};
pub use context::{export_time_now, ExportContext, DEFAULT_DOMAIN_ID, IPFIX_VERSION};
pub use decode::{
    decode_message, CompactHeader, CompactMessage, CompactSet, DecodedMessage, DecodedSet,
    MessageHeader, TemplateRecord,
};
pub use element::{
    write_unsigned, FieldSpec, InformationElement, ValueProducer, ENTERPRISE_BIT,
    MESHFLOW_ENTERPRISE_ID,
};
pub use error::{CodecError, CodecResult};
pub use template::{RecordSource, Template, MIN_DATA_TEMPLATE_ID, TEMPLATE_SET_ID};
pub use transcode::{
    source_tag_spec, transcode, transcoded_len, SOURCE_NODE_ADDRESS_ID, SOURCE_NODE_ADDRESS_SIZE,
};
