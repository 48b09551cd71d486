//! Compact to full expansion.
//!
//! A pure rewrite of headers: set bodies are copied byte for byte, so no
//! schema object is needed. When a source address is supplied it is added
//! as one more field, at the end of every template and every data record,
//! because the compact format carries no sender field.

use crate::buffer::ExportBuffer;
use crate::codec::{MessageKind, MessageWriter, HEADER_LEN, SET_HEADER_LEN, TEMPLATE_RECORD_HEADER_LEN};
use crate::context::ExportContext;
use crate::decode::CompactMessage;
use crate::element::{FieldSpec, MESHFLOW_ENTERPRISE_ID};
use crate::error::CodecResult;
use meshflow_core::{Encoding, MeshAddress};
use tracing::trace;

/// `sourceNodeAddress`: mesh address of the node a compact message came from
pub const SOURCE_NODE_ADDRESS_ID: u16 = 32771;

/// Width of the source tag
pub const SOURCE_NODE_ADDRESS_SIZE: u16 = 16;

/// Field specifier of the source tag
pub fn source_tag_spec() -> FieldSpec {
    FieldSpec {
        id: SOURCE_NODE_ADDRESS_ID,
        octet_size: SOURCE_NODE_ADDRESS_SIZE,
        enterprise_id: MESHFLOW_ENTERPRISE_ID,
    }
}

fn source_tag_specifier() -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..2].copy_from_slice(&SOURCE_NODE_ADDRESS_ID.to_be_bytes());
    out[2..4].copy_from_slice(&SOURCE_NODE_ADDRESS_SIZE.to_be_bytes());
    out[4..].copy_from_slice(&MESHFLOW_ENTERPRISE_ID.to_be_bytes());
    out
}

/// Expand `message` into a full message in `buf`.
///
/// The full message takes the next sequence number of `ctx`. With
/// `source`, every template gains the source tag specifier and every data
/// record gains the 16 address octets.
pub fn transcode<'b>(
    message: &CompactMessage<'_>,
    buf: &'b mut ExportBuffer,
    ctx: &mut ExportContext,
    export_time: u32,
    source: Option<MeshAddress>,
) -> CodecResult<&'b [u8]> {
    let kind = message.kind();
    let mut writer = MessageWriter::begin(buf, ctx, Encoding::Full, kind, export_time)?;
    let tag = source_tag_specifier();
    let address = source.map(|addr| addr.octets());

    for set in message.sets() {
        match kind {
            MessageKind::Template => {
                let fields = set.count as usize + usize::from(address.is_some());
                let raw = writer.open_raw_set(set.template_id, fields)?;
                let mut result = writer.extend_raw_set(&raw, set.body);
                if result.is_ok() && address.is_some() {
                    result = writer.extend_raw_set(&raw, &tag);
                }
                match result {
                    Ok(()) => writer.close_raw_set(raw)?,
                    Err(err) => {
                        writer.abandon_raw_set(raw);
                        return Err(err);
                    }
                }
            }
            MessageKind::Data => match address {
                None => writer.raw_set(set.template_id, set.count as usize, set.body)?,
                Some(octets) => {
                    let raw = writer.open_raw_set(set.template_id, set.count as usize)?;
                    let result = set.records().try_for_each(|record| {
                        writer.extend_raw_set(&raw, record)?;
                        writer.extend_raw_set(&raw, &octets)
                    });
                    match result {
                        Ok(()) => writer.close_raw_set(raw)?,
                        Err(err) => {
                            writer.abandon_raw_set(raw);
                            return Err(err);
                        }
                    }
                }
            },
        }
    }

    trace!(
        compact_sequence = message.header().sequence,
        sequence = writer.sequence_number(),
        tagged = address.is_some(),
        "Compact message transcoded"
    );
    writer.finish()
}

/// Size of the full message [`transcode`] produces for `message`
pub fn transcoded_len(message: &CompactMessage<'_>, tagged: bool) -> usize {
    message
        .sets()
        .map(|set| match message.kind() {
            MessageKind::Template => {
                SET_HEADER_LEN
                    + TEMPLATE_RECORD_HEADER_LEN
                    + set.body.len()
                    + if tagged { source_tag_spec().wire_len() } else { 0 }
            }
            MessageKind::Data => {
                SET_HEADER_LEN
                    + set.body.len()
                    + if tagged {
                        set.count as usize * SOURCE_NODE_ADDRESS_SIZE as usize
                    } else {
                        0
                    }
            }
        })
        .sum::<usize>()
        + HEADER_LEN
}
