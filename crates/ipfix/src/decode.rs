//! Message parsing.
//!
//! [`decode_message`] is a compliant reader of full messages, used to
//! verify exports end to end. [`CompactMessage`] is a zero-copy view over a
//! compact message, validated once at parse time, used by aggregation and
//! transcoding on the receive path.

use crate::codec::{
    template_id_from_compact, MessageKind, COMPACT_HEADER_LEN, COMPACT_SET_HEADER_LEN,
    COMPACT_VERSION_NIBBLE, HEADER_LEN, SET_HEADER_LEN, TEMPLATE_RECORD_HEADER_LEN,
};
use crate::context::IPFIX_VERSION;
use crate::element::FieldSpec;
use crate::error::{CodecError, CodecResult};
use crate::template::{MIN_DATA_TEMPLATE_ID, TEMPLATE_SET_ID};

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn ensure_len(bytes: &[u8], expected: usize) -> CodecResult<()> {
    if bytes.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Full message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Protocol version (10)
    pub version: u16,
    /// Total message length
    pub length: u16,
    /// Export time, seconds since the UNIX epoch
    pub export_time: u32,
    /// Sequence number
    pub sequence_number: u32,
    /// Observation domain
    pub domain_id: u32,
}

impl MessageHeader {
    /// Parse and check a full header against the datagram it came in
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        ensure_len(bytes, HEADER_LEN)?;
        let header = Self {
            version: read_u16(bytes, 0),
            length: read_u16(bytes, 2),
            export_time: read_u32(bytes, 4),
            sequence_number: read_u32(bytes, 8),
            domain_id: read_u32(bytes, 12),
        };
        if header.version != IPFIX_VERSION {
            return Err(CodecError::MalformedHeader(format!(
                "unsupported version {}",
                header.version
            )));
        }
        let length = header.length as usize;
        if length < HEADER_LEN || length > bytes.len() {
            return Err(CodecError::MalformedHeader(format!(
                "length {} does not fit datagram of {} bytes",
                length,
                bytes.len()
            )));
        }
        Ok(header)
    }
}

/// One template record from a template set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    /// Template id being defined
    pub template_id: u16,
    /// Field specifiers in wire order
    pub fields: Vec<FieldSpec>,
}

impl TemplateRecord {
    /// Bytes of one data record described by this template
    pub fn record_width(&self) -> usize {
        self.fields.iter().map(|f| f.octet_size as usize).sum()
    }

    /// Split a data set body into records
    pub fn records<'a>(&self, body: &'a [u8]) -> CodecResult<std::slice::ChunksExact<'a, u8>> {
        let width = self.record_width();
        if width == 0 || body.len() % width != 0 {
            return Err(CodecError::RecordWidthMismatch {
                template_id: self.template_id,
                expected: width,
                actual: body.len(),
            });
        }
        Ok(body.chunks_exact(width))
    }

    /// Pair every field of `record` with its specifier
    pub fn field_values<'a>(&self, record: &'a [u8]) -> Vec<(FieldSpec, &'a [u8])> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|spec| {
                let size = spec.octet_size as usize;
                let value = &record[offset..offset + size];
                offset += size;
                (*spec, value)
            })
            .collect()
    }
}

/// One set of a decoded full message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedSet {
    /// Template set with its template records
    Template(Vec<TemplateRecord>),
    /// Data set: template id and raw record bytes
    Data {
        /// Template the records follow
        template_id: u16,
        /// Concatenated records
        body: Vec<u8>,
    },
}

/// A decoded full message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Message header
    pub header: MessageHeader,
    /// Sets in wire order
    pub sets: Vec<DecodedSet>,
}

impl DecodedMessage {
    /// Every template record carried by the message
    pub fn templates(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.sets.iter().flat_map(|set| match set {
            DecodedSet::Template(records) => records.as_slice(),
            DecodedSet::Data { .. } => &[][..],
        })
    }

    /// Data set bodies for `template_id`
    pub fn data_sets(&self, template_id: u16) -> impl Iterator<Item = &[u8]> {
        self.sets.iter().filter_map(move |set| match set {
            DecodedSet::Data { template_id: id, body } if *id == template_id => {
                Some(body.as_slice())
            }
            _ => None,
        })
    }
}

fn decode_template_set(set_id: u16, mut body: &[u8]) -> CodecResult<Vec<TemplateRecord>> {
    let mut records = Vec::new();
    // Anything shorter than a template record header is padding.
    while body.len() >= TEMPLATE_RECORD_HEADER_LEN {
        let template_id = read_u16(body, 0);
        let field_count = read_u16(body, 2) as usize;
        if template_id < MIN_DATA_TEMPLATE_ID {
            return Err(CodecError::MalformedSet {
                set_id,
                reason: format!("template id {} is reserved", template_id),
            });
        }
        body = &body[TEMPLATE_RECORD_HEADER_LEN..];
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let (spec, used) = FieldSpec::read(body)?;
            fields.push(spec);
            body = &body[used..];
        }
        records.push(TemplateRecord {
            template_id,
            fields,
        });
    }
    Ok(records)
}

/// Decode a full message
pub fn decode_message(bytes: &[u8]) -> CodecResult<DecodedMessage> {
    let header = MessageHeader::parse(bytes)?;
    let mut rest = &bytes[HEADER_LEN..header.length as usize];
    let mut sets = Vec::new();

    while !rest.is_empty() {
        ensure_len(rest, SET_HEADER_LEN)?;
        let set_id = read_u16(rest, 0);
        let set_len = read_u16(rest, 2) as usize;
        if set_len < SET_HEADER_LEN || set_len > rest.len() {
            return Err(CodecError::MalformedSet {
                set_id,
                reason: format!("length {} with {} bytes left", set_len, rest.len()),
            });
        }
        let body = &rest[SET_HEADER_LEN..set_len];
        match set_id {
            TEMPLATE_SET_ID => sets.push(DecodedSet::Template(decode_template_set(set_id, body)?)),
            id if id >= MIN_DATA_TEMPLATE_ID => sets.push(DecodedSet::Data {
                template_id: id,
                body: body.to_vec(),
            }),
            // Options templates and other reserved sets are skipped.
            _ => {}
        }
        rest = &rest[set_len..];
    }

    Ok(DecodedMessage { header, sets })
}

/// Compact message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactHeader {
    /// Message kind
    pub kind: MessageKind,
    /// Low 16 bits of the exporter's sequence number
    pub sequence: u16,
    /// Total message length
    pub length: u16,
}

/// One validated set of a compact message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSet<'a> {
    /// Full template id
    pub template_id: u16,
    /// Record count (data) or field count (template)
    pub count: u8,
    /// Set body without its header
    pub body: &'a [u8],
}

impl<'a> CompactSet<'a> {
    /// Bytes per record of a data set (0 for an empty set)
    pub fn record_width(&self) -> usize {
        if self.count == 0 {
            0
        } else {
            self.body.len() / self.count as usize
        }
    }

    /// Records of a data set
    pub fn records(&self) -> impl Iterator<Item = &'a [u8]> {
        let width = self.record_width().max(1);
        let body = if self.count == 0 { &[][..] } else { self.body };
        body.chunks_exact(width)
    }

    /// Field specifiers of a template set
    pub fn field_specs(&self) -> impl Iterator<Item = FieldSpec> + 'a {
        let mut rest = self.body;
        std::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            // Validated at parse time.
            let (spec, used) = FieldSpec::read(rest).ok()?;
            rest = &rest[used..];
            Some(spec)
        })
    }
}

/// Zero-copy, validated view of a compact message
#[derive(Debug, Clone, Copy)]
pub struct CompactMessage<'a> {
    header: CompactHeader,
    sets: &'a [u8],
}

impl<'a> CompactMessage<'a> {
    /// Parse and fully validate a compact message
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        ensure_len(bytes, COMPACT_HEADER_LEN)?;
        let first = bytes[0];
        if first >> 4 != COMPACT_VERSION_NIBBLE {
            return Err(CodecError::MalformedHeader(format!(
                "not a compact message (first byte {:#04x})",
                first
            )));
        }
        let kind = MessageKind::from_compact_code(first & 0x0f).ok_or_else(|| {
            CodecError::MalformedHeader(format!("unknown message kind {}", first & 0x0f))
        })?;
        let header = CompactHeader {
            kind,
            sequence: read_u16(bytes, 1),
            length: read_u16(bytes, 3),
        };
        let length = header.length as usize;
        if length < COMPACT_HEADER_LEN || length > bytes.len() {
            return Err(CodecError::MalformedHeader(format!(
                "length {} does not fit datagram of {} bytes",
                length,
                bytes.len()
            )));
        }

        let message = Self {
            header,
            sets: &bytes[COMPACT_HEADER_LEN..length],
        };
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> CodecResult<()> {
        let mut rest = self.sets;
        while !rest.is_empty() {
            ensure_len(rest, COMPACT_SET_HEADER_LEN)?;
            let template_id = template_id_from_compact(rest[0]);
            let count = rest[1] as usize;
            let set_len = read_u16(rest, 2) as usize;
            if set_len < COMPACT_SET_HEADER_LEN || set_len > rest.len() {
                return Err(CodecError::MalformedSet {
                    set_id: template_id,
                    reason: format!("length {} with {} bytes left", set_len, rest.len()),
                });
            }
            let body = &rest[COMPACT_SET_HEADER_LEN..set_len];
            match self.header.kind {
                MessageKind::Data => {
                    let uneven = if count == 0 {
                        !body.is_empty()
                    } else {
                        body.is_empty() || body.len() % count != 0
                    };
                    if uneven {
                        return Err(CodecError::MalformedSet {
                            set_id: template_id,
                            reason: format!("{} bytes cannot hold {} records", body.len(), count),
                        });
                    }
                }
                MessageKind::Template => {
                    let mut fields = body;
                    for _ in 0..count {
                        let (_, used) = FieldSpec::read(fields)?;
                        fields = &fields[used..];
                    }
                    if !fields.is_empty() {
                        return Err(CodecError::MalformedSet {
                            set_id: template_id,
                            reason: format!("{} trailing bytes after {} fields", fields.len(), count),
                        });
                    }
                }
            }
            rest = &rest[set_len..];
        }
        Ok(())
    }

    /// Message header
    pub fn header(&self) -> CompactHeader {
        self.header
    }

    /// Message kind
    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    /// Sets in wire order
    pub fn sets(&self) -> impl Iterator<Item = CompactSet<'a>> {
        let mut rest = self.sets;
        std::iter::from_fn(move || {
            if rest.len() < COMPACT_SET_HEADER_LEN {
                return None;
            }
            let set_len = read_u16(rest, 2) as usize;
            let set = CompactSet {
                template_id: template_id_from_compact(rest[0]),
                count: rest[1],
                body: &rest[COMPACT_SET_HEADER_LEN..set_len],
            };
            rest = &rest[set_len..];
            Some(set)
        })
    }

    /// Total data records across all sets
    pub fn record_count(&self) -> usize {
        match self.header.kind {
            MessageKind::Data => self.sets().map(|set| set.count as usize).sum(),
            MessageKind::Template => 0,
        }
    }
}
