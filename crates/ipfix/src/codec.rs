//! Template-driven message encoder.
//!
//! One [`MessageWriter`] produces one message: a header followed by any
//! number of sets. The same machinery serves both encodings; only header
//! and set-header widths differ.
//!
//! Full layout:
//!
//! ```text
//! header   version u16 | length u16 | export_time u32 | sequence u32 | domain u32
//! set      set_id u16 | set_length u16 | body
//! ```
//!
//! Compact layout:
//!
//! ```text
//! header   0xA<kind> u8 | sequence (low 16 bits) u16 | length u16
//! set      template_id - 256 u8 | count u8 | set_length u16 | body
//! ```
//!
//! Bodies are identical in both encodings, which is what makes compact
//! messages mergeable and transcodable without the schema objects.

use crate::buffer::ExportBuffer;
use crate::context::ExportContext;
use crate::error::{CodecError, CodecResult};
use crate::template::{RecordSource, Template, MIN_DATA_TEMPLATE_ID, TEMPLATE_SET_ID};
use meshflow_core::Encoding;
use tracing::trace;

/// Full message header length
pub const HEADER_LEN: usize = 16;
/// Full set header length
pub const SET_HEADER_LEN: usize = 4;
/// Template record header (template id, field count) inside a template set
pub const TEMPLATE_RECORD_HEADER_LEN: usize = 4;
/// Compact message header length
pub const COMPACT_HEADER_LEN: usize = 5;
/// Compact set header length
pub const COMPACT_SET_HEADER_LEN: usize = 4;
/// High nibble of the first compact header byte
pub const COMPACT_VERSION_NIBBLE: u8 = 0xA;
/// Largest record or field count a compact set can carry
pub const MAX_COMPACT_COUNT: usize = u8::MAX as usize;
/// Largest template id a compact set can carry
pub const MAX_COMPACT_TEMPLATE_ID: u16 = MIN_DATA_TEMPLATE_ID + u8::MAX as u16;

/// What a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Template definitions
    Template,
    /// Data records
    Data,
}

impl MessageKind {
    /// Low nibble of the compact header
    pub fn compact_code(self) -> u8 {
        match self {
            MessageKind::Template => 1,
            MessageKind::Data => 2,
        }
    }

    /// Parse the low nibble of the compact header
    pub fn from_compact_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageKind::Template),
            2 => Some(MessageKind::Data),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            MessageKind::Template => "template",
            MessageKind::Data => "data",
        }
    }
}

/// Header length for an encoding
pub fn header_len(encoding: Encoding) -> usize {
    match encoding {
        Encoding::Full => HEADER_LEN,
        Encoding::Compact => COMPACT_HEADER_LEN,
    }
}

/// Set header length for an encoding
pub fn set_header_len(encoding: Encoding) -> usize {
    match encoding {
        Encoding::Full => SET_HEADER_LEN,
        Encoding::Compact => COMPACT_SET_HEADER_LEN,
    }
}

/// Compact set id for a template id
pub fn compact_set_id(template_id: u16) -> CodecResult<u8> {
    if !(MIN_DATA_TEMPLATE_ID..=MAX_COMPACT_TEMPLATE_ID).contains(&template_id) {
        return Err(CodecError::TemplateOutOfCompactRange(template_id));
    }
    Ok((template_id - MIN_DATA_TEMPLATE_ID) as u8)
}

/// Template id for a compact set id
pub fn template_id_from_compact(set_id: u8) -> u16 {
    MIN_DATA_TEMPLATE_ID + set_id as u16
}

/// Length of a full template-kind message for `templates`, as sized by their specifiers
pub fn template_message_len(encoding: Encoding, specifier_lens: &[usize]) -> usize {
    let per_set = match encoding {
        Encoding::Full => SET_HEADER_LEN + TEMPLATE_RECORD_HEADER_LEN,
        Encoding::Compact => COMPACT_SET_HEADER_LEN,
    };
    header_len(encoding)
        + specifier_lens
            .iter()
            .map(|len| per_set + len)
            .sum::<usize>()
}

/// Length of a data message holding `records` records of `record_width` bytes per set
pub fn data_message_len(encoding: Encoding, sets: &[(usize, usize)]) -> usize {
    header_len(encoding)
        + sets
            .iter()
            .map(|(records, width)| set_header_len(encoding) + records * width)
            .sum::<usize>()
}

/// Serializes one message into an [`ExportBuffer`]
#[derive(Debug)]
pub struct MessageWriter<'b> {
    buf: &'b mut ExportBuffer,
    encoding: Encoding,
    kind: MessageKind,
    sequence_number: u32,
    sets: usize,
    records: usize,
}

impl<'b> MessageWriter<'b> {
    /// Clear `buf` and write the message header.
    ///
    /// The context's sequence number is claimed only once the header fits.
    pub fn begin(
        buf: &'b mut ExportBuffer,
        ctx: &mut ExportContext,
        encoding: Encoding,
        kind: MessageKind,
        export_time: u32,
    ) -> CodecResult<Self> {
        buf.clear();
        let sequence_number = ctx.sequence_number();
        match encoding {
            Encoding::Full => {
                buf.put_u16(ctx.version())?;
                buf.put_u16(0)?;
                buf.put_u32(export_time)?;
                buf.put_u32(sequence_number)?;
                buf.put_u32(ctx.domain_id())?;
            }
            Encoding::Compact => {
                buf.put_u8((COMPACT_VERSION_NIBBLE << 4) | kind.compact_code())?;
                buf.put_u16(sequence_number as u16)?;
                buf.put_u16(0)?;
            }
        }
        ctx.next_sequence();

        Ok(Self {
            buf,
            encoding,
            kind,
            sequence_number,
            sets: 0,
            records: 0,
        })
    }

    /// Sequence number claimed by this message
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    /// Message kind
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Data records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Sets written so far
    pub fn sets(&self) -> usize {
        self.sets
    }

    fn expect_kind(&self, set: MessageKind) -> CodecResult<()> {
        if set != self.kind {
            return Err(CodecError::KindMismatch {
                set: set.name(),
                message: self.kind.name(),
            });
        }
        Ok(())
    }

    /// Write a set header with a zero length and return its offset.
    ///
    /// `count` is the field count of a template set or the record count of
    /// a data set. Nothing is left behind when the header does not fit.
    fn open_set(&mut self, template_id: u16, count: usize) -> CodecResult<usize> {
        let start = self.buf.len();
        let result = match (self.encoding, self.kind) {
            (Encoding::Full, MessageKind::Template) => self
                .buf
                .put_u16(TEMPLATE_SET_ID)
                .and_then(|_| self.buf.put_u16(0))
                .and_then(|_| self.buf.put_u16(template_id))
                .and_then(|_| self.buf.put_u16(count as u16)),
            (Encoding::Full, MessageKind::Data) => self
                .buf
                .put_u16(template_id)
                .and_then(|_| self.buf.put_u16(0)),
            (Encoding::Compact, _) => {
                if count > MAX_COMPACT_COUNT {
                    return Err(CodecError::TooManyRecords {
                        template_id,
                        count,
                        max: MAX_COMPACT_COUNT,
                    });
                }
                let compact_id = compact_set_id(template_id)?;
                self.buf
                    .put_u8(compact_id)
                    .and_then(|_| self.buf.put_u8(count as u8))
                    .and_then(|_| self.buf.put_u16(0))
            }
        };
        if let Err(err) = result {
            self.buf.truncate(start);
            return Err(err);
        }
        Ok(start)
    }

    fn close_set(&mut self, start: usize) -> CodecResult<()> {
        let set_len = self.buf.len() - start;
        let set_len = u16::try_from(set_len).map_err(|_| CodecError::BufferOverflow {
            needed: set_len,
            capacity: u16::MAX as usize,
        })?;
        self.buf.patch_u16(start + 2, set_len)?;
        self.sets += 1;
        Ok(())
    }

    /// Append the definition of `template`
    pub fn template_set<R>(&mut self, template: &Template<R>) -> CodecResult<()> {
        self.expect_kind(MessageKind::Template)?;
        let start = self.open_set(template.id(), template.len())?;
        let result = template
            .field_specs()
            .try_for_each(|spec| spec.write(self.buf))
            .and_then(|_| self.close_set(start));
        if let Err(err) = result {
            self.buf.truncate(start);
            return Err(err);
        }

        trace!(
            template_id = template.id(),
            fields = template.len(),
            "Template set written"
        );
        Ok(())
    }

    /// Append one data set holding every record of `source`.
    ///
    /// Returns the number of records written. Nothing is written when the
    /// records would not fit.
    pub fn data_set<R, S>(&mut self, template: &Template<R>, source: &S) -> CodecResult<usize>
    where
        S: RecordSource<R> + ?Sized,
    {
        self.expect_kind(MessageKind::Data)?;

        // Snapshot; the source stays borrowed until the set is complete.
        let announced = source.record_count();
        let needed = set_header_len(self.encoding) + announced * template.record_width();
        if needed > self.buf.remaining() {
            return Err(CodecError::BufferOverflow {
                needed: self.buf.len() + needed,
                capacity: self.buf.capacity(),
            });
        }

        let start = self.open_set(template.id(), announced)?;
        let mut produced = 0usize;
        let mut failure: Option<CodecError> = None;
        {
            let buf = &mut *self.buf;
            source.for_each_record(&mut |record: &R| {
                if failure.is_some() {
                    return;
                }
                produced += 1;
                if produced > announced {
                    return;
                }
                for element in template.elements() {
                    match buf.put_zeroed(element.octet_size() as usize) {
                        Ok(out) => element.produce(record, out),
                        Err(err) => {
                            failure = Some(err);
                            return;
                        }
                    }
                }
            });
        }

        if let Some(err) = failure {
            self.buf.truncate(start);
            return Err(err);
        }
        if produced != announced {
            self.buf.truncate(start);
            return Err(CodecError::RecordCountMismatch {
                template_id: template.id(),
                announced,
                produced,
            });
        }

        self.close_set(start)?;
        self.records += announced;

        trace!(
            template_id = template.id(),
            records = announced,
            "Data set written"
        );
        Ok(announced)
    }

    /// Open a set whose body is supplied as already encoded bytes.
    ///
    /// Used when re-encoding merged or transcoded payloads; `count` is the
    /// field count (template messages) or record count (data messages).
    pub fn open_raw_set(&mut self, template_id: u16, count: usize) -> CodecResult<RawSet> {
        let start = self.open_set(template_id, count)?;
        Ok(RawSet { start, count })
    }

    /// Append body bytes to a set opened with [`MessageWriter::open_raw_set`]
    pub fn extend_raw_set(&mut self, _set: &RawSet, bytes: &[u8]) -> CodecResult<()> {
        self.buf.put_slice(bytes)
    }

    /// Backpatch the length of a raw set
    pub fn close_raw_set(&mut self, set: RawSet) -> CodecResult<()> {
        self.close_set(set.start)?;
        if self.kind == MessageKind::Data {
            self.records += set.count;
        }
        Ok(())
    }

    /// Drop a partially written raw set
    pub fn abandon_raw_set(&mut self, set: RawSet) {
        self.buf.truncate(set.start);
    }

    /// Append a set with a verbatim body in one call
    pub fn raw_set(&mut self, template_id: u16, count: usize, body: &[u8]) -> CodecResult<()> {
        let set = self.open_raw_set(template_id, count)?;
        if let Err(err) = self.extend_raw_set(&set, body) {
            self.abandon_raw_set(set);
            return Err(err);
        }
        self.close_raw_set(set)
    }

    /// Backpatch the total length and return the encoded message
    pub fn finish(self) -> CodecResult<&'b [u8]> {
        let total = self.buf.len();
        let total16 = u16::try_from(total).map_err(|_| CodecError::BufferOverflow {
            needed: total,
            capacity: u16::MAX as usize,
        })?;
        let length_offset = match self.encoding {
            Encoding::Full => 2,
            Encoding::Compact => 3,
        };
        self.buf.patch_u16(length_offset, total16)?;

        trace!(
            kind = self.kind.name(),
            sequence = self.sequence_number,
            sets = self.sets,
            records = self.records,
            length = total,
            "Message encoded"
        );
        let buf: &'b ExportBuffer = self.buf;
        Ok(buf.as_slice())
    }
}

/// Handle to a set being filled piecewise
#[derive(Debug)]
pub struct RawSet {
    start: usize,
    count: usize,
}

/// Encode a single-template message of `kind` in one call
pub fn encode_message<'b, R, S>(
    buf: &'b mut ExportBuffer,
    ctx: &mut ExportContext,
    encoding: Encoding,
    kind: MessageKind,
    export_time: u32,
    template: &Template<R>,
    source: &S,
) -> CodecResult<&'b [u8]>
where
    S: RecordSource<R> + ?Sized,
{
    let mut writer = MessageWriter::begin(buf, ctx, encoding, kind, export_time)?;
    match kind {
        MessageKind::Template => writer.template_set(template)?,
        MessageKind::Data => {
            writer.data_set(template, source)?;
        }
    }
    writer.finish()
}
