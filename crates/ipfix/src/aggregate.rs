//! Fan-in of compact payloads.
//!
//! Data sets for the same template are merged by concatenating their record
//! blocks and summing counts; record bytes are never touched. Template sets
//! are retained, one per template id, until the next forward. All storage
//! is reserved up front and bounded by the outbound message size.

use crate::codec::{MessageKind, MessageWriter, COMPACT_HEADER_LEN, COMPACT_SET_HEADER_LEN, MAX_COMPACT_COUNT};
use crate::decode::{CompactMessage, CompactSet};
use crate::error::{CodecError, CodecResult};
use tracing::trace;

/// Default number of distinct templates tracked per cycle
pub const DEFAULT_MAX_TEMPLATES: usize = 4;

#[derive(Debug)]
struct DataSlot {
    template_id: u16,
    width: usize,
    count: usize,
    mark: usize,
    bytes: Vec<u8>,
}

impl DataSlot {
    fn clear(&mut self) {
        self.width = 0;
        self.count = 0;
        self.mark = 0;
        self.bytes.clear();
    }
}

#[derive(Debug)]
struct TemplateSlot {
    template_id: u16,
    field_count: usize,
    specifiers: Vec<u8>,
}

/// Per-cycle accumulator of compact sets, grouped by template id
#[derive(Debug)]
pub struct AggregationBuffer {
    data: Vec<DataSlot>,
    active: usize,
    mark_active: usize,
    templates: Vec<TemplateSlot>,
    active_templates: usize,
    max_message_size: usize,
}

impl AggregationBuffer {
    /// Reserve room for `max_templates` templates whose merged compact
    /// message must fit in `max_message_size` bytes
    pub fn new(max_templates: usize, max_message_size: usize) -> Self {
        let body = max_message_size.saturating_sub(COMPACT_HEADER_LEN);
        let data = (0..max_templates)
            .map(|_| DataSlot {
                template_id: 0,
                width: 0,
                count: 0,
                mark: 0,
                bytes: Vec::with_capacity(body),
            })
            .collect();
        let templates = (0..max_templates)
            .map(|_| TemplateSlot {
                template_id: 0,
                field_count: 0,
                specifiers: Vec::with_capacity(body),
            })
            .collect();
        Self {
            data,
            active: 0,
            mark_active: 0,
            templates,
            active_templates: 0,
            max_message_size,
        }
    }

    /// Merge every set of a validated compact message.
    ///
    /// Data messages are merged atomically: when any set is rejected the
    /// buffer is left as it was. Returns the number of records merged.
    pub fn merge(&mut self, message: &CompactMessage<'_>) -> CodecResult<usize> {
        match message.kind() {
            MessageKind::Template => {
                self.check_templates(message)?;
                for set in message.sets() {
                    self.retain_template(&set)?;
                }
                Ok(0)
            }
            MessageKind::Data => {
                self.checkpoint();
                let mut merged = 0;
                for set in message.sets() {
                    if let Err(err) = self.merge_data_set(&set) {
                        self.rollback();
                        return Err(err);
                    }
                    merged += set.count as usize;
                }
                Ok(merged)
            }
        }
    }

    fn checkpoint(&mut self) {
        self.mark_active = self.active;
        for slot in &mut self.data[..self.active] {
            slot.mark = slot.count;
        }
    }

    fn rollback(&mut self) {
        for slot in &mut self.data[..self.mark_active] {
            slot.count = slot.mark;
            slot.bytes.truncate(slot.mark * slot.width);
        }
        for slot in &mut self.data[self.mark_active..self.active] {
            slot.clear();
        }
        self.active = self.mark_active;
    }

    fn merge_data_set(&mut self, set: &CompactSet<'_>) -> CodecResult<()> {
        if set.count == 0 {
            return Ok(());
        }
        let width = set.record_width();
        let added = set.body.len();
        let data_len = self.data_message_len();
        let max_message_size = self.max_message_size;

        let (slot, header) = match self.data[..self.active]
            .iter()
            .position(|slot| slot.template_id == set.template_id)
        {
            Some(index) => (&mut self.data[index], 0),
            None => {
                if self.active == self.data.len() {
                    return Err(CodecError::TemplateSlotsExhausted(set.template_id));
                }
                let slot = &mut self.data[self.active];
                self.active += 1;
                slot.clear();
                slot.template_id = set.template_id;
                slot.width = width;
                (slot, COMPACT_SET_HEADER_LEN)
            }
        };

        if slot.width != width {
            return Err(CodecError::RecordWidthMismatch {
                template_id: set.template_id,
                expected: slot.width,
                actual: width,
            });
        }
        let count = slot.count + set.count as usize;
        if count > MAX_COMPACT_COUNT {
            return Err(CodecError::TooManyRecords {
                template_id: set.template_id,
                count,
                max: MAX_COMPACT_COUNT,
            });
        }
        let needed = data_len + header + added;
        if needed > max_message_size {
            return Err(CodecError::BufferOverflow {
                needed,
                capacity: max_message_size,
            });
        }

        slot.bytes.extend_from_slice(set.body);
        slot.count = count;
        trace!(
            template_id = set.template_id,
            records = set.count,
            total = count,
            "Data set merged"
        );
        Ok(())
    }

    /// Check that every template set of `message` can be retained, so a
    /// template message is retained whole or not at all.
    fn check_templates(&self, message: &CompactMessage<'_>) -> CodecResult<()> {
        let retained = &self.templates[..self.active_templates];
        let mut free = self.templates.len() - self.active_templates;
        let mut len = self.template_message_len();
        for (index, set) in message.sets().enumerate() {
            // The last definition of an id in a message wins.
            if message
                .sets()
                .skip(index + 1)
                .any(|later| later.template_id == set.template_id)
            {
                continue;
            }
            match retained
                .iter()
                .find(|slot| slot.template_id == set.template_id)
            {
                Some(slot) => len -= COMPACT_SET_HEADER_LEN + slot.specifiers.len(),
                None if free == 0 => {
                    return Err(CodecError::TemplateSlotsExhausted(set.template_id));
                }
                None => free -= 1,
            }
            len += COMPACT_SET_HEADER_LEN + set.body.len();
        }
        if len > self.max_message_size {
            return Err(CodecError::BufferOverflow {
                needed: len,
                capacity: self.max_message_size,
            });
        }
        Ok(())
    }

    fn retain_template(&mut self, set: &CompactSet<'_>) -> CodecResult<()> {
        let existing = self.templates[..self.active_templates]
            .iter()
            .position(|slot| slot.template_id == set.template_id);
        let slot = match existing {
            Some(index) => &mut self.templates[index],
            None => {
                if self.active_templates == self.templates.len() {
                    return Err(CodecError::TemplateSlotsExhausted(set.template_id));
                }
                let slot = &mut self.templates[self.active_templates];
                self.active_templates += 1;
                slot
            }
        };
        slot.template_id = set.template_id;
        slot.field_count = set.count as usize;
        slot.specifiers.clear();
        slot.specifiers.extend_from_slice(set.body);
        trace!(
            template_id = set.template_id,
            fields = set.count,
            "Template retained"
        );
        Ok(())
    }

    /// Data records pending
    pub fn record_count(&self) -> usize {
        self.data[..self.active].iter().map(|slot| slot.count).sum()
    }

    /// Distinct templates with pending data
    pub fn data_set_count(&self) -> usize {
        self.active
    }

    /// Template definitions pending
    pub fn template_count(&self) -> usize {
        self.active_templates
    }

    /// Whether no data records are pending
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Records pending for `template_id`
    pub fn records_for(&self, template_id: u16) -> usize {
        self.data[..self.active]
            .iter()
            .find(|slot| slot.template_id == template_id)
            .map(|slot| slot.count)
            .unwrap_or(0)
    }

    /// Length of the compact data message the pending sets encode to
    pub fn data_message_len(&self) -> usize {
        COMPACT_HEADER_LEN
            + self.data[..self.active]
                .iter()
                .map(|slot| COMPACT_SET_HEADER_LEN + slot.bytes.len())
                .sum::<usize>()
    }

    /// Length of the compact template message the retained templates encode to
    pub fn template_message_len(&self) -> usize {
        COMPACT_HEADER_LEN
            + self.templates[..self.active_templates]
                .iter()
                .map(|slot| COMPACT_SET_HEADER_LEN + slot.specifiers.len())
                .sum::<usize>()
    }

    /// Write every retained template as one set each
    pub fn write_templates(&self, writer: &mut MessageWriter<'_>) -> CodecResult<()> {
        for slot in &self.templates[..self.active_templates] {
            writer.raw_set(slot.template_id, slot.field_count, &slot.specifiers)?;
        }
        Ok(())
    }

    /// Write every merged data set, one set per template
    pub fn write_data(&self, writer: &mut MessageWriter<'_>) -> CodecResult<()> {
        for slot in &self.data[..self.active] {
            writer.raw_set(slot.template_id, slot.count, &slot.bytes)?;
        }
        Ok(())
    }

    /// Drop pending data sets and templates, keeping the storage
    pub fn reset(&mut self) {
        for slot in &mut self.data[..self.active] {
            slot.clear();
        }
        self.active = 0;
        self.mark_active = 0;
        for slot in &mut self.templates[..self.active_templates] {
            slot.specifiers.clear();
        }
        self.active_templates = 0;
    }
}
