//! Bounded per-destination flow accounting.
//!
//! The table holds at most `capacity` records, reserved at construction.
//! A new destination arriving while the table is full is rejected; tracked
//! flows are never evicted. Records keep insertion order, which is the
//! order they are exported in.

use crate::error::{FlowError, FlowResult};
use meshflow_core::config::MAX_FLOW_CAPACITY;
use meshflow_core::MeshAddress;
use meshflow_ipfix::RecordSource;
use tracing::{debug, trace};

/// Default number of flows tracked per export cycle
pub const DEFAULT_FLOW_CAPACITY: usize = 10;

/// Traffic accounted to one destination during the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRecord {
    /// Flow key
    pub destination: MeshAddress,
    /// Bytes sent towards the destination
    pub byte_count: u64,
    /// Packets sent towards the destination
    pub packet_count: u64,
}

/// Result of [`FlowTable::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Existing flow incremented
    Updated,
    /// New flow inserted
    Created,
    /// Table full; the observation was dropped
    Rejected,
}

impl UpdateOutcome {
    /// Whether the observation was dropped
    pub fn is_rejected(self) -> bool {
        self == UpdateOutcome::Rejected
    }
}

/// Fixed-capacity flow table keyed by destination
#[derive(Debug, Clone)]
pub struct FlowTable {
    records: Vec<FlowRecord>,
    capacity: usize,
}

impl FlowTable {
    /// Reserve storage for `capacity` flows (1..=255)
    pub fn new(capacity: usize) -> FlowResult<Self> {
        if capacity == 0 || capacity > MAX_FLOW_CAPACITY {
            return Err(FlowError::InvalidCapacity(capacity));
        }
        Ok(Self {
            records: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Account one packet of `bytes` bytes towards `destination`
    pub fn update(&mut self, destination: MeshAddress, bytes: u64) -> UpdateOutcome {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.destination == destination)
        {
            record.byte_count = record.byte_count.saturating_add(bytes);
            record.packet_count = record.packet_count.saturating_add(1);
            trace!(%destination, bytes, total = record.byte_count, "Flow updated");
            return UpdateOutcome::Updated;
        }

        if self.records.len() >= self.capacity {
            debug!(%destination, capacity = self.capacity, "Flow table full, observation dropped");
            return UpdateOutcome::Rejected;
        }

        self.records.push(FlowRecord {
            destination,
            byte_count: bytes,
            packet_count: 1,
        });
        trace!(%destination, bytes, flows = self.records.len(), "Flow created");
        UpdateOutcome::Created
    }

    /// [`FlowTable::update`] with rejection reported as an error
    pub fn try_update(&mut self, destination: MeshAddress, bytes: u64) -> FlowResult<UpdateOutcome> {
        match self.update(destination, bytes) {
            UpdateOutcome::Rejected => Err(FlowError::TableFull {
                destination,
                capacity: self.capacity,
            }),
            outcome => Ok(outcome),
        }
    }

    /// Number of tracked flows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no flow is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of flows
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flow towards `destination`, if tracked
    pub fn get(&self, destination: &MeshAddress) -> Option<&FlowRecord> {
        self.records
            .iter()
            .find(|record| &record.destination == destination)
    }

    /// Visit every flow in insertion order
    pub fn for_each(&self, mut visitor: impl FnMut(&FlowRecord)) {
        self.records.iter().for_each(|record| visitor(record));
    }

    /// Flows in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, FlowRecord> {
        self.records.iter()
    }

    /// Drop every flow, keeping the storage
    pub fn flush(&mut self) {
        self.records.clear();
    }
}

impl Default for FlowTable {
    fn default() -> Self {
        Self {
            records: Vec::with_capacity(DEFAULT_FLOW_CAPACITY),
            capacity: DEFAULT_FLOW_CAPACITY,
        }
    }
}

impl<'a> IntoIterator for &'a FlowTable {
    type Item = &'a FlowRecord;
    type IntoIter = std::slice::Iter<'a, FlowRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl RecordSource<FlowRecord> for FlowTable {
    fn record_count(&self) -> usize {
        self.len()
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&FlowRecord)) {
        self.records.iter().for_each(|record| visitor(record));
    }
}
