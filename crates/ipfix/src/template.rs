//! Templates: ordered element lists describing one exportable record type.

use crate::element::{FieldSpec, InformationElement};
use crate::error::{CodecError, CodecResult};
use std::sync::Arc;

/// Set id reserved for template-definition sets
pub const TEMPLATE_SET_ID: u16 = 2;

/// Lowest id a data template may use
pub const MIN_DATA_TEMPLATE_ID: u16 = 256;

/// Most elements a template may hold (the compact field count is one byte)
pub const MAX_TEMPLATE_ELEMENTS: usize = 255;

/// Provides the live records of one template at encode time.
///
/// The record count is snapshotted before serialization starts and the
/// visitor must then be called exactly that many times.
pub trait RecordSource<R> {
    /// Number of records the next iteration will yield
    fn record_count(&self) -> usize;

    /// Visit every record in a deterministic order
    fn for_each_record(&self, visitor: &mut dyn FnMut(&R));
}

impl<R> RecordSource<R> for [R] {
    fn record_count(&self) -> usize {
        self.len()
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&R)) {
        self.iter().for_each(|record| visitor(record));
    }
}

impl<R> RecordSource<R> for Vec<R> {
    fn record_count(&self) -> usize {
        self.len()
    }

    fn for_each_record(&self, visitor: &mut dyn FnMut(&R)) {
        self.as_slice().for_each_record(visitor)
    }
}

/// Ordered set of information elements exported under one template id
#[derive(Debug)]
pub struct Template<R> {
    id: u16,
    elements: Vec<Arc<InformationElement<R>>>,
}

impl<R> Template<R> {
    /// Create an empty template
    pub fn new(id: u16) -> CodecResult<Self> {
        if id < MIN_DATA_TEMPLATE_ID {
            return Err(CodecError::InvalidTemplate {
                id,
                reason: format!("ids below {} are reserved", MIN_DATA_TEMPLATE_ID),
            });
        }
        Ok(Self {
            id,
            elements: Vec::new(),
        })
    }

    /// Append an element; registration order is wire order
    pub fn add_element(&mut self, element: Arc<InformationElement<R>>) -> CodecResult<()> {
        if self.elements.len() >= MAX_TEMPLATE_ELEMENTS {
            return Err(CodecError::InvalidTemplate {
                id: self.id,
                reason: format!("more than {} elements", MAX_TEMPLATE_ELEMENTS),
            });
        }
        self.elements.push(element);
        Ok(())
    }

    /// Builder form of [`Template::add_element`]
    pub fn with_element(mut self, element: Arc<InformationElement<R>>) -> CodecResult<Self> {
        self.add_element(element)?;
        Ok(self)
    }

    /// Template id
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Elements in registration order
    pub fn elements(&self) -> &[Arc<InformationElement<R>>] {
        &self.elements
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the template has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Wire descriptions in registration order
    pub fn field_specs(&self) -> impl Iterator<Item = FieldSpec> + '_ {
        self.elements.iter().map(|element| element.spec())
    }

    /// Bytes of one data record
    pub fn record_width(&self) -> usize {
        self.elements
            .iter()
            .map(|element| element.octet_size() as usize)
            .sum()
    }

    /// Bytes of all field specifiers in a template set
    pub fn specifiers_len(&self) -> usize {
        self.field_specs().map(|spec| spec.wire_len()).sum()
    }
}
