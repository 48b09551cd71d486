//! Information elements: the typed fields a template is made of.
//!
//! An element pairs its wire description ([`FieldSpec`]) with a
//! [`ValueProducer`] that renders the field of the record currently being
//! encoded. The codec only ever sees the producer capability, so adding a
//! field kind never touches the encoder.

use crate::buffer::ExportBuffer;
use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Bit of the element id marking an enterprise-specific element
pub const ENTERPRISE_BIT: u16 = 0x8000;

/// Octet size reserved by IPFIX for variable-length fields (unsupported)
pub const VARIABLE_LENGTH: u16 = 0xFFFF;

/// Private enterprise number of the MeshFlow elements
pub const MESHFLOW_ENTERPRISE_ID: u32 = 20763;

/// Renders one field of a record into exactly `out.len()` bytes, network order.
pub trait ValueProducer<R>: Send + Sync {
    /// Fill `out` with the field value of `record`
    fn produce(&self, record: &R, out: &mut [u8]);
}

impl<R, F> ValueProducer<R> for F
where
    F: Fn(&R, &mut [u8]) + Send + Sync,
{
    fn produce(&self, record: &R, out: &mut [u8]) {
        self(record, out)
    }
}

/// Write `value` as a big-endian unsigned integer filling all of `out`.
///
/// Narrow fields use reduced-size encoding; values that do not fit saturate
/// to the largest value the field can hold.
pub fn write_unsigned(value: u64, out: &mut [u8]) {
    let width = out.len();
    if width >= 8 {
        let (pad, tail) = out.split_at_mut(width - 8);
        pad.fill(0);
        tail.copy_from_slice(&value.to_be_bytes());
        return;
    }
    let max = (1u64 << (width * 8)) - 1;
    let clamped = value.min(max);
    out.copy_from_slice(&clamped.to_be_bytes()[8 - width..]);
}

/// Schema-only description of a field, as carried by template sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    /// Element id, including the enterprise bit when present
    pub id: u16,
    /// Width of the field in data records
    pub octet_size: u16,
    /// Private enterprise number, 0 for IANA elements
    pub enterprise_id: u32,
}

impl FieldSpec {
    /// Validate and build a field description
    pub fn new(id: u16, octet_size: u16, enterprise_id: u32) -> CodecResult<Self> {
        if octet_size == 0 || octet_size == VARIABLE_LENGTH {
            return Err(CodecError::InvalidElement {
                id,
                reason: format!("unsupported octet size {}", octet_size),
            });
        }
        let has_bit = id & ENTERPRISE_BIT != 0;
        if has_bit != (enterprise_id != 0) {
            return Err(CodecError::InvalidElement {
                id,
                reason: format!(
                    "enterprise bit {} but enterprise id {}",
                    if has_bit { "set" } else { "clear" },
                    enterprise_id
                ),
            });
        }
        Ok(Self {
            id,
            octet_size,
            enterprise_id,
        })
    }

    /// Whether the specifier carries an enterprise id
    pub fn is_enterprise(&self) -> bool {
        self.enterprise_id != 0
    }

    /// Bytes this specifier occupies in a template set
    pub fn wire_len(&self) -> usize {
        if self.is_enterprise() {
            8
        } else {
            4
        }
    }

    /// Serialize as `id || size [|| enterprise_id]`
    pub fn write(&self, buf: &mut ExportBuffer) -> CodecResult<()> {
        buf.put_u16(self.id)?;
        buf.put_u16(self.octet_size)?;
        if self.is_enterprise() {
            buf.put_u32(self.enterprise_id)?;
        }
        Ok(())
    }

    /// Parse one specifier from the front of `bytes`, returning it and its length
    pub fn read(bytes: &[u8]) -> CodecResult<(Self, usize)> {
        if bytes.len() < 4 {
            return Err(CodecError::Truncated {
                expected: 4,
                actual: bytes.len(),
            });
        }
        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let octet_size = u16::from_be_bytes([bytes[2], bytes[3]]);
        if id & ENTERPRISE_BIT == 0 {
            return Ok((Self::new(id, octet_size, 0)?, 4));
        }
        if bytes.len() < 8 {
            return Err(CodecError::Truncated {
                expected: 8,
                actual: bytes.len(),
            });
        }
        let enterprise_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok((Self::new(id, octet_size, enterprise_id)?, 8))
    }
}

/// One exportable field of records of type `R`
pub struct InformationElement<R> {
    spec: FieldSpec,
    producer: Box<dyn ValueProducer<R>>,
}

impl<R> InformationElement<R> {
    /// Build an element; fails when the id/enterprise pairing or size is invalid
    pub fn new<P>(id: u16, octet_size: u16, enterprise_id: u32, producer: P) -> CodecResult<Self>
    where
        P: ValueProducer<R> + 'static,
    {
        Ok(Self {
            spec: FieldSpec::new(id, octet_size, enterprise_id)?,
            producer: Box::new(producer),
        })
    }

    /// Wire description
    pub fn spec(&self) -> FieldSpec {
        self.spec
    }

    /// Element id
    pub fn id(&self) -> u16 {
        self.spec.id
    }

    /// Field width
    pub fn octet_size(&self) -> u16 {
        self.spec.octet_size
    }

    /// Private enterprise number, 0 for IANA elements
    pub fn enterprise_id(&self) -> u32 {
        self.spec.enterprise_id
    }

    /// Render this field of `record` into `out` (`out.len() == octet_size`)
    pub fn produce(&self, record: &R, out: &mut [u8]) {
        self.producer.produce(record, out)
    }
}

impl<R> fmt::Debug for InformationElement<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InformationElement")
            .field("id", &self.spec.id)
            .field("octet_size", &self.spec.octet_size)
            .field("enterprise_id", &self.spec.enterprise_id)
            .finish()
    }
}
