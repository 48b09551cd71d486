//! Fixed-capacity output buffer.
//!
//! The storage is allocated once and never grows: every write is checked
//! against the capacity and fails with [`CodecError::BufferOverflow`]
//! instead of reallocating. Length fields are written as placeholders and
//! backpatched in place once the content they describe is known.

use crate::error::{CodecError, CodecResult};

/// Byte buffer with a hard capacity and in-place backpatching
#[derive(Debug, Clone)]
pub struct ExportBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl ExportBuffer {
    /// Allocate a buffer holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Fixed capacity in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Forget the content, keeping the storage
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Roll back to an earlier length
    pub fn truncate(&mut self, len: usize) {
        if len < self.len {
            self.len = len;
        }
    }

    /// Written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    fn reserve(&mut self, additional: usize) -> CodecResult<&mut [u8]> {
        let needed = self.len + additional;
        if needed > self.data.len() {
            return Err(CodecError::BufferOverflow {
                needed,
                capacity: self.data.len(),
            });
        }
        let start = self.len;
        self.len = needed;
        Ok(&mut self.data[start..needed])
    }

    /// Append one byte
    pub fn put_u8(&mut self, value: u8) -> CodecResult<()> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    /// Append a big-endian u16
    pub fn put_u16(&mut self, value: u16) -> CodecResult<()> {
        self.reserve(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Append a big-endian u32
    pub fn put_u32(&mut self, value: u32) -> CodecResult<()> {
        self.reserve(4)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Append raw bytes
    pub fn put_slice(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Append `len` zero bytes and hand them out for filling
    pub fn put_zeroed(&mut self, len: usize) -> CodecResult<&mut [u8]> {
        let region = self.reserve(len)?;
        region.fill(0);
        Ok(region)
    }

    /// Overwrite a previously written big-endian u16 at `offset`
    pub fn patch_u16(&mut self, offset: usize, value: u16) -> CodecResult<()> {
        if offset + 2 > self.len {
            return Err(CodecError::BufferOverflow {
                needed: offset + 2,
                capacity: self.len,
            });
        }
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Overwrite a previously written byte at `offset`
    pub fn patch_u8(&mut self, offset: usize, value: u8) -> CodecResult<()> {
        if offset >= self.len {
            return Err(CodecError::BufferOverflow {
                needed: offset + 1,
                capacity: self.len,
            });
        }
        self.data[offset] = value;
        Ok(())
    }
}
