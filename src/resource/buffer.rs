//! Minimal buffer object as seen by the command buffer.
//!
//! Buffers are owned by the application and only ever read here: their GPU address ends up in descriptors,
//! and host-visible buffers can be crawled on the CPU (for index range computation).
//!
//! # Example
//!
//! ```
//! use panbatch::prelude::*;
//!
//! let indices: [u16; 3] = [0, 1, 2];
//! let buffer = Buffer::with_data(0x2000_0000, bytemuck::cast_slice(&indices).to_vec());
//! assert_eq!(buffer.size(), 6);
//! assert_eq!(buffer.range(2, vk::WHOLE_SIZE), 4);
//! ```

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::Error;

#[derive(Debug)]
struct BufferInner {
    address: u64,
    size: u64,
    mapping: Option<Box<[u8]>>,
}

/// Shared handle to a buffer. Cloning is cheap, and clones refer to the same buffer.
#[derive(Debug, Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Buffer {}

impl Buffer {
    /// Create a buffer living only in GPU memory.
    pub fn new(address: u64, size: u64) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                address,
                size,
                mapping: None,
            }),
        }
    }

    /// Create a host-visible buffer with the given contents.
    pub fn with_data(address: u64, data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                address,
                size: data.len() as u64,
                mapping: Some(data.into_boxed_slice()),
            }),
        }
    }

    /// GPU address of the first byte.
    pub fn address(&self) -> u64 {
        self.inner.address
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// GPU address of the byte at `offset`.
    pub fn address_at(&self, offset: u64) -> u64 {
        self.inner.address + offset
    }

    /// Number of bytes accessible from `offset` when `range` bytes are requested. `vk::WHOLE_SIZE`
    /// selects everything up to the end of the buffer. Never reaches past the end of the buffer.
    pub fn range(&self, offset: u64, range: u64) -> u64 {
        if offset >= self.inner.size {
            return 0;
        }
        let remaining = self.inner.size - offset;
        if range == vk::WHOLE_SIZE {
            remaining
        } else {
            range.min(remaining)
        }
    }

    /// Whether the buffer has a host mapping.
    pub fn is_mapped(&self) -> bool {
        self.inner.mapping.is_some()
    }

    /// Host view of the buffer contents.
    /// # Errors
    /// * Fails with [`Error::UnmappableBuffer`] if the buffer is not host visible.
    pub fn mapped_slice(&self) -> Result<&[u8]> {
        self.inner
            .mapping
            .as_deref()
            .ok_or_else(|| Error::UnmappableBuffer.into())
    }
}

/// A range of a buffer, as referenced by a buffer descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRange {
    /// Referenced buffer.
    pub buffer: Buffer,
    /// Offset of the range in the buffer.
    pub offset: u64,
    /// Size of the range, or `vk::WHOLE_SIZE`.
    pub range: u64,
}

impl BufferRange {
    /// A range covering the whole buffer.
    pub fn whole(buffer: &Buffer) -> Self {
        Self {
            buffer: buffer.clone(),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    /// A range of `range` bytes starting at `offset`.
    pub fn new(buffer: &Buffer, offset: u64, range: u64) -> Self {
        Self {
            buffer: buffer.clone(),
            offset,
            range,
        }
    }

    /// GPU address and clamped size of this range after shifting it by a dynamic offset.
    pub fn resolve(&self, dynamic_offset: u64) -> (u64, u64) {
        let offset = self.offset + dynamic_offset;
        (self.buffer.address_at(offset), self.buffer.range(offset, self.range))
    }
}
