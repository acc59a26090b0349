//! A linear allocator for command buffer owned GPU memory.
//!
//! The arena works by linearly incrementing an offset on every allocation. Deallocation is only possible by calling
//! [`ArenaPool::reset`], which releases everything at once and moves the offset back to the first slab.
//! Slabs are kept across resets, so a command buffer that is recorded the same way every frame stops allocating
//! new memory after its first recording.
//!
//! Every allocation returns a [`PoolPtr`], carrying both the host side location (used to fill the memory)
//! and the GPU address (used in descriptors pointing at it).
//!
//! # Example
//! ```
//! # use panbatch::prelude::*;
//! # use anyhow::Result;
//! fn upload_table(pool: &mut ArenaPool<HostAllocator>) -> Result<u64> {
//!     let table: [u32; 4] = [1, 2, 3, 4];
//!     let ptr = pool.upload(&table, 16)?;
//!     assert_eq!(pool.read_pod::<u32>(ptr.gpu + 4), Some(2));
//!     Ok(ptr.gpu)
//! }
//! # let mut pool = ArenaPool::new(HostAllocator::new(), "example", 4096);
//! # upload_table(&mut pool).unwrap();
//! ```

use anyhow::Result;
use bytemuck::Pod;

use crate::allocator::traits::{Slab, SlabAllocator};
use crate::util::align::align_up;
use crate::Error;

/// GPU virtual addresses are 48 bits wide, so no single allocation can be larger.
const MAX_ALLOCATION_SIZE: u64 = 1 << 48;

/// Host side location of an arena allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HostPtr {
    slab: usize,
    offset: usize,
}

/// Dual handle to an arena allocation: where to write it on the host, and where the GPU sees it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PoolPtr {
    /// Host side location, only meaningful to the pool that returned it.
    pub host: HostPtr,
    /// GPU virtual address.
    pub gpu: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

impl PoolPtr {
    /// GPU address of the byte at `offset` into this allocation.
    pub fn gpu_at(&self, offset: u64) -> u64 {
        self.gpu + offset
    }
}

/// Linear allocator handing out [`PoolPtr`]s from slabs obtained through a [`SlabAllocator`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ArenaPool<A: SlabAllocator> {
    #[derivative(Debug = "ignore")]
    allocator: A,
    label: &'static str,
    slabs: Vec<Slab>,
    current_slab: usize,
    local_offset: u64,
    slab_size: u64,
    allocation_count: usize,
}

impl<A: SlabAllocator> ArenaPool<A> {
    /// Create a new arena. No memory is allocated until the first call to [`Self::allocate()`].
    pub fn new(allocator: A, label: &'static str, slab_size: u64) -> Self {
        Self {
            allocator,
            label,
            slabs: vec![],
            current_slab: 0,
            local_offset: 0,
            slab_size,
            allocation_count: 0,
        }
    }

    /// Allocate `size` bytes aligned to `alignment`, which must be a power of two. The memory is zeroed.
    /// # Errors
    /// * Fails with [`Error::OutOfMemory`] if a new slab is needed and the slab allocator cannot provide one.
    ///   The arena is left unchanged in that case, so the call can be retried.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> Result<PoolPtr> {
        if size > MAX_ALLOCATION_SIZE {
            return Err(Error::OutOfMemory {
                pool: self.label,
                requested: size,
            }
            .into());
        }
        let fits = |slab: &Slab, offset: u64| align_up(offset, alignment) + size <= slab.size();

        let use_current = self
            .slabs
            .get(self.current_slab)
            .map(|slab| fits(slab, self.local_offset))
            .unwrap_or_default();

        if !use_current {
            // Slabs retained from before the last reset are reused in order before allocating new ones.
            let next = self.current_slab + 1;
            let reuse = self.slabs.get(next).map(|slab| fits(slab, 0)).unwrap_or_default();
            if reuse {
                self.current_slab = next;
            } else {
                let slab_size = align_up(size.max(self.slab_size), alignment.max(1));
                let slab = self
                    .allocator
                    .allocate_slab(self.label, slab_size)
                    .map_err(|err| match err.downcast::<Error>() {
                        Ok(Error::OutOfMemory { .. }) => Error::OutOfMemory {
                            pool: self.label,
                            requested: size,
                        }
                        .into(),
                        Ok(other) => other.into(),
                        Err(other) => other,
                    })?;
                if self.slabs.is_empty() {
                    self.current_slab = 0;
                } else {
                    // Keep the slab order equal to the fill order, so reuse after reset walks them linearly.
                    self.current_slab = self.slabs.len();
                }
                self.slabs.push(slab);
            }
            self.local_offset = 0;
        }

        let slab_index = self.current_slab;
        let slab = &mut self.slabs[slab_index];
        let offset = align_up(self.local_offset, alignment);
        slab.mapping[offset as usize..(offset + size) as usize].fill(0);
        self.local_offset = offset + size;
        self.allocation_count += 1;

        Ok(PoolPtr {
            host: HostPtr {
                slab: slab_index,
                offset: offset as usize,
            },
            gpu: slab.device_address + offset,
            size,
        })
    }

    /// Copy raw bytes into an allocation, starting `offset` bytes into it.
    pub fn write(&mut self, ptr: &PoolPtr, offset: u64, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() as u64 <= ptr.size);
        let Some(slab) = self.slabs.get_mut(ptr.host.slab) else {
            return;
        };
        let start = ptr.host.offset + offset as usize;
        slab.mapping[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Write a single hardware descriptor into an allocation.
    pub fn write_pod<T: Pod>(&mut self, ptr: &PoolPtr, offset: u64, value: &T) {
        self.write(ptr, offset, bytemuck::bytes_of(value));
    }

    /// Write an array of hardware descriptors into an allocation.
    pub fn write_slice<T: Pod>(&mut self, ptr: &PoolPtr, offset: u64, values: &[T]) {
        self.write(ptr, offset, bytemuck::cast_slice(values));
    }

    /// Allocate and fill memory with an array of descriptors in one step.
    pub fn upload<T: Pod>(&mut self, values: &[T], alignment: u64) -> Result<PoolPtr> {
        let ptr = self.allocate(std::mem::size_of_val(values) as u64, alignment)?;
        self.write_slice(&ptr, 0, values);
        Ok(ptr)
    }

    /// Read back `len` bytes at a GPU address, if the address belongs to this arena.
    pub fn read(&self, gpu: u64, len: u64) -> Option<&[u8]> {
        let slab = self.slabs.iter().find(|slab| slab.contains(gpu, len))?;
        let start = (gpu - slab.device_address) as usize;
        Some(&slab.mapping[start..start + len as usize])
    }

    /// Read back a descriptor at a GPU address.
    pub fn read_pod<T: Pod>(&self, gpu: u64) -> Option<T> {
        let bytes = self.read(gpu, std::mem::size_of::<T>() as u64)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /// Read back an array of `count` descriptors at a GPU address.
    pub fn read_array<T: Pod>(&self, gpu: u64, count: usize) -> Option<Vec<T>> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read(gpu, (size * count) as u64)?;
        Some(bytes.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
    }

    /// Number of allocations made since the last reset.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Number of slabs owned by this arena, including ones retained across resets.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Debug label of this arena.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Move the offset back to the start of the first slab. Slabs are retained.
    ///
    /// Old allocations must not be in use by the GPU anymore. The command buffer only calls this from
    /// `reset()`, which has the same requirement.
    pub fn reset(&mut self) {
        self.current_slab = 0;
        self.local_offset = 0;
        self.allocation_count = 0;
    }
}

impl<A: SlabAllocator> Drop for ArenaPool<A> {
    fn drop(&mut self) {
        for slab in self.slabs.drain(..) {
            if let Err(err) = self.allocator.free_slab(slab) {
                error!("Failed to free slab of arena `{}`: {}", self.label, err);
            }
        }
    }
}
