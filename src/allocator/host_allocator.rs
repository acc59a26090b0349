//! A slab allocator backed by host memory, with fake but stable GPU addresses.
//!
//! This is what headless tools and the test-suite use. Its optional budget makes it possible to
//! exercise the out-of-memory paths of the batch builder deterministically.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::allocator::traits::{Slab, SlabAllocator};
use crate::util::align::align_up;
use crate::Error;

const BASE_ADDRESS: u64 = 0x1_0000_0000;
const SLAB_ALIGNMENT: u64 = 4096;

#[derive(Debug)]
struct HostAllocatorState {
    next_address: u64,
    live_bytes: u64,
    live_slabs: usize,
    budget: Option<u64>,
}

/// Slab allocator handing out zeroed host memory. All internal state is wrapped inside an
/// `Arc<Mutex<T>>`, so clones share the same address space and budget.
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// let mut allocator = HostAllocator::new();
/// allocator.set_budget(Some(4096));
/// let slab = allocator.allocate_slab("example", 4096).unwrap();
/// assert!(allocator.allocate_slab("example", 1).is_err());
/// allocator.free_slab(slab).unwrap();
/// assert!(allocator.allocate_slab("example", 1).is_ok());
/// ```
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct HostAllocator {
    #[derivative(Debug = "ignore")]
    state: Arc<Mutex<HostAllocatorState>>,
}

impl HostAllocator {
    /// Create a new allocator without a memory budget.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostAllocatorState {
                next_address: BASE_ADDRESS,
                live_bytes: 0,
                live_slabs: 0,
                budget: None,
            })),
        }
    }

    /// Limit the total size of live slabs. `None` removes the limit.
    pub fn set_budget(&mut self, budget: Option<u64>) {
        if let Ok(mut state) = self.state.lock() {
            state.budget = budget;
        }
    }

    /// Total size of all slabs currently handed out.
    pub fn live_bytes(&self) -> Result<u64> {
        Ok(self.state.lock().map_err(|_| Error::PoisonError)?.live_bytes)
    }

    /// Number of slabs currently handed out.
    pub fn live_slabs(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(|_| Error::PoisonError)?.live_slabs)
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SlabAllocator for HostAllocator {
    fn allocate_slab(&mut self, label: &'static str, size: u64) -> Result<Slab> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        let size = align_up(size.max(1), SLAB_ALIGNMENT);
        let out_of_memory = || Error::OutOfMemory {
            pool: label,
            requested: size,
        };
        if let Some(budget) = state.budget {
            if state.live_bytes.saturating_add(size) > budget {
                return Err(out_of_memory().into());
            }
        }

        let len = usize::try_from(size).map_err(|_| out_of_memory())?;
        let mut memory = Vec::new();
        memory.try_reserve_exact(len).map_err(|_| out_of_memory())?;
        memory.resize(len, 0u8);

        let address = state.next_address;
        state.next_address += size;
        state.live_bytes += size;
        state.live_slabs += 1;
        #[cfg(feature = "log-objects")]
        trace!("Allocated slab `{}` of {} bytes at {:#x}", label, size, address);
        Ok(Slab::new(address, memory.into_boxed_slice()))
    }

    fn free_slab(&mut self, slab: Slab) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        state.live_bytes -= slab.size();
        state.live_slabs -= 1;
        Ok(())
    }
}
