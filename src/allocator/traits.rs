use anyhow::Result;

/// One contiguous block of GPU-visible memory with a host mapping.
///
/// The host mapping and the GPU address are two independent handles to the same memory, there is no
/// way to derive one from the other without the slab.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Slab {
    pub(crate) device_address: u64,
    #[derivative(Debug = "ignore")]
    pub(crate) mapping: Box<[u8]>,
}

impl Slab {
    /// Create a slab from a GPU address and its host mapping.
    pub fn new(device_address: u64, mapping: Box<[u8]>) -> Self {
        Self {
            device_address,
            mapping,
        }
    }

    /// GPU address of the first byte.
    pub fn device_address(&self) -> u64 {
        self.device_address
    }

    /// Size of the slab in bytes.
    pub fn size(&self) -> u64 {
        self.mapping.len() as u64
    }

    /// Whether a GPU address range lies entirely inside this slab.
    pub fn contains(&self, address: u64, len: u64) -> bool {
        address >= self.device_address && address + len <= self.device_address + self.size()
    }
}

/// Backing memory source for the command buffer arenas. This is the buffer-object pool of the kernel driver.
///
/// Implementors are `Clone`, `Send` and `Sync` so one allocator can be shared by every command buffer of a pool,
/// with its state behind an `Arc<Mutex<T>>`.
pub trait SlabAllocator: Clone + Send + Sync {
    /// Allocate a new slab of at least `size` bytes.
    /// # Errors
    /// * Fails with [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the memory cannot be provided.
    fn allocate_slab(&mut self, label: &'static str, size: u64) -> Result<Slab>;
    /// Give a slab back to the allocator.
    fn free_slab(&mut self, slab: Slab) -> Result<()>;
}
