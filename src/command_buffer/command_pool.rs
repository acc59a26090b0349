//! Command pools hand out command buffers sharing one slab allocator and one set of settings.

use std::sync::Arc;

use anyhow::Result;

use crate::allocator::host_allocator::HostAllocator;
use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::CommandBuffer;
use crate::core::device::Device;
use crate::core::pool_info::{CommandPoolSettings, JOB_INDEX_LIMIT};

/// Allocates command buffers. Each command buffer owns its arenas, so command buffers from one pool can be
/// recorded on different threads.
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// # use anyhow::Result;
/// fn make_pool() -> Result<CommandPool> {
///     let device = DeviceBuilder::new().build()?;
///     let settings = CommandPoolBuilder::new().name("main").build();
///     CommandPool::new(device, HostAllocator::new(), settings)
/// }
/// # let pool = make_pool().unwrap();
/// # let cmd = pool.allocate();
/// # assert_eq!(cmd.status(), CommandBufferStatus::Initial);
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandPool<A: SlabAllocator = HostAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    allocator: A,
    settings: Arc<CommandPoolSettings>,
}

impl<A: SlabAllocator> CommandPool<A> {
    /// Create a new command pool.
    /// # Errors
    /// * Fails if a slab size is zero or the job index limit is out of range.
    pub fn new(device: Device, allocator: A, settings: CommandPoolSettings) -> Result<Self> {
        if settings.desc_slab_size == 0 || settings.tls_slab_size == 0 || settings.varying_slab_size == 0 {
            anyhow::bail!("Command pool `{}` has a zero slab size", settings.name);
        }
        if settings.job_index_limit == 0 || settings.job_index_limit > JOB_INDEX_LIMIT {
            anyhow::bail!(
                "Job index limit {} of command pool `{}` is outside 1..={}",
                settings.job_index_limit,
                settings.name,
                JOB_INDEX_LIMIT
            );
        }

        info!(
            "Created command pool `{}` (slabs: desc {}, tls {}, varying {})",
            settings.name, settings.desc_slab_size, settings.tls_slab_size, settings.varying_slab_size
        );

        Ok(Self {
            device,
            allocator,
            settings: Arc::new(settings),
        })
    }

    /// Allocate a command buffer in the initial state.
    pub fn allocate(&self) -> CommandBuffer<A> {
        CommandBuffer::new(self.device.clone(), self.allocator.clone(), self.settings.clone())
    }

    /// Settings shared by every command buffer of this pool.
    pub fn settings(&self) -> &CommandPoolSettings {
        &self.settings
    }

    /// Device of this pool.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
