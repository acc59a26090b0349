//! Command buffer recording for tile-based GPUs
//!
//! Panbatch translates Vulkan-style commands into batches of hardware jobs, the way a Mali-style
//! driver does it. Draws become vertex and tiler job pairs, dispatches become compute jobs, and
//! render passes become fragment jobs appended when a batch is closed. Descriptor sets are packed
//! when written, and the tables a job reads are built lazily and memoized until a binding command
//! invalidates them.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import all command traits
//! use panbatch::prelude::traits;
//! // Import types under a namespace.
//! use panbatch::prelude as pb;
//!
//! // Or, if you dont care about using the types under a namespace
//! use panbatch::prelude::*;
//! ```
//!
//! # Example
//!
//! A [`Device`] describes the GPU the command buffers record for, and a [`CommandPool`] hands out
//! command buffers backed by a slab allocator.
//! ```
//! use panbatch::prelude::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let device = DeviceBuilder::new()
//!     .thread_tls_alloc(256)
//!     .optimal_tib_size(16 * 1024)
//!     .build()?;
//! let settings = CommandPoolBuilder::new().name("main").build();
//! let pool = CommandPool::new(device, HostAllocator::new(), settings)?;
//!
//! let pipeline = ComputePipelineBuilder::new("blur")
//!     .set_shader(ShaderInfo::new(0x1000).wls_size(256))
//!     .local_size(8, 8, 1)
//!     .build()?;
//!
//! let mut cmd = pool.allocate();
//! cmd.begin()?
//!     .bind_pipeline(&Pipeline::Compute(pipeline))?
//!     .dispatch(16, 16, 1)?;
//! cmd.end()?;
//! for batch in cmd.batches() {
//!     assert_eq!(batch.jobs().len(), 1);
//! }
//! # Ok(())
//! # }
//! ```
//! For further example code, check out the following modules
//! - [`command_buffer`] for recording, batches and the commands available.
//! - [`descriptor`] for descriptor sets and descriptor tables.
//! - [`pipeline`] for pipeline layouts and pipelines.
//! - [`sync`] for events.
//! - [`allocator`] for slab allocators and command buffer arenas.
//! - [`resource`] for buffers, image views and samplers.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod descriptor;
pub mod pipeline;
pub mod resource;
pub mod sync;
pub mod util;
