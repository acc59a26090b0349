//! This module handles everything related to descriptor sets and the descriptor tables built from them.
//!
//! A [`DescriptorSet`](crate::DescriptorSet) stores hardware descriptors packed at write time, grouped per table
//! kind. Sets are filled with [`DescriptorSet::write`](crate::DescriptorSet::write), a
//! [`DescriptorSetBuilder`](crate::DescriptorSetBuilder) or a
//! [`DescriptorUpdateTemplate`](crate::DescriptorUpdateTemplate).
//!
//! Each bind point of a command buffer keeps a [`DescriptorState`](crate::DescriptorState): the bound sets, the
//! resolved dynamic buffers and the memoized tables. A table is built the first time a draw or dispatch needs it
//! and reused until a binding command drops it.
//!
//! # Example
//!
//! ```
//! use panbatch::prelude::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let layout = DescriptorSetLayout::new(&DescriptorSetLayoutCreateInfo {
//!     bindings: vec![DescriptorSetLayoutBinding {
//!         binding: 0,
//!         ty: vk::DescriptorType::UNIFORM_BUFFER,
//!         count: 1,
//!         stages: vk::ShaderStageFlags::FRAGMENT,
//!     }],
//!     push_descriptor: false,
//! })?;
//! let buffer = Buffer::new(0x10_0000, 256);
//! let set = DescriptorSetBuilder::new(layout)
//!     // In GLSL this would be
//!     // layout(set = X, binding = 0) uniform Material { ... };
//!     .bind_uniform_buffer(0, BufferRange::whole(&buffer))
//!     .build()?;
//! assert_eq!(set.ubos().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod descriptor_set;
pub mod packed;
pub mod state;
pub mod tables;
pub mod template;
