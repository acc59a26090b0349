//! Re-exports of every public type, plus the command traits under [`traits`].

pub use std::sync::Arc;

pub use ash::vk;

pub mod traits {
    pub use crate::allocator::traits::*;
    pub use crate::command_buffer::traits::*;
    pub use crate::util::byte_size::ByteSize;
}

pub use crate::core::device::{wls_instances, Device, DeviceBuilder, DeviceProperties, TilerHeap};
pub use crate::core::error::Error;
pub use crate::core::pool_info::{CommandPoolBuilder, CommandPoolSettings, DEFAULT_SLAB_SIZE, JOB_INDEX_LIMIT};

pub use crate::allocator::arena::{ArenaPool, HostPtr, PoolPtr};
pub use crate::allocator::host_allocator::HostAllocator;
pub use crate::allocator::traits::*;

pub use crate::command_buffer::batch::{Batch, FramebufferAlloc, TilerAlloc};
pub use crate::command_buffer::command_pool::CommandPool;
pub use crate::command_buffer::graphics::padded_vertex_count;
pub use crate::command_buffer::job::{AllocatedJob, Job, JobChain, JobRecord};
pub use crate::command_buffer::state::{
    AttachmentBos, ClearValue, DynamicState, FramebufferInfo, RenderTargetState, RenderingAttachmentInfo, RenderingInfo,
    VertexAttributeTables, MAX_RTS, MAX_VBS, MAX_VS_ATTRIBS,
};
pub use crate::command_buffer::sysvals::{ComputeSysvals, GraphicsSysvals};
pub use crate::command_buffer::traits::*;
pub use crate::command_buffer::{CommandBuffer, CommandBufferStatus};

pub use crate::descriptor::descriptor_set::{Descriptor, DescriptorSet, DescriptorSetBuilder, DescriptorWrite};
pub use crate::descriptor::state::{DescriptorState, ImageAttributeTables, SetBinding, TableKind};
pub use crate::descriptor::template::{DescriptorUpdateTemplate, DescriptorUpdateTemplateEntry};

pub use crate::pipeline::builder::{GraphicsPipeline, PipelineBuilder, VertexInputAttribute, VertexInputBinding};
pub use crate::pipeline::compute::{ComputePipeline, ComputePipelineBuilder};
pub use crate::pipeline::pipeline_layout::{PipelineLayout, PipelineLayoutCreateInfo, PushConstantRange};
pub use crate::pipeline::set_layout::{
    BindingLayout, DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo,
};
pub use crate::pipeline::shader::ShaderInfo;
pub use crate::pipeline::Pipeline;

pub use crate::resource::buffer::{Buffer, BufferRange};
pub use crate::resource::image::{ImageView, ImageViewInfo};
pub use crate::resource::sampler::{Sampler, SamplerInfo};

pub use crate::sync::event::{Event, EventOp};
