//! The pipeline module exposes pipeline layouts, descriptor set layouts and the two pipeline kinds the command
//! buffer can bind: [`GraphicsPipeline`](crate::GraphicsPipeline) and [`ComputePipeline`](crate::ComputePipeline).
//!
//! Shaders are compiled elsewhere. A pipeline only carries the binary address and resource requirements of each
//! stage (see [`ShaderInfo`](crate::ShaderInfo)), plus the static state the draw path reads.
//!
//! # Example
//! ```
//! use panbatch::prelude::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let set_layout = DescriptorSetLayout::new(&DescriptorSetLayoutCreateInfo {
//!     bindings: vec![DescriptorSetLayoutBinding {
//!         binding: 0,
//!         ty: vk::DescriptorType::UNIFORM_BUFFER,
//!         count: 1,
//!         stages: vk::ShaderStageFlags::VERTEX,
//!     }],
//!     push_descriptor: false,
//! })?;
//! let layout = PipelineLayout::new(&PipelineLayoutCreateInfo {
//!     set_layouts: vec![set_layout],
//!     push_constants: vec![],
//! })?;
//! let pipeline = PipelineBuilder::new("triangle")
//!     .layout(layout)
//!     .vertex_shader(ShaderInfo::new(0x1000).writes_position(16))
//!     .fragment_shader(ShaderInfo::new(0x2000))
//!     .blend_attachment_write_all()
//!     .build()?;
//! let pipeline = Pipeline::Graphics(pipeline);
//! assert_eq!(pipeline.bind_point(), vk::PipelineBindPoint::GRAPHICS);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;

use crate::pipeline::builder::GraphicsPipeline;
use crate::pipeline::compute::ComputePipeline;
use crate::pipeline::pipeline_layout::PipelineLayout;

pub mod builder;
pub mod compute;
pub mod pipeline_layout;
pub mod set_layout;
pub mod shader;

/// A pipeline of either kind. This is what `bind_pipeline` takes.
#[derive(Debug, Clone)]
pub enum Pipeline {
    /// Graphics pipeline.
    Graphics(Arc<GraphicsPipeline>),
    /// Compute pipeline.
    Compute(Arc<ComputePipeline>),
}

impl Pipeline {
    /// Bind point this pipeline binds to.
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        match self {
            Pipeline::Graphics(_) => vk::PipelineBindPoint::GRAPHICS,
            Pipeline::Compute(_) => vk::PipelineBindPoint::COMPUTE,
        }
    }

    /// Layout of the pipeline.
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        match self {
            Pipeline::Graphics(pipeline) => &pipeline.layout,
            Pipeline::Compute(pipeline) => &pipeline.layout,
        }
    }
}

impl From<Arc<GraphicsPipeline>> for Pipeline {
    fn from(value: Arc<GraphicsPipeline>) -> Self {
        Pipeline::Graphics(value)
    }
}

impl From<Arc<ComputePipeline>> for Pipeline {
    fn from(value: Arc<ComputePipeline>) -> Self {
        Pipeline::Compute(value)
    }
}
