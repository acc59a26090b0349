//! Pipeline layouts, carrying the per-set table offsets the command buffer uses to lay out descriptor tables.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::set_layout::DescriptorSetLayout;
use crate::Error;

/// Maximum number of descriptor sets in a pipeline layout.
pub const MAX_SETS: usize = 4;
/// Maximum number of dynamic uniform buffers across all sets of a layout.
pub const MAX_DYNAMIC_UNIFORM_BUFFERS: u32 = 16;
/// Maximum number of dynamic storage buffers across all sets of a layout.
pub const MAX_DYNAMIC_STORAGE_BUFFERS: u32 = 8;
/// Size of the push constant block.
pub const MAX_PUSH_CONSTANTS_SIZE: u32 = 128;

/// Defines a range of push constants.
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Shader stages where this push constant range is used
    pub stage_flags: vk::ShaderStageFlags,
    /// Offset into the global push constant block of this range
    pub offset: u32,
    /// Size of this push constant range
    pub size: u32,
}

/// Define a pipeline layout, this includes all descriptor set layouts and push constant ranges used by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutCreateInfo {
    /// Descriptor set layouts, indexed by set number.
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,
    /// Push constant ranges used in this pipeline
    pub push_constants: Vec<PushConstantRange>,
}

/// Where the resources of one set start in the pipeline-wide tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOffsets {
    /// First slot in the uniform buffer table.
    pub ubo_offset: u32,
    /// First slot in the per-bind-point dynamic uniform buffer array.
    pub dyn_ubo_offset: u32,
    /// First slot in the per-bind-point dynamic storage buffer array.
    pub dyn_ssbo_offset: u32,
    /// First image in the image attribute table.
    pub img_offset: u32,
}

/// A fully built pipeline layout. Offsets are computed once here and stay valid for the lifetime of the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    set_offsets: Vec<SetOffsets>,
    push_constants: Vec<PushConstantRange>,
    /// Static uniform buffer slots across all sets, descriptor uniform buffers included.
    pub num_ubos: u32,
    /// Dynamic uniform buffers across all sets.
    pub num_dyn_ubos: u32,
    /// Dynamic storage buffers across all sets.
    pub num_dyn_ssbos: u32,
    /// Textures across all sets.
    pub num_textures: u32,
    /// Samplers across all sets, not counting the dummy sampler.
    pub num_samplers: u32,
    /// Storage images across all sets.
    pub num_imgs: u32,
}

impl PipelineLayout {
    /// Create a pipeline layout and compute the table offsets of every set.
    /// # Errors
    /// * Fails with [`Error::TooManyBindings`] if the layout has more than [`MAX_SETS`] sets, or more dynamic buffers
    ///   than the per-bind-point arrays can hold.
    /// * Fails with [`Error::PushConstantRange`] if a push constant range does not fit the push constant block.
    pub fn new(info: &PipelineLayoutCreateInfo) -> Result<Arc<Self>> {
        if info.set_layouts.len() > MAX_SETS {
            return Err(Error::TooManyBindings {
                what: "descriptor sets",
                max: MAX_SETS as u32,
            }
            .into());
        }

        for range in &info.push_constants {
            let end = range.offset.checked_add(range.size);
            if end.map_or(true, |end| end > MAX_PUSH_CONSTANTS_SIZE) {
                return Err(Error::PushConstantRange {
                    offset: range.offset,
                    end: end.unwrap_or(u32::MAX),
                    max: MAX_PUSH_CONSTANTS_SIZE,
                }
                .into());
            }
        }

        let mut layout = Self {
            set_layouts: info.set_layouts.clone(),
            push_constants: info.push_constants.clone(),
            ..Self::empty()
        };

        for set in &info.set_layouts {
            layout.set_offsets.push(SetOffsets {
                ubo_offset: layout.num_ubos,
                dyn_ubo_offset: layout.num_dyn_ubos,
                dyn_ssbo_offset: layout.num_dyn_ssbos,
                img_offset: layout.num_imgs,
            });
            layout.num_ubos += set.num_ubos;
            layout.num_dyn_ubos += set.num_dyn_ubos;
            layout.num_dyn_ssbos += set.num_dyn_ssbos;
            layout.num_textures += set.num_textures;
            layout.num_samplers += set.num_samplers;
            layout.num_imgs += set.num_imgs;
        }

        if layout.num_dyn_ubos > MAX_DYNAMIC_UNIFORM_BUFFERS {
            return Err(Error::TooManyBindings {
                what: "dynamic uniform buffers",
                max: MAX_DYNAMIC_UNIFORM_BUFFERS,
            }
            .into());
        }
        if layout.num_dyn_ssbos > MAX_DYNAMIC_STORAGE_BUFFERS {
            return Err(Error::TooManyBindings {
                what: "dynamic storage buffers",
                max: MAX_DYNAMIC_STORAGE_BUFFERS,
            }
            .into());
        }

        #[cfg(feature = "log-objects")]
        trace!(
            "Created pipeline layout with {} sets, {} uniform buffer slots",
            layout.set_layouts.len(),
            layout.total_ubo_count()
        );

        Ok(Arc::new(layout))
    }

    /// A layout without sets or push constants.
    pub fn empty() -> Self {
        Self {
            set_layouts: vec![],
            set_offsets: vec![],
            push_constants: vec![],
            num_ubos: 0,
            num_dyn_ubos: 0,
            num_dyn_ssbos: 0,
            num_textures: 0,
            num_samplers: 0,
            num_imgs: 0,
        }
    }

    /// Get the descriptor set layouts of this pipeline layout.
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        self.set_layouts.as_slice()
    }

    /// Get the layout of one set.
    pub fn set_layout(&self, set: usize) -> Option<&Arc<DescriptorSetLayout>> {
        self.set_layouts.get(set)
    }

    /// Table offsets of one set.
    pub fn set_offsets(&self, set: usize) -> Option<SetOffsets> {
        self.set_offsets.get(set).copied()
    }

    /// Number of sets.
    pub fn set_count(&self) -> usize {
        self.set_layouts.len()
    }

    /// Push constant ranges.
    pub fn push_constants(&self) -> &[PushConstantRange] {
        self.push_constants.as_slice()
    }

    /// Size of the uniform buffer table: static slots, then dynamic uniform buffers, then one
    /// slot for the dynamic storage buffer address array if the layout has dynamic storage buffers.
    pub fn total_ubo_count(&self) -> u32 {
        self.num_ubos + self.num_dyn_ubos + (self.num_dyn_ssbos > 0) as u32
    }

    /// First slot of the dynamic uniform buffers in the uniform buffer table.
    pub fn dyn_ubos_offset(&self) -> u32 {
        self.num_ubos
    }

    /// Slot of the dynamic storage buffer address array in the uniform buffer table.
    pub fn dyn_desc_ubo_index(&self) -> u32 {
        self.num_ubos + self.num_dyn_ubos
    }
}
