//! Descriptor set layouts, with every binding assigned a slot in each hardware table it contributes to.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::descriptor::packed::SsboAddr;
use crate::Error;

/// Describes a single binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSetLayoutBinding {
    /// Binding number.
    pub binding: u32,
    /// Descriptor type.
    pub ty: vk::DescriptorType,
    /// Number of array elements.
    pub count: u32,
    /// Shader stages accessing this binding.
    pub stages: vk::ShaderStageFlags,
}

/// Describes a descriptor set layout.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Bindings of the set, in any order.
    pub bindings: Vec<DescriptorSetLayoutBinding>,
    /// Whether sets of this layout are pushed through the command buffer instead of allocated.
    pub push_descriptor: bool,
}

/// A binding with its first slot in each hardware table. Only the slots matching the descriptor
/// type are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingLayout {
    /// Binding number.
    pub binding: u32,
    /// Descriptor type.
    pub ty: vk::DescriptorType,
    /// Number of array elements.
    pub count: u32,
    /// First slot in the set's uniform buffer array.
    pub ubo_idx: u32,
    /// First slot in the set's dynamic uniform buffer array.
    pub dyn_ubo_idx: u32,
    /// First slot in the set's dynamic storage buffer array.
    pub dyn_ssbo_idx: u32,
    /// First slot in the set's storage buffer array.
    pub ssbo_idx: u32,
    /// First slot in the set's texture array.
    pub tex_idx: u32,
    /// First slot in the set's sampler array.
    pub sampler_idx: u32,
    /// First slot in the set's image array.
    pub img_idx: u32,
}

impl BindingLayout {
    /// Whether this binding consumes dynamic offsets at bind time.
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self.ty,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        )
    }
}

/// A fully built descriptor set layout.
///
/// Static storage buffers are not visible to shaders directly, their addresses are packed into a
/// per-set descriptor uniform buffer, placed right after the set's regular uniform buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    bindings: Vec<BindingLayout>,
    push_descriptor: bool,
    /// Regular uniform buffers, not counting the descriptor uniform buffer.
    pub num_ubo_bindings: u32,
    /// Uniform buffer slots, including the descriptor uniform buffer if there is one.
    pub num_ubos: u32,
    /// Dynamic uniform buffers.
    pub num_dyn_ubos: u32,
    /// Dynamic storage buffers.
    pub num_dyn_ssbos: u32,
    /// Static storage buffers.
    pub num_ssbos: u32,
    /// Texture slots.
    pub num_textures: u32,
    /// Sampler slots.
    pub num_samplers: u32,
    /// Storage image slots.
    pub num_imgs: u32,
}

impl DescriptorSetLayout {
    /// Create a set layout, assigning every binding its table slots in ascending binding order.
    /// # Errors
    /// * Fails if a descriptor type has no hardware table, or a binding number is used twice.
    pub fn new(info: &DescriptorSetLayoutCreateInfo) -> Result<Arc<Self>> {
        let mut sorted = info.bindings.clone();
        sorted.sort_by_key(|binding| binding.binding);
        if sorted.windows(2).any(|pair| pair[0].binding == pair[1].binding) {
            anyhow::bail!("Descriptor set layout declares the same binding twice");
        }

        let mut layout = Self {
            bindings: Vec::with_capacity(sorted.len()),
            push_descriptor: info.push_descriptor,
            num_ubo_bindings: 0,
            num_ubos: 0,
            num_dyn_ubos: 0,
            num_dyn_ssbos: 0,
            num_ssbos: 0,
            num_textures: 0,
            num_samplers: 0,
            num_imgs: 0,
        };

        for binding in sorted {
            let mut entry = BindingLayout {
                binding: binding.binding,
                ty: binding.ty,
                count: binding.count,
                ubo_idx: layout.num_ubo_bindings,
                dyn_ubo_idx: layout.num_dyn_ubos,
                dyn_ssbo_idx: layout.num_dyn_ssbos,
                ssbo_idx: layout.num_ssbos,
                tex_idx: layout.num_textures,
                sampler_idx: layout.num_samplers,
                img_idx: layout.num_imgs,
            };
            match binding.ty {
                vk::DescriptorType::SAMPLER => layout.num_samplers += binding.count,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => {
                    layout.num_samplers += binding.count;
                    layout.num_textures += binding.count;
                }
                vk::DescriptorType::SAMPLED_IMAGE | vk::DescriptorType::INPUT_ATTACHMENT => {
                    layout.num_textures += binding.count
                }
                vk::DescriptorType::STORAGE_IMAGE => layout.num_imgs += binding.count,
                vk::DescriptorType::UNIFORM_BUFFER => layout.num_ubo_bindings += binding.count,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => layout.num_dyn_ubos += binding.count,
                vk::DescriptorType::STORAGE_BUFFER => layout.num_ssbos += binding.count,
                vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => layout.num_dyn_ssbos += binding.count,
                other => return Err(Error::UnsupportedDescriptorType(other).into()),
            }
            // Slots that the type does not use point one past the end, so misuse reads as out of range.
            if binding.ty != vk::DescriptorType::UNIFORM_BUFFER {
                entry.ubo_idx = u32::MAX;
            }
            layout.bindings.push(entry);
        }

        layout.num_ubos = layout.num_ubo_bindings + layout.has_desc_ubo() as u32;
        Ok(Arc::new(layout))
    }

    /// Bindings in ascending binding order.
    pub fn bindings(&self) -> &[BindingLayout] {
        &self.bindings
    }

    /// Look up a binding by number.
    pub fn binding(&self, binding: u32) -> Option<&BindingLayout> {
        self.bindings
            .binary_search_by_key(&binding, |entry| entry.binding)
            .ok()
            .map(|index| &self.bindings[index])
    }

    /// Whether sets of this layout are push descriptor sets.
    pub fn is_push_descriptor(&self) -> bool {
        self.push_descriptor
    }

    /// Number of dynamic offsets a set of this layout consumes when bound.
    pub fn dynamic_offset_count(&self) -> u32 {
        self.num_dyn_ubos + self.num_dyn_ssbos
    }

    /// Whether the set carries a descriptor uniform buffer.
    pub fn has_desc_ubo(&self) -> bool {
        self.num_ssbos > 0
    }

    /// Slot of the descriptor uniform buffer in the set's uniform buffer array.
    pub fn desc_ubo_index(&self) -> u32 {
        self.num_ubo_bindings
    }

    /// Size of the descriptor uniform buffer contents.
    pub fn desc_ubo_size(&self) -> u64 {
        self.num_ssbos as u64 * std::mem::size_of::<SsboAddr>() as u64
    }
}
