//! Descriptor sets, holding pre-packed hardware descriptors for every binding of their layout.
//!
//! Writing a descriptor packs it immediately, so building descriptor tables at draw time is a matter of copying
//! slices of these arrays into command buffer memory.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::descriptor::packed::{AttributeBufferDesc, SamplerDesc, SsboAddr, TextureDesc, UniformBufferDesc};
use crate::pipeline::set_layout::{BindingLayout, DescriptorSetLayout};
use crate::resource::buffer::BufferRange;
use crate::resource::image::ImageView;
use crate::resource::sampler::Sampler;
use crate::Error;

/// A single descriptor to write into a set.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// A standalone sampler.
    Sampler(Sampler),
    /// An image with its sampler.
    CombinedImageSampler(ImageView, Sampler),
    /// A sampled image, also used for input attachments.
    SampledImage(ImageView),
    /// A storage image.
    StorageImage(ImageView),
    /// A uniform buffer range.
    UniformBuffer(BufferRange),
    /// A uniform buffer range whose offset is shifted at bind time.
    UniformBufferDynamic(BufferRange),
    /// A storage buffer range.
    StorageBuffer(BufferRange),
    /// A storage buffer range whose offset is shifted at bind time.
    StorageBufferDynamic(BufferRange),
}

impl Descriptor {
    fn matches(&self, ty: vk::DescriptorType) -> bool {
        match self {
            Descriptor::Sampler(_) => ty == vk::DescriptorType::SAMPLER,
            Descriptor::CombinedImageSampler(..) => ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Descriptor::SampledImage(_) => {
                ty == vk::DescriptorType::SAMPLED_IMAGE || ty == vk::DescriptorType::INPUT_ATTACHMENT
            }
            Descriptor::StorageImage(_) => ty == vk::DescriptorType::STORAGE_IMAGE,
            Descriptor::UniformBuffer(_) => ty == vk::DescriptorType::UNIFORM_BUFFER,
            Descriptor::UniformBufferDynamic(_) => ty == vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            Descriptor::StorageBuffer(_) => ty == vk::DescriptorType::STORAGE_BUFFER,
            Descriptor::StorageBufferDynamic(_) => ty == vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        }
    }
}

/// Consecutive descriptors written into one binding, as used by
/// [`CommandBuffer::push_descriptor_set`](crate::CommandBuffer::push_descriptor_set).
#[derive(Debug, Clone)]
pub struct DescriptorWrite {
    /// Destination binding.
    pub binding: u32,
    /// First destination array element.
    pub array_element: u32,
    /// Descriptors to write.
    pub descriptors: Vec<Descriptor>,
}

impl DescriptorWrite {
    /// Write one descriptor into the first element of a binding.
    pub fn new(binding: u32, descriptor: Descriptor) -> Self {
        Self {
            binding,
            array_element: 0,
            descriptors: vec![descriptor],
        }
    }
}

/// A descriptor set. Once bound to a command buffer through an `Arc`, it is read-only.
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    layout: Arc<DescriptorSetLayout>,
    pub(crate) ubos: Vec<UniformBufferDesc>,
    pub(crate) dyn_ubos: Vec<Option<BufferRange>>,
    pub(crate) dyn_ssbos: Vec<Option<BufferRange>>,
    pub(crate) ssbos: Vec<SsboAddr>,
    pub(crate) textures: Vec<TextureDesc>,
    pub(crate) samplers: Vec<SamplerDesc>,
    pub(crate) img_attrib_bufs: Vec<AttributeBufferDesc>,
    pub(crate) img_formats: Vec<u32>,
}

impl DescriptorSet {
    /// Create a descriptor set with every descriptor null.
    pub fn new(layout: Arc<DescriptorSetLayout>) -> Self {
        Self {
            ubos: vec![UniformBufferDesc::default(); layout.num_ubo_bindings as usize],
            dyn_ubos: vec![None; layout.num_dyn_ubos as usize],
            dyn_ssbos: vec![None; layout.num_dyn_ssbos as usize],
            ssbos: vec![SsboAddr::default(); layout.num_ssbos as usize],
            textures: vec![TextureDesc::default(); layout.num_textures as usize],
            samplers: vec![SamplerDesc::default(); layout.num_samplers as usize],
            img_attrib_bufs: vec![AttributeBufferDesc::default(); layout.num_imgs as usize * 2],
            img_formats: vec![0; layout.num_imgs as usize],
            layout,
        }
    }

    /// Layout of this set.
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Packed uniform buffer descriptors, without the descriptor uniform buffer slot.
    pub fn ubos(&self) -> &[UniformBufferDesc] {
        &self.ubos
    }

    /// Storage buffer addresses, as read through the descriptor uniform buffer.
    pub fn ssbos(&self) -> &[SsboAddr] {
        &self.ssbos
    }

    /// Packed texture descriptors.
    pub fn textures(&self) -> &[TextureDesc] {
        &self.textures
    }

    /// Packed sampler descriptors.
    pub fn samplers(&self) -> &[SamplerDesc] {
        &self.samplers
    }

    /// Attribute buffer pairs of the storage images.
    pub fn img_attrib_bufs(&self) -> &[AttributeBufferDesc] {
        &self.img_attrib_bufs
    }

    /// Hardware formats of the storage images.
    pub fn img_formats(&self) -> &[u32] {
        &self.img_formats
    }

    /// Dynamic uniform buffer ranges, before dynamic offsets are applied.
    pub fn dyn_ubos(&self) -> &[Option<BufferRange>] {
        &self.dyn_ubos
    }

    /// Dynamic storage buffer ranges, before dynamic offsets are applied.
    pub fn dyn_ssbos(&self) -> &[Option<BufferRange>] {
        &self.dyn_ssbos
    }

    /// Write consecutive array elements of one binding, starting at `array_element`.
    /// # Errors
    /// * Fails with [`Error::NoBinding`] if the layout has no such binding.
    /// * Fails with [`Error::DescriptorOutOfRange`] if the write goes past the end of the binding.
    /// * Fails with [`Error::DescriptorTypeMismatch`] if a descriptor does not match the binding type.
    ///   Elements before the mismatching one are written.
    pub fn write(&mut self, binding: u32, array_element: u32, descriptors: &[Descriptor]) -> Result<()> {
        let layout = *self.layout.binding(binding).ok_or(Error::NoBinding(binding))?;
        if array_element as usize + descriptors.len() > layout.count as usize {
            return Err(Error::DescriptorOutOfRange(binding).into());
        }
        for (i, descriptor) in descriptors.iter().enumerate() {
            self.write_one(&layout, array_element + i as u32, descriptor)?;
        }
        Ok(())
    }

    pub(crate) fn write_one(&mut self, layout: &BindingLayout, element: u32, descriptor: &Descriptor) -> Result<()> {
        if !descriptor.matches(layout.ty) {
            return Err(Error::DescriptorTypeMismatch {
                binding: layout.binding,
                expected: layout.ty,
            }
            .into());
        }
        if element >= layout.count {
            return Err(Error::DescriptorOutOfRange(layout.binding).into());
        }

        match descriptor {
            Descriptor::Sampler(sampler) => {
                self.samplers[(layout.sampler_idx + element) as usize] = sampler.desc();
            }
            Descriptor::CombinedImageSampler(view, sampler) => {
                self.textures[(layout.tex_idx + element) as usize] = view.texture_desc();
                self.samplers[(layout.sampler_idx + element) as usize] = sampler.desc();
            }
            Descriptor::SampledImage(view) => {
                self.textures[(layout.tex_idx + element) as usize] = view.texture_desc();
            }
            Descriptor::StorageImage(view) => {
                let index = (layout.img_idx + element) as usize;
                let [buffer, extent] = view.attribute_buffers();
                self.img_attrib_bufs[index * 2] = buffer;
                self.img_attrib_bufs[index * 2 + 1] = extent;
                self.img_formats[index] = view.hw_format();
            }
            Descriptor::UniformBuffer(range) => {
                let (address, size) = range.resolve(0);
                self.ubos[(layout.ubo_idx + element) as usize] = UniformBufferDesc::new(address, size);
            }
            Descriptor::UniformBufferDynamic(range) => {
                self.dyn_ubos[(layout.dyn_ubo_idx + element) as usize] = Some(range.clone());
            }
            Descriptor::StorageBuffer(range) => {
                let (address, size) = range.resolve(0);
                self.ssbos[(layout.ssbo_idx + element) as usize] = SsboAddr::new(address, size);
            }
            Descriptor::StorageBufferDynamic(range) => {
                self.dyn_ssbos[(layout.dyn_ssbo_idx + element) as usize] = Some(range.clone());
            }
        }
        Ok(())
    }
}

/// Convenience builder to create and fill a descriptor set in one expression.
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// # use anyhow::Result;
/// fn make_set(layout: Arc<DescriptorSetLayout>, ubo: &Buffer) -> Result<Arc<DescriptorSet>> {
///     DescriptorSetBuilder::new(layout)
///         // In GLSL: layout(set = X, binding = 0) uniform Camera { ... };
///         .bind_uniform_buffer(0, BufferRange::whole(ubo))
///         .build()
/// }
/// ```
#[derive(Debug)]
pub struct DescriptorSetBuilder {
    layout: Arc<DescriptorSetLayout>,
    writes: Vec<(u32, Descriptor)>,
}

impl DescriptorSetBuilder {
    /// Start building a set with the given layout.
    pub fn new(layout: Arc<DescriptorSetLayout>) -> Self {
        Self {
            layout,
            writes: vec![],
        }
    }

    /// Bind any descriptor to the first element of a binding.
    pub fn bind(mut self, binding: u32, descriptor: Descriptor) -> Self {
        self.writes.push((binding, descriptor));
        self
    }

    /// Bind a uniform buffer.
    pub fn bind_uniform_buffer(self, binding: u32, range: BufferRange) -> Self {
        self.bind(binding, Descriptor::UniformBuffer(range))
    }

    /// Bind a dynamic uniform buffer.
    pub fn bind_dynamic_uniform_buffer(self, binding: u32, range: BufferRange) -> Self {
        self.bind(binding, Descriptor::UniformBufferDynamic(range))
    }

    /// Bind a storage buffer.
    pub fn bind_storage_buffer(self, binding: u32, range: BufferRange) -> Self {
        self.bind(binding, Descriptor::StorageBuffer(range))
    }

    /// Bind a dynamic storage buffer.
    pub fn bind_dynamic_storage_buffer(self, binding: u32, range: BufferRange) -> Self {
        self.bind(binding, Descriptor::StorageBufferDynamic(range))
    }

    /// Bind a sampled image.
    pub fn bind_sampled_image(self, binding: u32, view: &ImageView) -> Self {
        self.bind(binding, Descriptor::SampledImage(view.clone()))
    }

    /// Bind an image with its sampler.
    pub fn bind_combined_image_sampler(self, binding: u32, view: &ImageView, sampler: &Sampler) -> Self {
        self.bind(binding, Descriptor::CombinedImageSampler(view.clone(), *sampler))
    }

    /// Bind a sampler.
    pub fn bind_sampler(self, binding: u32, sampler: &Sampler) -> Self {
        self.bind(binding, Descriptor::Sampler(*sampler))
    }

    /// Bind a storage image.
    pub fn bind_storage_image(self, binding: u32, view: &ImageView) -> Self {
        self.bind(binding, Descriptor::StorageImage(view.clone()))
    }

    /// Create the set and apply every write.
    pub fn build(self) -> Result<Arc<DescriptorSet>> {
        let mut set = DescriptorSet::new(self.layout);
        for (binding, descriptor) in self.writes {
            set.write(binding, 0, std::slice::from_ref(&descriptor))?;
        }
        Ok(Arc::new(set))
    }
}
