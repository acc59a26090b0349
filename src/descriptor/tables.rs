//! Lazy materialization of descriptor tables into command buffer memory.
//!
//! Every `prepare_*` function returns the memoized address when there is one, and otherwise builds the table
//! from the currently bound sets, uploads it, and memoizes the address. A failed upload memoizes nothing, so
//! calling again after the allocator recovers rebuilds the table from scratch.

use anyhow::Result;

use crate::allocator::arena::ArenaPool;
use crate::allocator::traits::SlabAllocator;
use crate::descriptor::packed::{AttributeBufferDesc, AttributeDesc, SamplerDesc, SsboAddr, TextureDesc, UniformBufferDesc};
use crate::descriptor::state::{DescriptorState, ImageAttributeTables};
use crate::pipeline::pipeline_layout::PipelineLayout;

/// Size of the push uniform blob.
pub const PUSH_UNIFORMS_SIZE: u64 = 512;
/// Offset of the system values inside the push uniform blob. Push constants fill everything before it.
pub const SYSVALS_OFFSET: u64 = 256;

const UBO_TABLE_ALIGN: u64 = 16;
const TEXTURE_TABLE_ALIGN: u64 = 32;
const SAMPLER_TABLE_ALIGN: u64 = 32;
const ATTRIB_TABLE_ALIGN: u64 = 32;

impl DescriptorState {
    /// Upload the dynamic storage buffer addresses. Returns zero if the layout has none.
    pub fn prepare_dyn_ssbos<A: SlabAllocator>(&mut self, pool: &mut ArenaPool<A>, layout: &PipelineLayout) -> Result<u64> {
        if layout.num_dyn_ssbos == 0 {
            return Ok(0);
        }
        let dyn_ssbos = self.dyn_ssbos;
        self.dyn_desc_ubo
            .get_or_try_insert_with(|| pool.upload(&dyn_ssbos, UBO_TABLE_ALIGN).map(|ptr| ptr.gpu))
    }

    /// Build the uniform buffer table. Returns zero if the layout has no uniform buffers.
    ///
    /// Layout: the static uniform buffers of every set at the set's offset (null for unbound sets, with each
    /// set's storage buffer addresses uploaded behind its descriptor uniform buffer slot), then the dynamic
    /// uniform buffers, then the slot pointing at the dynamic storage buffer addresses.
    pub fn prepare_ubos<A: SlabAllocator>(&mut self, pool: &mut ArenaPool<A>, layout: &PipelineLayout) -> Result<u64> {
        let count = layout.total_ubo_count() as usize;
        if count == 0 {
            return Ok(0);
        }
        if let Some(address) = self.ubos.get() {
            return Ok(address);
        }

        let dyn_desc_ubo = self.prepare_dyn_ssbos(pool, layout)?;

        let mut descs = vec![UniformBufferDesc::default(); count];
        for index in 0..layout.set_count() {
            let (Some(offsets), Some(set)) = (layout.set_offsets(index), self.set(index)) else {
                continue;
            };
            let start = offsets.ubo_offset as usize;
            let set_layout = set.layout();
            let static_count = set.ubos().len().min(count.saturating_sub(start));
            descs[start..start + static_count].copy_from_slice(&set.ubos()[..static_count]);

            if set_layout.has_desc_ubo() {
                let desc_ubo = pool.upload(set.ssbos(), UBO_TABLE_ALIGN)?;
                let slot = start + set_layout.desc_ubo_index() as usize;
                if let Some(desc) = descs.get_mut(slot) {
                    *desc = UniformBufferDesc::new(desc_ubo.gpu, set_layout.desc_ubo_size());
                }
            }
        }

        let dyn_start = layout.dyn_ubos_offset() as usize;
        let num_dyn_ubos = layout.num_dyn_ubos as usize;
        descs[dyn_start..dyn_start + num_dyn_ubos].copy_from_slice(&self.dyn_ubos[..num_dyn_ubos]);

        if layout.num_dyn_ssbos > 0 {
            let size = layout.num_dyn_ssbos as u64 * std::mem::size_of::<SsboAddr>() as u64;
            descs[layout.dyn_desc_ubo_index() as usize] = UniformBufferDesc::new(dyn_desc_ubo, size);
        }

        let table = pool.upload(&descs, UBO_TABLE_ALIGN)?;
        debug!("Built uniform buffer table with {} entries at {:#x}", count, table.gpu);
        Ok(self.ubos.insert(table.gpu))
    }

    /// Build the texture table: the textures of every bound set, densely packed in set order.
    /// Returns zero if the layout has no textures.
    pub fn prepare_textures<A: SlabAllocator>(&mut self, pool: &mut ArenaPool<A>, layout: &PipelineLayout) -> Result<u64> {
        let capacity = layout.num_textures as usize;
        if capacity == 0 {
            return Ok(0);
        }
        if let Some(address) = self.textures.get() {
            return Ok(address);
        }

        let mut descs: Vec<TextureDesc> = Vec::with_capacity(capacity);
        for index in 0..layout.set_count() {
            if let Some(set) = self.set(index) {
                let take = set.textures().len().min(capacity - descs.len());
                descs.extend_from_slice(&set.textures()[..take]);
            }
        }
        descs.resize(capacity, TextureDesc::default());

        let table = pool.upload(&descs, TEXTURE_TABLE_ALIGN)?;
        debug!("Built texture table with {} entries at {:#x}", capacity, table.gpu);
        Ok(self.textures.insert(table.gpu))
    }

    /// Build the sampler table: the dummy sampler, then the samplers of every bound set, densely packed in
    /// set order. Returns zero if the layout has no samplers.
    pub fn prepare_samplers<A: SlabAllocator>(&mut self, pool: &mut ArenaPool<A>, layout: &PipelineLayout) -> Result<u64> {
        let capacity = layout.num_samplers as usize + 1;
        if layout.num_samplers == 0 {
            return Ok(0);
        }
        if let Some(address) = self.samplers.get() {
            return Ok(address);
        }

        let mut descs = Vec::with_capacity(capacity);
        descs.push(SamplerDesc::dummy());
        for index in 0..layout.set_count() {
            if let Some(set) = self.set(index) {
                let take = set.samplers().len().min(capacity - descs.len());
                descs.extend_from_slice(&set.samplers()[..take]);
            }
        }
        descs.resize(capacity, SamplerDesc::default());

        let table = pool.upload(&descs, SAMPLER_TABLE_ALIGN)?;
        debug!("Built sampler table with {} entries at {:#x}", capacity, table.gpu);
        Ok(self.samplers.insert(table.gpu))
    }

    /// Fill image attribute buffers and attributes for every bound set. Buffer indices in the attributes start
    /// at `first_buf`, so the tables can be appended to vertex attribute tables.
    pub(crate) fn fill_img_attribs(
        &self,
        layout: &PipelineLayout,
        bufs: &mut [AttributeBufferDesc],
        attribs: &mut [AttributeDesc],
        first_buf: u32,
    ) {
        for index in 0..layout.set_count() {
            let (Some(offsets), Some(set)) = (layout.set_offsets(index), self.set(index)) else {
                continue;
            };
            let img_idx = offsets.img_offset as usize;
            for (i, format) in set.img_formats().iter().enumerate() {
                let image = img_idx + i;
                let (Some(buf_pair), Some(attrib)) = (bufs.get_mut(image * 2..image * 2 + 2), attribs.get_mut(image))
                else {
                    break;
                };
                buf_pair.copy_from_slice(&set.img_attrib_bufs()[i * 2..i * 2 + 2]);
                *attrib = AttributeDesc::new(first_buf + image as u32 * 2, *format, None);
            }
        }
    }

    /// Build the image attribute tables. Returns null addresses if the layout has no storage images.
    pub fn prepare_img_attribs<A: SlabAllocator>(
        &mut self,
        pool: &mut ArenaPool<A>,
        layout: &PipelineLayout,
    ) -> Result<ImageAttributeTables> {
        let num_imgs = layout.num_imgs as usize;
        if num_imgs == 0 {
            return Ok(ImageAttributeTables::default());
        }
        if let Some(tables) = self.img.get() {
            return Ok(tables);
        }

        // One extra null buffer stops the attribute unit from prefetching past the end.
        let mut bufs = vec![AttributeBufferDesc::default(); num_imgs * 2 + 1];
        let mut attribs = vec![AttributeDesc::default(); num_imgs];
        self.fill_img_attribs(layout, &mut bufs, &mut attribs, 0);

        let buffers = pool.upload(&bufs, ATTRIB_TABLE_ALIGN)?;
        let attributes = pool.upload(&attribs, ATTRIB_TABLE_ALIGN)?;
        debug!("Built image attribute tables for {} images", num_imgs);
        Ok(self.img.insert(ImageAttributeTables {
            buffers: buffers.gpu,
            attributes: attributes.gpu,
        }))
    }

    /// Build the push uniform blob: push constants in the first half, system values in the second half.
    pub fn prepare_push_uniforms<A: SlabAllocator>(
        &mut self,
        pool: &mut ArenaPool<A>,
        push_constants: &[u8],
        sysvals: &[u8],
    ) -> Result<u64> {
        self.push_uniforms.get_or_try_insert_with(|| {
            let blob = pool.allocate(PUSH_UNIFORMS_SIZE, 16)?;
            let push_len = push_constants.len().min(SYSVALS_OFFSET as usize);
            pool.write(&blob, 0, &push_constants[..push_len]);
            let sysvals_len = sysvals.len().min((PUSH_UNIFORMS_SIZE - SYSVALS_OFFSET) as usize);
            pool.write(&blob, SYSVALS_OFFSET, &sysvals[..sysvals_len]);
            Ok(blob.gpu)
        })
    }
}
