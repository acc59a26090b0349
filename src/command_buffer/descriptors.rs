//! Binding commands: pipelines, descriptor sets, push descriptors and push constants.
//!
//! None of these emit anything. They update the bind point state and drop the memoized tables that depend on
//! it, so the next draw or dispatch rebuilds them.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::allocator::arena::ArenaPool;
use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::state::DirtyFlags;
use crate::command_buffer::{CommandBuffer, CommandBufferStatus};
use crate::descriptor::descriptor_set::{Descriptor, DescriptorSet, DescriptorWrite};
use crate::descriptor::state::{DescriptorState, TableKind};
use crate::descriptor::template::DescriptorUpdateTemplate;
use crate::pipeline::builder::GraphicsPipeline;
use crate::pipeline::pipeline_layout::{PipelineLayout, MAX_PUSH_CONSTANTS_SIZE};
use crate::pipeline::Pipeline;
use crate::Error;

impl<A: SlabAllocator> CommandBuffer<A> {
    /// Bind a pipeline to its bind point. Every table and the push uniforms of that bind point are rebuilt on
    /// the next draw or dispatch, since the new layout may place things differently. Graphics state that the
    /// pipeline does not declare dynamic is taken from the pipeline.
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> Result<&mut Self> {
        self.record(|cmd| {
            match pipeline {
                Pipeline::Graphics(pipeline) => cmd.bind_graphics_pipeline(pipeline.clone()),
                Pipeline::Compute(pipeline) => {
                    cmd.compute.desc_state.invalidate_tables();
                    cmd.compute.desc_state.invalidate_push_uniforms();
                    cmd.compute.pipeline = Some(pipeline.clone());
                }
            }
            Ok(())
        })
    }

    fn bind_graphics_pipeline(&mut self, pipeline: Arc<GraphicsPipeline>) {
        let gfx = &mut self.gfx;
        gfx.desc_state.invalidate_tables();
        gfx.desc_state.invalidate_push_uniforms();
        gfx.fs_rsd.invalidate();
        gfx.invalidate_vs_attribs();

        let dynamic = &mut gfx.dynamic;
        let mut dirty = DirtyFlags::default();
        if !pipeline.is_dynamic(vk::DynamicState::VIEWPORT) {
            dynamic.viewport = pipeline.viewport;
            dirty.viewport = true;
        }
        if !pipeline.is_dynamic(vk::DynamicState::SCISSOR) {
            dynamic.scissor = pipeline.scissor;
            dirty.scissor = true;
        }
        if !pipeline.is_dynamic(vk::DynamicState::BLEND_CONSTANTS) {
            dynamic.blend_constants = pipeline.blend_constants;
            dirty.blend_constants = true;
        }
        if !pipeline.is_dynamic(vk::DynamicState::PRIMITIVE_TOPOLOGY) {
            dynamic.topology = pipeline.topology;
        }
        if !pipeline.is_dynamic(vk::DynamicState::PRIMITIVE_RESTART_ENABLE) {
            dynamic.primitive_restart = pipeline.primitive_restart;
        }
        if !pipeline.is_dynamic(vk::DynamicState::RASTERIZER_DISCARD_ENABLE) {
            dynamic.rasterizer_discard = pipeline.rasterizer_discard;
        }
        if !pipeline.is_dynamic(vk::DynamicState::LINE_WIDTH) {
            dynamic.line_width = pipeline.line_width;
        }
        if !pipeline.is_dynamic(vk::DynamicState::CULL_MODE) {
            dynamic.cull_mode = pipeline.cull_mode;
        }
        if !pipeline.is_dynamic(vk::DynamicState::FRONT_FACE) {
            dynamic.front_face = pipeline.front_face;
        }

        gfx.dirty.viewport |= dirty.viewport;
        gfx.dirty.scissor |= dirty.scissor;
        gfx.dirty.blend_constants |= dirty.blend_constants;

        #[cfg(feature = "log-objects")]
        trace!("Bound graphics pipeline `{}`", pipeline.name);

        gfx.pipeline = Some(pipeline);
    }

    /// Bind descriptor sets to consecutive slots starting at `first_set`. `dynamic_offsets` holds one offset per
    /// dynamic buffer element of the bound sets, in set, binding and array element order.
    /// # Errors
    /// * Fails with [`Error::UnsupportedBindPoint`] for bind points other than graphics and compute.
    /// * Fails with [`Error::InvalidSetIndex`] if the sets do not fit in `layout`.
    /// * Fails with [`Error::DynamicOffsetCountMismatch`] if the number of offsets is wrong.
    pub fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: &PipelineLayout,
        first_set: u32,
        sets: &[Arc<DescriptorSet>],
        dynamic_offsets: &[u32],
    ) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.descriptor_state_mut(bind_point)?
                .bind_sets(layout, first_set, sets, dynamic_offsets)?;
            if bind_point == vk::PipelineBindPoint::GRAPHICS {
                // Storage images are read through the vertex attribute tables.
                cmd.gfx.invalidate_vs_attribs();
            }
            Ok(())
        })
    }

    /// Write descriptors into the push descriptor set of slot `set`.
    /// # Errors
    /// * Fails with [`Error::NotPushDescriptorLayout`] if the set layout of that slot is not a push descriptor
    ///   layout.
    /// * Fails if a write does not match its binding.
    pub fn push_descriptor_set(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: &PipelineLayout,
        set: u32,
        writes: &[DescriptorWrite],
    ) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.descriptor_state_mut(bind_point)?.push_set(layout, set, |dst| {
                writes
                    .iter()
                    .try_for_each(|write| dst.write(write.binding, write.array_element, &write.descriptors))
            })?;
            if bind_point == vk::PipelineBindPoint::GRAPHICS {
                cmd.gfx.invalidate_vs_attribs();
            }
            Ok(())
        })
    }

    /// Write descriptors into the push descriptor set of slot `set` through an update template.
    pub fn push_descriptor_set_with_template(
        &mut self,
        template: &DescriptorUpdateTemplate,
        bind_point: vk::PipelineBindPoint,
        layout: &PipelineLayout,
        set: u32,
        data: &[Descriptor],
    ) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.descriptor_state_mut(bind_point)?
                .push_set(layout, set, |dst| template.apply(dst, data))?;
            if bind_point == vk::PipelineBindPoint::GRAPHICS {
                cmd.gfx.invalidate_vs_attribs();
            }
            Ok(())
        })
    }

    /// Update push constant bytes. The push uniforms of the bind points `stages` belongs to are rebuilt on the
    /// next draw or dispatch.
    /// # Errors
    /// * Fails with [`Error::PushConstantRange`] if the range exceeds the push constant block.
    pub fn push_constants(&mut self, stages: vk::ShaderStageFlags, offset: u32, values: &[u8]) -> Result<&mut Self> {
        self.record(|cmd| {
            let end = offset as u64 + values.len() as u64;
            if end > MAX_PUSH_CONSTANTS_SIZE as u64 {
                return Err(Error::PushConstantRange {
                    offset,
                    end: end.min(u32::MAX as u64) as u32,
                    max: MAX_PUSH_CONSTANTS_SIZE,
                }
                .into());
            }
            cmd.push_constants[offset as usize..end as usize].copy_from_slice(values);

            if stages.intersects(vk::ShaderStageFlags::ALL_GRAPHICS) {
                cmd.gfx.desc_state.invalidate_push_uniforms();
            }
            if stages.contains(vk::ShaderStageFlags::COMPUTE) {
                cmd.compute.desc_state.invalidate_push_uniforms();
            }
            Ok(())
        })
    }

    /// Build one descriptor table for the pipeline bound to `bind_point`, or return the memoized one. For image
    /// attributes, the address of the attribute table is returned.
    ///
    /// Failures do not put the command buffer in the failed state and leave nothing memoized, so the call can
    /// be retried.
    /// # Errors
    /// * Fails with [`Error::NoPipelineBound`] if no pipeline is bound to `bind_point`.
    /// * Fails with [`Error::OutOfMemory`] if the table cannot be allocated.
    pub fn prepare_table(&mut self, bind_point: vk::PipelineBindPoint, kind: TableKind) -> Result<u64> {
        self.ensure_recording()?;
        let layout = self.bound_layout(bind_point)?;
        let (state, pool) = self.desc_state_and_pool(bind_point)?;
        match kind {
            TableKind::UniformBuffers => state.prepare_ubos(pool, &layout),
            TableKind::Textures => state.prepare_textures(pool, &layout),
            TableKind::Samplers => state.prepare_samplers(pool, &layout),
            TableKind::ImageAttributes => state.prepare_img_attribs(pool, &layout).map(|tables| tables.attributes),
            TableKind::DynamicStorageBuffers => state.prepare_dyn_ssbos(pool, &layout),
        }
    }

    /// Build the push uniform blob of `bind_point` from the current push constants and system values, or return
    /// the memoized one. Failures can be retried like [`CommandBuffer::prepare_table`].
    pub fn prepare_push_uniforms(&mut self, bind_point: vk::PipelineBindPoint) -> Result<u64> {
        self.ensure_recording()?;
        self.prepare_push_uniforms_inner(bind_point)
    }

    pub(crate) fn prepare_push_uniforms_inner(&mut self, bind_point: vk::PipelineBindPoint) -> Result<u64> {
        let push_constants = self.push_constants;
        match bind_point {
            vk::PipelineBindPoint::GRAPHICS => {
                let sysvals = self.gfx.sysvals;
                self.gfx.desc_state.prepare_push_uniforms(
                    &mut self.desc_pool,
                    &push_constants,
                    bytemuck::bytes_of(&sysvals),
                )
            }
            vk::PipelineBindPoint::COMPUTE => {
                let sysvals = self.compute.sysvals;
                self.compute.desc_state.prepare_push_uniforms(
                    &mut self.desc_pool,
                    &push_constants,
                    bytemuck::bytes_of(&sysvals),
                )
            }
            other => Err(Error::UnsupportedBindPoint(other).into()),
        }
    }

    fn ensure_recording(&self) -> Result<()> {
        match self.status {
            CommandBufferStatus::Recording => Ok(()),
            CommandBufferStatus::Invalid => Err(Error::Failed(self.failure.clone().unwrap_or_default()).into()),
            _ => Err(Error::NotRecording.into()),
        }
    }

    /// Layout of the pipeline bound to `bind_point`.
    pub(crate) fn bound_layout(&self, bind_point: vk::PipelineBindPoint) -> Result<Arc<PipelineLayout>> {
        let layout = match bind_point {
            vk::PipelineBindPoint::GRAPHICS => self.gfx.pipeline.as_ref().map(|pipeline| pipeline.layout.clone()),
            vk::PipelineBindPoint::COMPUTE => self.compute.pipeline.as_ref().map(|pipeline| pipeline.layout.clone()),
            other => return Err(Error::UnsupportedBindPoint(other).into()),
        };
        layout.ok_or_else(|| Error::NoPipelineBound(bind_point).into())
    }

    pub(crate) fn desc_state_and_pool(
        &mut self,
        bind_point: vk::PipelineBindPoint,
    ) -> Result<(&mut DescriptorState, &mut ArenaPool<A>)> {
        match bind_point {
            vk::PipelineBindPoint::GRAPHICS => Ok((&mut self.gfx.desc_state, &mut self.desc_pool)),
            vk::PipelineBindPoint::COMPUTE => Ok((&mut self.compute.desc_state, &mut self.desc_pool)),
            other => Err(Error::UnsupportedBindPoint(other).into()),
        }
    }
}
