//! Compute commands. Every dispatch gets a batch of its own, holding a single compute job.

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::batch::Batch;
use crate::command_buffer::job::Job;
use crate::command_buffer::packed::{ComputeJobPayload, DrawDesc, InvocationDesc};
use crate::command_buffer::traits::ComputeCmdBuffer;
use crate::command_buffer::CommandBuffer;
use crate::core::device::wls_instances;
use crate::pipeline::compute::ComputePipeline;
use crate::resource::buffer::Buffer;
use crate::Error;

/// `ceil(log2(value))`, zero for zero and one.
fn log2_ceil(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        32 - (value - 1).leading_zeros()
    }
}

impl<A: SlabAllocator> CommandBuffer<A> {
    fn dispatch_inner(&mut self, count: [u32; 3]) -> Result<()> {
        let pipeline = self
            .compute
            .pipeline
            .clone()
            .ok_or(Error::NoPipelineBound(vk::PipelineBindPoint::COMPUTE))?;
        if count.contains(&0) {
            return Ok(());
        }

        self.close_batch_inner()?;
        let in_render_pass = self.gfx.fb.in_render_pass;
        if in_render_pass {
            self.preload_fb_after_split();
        }
        self.open_batch_inner()?;

        self.with_batch(|cmd, batch| cmd.emit_dispatch(batch, &pipeline, count))?;
        self.close_batch_inner()?;

        // Draws recorded after the dispatch continue the render pass in a batch of their own.
        if in_render_pass {
            self.open_batch_inner()?;
        }
        Ok(())
    }

    fn emit_dispatch(&mut self, batch: &mut Batch, pipeline: &ComputePipeline, count: [u32; 3]) -> Result<()> {
        let local_size = pipeline.local_size;
        let wls = match pipeline.shader.wls_size {
            0 => None,
            wls_size => {
                let instances = wls_instances(count)?;
                Some((instances, self.device.total_wls_size(wls_size, instances)?))
            }
        };
        let sysvals = &mut self.compute.sysvals;
        sysvals.num_work_groups = count;
        sysvals.local_group_size = local_size;
        self.compute.desc_state.invalidate_push_uniforms();

        let tls = self.alloc_tls_desc(batch)?;
        let layout = pipeline.layout.clone();
        let state = &mut self.compute.desc_state;
        let pool = &mut self.desc_pool;

        let img = if pipeline.shader.has_img_access {
            state.prepare_img_attribs(pool, &layout)?
        } else {
            Default::default()
        };
        let ubos = state.prepare_ubos(pool, &layout)?;
        let push_uniforms = self.prepare_push_uniforms_inner(vk::PipelineBindPoint::COMPUTE)?;
        let textures = self.compute.desc_state.prepare_textures(&mut self.desc_pool, &layout)?;
        let samplers = self.compute.desc_state.prepare_samplers(&mut self.desc_pool, &layout)?;

        let job = Job::Compute(ComputeJobPayload {
            draw: DrawDesc {
                invocation: InvocationDesc::new(count, local_size),
                state: pipeline.shader.binary_address,
                attributes: img.attributes,
                attribute_buffers: img.buffers,
                thread_storage: tls,
                uniform_buffers: ubos,
                push_uniforms,
                textures,
                samplers,
                ..Default::default()
            },
            job_task_split: local_size.iter().map(|&size| log2_ceil(size + 1)).sum(),
            reserved: 0,
        })
        .allocate(&mut self.desc_pool)?;
        batch.jobs.add(&mut self.desc_pool, job, 0, false);

        batch.tls_size = pipeline.shader.tls_size;
        batch.wls_size = pipeline.shader.wls_size;
        if let Some((instances, total_size)) = wls {
            batch.wls_instances = instances;
            batch.wls_total_size = total_size;
        }

        #[cfg(feature = "log-objects")]
        trace!(
            "Recorded dispatch of {}x{}x{} workgroups with pipeline `{}`",
            count[0],
            count[1],
            count[2],
            pipeline.name
        );
        Ok(())
    }
}

impl<A: SlabAllocator> ComputeCmdBuffer for CommandBuffer<A> {
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<&mut Self> {
        self.record(|cmd| cmd.dispatch_inner([x, y, z]))
    }

    fn dispatch_base(&mut self, base: [u32; 3], count: [u32; 3]) -> Result<&mut Self> {
        if base != [0; 3] {
            return self.unsupported("dispatch_base");
        }
        self.record(|cmd| cmd.dispatch_inner(count))
    }

    fn dispatch_indirect(&mut self, _buffer: &Buffer, _offset: u64) -> Result<&mut Self> {
        self.unsupported("dispatch_indirect")
    }
}
