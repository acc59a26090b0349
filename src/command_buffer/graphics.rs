//! Graphics commands. A draw becomes a vertex job, which runs the vertex shader once per vertex and instance,
//! and a tiler job, which bins the resulting primitives into the tiles of the framebuffer. The fragment jobs
//! shading those tiles are only added when the batch is closed.

use std::sync::Once;

use anyhow::Result;
use ash::vk;

use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::batch::Batch;
use crate::command_buffer::job::Job;
use crate::command_buffer::packed::{
    draw_mode, index_type, ComputeJobPayload, DrawDesc, InvocationDesc, PrimitiveDesc, RendererStateDesc,
    TilerJobPayload, ViewportDesc, DESC_ALIGN, DRAW_CULL_BACK, DRAW_CULL_FRONT, DRAW_FRONT_FACE_CCW,
    PRIMITIVE_FIRST_PROVOKING_VERTEX, PRIMITIVE_POINT_SIZE_ARRAY, PRIMITIVE_RESTART, RSD_DEPTH_TEST,
    RSD_DEPTH_WRITE, RSD_RASTERIZER_DISCARD, RSD_SHADER_ENABLED,
};
use crate::command_buffer::state::{
    ClearValue, DirtyFlags, FramebufferInfo, IndexBufferBinding, RenderingInfo, VertexAttributeKey,
    VertexAttributeTables, VertexBufferBinding, MAX_RTS, MAX_VBS, MAX_VS_ATTRIBS,
};
use crate::command_buffer::traits::GraphicsCmdBuffer;
use crate::command_buffer::CommandBuffer;
use crate::descriptor::packed::{AttributeBufferDesc, AttributeDesc};
use crate::descriptor::state::ImageAttributeTables;
use crate::pipeline::builder::GraphicsPipeline;
use crate::pipeline::shader::{VARYING_BUF_COUNT, VARYING_BUF_POSITION, VARYING_BUF_PSIZ};
use crate::resource::buffer::Buffer;
use crate::util::align::align_up;
use crate::Error;

const VERTEX_JOB_TASK_SPLIT: u32 = 5;
const TILER_JOB_TASK_SPLIT: u32 = 6;
const VARYING_ALIGN: u64 = 64;
const ATTRIB_BUF_ALIGN: u64 = 64;
/// Attribute buffers must start on a 64 byte boundary, the rest goes into the attribute offset.
const ATTRIB_BUF_ADDR_MASK: u64 = 63;
/// Render areas are rounded up to whole 32x32 blocks so tile buffer preloads cover every touched tile.
const RENDER_AREA_ALIGN: u64 = 32;

static INDEX_CRAWL_WARNING: Once = Once::new();

/// Parameters of one draw, shared by indexed and non-indexed draws.
#[derive(Debug, Default, Copy, Clone)]
struct DrawInfo {
    /// Index size in bits, zero for non-indexed draws.
    index_size: u32,
    index_count: u32,
    vertex_offset: i32,
    first_instance: u32,
    instance_count: u32,
    /// Number of vertices the vertex shader runs for.
    vertex_range: u32,
    vertex_count: u32,
    padded_vertex_count: u32,
    /// First vertex the vertex shader runs for.
    offset_start: u32,
    /// GPU address of the first index.
    indices: u64,
}

#[derive(Debug, Default, Copy, Clone)]
struct VaryingTables {
    buffers: u64,
    attributes: u64,
    position: u64,
    psiz: u64,
}

/// Number of vertices the vertex shader actually runs for when instancing. The hardware only supports
/// instance strides of the form `2^n * (1, 3, 5, 7 or 9)`, so the vertex count is padded up to the next
/// one of those.
pub fn padded_vertex_count(vertex_count: u32) -> u32 {
    if vertex_count < 10 {
        return vertex_count;
    }
    if vertex_count < 20 {
        return (vertex_count + 1) & !1;
    }

    let highest = 32 - vertex_count.leading_zeros();
    let n = highest - 4;
    let nibble = (vertex_count >> n) & 0xf;
    let padded: u64 = match (nibble >> 1) & 0x3 {
        0 if nibble & 1 == 0 => (1u64 << n) * 9,
        0 => (1u64 << (n + 1)) * 5,
        1 => (1u64 << (n + 2)) * 3,
        2 => (1u64 << (n + 1)) * 7,
        _ => 1u64 << (n + 4),
    };
    padded.min(u32::MAX as u64) as u32
}

/// Smallest and largest index read by an indexed draw, skipping restart indices. `None` if every index is a
/// restart index.
fn index_bounds(ib: &IndexBufferBinding, first_index: u32, index_count: u32, restart: bool) -> Result<Option<(u32, u32)>> {
    let data = ib.buffer.mapped_slice()?;
    let size = (ib.index_size / 8) as usize;
    let start = ib.offset as usize + first_index as usize * size;
    let end = start + index_count as usize * size;
    let bytes = data.get(start..end).ok_or_else(|| {
        anyhow::anyhow!(
            "Indices {}..{} exceed the {} byte index buffer",
            first_index,
            first_index as u64 + index_count as u64,
            data.len()
        )
    })?;

    let restart_index = match size {
        1 => u8::MAX as u32,
        2 => u16::MAX as u32,
        _ => u32::MAX,
    };

    let mut bounds: Option<(u32, u32)> = None;
    for chunk in bytes.chunks_exact(size) {
        let index = match *chunk {
            [a] => a as u32,
            [a, b] => u16::from_le_bytes([a, b]) as u32,
            [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
            _ => continue,
        };
        if restart && index == restart_index {
            continue;
        }
        bounds = Some(match bounds {
            Some((min, max)) => (min.min(index), max.max(index)),
            None => (index, index),
        });
    }
    Ok(bounds)
}

/// Scissor box of the intersection of a viewport and a scissor rectangle.
fn viewport_desc(viewport: &vk::Viewport, scissor: &vk::Rect2D) -> ViewportDesc {
    let mut min_x = viewport.x as i64;
    let mut max_x = (viewport.x + viewport.width) as i64;
    // Negative viewport heights flip the y axis.
    let y0 = viewport.y as i64;
    let y1 = (viewport.y + viewport.height) as i64;
    let mut min_y = y0.min(y1);
    let mut max_y = y0.max(y1);

    min_x = min_x.max(scissor.offset.x as i64);
    min_y = min_y.max(scissor.offset.y as i64);
    max_x = max_x.min(scissor.offset.x as i64 + scissor.extent.width as i64);
    max_y = max_y.min(scissor.offset.y as i64 + scissor.extent.height as i64);

    // Bounds are inclusive. An empty box keeps max == min.
    if max_x > min_x {
        max_x -= 1;
    }
    if max_y > min_y {
        max_y -= 1;
    }

    let clamp = |value: i64| value.clamp(0, u16::MAX as i64) as u16;
    ViewportDesc {
        scissor_min_x: clamp(min_x),
        scissor_min_y: clamp(min_y),
        scissor_max_x: clamp(max_x),
        scissor_max_y: clamp(max_y),
        min_depth: viewport.min_depth.min(viewport.max_depth),
        max_depth: viewport.min_depth.max(viewport.max_depth),
    }
}

impl<A: SlabAllocator> CommandBuffer<A> {
    fn draw_inner(&mut self, draw: DrawInfo) -> Result<()> {
        let pipeline = self
            .gfx
            .pipeline
            .clone()
            .ok_or(Error::NoPipelineBound(vk::PipelineBindPoint::GRAPHICS))?;
        if !self.gfx.fb.in_render_pass {
            return Err(Error::NoRenderpass.into());
        }

        // A draw adds up to two jobs, and job indices are 16 bits.
        let limit = self.settings.job_index_limit;
        match self.cur_batch.as_ref().map(|batch| batch.jobs.job_index() >= limit) {
            Some(true) => self.split_batch()?,
            Some(false) => {}
            None => self.open_batch_inner()?,
        }

        self.with_batch(|cmd, batch| cmd.emit_draw(batch, &pipeline, &draw))
    }

    /// Emit the jobs of a draw. Every descriptor is allocated before the first job is added, so a failed draw
    /// leaves the job chain untouched.
    fn emit_draw(&mut self, batch: &mut Batch, pipeline: &GraphicsPipeline, draw: &DrawInfo) -> Result<()> {
        let topology = self.gfx.dynamic.topology;
        let mode = draw_mode(topology).ok_or(Error::UnsupportedTopology(topology))?;
        let discard = self.gfx.dynamic.rasterizer_discard;
        let layout = pipeline.layout.clone();

        if !discard {
            self.alloc_fb_desc(batch)?;
        }
        let tls = self.alloc_tls_desc(batch)?;

        self.prepare_draw_sysvals(draw);
        let push_uniforms = self.prepare_push_uniforms_inner(vk::PipelineBindPoint::GRAPHICS)?;
        let ubos = self.gfx.desc_state.prepare_ubos(&mut self.desc_pool, &layout)?;
        let textures = self.gfx.desc_state.prepare_textures(&mut self.desc_pool, &layout)?;
        let samplers = self.gfx.desc_state.prepare_samplers(&mut self.desc_pool, &layout)?;

        let fs_rsd = self.prepare_fs_rsd(pipeline)?;
        let varyings = self.prepare_varyings(pipeline, draw)?;
        let attribs = self.prepare_vs_attribs(pipeline, draw)?;
        let fs_img = match &pipeline.fs {
            Some(fs) if fs.has_img_access => self.gfx.desc_state.prepare_img_attribs(&mut self.desc_pool, &layout)?,
            _ => ImageAttributeTables::default(),
        };
        let viewport = self.prepare_viewport()?;

        let has_tiler = !discard && varyings.position != 0;
        let tiler_context = if has_tiler {
            self.prepare_tiler_context(batch, 0)?
        } else {
            0
        };

        let dcd = DrawDesc {
            invocation: InvocationDesc::new([1, draw.vertex_range, draw.instance_count], [1, 1, 1]),
            offset_start: draw.offset_start,
            instance_size: if draw.instance_count > 1 {
                draw.padded_vertex_count
            } else {
                1
            },
            thread_storage: tls,
            uniform_buffers: ubos,
            push_uniforms,
            textures,
            samplers,
            varying_buffers: varyings.buffers,
            ..Default::default()
        };

        let vertex_job = Job::Vertex(ComputeJobPayload {
            draw: DrawDesc {
                state: pipeline.vs.binary_address,
                attributes: attribs.attributes,
                attribute_buffers: attribs.buffers,
                varyings: varyings.attributes,
                ..dcd
            },
            job_task_split: VERTEX_JOB_TASK_SPLIT,
            reserved: 0,
        })
        .allocate(&mut self.desc_pool)?;

        let tiler_job = if has_tiler {
            let dynamic = &self.gfx.dynamic;
            let mut flags = 0;
            if dynamic.front_face == vk::FrontFace::COUNTER_CLOCKWISE {
                flags |= DRAW_FRONT_FACE_CCW;
            }
            if dynamic.cull_mode.contains(vk::CullModeFlags::FRONT) {
                flags |= DRAW_CULL_FRONT;
            }
            if dynamic.cull_mode.contains(vk::CullModeFlags::BACK) {
                flags |= DRAW_CULL_BACK;
            }

            let mut primitive_flags = PRIMITIVE_FIRST_PROVOKING_VERTEX;
            if dynamic.primitive_restart {
                primitive_flags |= PRIMITIVE_RESTART;
            }
            if varyings.psiz != 0 {
                primitive_flags |= PRIMITIVE_POINT_SIZE_ARRAY;
            }

            let indexed = draw.index_size != 0;
            let primitive = PrimitiveDesc {
                draw_mode: mode,
                index_type: index_type(draw.index_size),
                indices: if indexed { draw.indices } else { 0 },
                index_count: if indexed { draw.index_count } else { draw.vertex_count },
                base_vertex_offset: if indexed {
                    draw.vertex_offset.wrapping_sub(draw.offset_start as i32)
                } else {
                    0
                },
                flags: primitive_flags,
                job_task_split: TILER_JOB_TASK_SPLIT,
                constant_size: if varyings.psiz != 0 { 0.0 } else { dynamic.line_width },
                reserved: 0,
                size_array: varyings.psiz,
            };

            let payload = TilerJobPayload {
                draw: DrawDesc {
                    flags,
                    state: fs_rsd,
                    attributes: fs_img.attributes,
                    attribute_buffers: fs_img.buffers,
                    varyings: varyings.attributes,
                    position: varyings.position,
                    viewport,
                    ..dcd
                },
                primitive,
                tiler_context,
            };
            Some(Job::Tiler(payload).allocate(&mut self.desc_pool)?)
        } else {
            None
        };

        let fs_tls = pipeline.fs.as_ref().map(|fs| fs.tls_size).unwrap_or_default();
        batch.tls_size = batch.tls_size.max(pipeline.vs.tls_size).max(fs_tls);

        let vertex = batch.jobs.add(&mut self.desc_pool, vertex_job, 0, false);
        if let Some(tiler_job) = tiler_job {
            batch.jobs.add(&mut self.desc_pool, tiler_job, vertex, false);
        }

        #[cfg(feature = "log-objects")]
        trace!(
            "Recorded draw of {} vertices x {} instances with pipeline `{}`",
            draw.vertex_range,
            draw.instance_count,
            pipeline.name
        );

        self.gfx.dirty = DirtyFlags::default();
        Ok(())
    }

    fn prepare_draw_sysvals(&mut self, draw: &DrawInfo) {
        let gfx = &mut self.gfx;
        let base_vertex = if draw.index_size != 0 { draw.vertex_offset } else { 0 };
        let mut changed = gfx
            .sysvals
            .set_draw_params(draw.offset_start, base_vertex, draw.first_instance);
        if gfx.dirty.viewport {
            changed |= gfx.sysvals.set_viewport(&gfx.dynamic.viewport);
        }
        if gfx.dirty.blend_constants {
            changed |= gfx.sysvals.set_blend_constants(gfx.dynamic.blend_constants);
        }
        if changed {
            gfx.desc_state.invalidate_push_uniforms();
        }
    }

    /// Fragment renderer state. Rebuilt after a pipeline bind, a render pass change, or a change of the blend
    /// constants or rasterizer discard.
    fn prepare_fs_rsd(&mut self, pipeline: &GraphicsPipeline) -> Result<u64> {
        let gfx = &mut self.gfx;
        if gfx.dirty.blend_constants {
            gfx.fs_rsd.invalidate();
        }
        let pool = &mut self.desc_pool;
        let dynamic = &gfx.dynamic;
        let rt_count = gfx.fb.rt_count;

        gfx.fs_rsd.get_or_try_insert_with(|| {
            let discard = dynamic.rasterizer_discard;
            let fs = pipeline.fs.as_ref().filter(|_| !discard && pipeline.fs_required());

            let mut flags = 0;
            if fs.is_some() {
                flags |= RSD_SHADER_ENABLED;
            }
            if pipeline.depth_test {
                flags |= RSD_DEPTH_TEST;
            }
            if pipeline.depth_write {
                flags |= RSD_DEPTH_WRITE;
            }
            if discard {
                flags |= RSD_RASTERIZER_DISCARD;
            }

            let rt_write_masks = pipeline
                .color_write_masks
                .iter()
                .take(MAX_RTS)
                .enumerate()
                .fold(0u32, |masks, (rt, mask)| masks | ((mask.as_raw() & 0xf) << (4 * rt)));

            let desc = RendererStateDesc {
                shader: fs.map(|fs| fs.binary_address).unwrap_or_default(),
                flags,
                rt_count: rt_count.max(1),
                blend_constants: dynamic.blend_constants.map(|c| c.clamp(0.0, 1.0)),
                depth_func: pipeline.depth_op.as_raw() as u32,
                rt_write_masks,
                reserved: [0; 2],
            };
            pool.upload(std::slice::from_ref(&desc), DESC_ALIGN).map(|ptr| ptr.gpu)
        })
    }

    /// Allocate the varying buffers written by the vertex shader, one per varying slot, and describe them.
    fn prepare_varyings(&mut self, pipeline: &GraphicsPipeline, draw: &DrawInfo) -> Result<VaryingTables> {
        let vs = &pipeline.vs;
        let vertex_count = draw.padded_vertex_count as u64 * draw.instance_count as u64;

        // One extra null buffer terminates the table.
        let mut bufs = [AttributeBufferDesc::default(); VARYING_BUF_COUNT + 1];
        let mut addresses = [0u64; VARYING_BUF_COUNT];
        for (slot, &stride) in vs.varying_strides.iter().enumerate() {
            let size = vertex_count * stride as u64;
            if size == 0 {
                continue;
            }
            let ptr = self.varying_pool.allocate(size, VARYING_ALIGN)?;
            bufs[slot] = AttributeBufferDesc::linear(ptr.gpu, stride, size);
            addresses[slot] = ptr.gpu;
        }

        let attribs = (0..VARYING_BUF_COUNT)
            .filter(|&slot| addresses[slot] != 0)
            .map(|slot| AttributeDesc::new(slot as u32, 0, None))
            .collect::<Vec<_>>();

        let buffers = self.desc_pool.upload(&bufs, ATTRIB_BUF_ALIGN)?.gpu;
        let attributes = if attribs.is_empty() {
            0
        } else {
            self.desc_pool.upload(&attribs, DESC_ALIGN)?.gpu
        };

        let position = if vs.writes_position {
            addresses[VARYING_BUF_POSITION]
        } else {
            0
        };
        let psiz = if vs.writes_point_size && self.gfx.dynamic.topology == vk::PrimitiveTopology::POINT_LIST {
            addresses[VARYING_BUF_PSIZ]
        } else {
            0
        };

        Ok(VaryingTables {
            buffers,
            attributes,
            position,
            psiz,
        })
    }

    /// Vertex attribute tables: one attribute buffer pair per vertex binding, one attribute per location, then
    /// the storage images of the bound sets if the vertex shader accesses images. Reused across draws as long as
    /// the bindings and the instancing parameters stay the same.
    fn prepare_vs_attribs(&mut self, pipeline: &GraphicsPipeline, draw: &DrawInfo) -> Result<VertexAttributeTables> {
        let key = VertexAttributeKey {
            first_instance: draw.first_instance,
            instanced: draw.instance_count > 1,
        };
        if key != self.gfx.vs_attrib_key {
            self.gfx.invalidate_vs_attribs();
            self.gfx.vs_attrib_key = key;
        }
        if let Some(tables) = self.gfx.vs_attribs.get() {
            return Ok(tables);
        }

        let layout = &pipeline.layout;
        let num_imgs = if pipeline.vs.has_img_access {
            layout.num_imgs as usize
        } else {
            0
        };
        let num_vbs = pipeline
            .vertex_bindings
            .iter()
            .map(|binding| binding.binding as usize + 1)
            .max()
            .unwrap_or_default();
        let num_locations = pipeline
            .vertex_attributes
            .iter()
            .map(|attr| attr.location as usize + 1)
            .max()
            .unwrap_or_default();

        if num_vbs == 0 && num_locations == 0 && num_imgs == 0 {
            return Ok(self.gfx.vs_attribs.insert(VertexAttributeTables::default()));
        }
        if num_vbs > MAX_VBS {
            return Err(Error::TooManyBindings {
                what: "vertex buffers",
                max: MAX_VBS as u32,
            }
            .into());
        }
        if num_locations > MAX_VS_ATTRIBS {
            return Err(Error::TooManyBindings {
                what: "vertex attributes",
                max: MAX_VS_ATTRIBS as u32,
            }
            .into());
        }

        let attrib_count = if num_imgs > 0 {
            MAX_VS_ATTRIBS + num_imgs
        } else {
            num_locations
        };
        let mut bufs = vec![AttributeBufferDesc::default(); (num_vbs + num_imgs) * 2 + 1];
        let mut attribs = vec![AttributeDesc::default(); attrib_count];

        for binding in &pipeline.vertex_bindings {
            let index = binding.binding as usize;
            let Some(vb) = &self.gfx.vbs[index] else {
                continue;
            };
            let address = vb.address();
            // Per-instance data of a single instance is read with a zero stride.
            let stride = if binding.rate == vk::VertexInputRate::INSTANCE && draw.instance_count <= 1 {
                0
            } else {
                binding.stride
            };
            bufs[index * 2] = AttributeBufferDesc::linear(
                address & !ATTRIB_BUF_ADDR_MASK,
                stride,
                vb.size() + (address & ATTRIB_BUF_ADDR_MASK),
            );
        }

        for attr in &pipeline.vertex_attributes {
            let binding = pipeline
                .vertex_bindings
                .iter()
                .find(|binding| binding.binding == attr.binding)
                .ok_or(Error::NoVertexBinding(attr.binding))?;
            let misalignment = self.gfx.vbs[attr.binding as usize]
                .as_ref()
                .map(|vb| vb.address() & ATTRIB_BUF_ADDR_MASK)
                .unwrap_or_default();
            let mut offset = attr.offset + misalignment as u32;
            if binding.rate == vk::VertexInputRate::INSTANCE {
                offset += draw.first_instance * binding.stride;
            }
            attribs[attr.location as usize] = AttributeDesc::new(attr.binding * 2, attr.format.as_raw() as u32, Some(offset));
        }

        if num_imgs > 0 {
            self.gfx.desc_state.fill_img_attribs(
                layout,
                &mut bufs[num_vbs * 2..],
                &mut attribs[MAX_VS_ATTRIBS..],
                (num_vbs * 2) as u32,
            );
        }

        let buffers = self.desc_pool.upload(&bufs, ATTRIB_BUF_ALIGN)?;
        let attributes = self.desc_pool.upload(&attribs, DESC_ALIGN)?;

        if num_imgs > 0 {
            // Other stages reach the storage images through the tail of the vertex tables.
            let attrib_size = std::mem::size_of::<AttributeDesc>() as u64;
            let buf_size = std::mem::size_of::<AttributeBufferDesc>() as u64;
            self.gfx.desc_state.img.insert(ImageAttributeTables {
                buffers: buffers.gpu_at(num_vbs as u64 * 2 * buf_size),
                attributes: attributes.gpu_at(MAX_VS_ATTRIBS as u64 * attrib_size),
            });
        }

        Ok(self.gfx.vs_attribs.insert(VertexAttributeTables {
            buffers: buffers.gpu,
            attributes: attributes.gpu,
        }))
    }

    fn prepare_viewport(&mut self) -> Result<u64> {
        let gfx = &mut self.gfx;
        if gfx.dirty.viewport || gfx.dirty.scissor {
            gfx.viewport_desc.invalidate();
        }
        let pool = &mut self.desc_pool;
        let dynamic = &gfx.dynamic;
        gfx.viewport_desc.get_or_try_insert_with(|| {
            let desc = viewport_desc(&dynamic.viewport, &dynamic.scissor);
            pool.upload(std::slice::from_ref(&desc), DESC_ALIGN).map(|ptr| ptr.gpu)
        })
    }

    fn begin_rendering_inner(&mut self, info: &RenderingInfo) -> Result<()> {
        if self.gfx.fb.in_render_pass {
            anyhow::bail!("`begin_rendering` called inside a render pass");
        }
        if info.color_attachments.len() > MAX_RTS {
            return Err(Error::TooManyBindings {
                what: "color attachments",
                max: MAX_RTS as u32,
            }
            .into());
        }

        let mut fb = FramebufferInfo {
            render_area: info.render_area,
            layer_count: info.layer_count.max(1),
            nr_samples: 1,
            rt_count: info.color_attachments.len() as u32,
            tile_buf_budget: self.device.optimal_tib_size,
            in_render_pass: true,
            ..Default::default()
        };

        let mut att_width = 0;
        let mut att_height = 0;
        let mut bound = false;

        for (index, att) in info.color_attachments.iter().enumerate() {
            let Some(att) = att else {
                continue;
            };
            let view = &att.image_view;
            bound = true;
            att_width = att_width.max(view.extent().width);
            att_height = att_height.max(view.extent().height);
            fb.nr_samples = view.sample_count();
            fb.bos.push(view.address());

            let rt = &mut fb.rts[index];
            rt.view = Some(view.clone());
            if att.load_op == vk::AttachmentLoadOp::CLEAR {
                rt.clear = true;
                if let ClearValue::Color(color) = att.clear_value {
                    rt.clear_value = color;
                }
            } else if att.load_op == vk::AttachmentLoadOp::LOAD {
                rt.preload = true;
            }
        }

        if let Some(att) = &info.depth_attachment {
            let view = &att.image_view;
            bound = true;
            att_width = att_width.max(view.extent().width);
            att_height = att_height.max(view.extent().height);
            fb.bos.push(view.address());
            fb.zs_view = Some(view.clone());
            if att.load_op == vk::AttachmentLoadOp::CLEAR {
                fb.z_clear = true;
                if let ClearValue::DepthStencil {
                    depth, ..
                } = att.clear_value
                {
                    fb.clear_depth = depth;
                }
            } else if att.load_op == vk::AttachmentLoadOp::LOAD {
                fb.z_preload = true;
            }
        }

        if let Some(att) = &info.stencil_attachment {
            let view = &att.image_view;
            bound = true;
            att_width = att_width.max(view.extent().width);
            att_height = att_height.max(view.extent().height);
            if fb.zs_view.as_ref() != Some(view) {
                fb.bos.push(view.address());
                fb.s_view = Some(view.clone());
            }
            if att.load_op == vk::AttachmentLoadOp::CLEAR {
                fb.s_clear = true;
                if let ClearValue::DepthStencil {
                    stencil, ..
                } = att.clear_value
                {
                    fb.clear_stencil = stencil;
                }
            } else if att.load_op == vk::AttachmentLoadOp::LOAD {
                fb.s_preload = true;
            }
        }

        let area = info.render_area;
        let mut width = area.offset.x.max(0) as u64 + area.extent.width as u64;
        let mut height = area.offset.y.max(0) as u64 + area.extent.height as u64;
        if bound {
            width = (att_width as u64).min(align_up(width, RENDER_AREA_ALIGN));
            height = (att_height as u64).min(align_up(height, RENDER_AREA_ALIGN));
        }
        if width == 0 || height == 0 {
            anyhow::bail!("Render area {}x{} is empty", width, height);
        }
        fb.width = width as u32;
        fb.height = height as u32;

        self.gfx.fb = fb;
        self.gfx.fs_rsd.invalidate();

        // A batch left open by event commands is adopted, so its event operations stay in front of the draws.
        if self.cur_batch.is_none() {
            self.open_batch_inner()?;
        }
        Ok(())
    }
}

impl<A: SlabAllocator> GraphicsCmdBuffer for CommandBuffer<A> {
    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<&mut Self> {
        self.record(|cmd| cmd.begin_rendering_inner(info))
    }

    fn end_rendering(&mut self) -> Result<&mut Self> {
        self.record(|cmd| {
            if !cmd.gfx.fb.in_render_pass {
                return Err(Error::NoRenderpass.into());
            }
            cmd.close_batch_inner()?;
            cmd.gfx.fb = FramebufferInfo::default();
            cmd.gfx.fs_rsd.invalidate();
            Ok(())
        })
    }

    fn full_viewport_scissor(&mut self) -> Result<&mut Self> {
        let area = self.gfx.fb.render_area;
        self.viewport(vk::Viewport {
            x: area.offset.x as f32,
            y: area.offset.y as f32,
            width: area.extent.width as f32,
            height: area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        })?
        .scissor(area)
    }

    fn viewport(&mut self, viewport: vk::Viewport) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.viewport = viewport;
            cmd.gfx.dirty.viewport = true;
            Ok(())
        })
    }

    fn scissor(&mut self, scissor: vk::Rect2D) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.scissor = scissor;
            cmd.gfx.dirty.scissor = true;
            Ok(())
        })
    }

    fn blend_constants(&mut self, constants: [f32; 4]) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.blend_constants = constants;
            cmd.gfx.dirty.blend_constants = true;
            Ok(())
        })
    }

    fn primitive_topology(&mut self, topology: vk::PrimitiveTopology) -> Result<&mut Self> {
        self.record(|cmd| {
            draw_mode(topology).ok_or(Error::UnsupportedTopology(topology))?;
            cmd.gfx.dynamic.topology = topology;
            Ok(())
        })
    }

    fn primitive_restart(&mut self, enable: bool) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.primitive_restart = enable;
            Ok(())
        })
    }

    fn rasterizer_discard(&mut self, enable: bool) -> Result<&mut Self> {
        self.record(|cmd| {
            if cmd.gfx.dynamic.rasterizer_discard != enable {
                cmd.gfx.dynamic.rasterizer_discard = enable;
                cmd.gfx.fs_rsd.invalidate();
            }
            Ok(())
        })
    }

    fn line_width(&mut self, width: f32) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.line_width = width;
            Ok(())
        })
    }

    fn cull_mode(&mut self, mode: vk::CullModeFlags) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.cull_mode = mode;
            Ok(())
        })
    }

    fn front_face(&mut self, face: vk::FrontFace) -> Result<&mut Self> {
        self.record(|cmd| {
            cmd.gfx.dynamic.front_face = face;
            Ok(())
        })
    }

    fn depth_bounds_test(&mut self, enable: bool) -> Result<&mut Self> {
        if enable {
            return self.unsupported("depth_bounds_test");
        }
        self.record(|_| Ok(()))
    }

    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(&Buffer, u64)]) -> Result<&mut Self> {
        self.record(|cmd| {
            let end = first_binding as usize + buffers.len();
            if end > MAX_VBS {
                return Err(Error::TooManyBindings {
                    what: "vertex buffers",
                    max: MAX_VBS as u32,
                }
                .into());
            }
            for (slot, (buffer, offset)) in cmd.gfx.vbs[first_binding as usize..end].iter_mut().zip(buffers) {
                *slot = Some(VertexBufferBinding {
                    buffer: (*buffer).clone(),
                    offset: *offset,
                });
            }
            cmd.gfx.invalidate_vs_attribs();
            Ok(())
        })
    }

    fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, ty: vk::IndexType) -> Result<&mut Self> {
        self.record(|cmd| {
            let index_size = match ty {
                vk::IndexType::UINT8_EXT => 8,
                vk::IndexType::UINT16 => 16,
                vk::IndexType::UINT32 => 32,
                other => return Err(Error::InvalidIndexType(other).into()),
            };
            cmd.gfx.ib = Some(IndexBufferBinding {
                buffer: buffer.clone(),
                offset,
                index_size,
            });
            Ok(())
        })
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32)
        -> Result<&mut Self> {
        self.record(|cmd| {
            if vertex_count == 0 || instance_count == 0 {
                return Ok(());
            }
            let padded_vertex_count = if instance_count > 1 {
                padded_vertex_count(vertex_count)
            } else {
                vertex_count
            };
            cmd.draw_inner(DrawInfo {
                first_instance,
                instance_count,
                vertex_range: vertex_count,
                vertex_count,
                padded_vertex_count,
                offset_start: first_vertex,
                ..Default::default()
            })
        })
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<&mut Self> {
        self.record(|cmd| {
            if index_count == 0 || instance_count == 0 {
                return Ok(());
            }
            let ib = cmd.gfx.ib.clone().ok_or(Error::NoIndexBuffer)?;

            INDEX_CRAWL_WARNING.call_once(|| {
                warn!("Indexed draws crawl the index buffer on the CPU to find the vertex range");
            });
            let Some((min, max)) = index_bounds(&ib, first_index, index_count, cmd.gfx.dynamic.primitive_restart)?
            else {
                trace!("Skipped indexed draw made only of restart indices");
                return Ok(());
            };

            // Indices 0 and u32::MAX with restart disabled span 2^32 vertices.
            let span = max as u64 - min as u64 + 1;
            let vertex_range = u32::try_from(span).map_err(|_| Error::SizeOverflow {
                what: "indexed draw vertex range",
                value: span,
                max: u32::MAX as u64,
            })?;
            let padded_vertex_count = if instance_count > 1 {
                padded_vertex_count(vertex_range)
            } else {
                vertex_range
            };
            cmd.draw_inner(DrawInfo {
                index_size: ib.index_size,
                index_count,
                vertex_offset,
                first_instance,
                instance_count,
                vertex_range,
                vertex_count: index_count.saturating_add(vertex_offset.unsigned_abs()),
                padded_vertex_count,
                offset_start: (min as i32).wrapping_add(vertex_offset) as u32,
                indices: ib.buffer.address_at(ib.offset) + first_index as u64 * (ib.index_size / 8) as u64,
            })
        })
    }

    fn draw_indirect(&mut self, _buffer: &Buffer, _offset: u64, _draw_count: u32, _stride: u32) -> Result<&mut Self> {
        self.unsupported("draw_indirect")
    }

    fn draw_indexed_indirect(&mut self, _buffer: &Buffer, _offset: u64, _draw_count: u32, _stride: u32)
        -> Result<&mut Self> {
        self.unsupported("draw_indexed_indirect")
    }
}
