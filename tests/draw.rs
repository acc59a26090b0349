use anyhow::Result;

use panbatch::command_buffer::packed::{
    ComputeJobPayload, JobType, TilerJobPayload, FBD_HAS_ZS_EXT, FBD_Z_CLEAR, JOB_HEADER_SIZE, PRIMITIVE_RESTART,
};
use panbatch::descriptor::packed::{AttributeBufferDesc, AttributeDesc};
use panbatch::descriptor::tables::SYSVALS_OFFSET;
use panbatch::prelude::*;

mod framework;

const GRAPHICS: vk::PipelineBindPoint = vk::PipelineBindPoint::GRAPHICS;

fn index_buffer(indices: &[u16]) -> Buffer {
    let bytes = indices.iter().flat_map(|index| index.to_le_bytes()).collect();
    Buffer::with_data(0x5000_0000, bytes)
}

fn job_payload<T: bytemuck::Pod>(cmd: &CommandBuffer, job: &JobRecord) -> T {
    cmd.desc_pool()
        .read_pod::<T>(job.address() + JOB_HEADER_SIZE)
        .expect("Job payload lives in the descriptor arena")
}

fn open_batch_jobs(cmd: &CommandBuffer) -> &JobChain {
    cmd.current_batch().expect("Render pass keeps a batch open").jobs()
}

#[test]
pub fn padded_vertex_counts() -> Result<()> {
    for count in [0, 1, 5, 9] {
        assert_eq!(padded_vertex_count(count), count);
    }
    assert_eq!(padded_vertex_count(11), 12);
    assert_eq!(padded_vertex_count(12), 12);
    assert_eq!(padded_vertex_count(19), 20);
    assert_eq!(padded_vertex_count(20), 24);
    assert_eq!(padded_vertex_count(64), 72);
    assert_eq!(padded_vertex_count(100), 112);
    for count in 10..5000 {
        let padded = padded_vertex_count(count);
        assert!(padded >= count, "{count} padded down to {padded}");
        let odd = padded >> padded.trailing_zeros();
        assert!([1, 3, 5, 7, 9].contains(&odd), "{count} padded to {padded}, odd factor {odd}");
    }
    Ok(())
}

#[test]
pub fn viewport_sysvals() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 0, 0)?;
    let sysvals = *cmd.graphics_sysvals();
    assert_eq!(sysvals.viewport_scale, [32.0, 32.0, 1.0]);
    assert_eq!(sysvals.viewport_offset, [32.0, 32.0, 0.0]);

    let mut sysvals = GraphicsSysvals::default();
    let viewport = vk::Viewport {
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 50.0,
        min_depth: 0.25,
        max_depth: 0.75,
    };
    assert!(sysvals.set_viewport(&viewport));
    assert!(!sysvals.set_viewport(&viewport), "Setting the same viewport again changes nothing");
    assert_eq!(sysvals.viewport_scale, [50.0, 25.0, 0.5]);
    assert_eq!(sysvals.viewport_offset, [60.0, 45.0, 0.25]);
    Ok(())
}

#[test]
pub fn blend_constants_are_clamped() -> Result<()> {
    let context = framework::make_context()?;
    let pipeline = framework::triangle_pipeline_with(framework::empty_layout()?, |builder| {
        builder.dynamic_state(vk::DynamicState::BLEND_CONSTANTS)
    })?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.bind_pipeline(&Pipeline::Graphics(pipeline))?
        .blend_constants([2.0, -1.0, 0.5, 1.0])?
        .draw(3, 1, 0, 0)?;
    assert_eq!(cmd.graphics_sysvals().blend_constants, [1.0, 0.0, 0.5, 1.0]);
    assert_eq!(cmd.dynamic_state().blend_constants, [2.0, -1.0, 0.5, 1.0]);
    Ok(())
}

#[test]
pub fn draw_parameters_reach_push_uniforms() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(3, 1, 7, 2)?;
    let first = cmd.descriptor_state(GRAPHICS)?.push_uniforms_address().unwrap();
    let sysvals = cmd.desc_pool().read_pod::<GraphicsSysvals>(first + SYSVALS_OFFSET).unwrap();
    assert_eq!(sysvals.first_vertex, 7);
    assert_eq!(sysvals.base_instance, 2);
    assert_eq!(sysvals.base_vertex, 0);

    // Same parameters reuse the blob, new ones rebuild it.
    cmd.draw(3, 1, 7, 2)?;
    assert_eq!(cmd.descriptor_state(GRAPHICS)?.push_uniforms_address(), Some(first));
    cmd.draw(3, 1, 0, 0)?;
    let second = cmd.descriptor_state(GRAPHICS)?.push_uniforms_address().unwrap();
    assert_ne!(second, first);

    let vertex = open_batch_jobs(&cmd).job(5).unwrap();
    assert_eq!(vertex.ty, JobType::Vertex);
    let payload: ComputeJobPayload = job_payload(&cmd, vertex);
    assert_eq!(payload.draw.push_uniforms, second);
    Ok(())
}

#[test]
pub fn instanced_draw() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.draw(20, 3, 0, 0)?;

    let jobs = open_batch_jobs(&cmd);
    let payload: ComputeJobPayload = job_payload(&cmd, jobs.job(1).unwrap());
    assert_eq!(payload.draw.invocation.count, [1, 20, 3]);
    assert_eq!(payload.draw.instance_size, 24);
    assert_ne!(payload.draw.varying_buffers, 0);
    // Position varyings for every padded vertex of every instance.
    assert!(cmd.varying_pool().allocation_count() > 0);
    Ok(())
}

#[test]
pub fn indexed_draw_range() -> Result<()> {
    let context = framework::make_context()?;
    let indices = index_buffer(&[5, 7, 6, 0xffff, 9]);
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.primitive_restart(true)?
        .bind_index_buffer(&indices, 0, vk::IndexType::UINT16)?
        .draw_indexed(5, 1, 0, 2, 0)?;

    let sysvals = cmd.graphics_sysvals();
    assert_eq!(sysvals.first_vertex, 7, "Smallest index plus the vertex offset");
    assert_eq!(sysvals.base_vertex, 2);

    let jobs = open_batch_jobs(&cmd);
    let vertex: ComputeJobPayload = job_payload(&cmd, jobs.job(1).unwrap());
    assert_eq!(vertex.draw.offset_start, 7);
    assert_eq!(vertex.draw.invocation.count, [1, 5, 1], "Indices 5 to 9 are shaded");

    let tiler: TilerJobPayload = job_payload(&cmd, jobs.job(2).unwrap());
    assert_eq!(tiler.primitive.indices, 0x5000_0000);
    assert_eq!(tiler.primitive.index_count, 5);
    assert_eq!(tiler.primitive.base_vertex_offset, -5);
    assert_ne!(tiler.primitive.flags & PRIMITIVE_RESTART, 0);
    assert_ne!(tiler.tiler_context, 0);
    Ok(())
}

#[test]
pub fn indexed_draw_skips_restart_only() -> Result<()> {
    let context = framework::make_context()?;
    let indices = index_buffer(&[0xffff, 0xffff, 0xffff]);
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.primitive_restart(true)?
        .bind_index_buffer(&indices, 0, vk::IndexType::UINT16)?
        .draw_indexed(3, 1, 0, 0, 0)?;
    assert!(open_batch_jobs(&cmd).is_empty());
    assert_eq!(cmd.status(), CommandBufferStatus::Recording);
    Ok(())
}

#[test]
pub fn indexed_draw_errors() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    assert!(framework::is_error(cmd.draw_indexed(3, 1, 0, 0, 0), |err| matches!(err, Error::NoIndexBuffer)));

    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.bind_index_buffer(&index_buffer(&[0, 1, 2]), 0, vk::IndexType::UINT16)?;
    assert!(cmd.draw_indexed(6, 1, 0, 0, 0).is_err(), "Reading past the end of the index buffer");

    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.bind_index_buffer(&Buffer::new(0x5000_0000, 64), 0, vk::IndexType::UINT32)?;
    assert!(framework::is_error(cmd.draw_indexed(3, 1, 0, 0, 0), |err| matches!(err, Error::UnmappableBuffer)));

    let mut cmd = framework::recording(&context)?;
    let result = cmd.bind_index_buffer(&index_buffer(&[0]), 0, vk::IndexType::NONE_KHR);
    assert!(framework::is_error(result, |err| matches!(err, Error::InvalidIndexType(_))));
    Ok(())
}

#[test]
pub fn indexed_draw_range_must_fit() -> Result<()> {
    let context = framework::make_context()?;
    let bytes = [0, 1, u32::MAX].iter().flat_map(|index| index.to_le_bytes()).collect();
    let indices = Buffer::with_data(0x5000_0000, bytes);
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.primitive_restart(false)?
        .bind_index_buffer(&indices, 0, vk::IndexType::UINT32)?;

    // Without restart, u32::MAX is a regular index and the draw covers 2^32 vertices.
    let result = cmd.draw_indexed(3, 1, 0, 0, 0);
    assert!(framework::is_error(result, |err| matches!(
        err,
        Error::SizeOverflow {
            value: 0x1_0000_0000,
            ..
        }
    )));
    assert_eq!(cmd.status(), CommandBufferStatus::Invalid);
    Ok(())
}

#[test]
pub fn rasterizer_discard_skips_tiler() -> Result<()> {
    let context = framework::make_context()?;
    let pipeline =
        framework::triangle_pipeline_with(framework::empty_layout()?, |builder| builder.rasterizer_discard(true))?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::LOAD)?;
    cmd.bind_pipeline(&Pipeline::Graphics(pipeline))?.draw(3, 1, 0, 0)?;
    assert!(cmd.dynamic_state().rasterizer_discard);
    cmd.end_rendering()?;
    cmd.end()?;

    let batch = &cmd.batches()[0];
    assert_eq!(batch.job_count(JobType::Vertex), 1);
    assert_eq!(batch.job_count(JobType::Tiler), 0);
    assert!(!batch.has_tiler_job());
    assert!(batch.framebuffer().is_none());
    Ok(())
}

#[test]
pub fn no_position_skips_tiler() -> Result<()> {
    let context = framework::make_context()?;
    let pipeline = PipelineBuilder::new("transform feedback")
        .vertex_shader(ShaderInfo::new(0x1000).general_varyings(32))
        .dynamic_states(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR])
        .build()?;
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.bind_pipeline(&Pipeline::Graphics(pipeline))?.draw(3, 1, 0, 0)?;
    let jobs = open_batch_jobs(&cmd);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs.count(JobType::Vertex), 1);
    assert!(jobs.first_tiler().is_none());
    Ok(())
}

#[test]
pub fn static_state_comes_from_pipeline() -> Result<()> {
    let context = framework::make_context()?;
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: 16.0,
        height: 8.0,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let static_pipeline = PipelineBuilder::new("static")
        .vertex_shader(ShaderInfo::new(0x1000).writes_position(16))
        .viewport(viewport)
        .topology(vk::PrimitiveTopology::LINE_LIST)
        .primitive_restart(true)
        .blend_attachment_write_all()
        .build()?;
    let dynamic_pipeline = framework::triangle_pipeline(framework::empty_layout()?)?;

    let mut cmd = framework::recording(&context)?;
    cmd.viewport(vk::Viewport {
        width: 64.0,
        ..viewport
    })?;
    cmd.bind_pipeline(&Pipeline::Graphics(dynamic_pipeline.clone()))?;
    assert_eq!(cmd.dynamic_state().viewport.width, 64.0, "Dynamic state survives the bind");
    assert_eq!(cmd.dynamic_state().topology, vk::PrimitiveTopology::TRIANGLE_LIST);

    cmd.bind_pipeline(&Pipeline::Graphics(static_pipeline))?;
    assert_eq!(cmd.dynamic_state().viewport.width, 16.0);
    assert_eq!(cmd.dynamic_state().viewport.height, 8.0);
    assert_eq!(cmd.dynamic_state().topology, vk::PrimitiveTopology::LINE_LIST);
    assert!(cmd.dynamic_state().primitive_restart);
    Ok(())
}

#[test]
pub fn unsupported_topologies() -> Result<()> {
    let context = framework::make_context()?;
    let result = framework::triangle_pipeline_with(framework::empty_layout()?, |builder| {
        builder.topology(vk::PrimitiveTopology::PATCH_LIST)
    });
    assert!(framework::is_error(result, |err| matches!(err, Error::UnsupportedTopology(_))));

    let mut cmd = framework::recording(&context)?;
    let result = cmd.primitive_topology(vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY);
    assert!(framework::is_error(result, |err| matches!(err, Error::UnsupportedTopology(_))));
    Ok(())
}

#[test]
pub fn vertex_buffer_limits() -> Result<()> {
    let context = framework::make_context()?;
    let buffer = Buffer::new(0x7000_0000, 0x1000);
    let mut cmd = framework::recording(&context)?;
    cmd.bind_vertex_buffers(MAX_VBS as u32 - 2, &[(&buffer, 0), (&buffer, 0)])?;
    let result = cmd.bind_vertex_buffers(MAX_VBS as u32 - 1, &[(&buffer, 0), (&buffer, 0)]);
    assert!(framework::is_error(result, |err| matches!(
        err,
        Error::TooManyBindings {
            what: "vertex buffers",
            ..
        }
    )));
    Ok(())
}

#[test]
pub fn vertex_attribute_tables() -> Result<()> {
    let context = framework::make_context()?;
    let pipeline = framework::triangle_pipeline_with(framework::empty_layout()?, |builder| {
        builder
            .vertex_input(0, vk::VertexInputRate::VERTEX)
            .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)
            .and_then(|builder| builder.vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT))
            .expect("Binding 0 was declared")
    })?;
    assert_eq!(pipeline.vertex_bindings()[0].stride, 16);
    assert_eq!(pipeline.vertex_attributes()[1].offset, 8);

    let buffer = Buffer::new(0x7000_0000, 0x1000);
    let mut cmd = framework::recording(&context)?;
    framework::begin_triangle_pass(&mut cmd, vk::AttachmentLoadOp::CLEAR)?;
    cmd.bind_pipeline(&Pipeline::Graphics(pipeline))?
        .bind_vertex_buffers(0, &[(&buffer, 0x10)])?
        .draw(4, 1, 0, 0)?;

    let vertex: ComputeJobPayload = job_payload(&cmd, open_batch_jobs(&cmd).job(1).unwrap());
    let buffers = cmd
        .desc_pool()
        .read_pod::<AttributeBufferDesc>(vertex.draw.attribute_buffers)
        .unwrap();
    // The misaligned start moves into the attribute offsets.
    assert_eq!(buffers.pointer, 0x7000_0000);
    assert_eq!(buffers.stride, 16);
    assert_eq!(buffers.size, 0x1000);

    let attributes = cmd.desc_pool().read_array::<AttributeDesc>(vertex.draw.attributes, 2).unwrap();
    assert_eq!(attributes[0].offset, 0x10);
    assert_eq!(attributes[1].offset, 0x18);
    assert!(attributes.iter().all(|attr| attr.buffer_index() == 0 && attr.offset_enabled()));

    // The tables are reused until the bindings change.
    cmd.draw(4, 1, 0, 0)?;
    let again: ComputeJobPayload = job_payload(&cmd, open_batch_jobs(&cmd).job(3).unwrap());
    assert_eq!(again.draw.attribute_buffers, vertex.draw.attribute_buffers);
    cmd.bind_vertex_buffers(0, &[(&buffer, 0)])?.draw(4, 1, 0, 0)?;
    let rebound: ComputeJobPayload = job_payload(&cmd, open_batch_jobs(&cmd).job(5).unwrap());
    assert_ne!(rebound.draw.attribute_buffers, vertex.draw.attribute_buffers);
    Ok(())
}

#[test]
pub fn depth_stencil_attachment() -> Result<()> {
    let context = framework::make_context()?;
    let color = framework::color_target(64, 64);
    let depth = ImageView::new(ImageViewInfo {
        address: 0x9000_0000,
        format: vk::Format::D24_UNORM_S8_UINT,
        extent: vk::Extent3D {
            width: 64,
            height: 64,
            depth: 1,
        },
        ..Default::default()
    });
    let depth_attachment = RenderingAttachmentInfo {
        image_view: depth.clone(),
        load_op: vk::AttachmentLoadOp::CLEAR,
        clear_value: ClearValue::DepthStencil {
            depth: 1.0,
            stencil: 0,
        },
    };
    let info = RenderingInfo {
        depth_attachment: Some(depth_attachment.clone()),
        stencil_attachment: Some(depth_attachment),
        ..framework::render_to(&color, vk::AttachmentLoadOp::LOAD)
    };

    let mut cmd = framework::recording(&context)?;
    cmd.begin_rendering(&info)?;
    assert!(cmd.framebuffer().s_view.is_none(), "The combined view is not tracked twice");
    cmd.end_rendering()?;
    cmd.end()?;

    let batch = &cmd.batches()[0];
    assert_eq!(batch.bos(), &[color.address(), depth.address()]);
    let fb = batch.framebuffer().unwrap();
    assert!(fb.has_zs_ext);
    let fbd = cmd
        .desc_pool()
        .read_pod::<panbatch::command_buffer::packed::FramebufferDesc>(fb.desc.gpu)
        .unwrap();
    assert_ne!(fbd.flags & FBD_HAS_ZS_EXT, 0);
    assert_ne!(fbd.flags & FBD_Z_CLEAR, 0);
    Ok(())
}

#[test]
pub fn layered_rendering() -> Result<()> {
    let context = framework::make_context()?;
    let target = framework::color_target(32, 32);
    let info = RenderingInfo {
        layer_count: 3,
        ..framework::render_to(&target, vk::AttachmentLoadOp::CLEAR)
    };
    let mut cmd = framework::recording(&context)?;
    cmd.begin_rendering(&info)?.end_rendering()?;
    cmd.end()?;

    let batch = &cmd.batches()[0];
    assert_eq!(batch.fragment_jobs().len(), 3);
    let fb = batch.framebuffer().unwrap();
    assert_eq!(fb.layer_count, 3);
    assert_eq!(fb.layer_address(2), fb.desc.gpu + 2 * fb.stride);
    assert_eq!(batch.tiler().unwrap().layer_count, 3);
    Ok(())
}

#[test]
pub fn depth_bounds_test_is_unsupported() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    cmd.depth_bounds_test(false)?;
    assert!(framework::is_error(cmd.depth_bounds_test(true), |err| matches!(err, Error::Unsupported(_))));
    assert_eq!(cmd.status(), CommandBufferStatus::Recording);
    Ok(())
}
