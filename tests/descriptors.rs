use anyhow::Result;

use panbatch::descriptor::packed::{
    AttributeBufferDesc, AttributeDesc, SamplerDesc, SsboAddr, TextureDesc, UniformBufferDesc,
};
use panbatch::descriptor::tables::SYSVALS_OFFSET;
use panbatch::pipeline::pipeline_layout::SetOffsets;
use panbatch::prelude::*;

mod framework;

const COMPUTE: vk::PipelineBindPoint = vk::PipelineBindPoint::COMPUTE;

/// Record into a command buffer with a compute pipeline using `layout` bound.
fn compute_with_layout(context: &framework::Context, layout: &Arc<PipelineLayout>) -> Result<CommandBuffer> {
    let pipeline = framework::compute_pipeline(layout.clone(), ShaderInfo::new(0x1000))?;
    let mut cmd = framework::recording(context)?;
    cmd.bind_pipeline(&Pipeline::Compute(pipeline))?;
    Ok(cmd)
}

fn view_at(address: u64, format: vk::Format) -> ImageView {
    ImageView::new(ImageViewInfo {
        address,
        format,
        ..Default::default()
    })
}

#[test]
pub fn uniform_buffer_table_is_memoized() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 2)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let buffer = Buffer::new(0x10_0000, 256);
    // Only the first element is written, the second stays null.
    let set = DescriptorSetBuilder::new(set_layout.clone())
        .bind_uniform_buffer(0, BufferRange::whole(&buffer))
        .build()?;

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set], &[])?;
    assert!(cmd.descriptor_state(COMPUTE)?.table_address(TableKind::UniformBuffers).is_none());

    let table = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    assert_ne!(table, 0);
    let allocations = cmd.desc_pool().allocation_count();
    assert_eq!(cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?, table);
    assert_eq!(cmd.desc_pool().allocation_count(), allocations, "A memoized table is not uploaded again");

    let entries = cmd.desc_pool().read_array::<UniformBufferDesc>(table, 2).unwrap();
    assert_eq!(entries[0], UniformBufferDesc::new(0x10_0000, 256));
    assert_eq!(entries[0].address(), 0x10_0000);
    assert_eq!(entries[0].entries(), 16);
    assert!(entries[1].is_null());

    // The dispatch uses the memoized table.
    cmd.dispatch(1, 1, 1)?;
    assert_eq!(cmd.descriptor_state(COMPUTE)?.table_address(TableKind::UniformBuffers), Some(table));

    let other = Buffer::new(0x18_0000, 0x400);
    let mut replacement = DescriptorSet::new(set_layout);
    replacement.write(
        0,
        0,
        &[
            Descriptor::UniformBuffer(BufferRange::new(&other, 0x100, 64)),
            Descriptor::UniformBuffer(BufferRange::whole(&other)),
        ],
    )?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[Arc::new(replacement)], &[])?;
    assert!(cmd.descriptor_state(COMPUTE)?.table_address(TableKind::UniformBuffers).is_none());

    let allocations = cmd.desc_pool().allocation_count();
    let rebuilt = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    assert_ne!(rebuilt, table);
    assert_eq!(cmd.desc_pool().allocation_count(), allocations + 1);
    let entries = cmd.desc_pool().read_array::<UniformBufferDesc>(rebuilt, 2).unwrap();
    assert_eq!(entries[0], UniformBufferDesc::new(0x18_0100, 64));
    assert_eq!(entries[1], UniformBufferDesc::new(0x18_0000, 0x400));
    Ok(())
}

#[test]
pub fn binding_drops_every_table() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 1),
            (1, vk::DescriptorType::SAMPLER, 1),
            (2, vk::DescriptorType::SAMPLED_IMAGE, 1),
            (3, vk::DescriptorType::STORAGE_IMAGE, 1),
            (4, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let set = Arc::new(DescriptorSet::new(set_layout));

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set.clone()], &[0])?;
    for kind in TableKind::ALL {
        assert_ne!(cmd.prepare_table(COMPUTE, kind)?, 0, "{kind:?} table must exist for this layout");
        assert!(cmd.descriptor_state(COMPUTE)?.table_address(kind).is_some());
    }

    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set], &[0])?;
    for kind in TableKind::ALL {
        assert!(
            cmd.descriptor_state(COMPUTE)?.table_address(kind).is_none(),
            "{kind:?} table survived a bind"
        );
    }
    Ok(())
}

#[test]
pub fn bind_points_are_independent() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let set = Arc::new(DescriptorSet::new(set_layout));

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, &layout, 0, &[set], &[])?;
    assert!(matches!(
        cmd.descriptor_state(vk::PipelineBindPoint::GRAPHICS)?.binding(0),
        Some(SetBinding::Bound(_))
    ));
    assert!(matches!(cmd.descriptor_state(COMPUTE)?.binding(0), Some(SetBinding::Unbound)));
    assert!(framework::is_error(
        cmd.descriptor_state(vk::PipelineBindPoint::RAY_TRACING_KHR).map(|_| ()),
        |err| matches!(err, Error::UnsupportedBindPoint(_))
    ));
    Ok(())
}

#[test]
pub fn dynamic_offsets_follow_binding_order() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 2),
            (1, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1),
            (2, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let buffer = Buffer::new(0x20_0000, 0x1000);
    let range = |offset| BufferRange::new(&buffer, offset, 64);

    let mut set = DescriptorSet::new(set_layout);
    set.write(
        0,
        0,
        &[Descriptor::UniformBufferDynamic(range(0)), Descriptor::UniformBufferDynamic(range(0x100))],
    )?;
    set.write(1, 0, &[Descriptor::StorageBufferDynamic(range(0x200))])?;
    set.write(2, 0, &[Descriptor::UniformBufferDynamic(range(0x300))])?;
    let set = Arc::new(set);

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set], &[16, 32, 48, 64])?;

    let state = cmd.descriptor_state(COMPUTE)?;
    let ubos = state.dynamic_uniform_buffers().to_vec();
    assert_eq!(ubos[0], UniformBufferDesc::new(0x20_0000 + 16, 64));
    assert_eq!(ubos[1], UniformBufferDesc::new(0x20_0100 + 32, 64));
    assert_eq!(ubos[2], UniformBufferDesc::new(0x20_0300 + 64, 64));
    assert_eq!(state.dynamic_storage_buffers()[0], SsboAddr::new(0x20_0200 + 48, 64));

    // Dynamic uniform buffers follow the static slots in the table, and the last slot points at the dynamic
    // storage buffer addresses.
    let table = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    let entries = cmd
        .desc_pool()
        .read_array::<UniformBufferDesc>(table, layout.total_ubo_count() as usize)
        .unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[layout.dyn_ubos_offset() as usize], ubos[0]);
    let dyn_desc_ubo = entries[layout.dyn_desc_ubo_index() as usize];
    let ssbos = cmd.desc_pool().read_array::<SsboAddr>(dyn_desc_ubo.address(), 1).unwrap();
    assert_eq!(ssbos[0].base_addr, 0x20_0200 + 48);
    assert_eq!(ssbos[0].size, 64);
    assert_eq!(ssbos[0].zero, 0);
    Ok(())
}

#[test]
pub fn tables_span_every_set() -> Result<()> {
    let first = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 1),
            (1, vk::DescriptorType::SAMPLED_IMAGE, 1),
            (2, vk::DescriptorType::SAMPLER, 1),
            (3, vk::DescriptorType::STORAGE_IMAGE, 1),
            (4, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let middle = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 2),
            (1, vk::DescriptorType::SAMPLED_IMAGE, 2),
            (2, vk::DescriptorType::SAMPLER, 1),
            (3, vk::DescriptorType::STORAGE_IMAGE, 1),
            (4, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1),
            (5, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let last = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 1),
            (1, vk::DescriptorType::SAMPLED_IMAGE, 1),
            (2, vk::DescriptorType::SAMPLER, 1),
            (3, vk::DescriptorType::STORAGE_IMAGE, 1),
            (4, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let layout = framework::pipeline_layout(vec![first.clone(), middle, last.clone()])?;

    assert_eq!(
        layout.set_offsets(1),
        Some(SetOffsets {
            ubo_offset: 1,
            dyn_ubo_offset: 1,
            dyn_ssbo_offset: 0,
            img_offset: 1,
        })
    );
    assert_eq!(
        layout.set_offsets(2),
        Some(SetOffsets {
            ubo_offset: 3,
            dyn_ubo_offset: 2,
            dyn_ssbo_offset: 1,
            img_offset: 2,
        })
    );
    assert_eq!(layout.total_ubo_count(), 7);
    assert_eq!(layout.dyn_ubos_offset(), 4);
    assert_eq!(layout.dyn_desc_ubo_index(), 6);

    let dynamic = Buffer::new(0x12_0000, 0x1000);
    let (tex_a, tex_c) = (
        view_at(0x8100_0000, vk::Format::R8G8B8A8_UNORM),
        view_at(0x8200_0000, vk::Format::R8G8B8A8_UNORM),
    );
    let (img_a, img_c) = (
        view_at(0x8300_0000, vk::Format::R32_SFLOAT),
        view_at(0x8400_0000, vk::Format::R32_UINT),
    );
    let sampler_a = Sampler::new(&SamplerInfo::default());
    let sampler_c = Sampler::new(&SamplerInfo {
        mag_filter: vk::Filter::LINEAR,
        ..Default::default()
    });
    let set_a = DescriptorSetBuilder::new(first)
        .bind_uniform_buffer(0, BufferRange::whole(&Buffer::new(0x10_0000, 256)))
        .bind_sampled_image(1, &tex_a)
        .bind_sampler(2, &sampler_a)
        .bind_storage_image(3, &img_a)
        .bind_dynamic_uniform_buffer(4, BufferRange::new(&dynamic, 0, 64))
        .build()?;
    let set_c = DescriptorSetBuilder::new(last)
        .bind_uniform_buffer(0, BufferRange::whole(&Buffer::new(0x11_0000, 512)))
        .bind_sampled_image(1, &tex_c)
        .bind_sampler(2, &sampler_c)
        .bind_storage_image(3, &img_c)
        .bind_dynamic_storage_buffer(4, BufferRange::new(&dynamic, 0x800, 0x100))
        .build()?;

    // The middle set is never bound.
    let mut state = DescriptorState::default();
    state.bind_sets(&layout, 0, &[set_a], &[0x10])?;
    state.bind_sets(&layout, 2, &[set_c], &[0x20])?;
    assert!(matches!(state.binding(1), Some(SetBinding::Unbound)));

    let mut pool = ArenaPool::new(HostAllocator::new(), "desc", 4096);
    let table = state.prepare_ubos(&mut pool, &layout)?;
    let ubos = pool.read_array::<UniformBufferDesc>(table, 7).unwrap();
    assert_eq!(ubos[0], UniformBufferDesc::new(0x10_0000, 256));
    assert!(ubos[1].is_null() && ubos[2].is_null(), "Slots of an unbound set are zero");
    assert_eq!(ubos[3], UniformBufferDesc::new(0x11_0000, 512));
    assert_eq!(ubos[4], UniformBufferDesc::new(0x12_0010, 64));
    assert!(ubos[5].is_null());
    let ssbos = pool.read_array::<SsboAddr>(ubos[6].address(), 2).unwrap();
    assert_eq!(ssbos[0], SsboAddr::default());
    assert_eq!(ssbos[1], SsboAddr::new(0x12_0820, 0x100));

    // Textures and samplers are packed densely, so the unbound set leaves no gap.
    let textures = state.prepare_textures(&mut pool, &layout)?;
    let textures = pool.read_array::<TextureDesc>(textures, 4).unwrap();
    assert_eq!(textures[0], tex_a.texture_desc());
    assert_eq!(textures[1], tex_c.texture_desc());
    assert_eq!(&textures[2..], &[TextureDesc::default(); 2]);

    let samplers = state.prepare_samplers(&mut pool, &layout)?;
    let samplers = pool.read_array::<SamplerDesc>(samplers, 4).unwrap();
    assert_eq!(samplers, vec![SamplerDesc::dummy(), sampler_a.desc(), sampler_c.desc(), SamplerDesc::default()]);

    // Images keep the fixed per-set offsets.
    let img = state.prepare_img_attribs(&mut pool, &layout)?;
    let attributes = pool.read_array::<AttributeDesc>(img.attributes, 3).unwrap();
    assert_eq!(attributes[0], AttributeDesc::new(0, img_a.hw_format(), None));
    assert_eq!(attributes[1], AttributeDesc::default());
    assert_eq!(attributes[2], AttributeDesc::new(4, img_c.hw_format(), None));
    let buffers = pool.read_array::<AttributeBufferDesc>(img.buffers, 7).unwrap();
    assert_eq!(&buffers[0..2], &img_a.attribute_buffers());
    assert_eq!(&buffers[2..4], &[AttributeBufferDesc::default(); 2]);
    assert_eq!(&buffers[4..6], &img_c.attribute_buffers());
    assert_eq!(buffers[6], AttributeBufferDesc::default());
    Ok(())
}

#[test]
pub fn reordered_sets_swap_dynamic_offsets() -> Result<()> {
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone(), set_layout.clone()])?;
    assert_eq!(layout.set_offsets(1).map(|offsets| offsets.dyn_ubo_offset), Some(1));

    let make_set = |buffer: &Buffer| {
        DescriptorSetBuilder::new(set_layout.clone())
            .bind_dynamic_uniform_buffer(0, BufferRange::new(buffer, 0, 64))
            .build()
    };
    let (buffer_a, buffer_b) = (Buffer::new(0x50_0000, 0x1000), Buffer::new(0x60_0000, 0x1000));
    let (a, b) = (make_set(&buffer_a)?, make_set(&buffer_b)?);

    let mut state = DescriptorState::default();
    state.bind_sets(&layout, 0, &[a.clone(), b.clone()], &[16, 32])?;
    assert_eq!(state.dynamic_uniform_buffers()[0], UniformBufferDesc::new(0x50_0010, 64));
    assert_eq!(state.dynamic_uniform_buffers()[1], UniformBufferDesc::new(0x60_0020, 64));

    state.bind_sets(&layout, 0, &[b, a], &[16, 32])?;
    assert_eq!(state.dynamic_uniform_buffers()[0], UniformBufferDesc::new(0x60_0010, 64));
    assert_eq!(state.dynamic_uniform_buffers()[1], UniformBufferDesc::new(0x50_0020, 64));
    Ok(())
}

#[test]
pub fn dynamic_ranges_stop_at_buffer_end() -> Result<()> {
    let set_layout = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 3),
            (1, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1),
        ],
        false,
    )?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let buffer = Buffer::new(0x70_0000, 0x100);

    let mut set = DescriptorSet::new(set_layout);
    set.write(
        0,
        0,
        &[
            Descriptor::UniformBufferDynamic(BufferRange::new(&buffer, 0x80, 0x100)),
            Descriptor::UniformBufferDynamic(BufferRange::whole(&buffer)),
            Descriptor::UniformBufferDynamic(BufferRange::new(&buffer, 0, 16)),
        ],
    )?;
    set.write(1, 0, &[Descriptor::StorageBufferDynamic(BufferRange::new(&buffer, 0x10, 0x1000))])?;

    let mut state = DescriptorState::default();
    state.bind_sets(&layout, 0, &[Arc::new(set)], &[0x40, 0x30, 0x100, 0x20])?;

    let ubos = state.dynamic_uniform_buffers();
    // 0x80 + 0x40 leaves 0x40 bytes, less than the 0x100 requested.
    assert_eq!(ubos[0], UniformBufferDesc::new(0x70_00c0, 0x40));
    assert_eq!(ubos[0].entries(), 4);
    assert_eq!(ubos[1], UniformBufferDesc::new(0x70_0030, 0xd0));
    assert!(ubos[2].is_null(), "A range starting at the end of the buffer is empty");
    assert_eq!(state.dynamic_storage_buffers()[0], SsboAddr::new(0x70_0030, 0xd0));
    Ok(())
}

#[test]
pub fn failed_bind_changes_nothing() -> Result<()> {
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let set = Arc::new(DescriptorSet::new(set_layout));

    let mut state = DescriptorState::default();
    let result = state.bind_sets(&layout, 0, &[set.clone()], &[]);
    assert!(framework::is_error(result, |err| matches!(
        err,
        Error::DynamicOffsetCountMismatch {
            expected: 1,
            got: 0
        }
    )));
    assert!(matches!(state.binding(0), Some(SetBinding::Unbound)));

    let result = state.bind_sets(&layout, 1, &[set.clone()], &[0]);
    assert!(framework::is_error(result, |err| matches!(err, Error::InvalidSetIndex(1))));
    assert!(state.set(0).is_none());

    state.bind_sets(&layout, 0, &[set], &[0])?;
    assert!(state.set(0).is_some());
    Ok(())
}

#[test]
pub fn storage_buffers_go_through_descriptor_ubo() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 1),
            (1, vk::DescriptorType::STORAGE_BUFFER, 2),
        ],
        false,
    )?;
    assert!(set_layout.has_desc_ubo());
    assert_eq!(set_layout.num_ubos, 2);
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;

    let ubo = Buffer::new(0x30_0000, 128);
    let ssbo = Buffer::new(0x40_0000, 0x2000);
    let mut set = DescriptorSet::new(set_layout.clone());
    set.write(0, 0, &[Descriptor::UniformBuffer(BufferRange::whole(&ubo))])?;
    set.write(
        1,
        0,
        &[
            Descriptor::StorageBuffer(BufferRange::new(&ssbo, 0, 0x1000)),
            Descriptor::StorageBuffer(BufferRange::new(&ssbo, 0x1000, vk::WHOLE_SIZE)),
        ],
    )?;

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[Arc::new(set)], &[])?;
    let table = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    let entries = cmd.desc_pool().read_array::<UniformBufferDesc>(table, 2).unwrap();
    assert_eq!(entries[0], UniformBufferDesc::new(0x30_0000, 128));

    let desc_ubo = entries[set_layout.desc_ubo_index() as usize];
    assert_eq!(desc_ubo.entries() * 16, set_layout.desc_ubo_size());
    let ssbos = cmd.desc_pool().read_array::<SsboAddr>(desc_ubo.address(), 2).unwrap();
    assert_eq!(ssbos[0], SsboAddr::new(0x40_0000, 0x1000));
    assert_eq!(ssbos[1], SsboAddr::new(0x40_1000, 0x1000));
    Ok(())
}

#[test]
pub fn sampler_table_starts_with_dummy() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::SAMPLER, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let sampler = Sampler::new(&SamplerInfo {
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        ..Default::default()
    });
    let set = DescriptorSetBuilder::new(set_layout).bind_sampler(0, &sampler).build()?;

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set], &[])?;
    let table = cmd.prepare_table(COMPUTE, TableKind::Samplers)?;
    let entries = cmd.desc_pool().read_array::<SamplerDesc>(table, 2).unwrap();
    assert_eq!(entries[0], SamplerDesc::dummy());
    assert_eq!(entries[1], sampler.desc());
    Ok(())
}

#[test]
pub fn empty_tables_are_null() -> Result<()> {
    let context = framework::make_context()?;
    let layout = framework::empty_layout()?;
    let mut cmd = compute_with_layout(&context, &layout)?;
    let allocations = cmd.desc_pool().allocation_count();
    for kind in TableKind::ALL {
        assert_eq!(cmd.prepare_table(COMPUTE, kind)?, 0);
    }
    assert_eq!(cmd.desc_pool().allocation_count(), allocations);
    Ok(())
}

#[test]
pub fn table_preparation_can_be_retried() -> Result<()> {
    let context = framework::make_context()?;
    let mut allocator = context.allocator.clone();
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout.clone()])?;
    let set = Arc::new(DescriptorSet::new(set_layout));

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.bind_descriptor_sets(COMPUTE, &layout, 0, &[set], &[])?;

    allocator.set_budget(Some(0));
    let result = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers);
    assert!(framework::is_error(result, |err| matches!(err, Error::OutOfMemory { pool: "desc", .. })));
    assert_eq!(cmd.status(), CommandBufferStatus::Recording);
    assert!(cmd.descriptor_state(COMPUTE)?.table_address(TableKind::UniformBuffers).is_none());

    allocator.set_budget(None);
    let table = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    assert_eq!(cmd.descriptor_state(COMPUTE)?.table_address(TableKind::UniformBuffers), Some(table));
    Ok(())
}

#[test]
pub fn prepare_table_needs_pipeline() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    let result = cmd.prepare_table(COMPUTE, TableKind::Textures);
    assert!(framework::is_error(result, |err| matches!(err, Error::NoPipelineBound(_))));
    assert_eq!(cmd.status(), CommandBufferStatus::Recording);
    Ok(())
}

#[test]
pub fn push_constants_invalidate_per_stage() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    let graphics = vk::PipelineBindPoint::GRAPHICS;

    cmd.prepare_push_uniforms(graphics)?;
    let compute = cmd.prepare_push_uniforms(COMPUTE)?;

    cmd.push_constants(vk::ShaderStageFlags::VERTEX, 0, &[1, 2, 3, 4])?;
    assert!(cmd.descriptor_state(graphics)?.push_uniforms_address().is_none());
    assert_eq!(cmd.descriptor_state(COMPUTE)?.push_uniforms_address(), Some(compute));

    cmd.push_constants(vk::ShaderStageFlags::COMPUTE, 4, &[5, 6, 7, 8])?;
    assert!(cmd.descriptor_state(COMPUTE)?.push_uniforms_address().is_none());
    assert_eq!(&cmd.push_constant_bytes()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);

    let blob = cmd.prepare_push_uniforms(COMPUTE)?;
    assert_eq!(cmd.desc_pool().read(blob, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    Ok(())
}

#[test]
pub fn push_constants_out_of_range() -> Result<()> {
    let context = framework::make_context()?;
    let mut cmd = framework::recording(&context)?;
    let result = cmd.push_constants(vk::ShaderStageFlags::ALL, 120, &[0; 16]);
    assert!(framework::is_error(result, |err| matches!(
        err,
        Error::PushConstantRange {
            offset: 120,
            end: 136,
            max: 128
        }
    )));

    let ranges = [(120, 16), (u32::MAX - 3, 8)];
    for (offset, size) in ranges {
        let result = PipelineLayout::new(&PipelineLayoutCreateInfo {
            set_layouts: vec![],
            push_constants: vec![PushConstantRange {
                stage_flags: vk::ShaderStageFlags::ALL,
                offset,
                size,
            }],
        });
        assert!(framework::is_error(result, |err| matches!(
            err,
            Error::PushConstantRange { offset: start, max: 128, .. } if *start == offset
        )));
    }
    Ok(())
}

#[test]
pub fn push_uniforms_carry_compute_sysvals() -> Result<()> {
    let context = framework::make_context()?;
    let layout = framework::empty_layout()?;
    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.push_constants(vk::ShaderStageFlags::COMPUTE, 0, &42u32.to_le_bytes())?;
    cmd.dispatch(2, 3, 4)?;

    let blob = cmd.descriptor_state(COMPUTE)?.push_uniforms_address().unwrap();
    assert_eq!(cmd.desc_pool().read_pod::<u32>(blob), Some(42));
    let sysvals = cmd.desc_pool().read_pod::<ComputeSysvals>(blob + SYSVALS_OFFSET).unwrap();
    assert_eq!(sysvals.num_work_groups, [2, 3, 4]);
    assert_eq!(sysvals.local_group_size, [8, 4, 1]);
    assert_eq!(&sysvals, cmd.compute_sysvals());
    Ok(())
}

#[test]
pub fn push_descriptors() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 1)], true)?;
    let layout = framework::pipeline_layout(vec![set_layout])?;
    let buffer = Buffer::new(0x50_0000, 64);

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.push_descriptor_set(
        COMPUTE,
        &layout,
        0,
        &[DescriptorWrite::new(0, Descriptor::UniformBuffer(BufferRange::whole(&buffer)))],
    )?;
    let state = cmd.descriptor_state(COMPUTE)?;
    assert!(matches!(state.binding(0), Some(SetBinding::Pushed)));
    assert_eq!(state.set(0).unwrap().ubos()[0], UniformBufferDesc::new(0x50_0000, 64));

    let table = cmd.prepare_table(COMPUTE, TableKind::UniformBuffers)?;
    assert_eq!(
        cmd.desc_pool().read_pod::<UniformBufferDesc>(table),
        Some(UniformBufferDesc::new(0x50_0000, 64))
    );

    // A write that fails leaves the pushed set as it was.
    let result = cmd.push_descriptor_set(
        COMPUTE,
        &layout,
        0,
        &[DescriptorWrite::new(0, Descriptor::StorageBuffer(BufferRange::whole(&buffer)))],
    );
    assert!(framework::is_error(result, |err| matches!(err, Error::DescriptorTypeMismatch { binding: 0, .. })));
    let state = cmd.descriptor_state(COMPUTE)?;
    assert_eq!(state.set(0).unwrap().ubos()[0], UniformBufferDesc::new(0x50_0000, 64));
    Ok(())
}

#[test]
pub fn push_requires_push_layout() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 1)], false)?;
    let layout = framework::pipeline_layout(vec![set_layout])?;
    let buffer = Buffer::new(0x50_0000, 64);

    let mut cmd = compute_with_layout(&context, &layout)?;
    let result = cmd.push_descriptor_set(
        COMPUTE,
        &layout,
        0,
        &[DescriptorWrite::new(0, Descriptor::UniformBuffer(BufferRange::whole(&buffer)))],
    );
    assert!(framework::is_error(result, |err| matches!(err, Error::NotPushDescriptorLayout(0))));
    assert_eq!(cmd.status(), CommandBufferStatus::Invalid);
    Ok(())
}

#[test]
pub fn push_with_template() -> Result<()> {
    let context = framework::make_context()?;
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 2)], true)?;
    let layout = framework::pipeline_layout(vec![set_layout])?;
    let first = Buffer::new(0x60_0000, 32);
    let second = Buffer::new(0x70_0000, 48);
    let filler = Descriptor::Sampler(Sampler::new(&SamplerInfo::default()));

    let template = DescriptorUpdateTemplate::new(vec![DescriptorUpdateTemplateEntry {
        binding: 0,
        array_element: 0,
        count: 2,
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        offset: 1,
        stride: 2,
    }]);
    let data = [
        filler.clone(),
        Descriptor::UniformBuffer(BufferRange::whole(&first)),
        filler,
        Descriptor::UniformBuffer(BufferRange::whole(&second)),
    ];

    let mut cmd = compute_with_layout(&context, &layout)?;
    cmd.push_descriptor_set_with_template(&template, COMPUTE, &layout, 0, &data)?;
    let set = cmd.descriptor_state(COMPUTE)?.set(0).unwrap();
    assert_eq!(set.ubos(), &[UniformBufferDesc::new(0x60_0000, 32), UniformBufferDesc::new(0x70_0000, 48)]);

    // Reading past the end of the data array fails.
    let result = cmd.push_descriptor_set_with_template(&template, COMPUTE, &layout, 0, &data[..2]);
    assert!(result.is_err());
    Ok(())
}

#[test]
pub fn write_errors() -> Result<()> {
    let set_layout = framework::set_layout(&[(0, vk::DescriptorType::UNIFORM_BUFFER, 1)], false)?;
    let buffer = Buffer::new(0x10_0000, 64);
    let ubo = Descriptor::UniformBuffer(BufferRange::whole(&buffer));
    let mut set = DescriptorSet::new(set_layout);

    assert!(framework::is_error(set.write(5, 0, &[ubo.clone()]), |err| matches!(err, Error::NoBinding(5))));
    assert!(framework::is_error(set.write(0, 0, &[ubo.clone(), ubo.clone()]), |err| matches!(
        err,
        Error::DescriptorOutOfRange(0)
    )));
    assert!(framework::is_error(
        set.write(0, 0, &[Descriptor::StorageBuffer(BufferRange::whole(&buffer))]),
        |err| matches!(
            err,
            Error::DescriptorTypeMismatch {
                binding: 0,
                expected: vk::DescriptorType::UNIFORM_BUFFER
            }
        )
    ));
    assert!(set.ubos()[0].is_null());

    set.write(0, 0, &[ubo])?;
    assert!(!set.ubos()[0].is_null());
    Ok(())
}

#[test]
pub fn layout_rejects_unsupported_types() -> Result<()> {
    let result = framework::set_layout(&[(0, vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1)], false);
    assert!(framework::is_error(result, |err| matches!(err, Error::UnsupportedDescriptorType(_))));
    let result = framework::set_layout(
        &[
            (0, vk::DescriptorType::UNIFORM_BUFFER, 1),
            (0, vk::DescriptorType::SAMPLER, 1),
        ],
        false,
    );
    assert!(result.is_err());
    Ok(())
}
