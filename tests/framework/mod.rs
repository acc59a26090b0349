#![allow(dead_code)]

use anyhow::Result;

use panbatch::prelude::*;

#[derive(Debug)]
pub struct Context {
    pub pool: CommandPool,
    pub allocator: HostAllocator,
    pub device: Device,
}

/// Creates a command pool backed by host memory, ready for automated tests
pub fn make_context() -> Result<Context> {
    make_context_with_settings(|settings| settings)
}

pub fn make_context_with_settings<F: FnOnce(CommandPoolBuilder) -> CommandPoolBuilder>(
    callback: F,
) -> Result<Context> {
    let _ = pretty_env_logger::try_init();
    let device = DeviceBuilder::new().build()?;
    let allocator = HostAllocator::new();
    let settings = callback(CommandPoolBuilder::new().name("panbatch test framework")).build();
    let pool = CommandPool::new(device.clone(), allocator.clone(), settings)?;
    Ok(Context {
        pool,
        allocator,
        device,
    })
}

/// A command buffer that already called `begin()`
pub fn recording(context: &Context) -> Result<CommandBuffer> {
    let mut cmd = context.pool.allocate();
    cmd.begin()?;
    Ok(cmd)
}

pub fn color_target(width: u32, height: u32) -> ImageView {
    ImageView::new(ImageViewInfo {
        address: 0x8000_0000,
        extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
        ..Default::default()
    })
}

pub fn render_to(view: &ImageView, load_op: vk::AttachmentLoadOp) -> RenderingInfo {
    let extent = view.extent();
    RenderingInfo {
        render_area: vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D {
                width: extent.width,
                height: extent.height,
            },
        },
        layer_count: 1,
        color_attachments: vec![Some(RenderingAttachmentInfo {
            image_view: view.clone(),
            load_op,
            clear_value: ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
        })],
        depth_attachment: None,
        stencil_attachment: None,
    }
}

/// Graphics pipeline with a position-writing vertex shader, one color attachment and dynamic viewport and scissor
pub fn triangle_pipeline(layout: Arc<PipelineLayout>) -> Result<Arc<GraphicsPipeline>> {
    triangle_pipeline_with(layout, |builder| builder)
}

pub fn triangle_pipeline_with<F: FnOnce(PipelineBuilder) -> PipelineBuilder>(
    layout: Arc<PipelineLayout>,
    callback: F,
) -> Result<Arc<GraphicsPipeline>> {
    let builder = PipelineBuilder::new("triangle")
        .layout(layout)
        .vertex_shader(ShaderInfo::new(0x1000).writes_position(16))
        .fragment_shader(ShaderInfo::new(0x2000))
        .dynamic_states(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR])
        .blend_attachment_write_all();
    callback(builder).build()
}

pub fn compute_pipeline(layout: Arc<PipelineLayout>, shader: ShaderInfo) -> Result<Arc<ComputePipeline>> {
    ComputePipelineBuilder::new("compute")
        .layout(layout)
        .set_shader(shader)
        .local_size(8, 4, 1)
        .build()
}

pub fn empty_layout() -> Result<Arc<PipelineLayout>> {
    PipelineLayout::new(&PipelineLayoutCreateInfo::default())
}

pub fn set_layout(bindings: &[(u32, vk::DescriptorType, u32)], push_descriptor: bool) -> Result<Arc<DescriptorSetLayout>> {
    DescriptorSetLayout::new(&DescriptorSetLayoutCreateInfo {
        bindings: bindings
            .iter()
            .map(|&(binding, ty, count)| DescriptorSetLayoutBinding {
                binding,
                ty,
                count,
                stages: vk::ShaderStageFlags::ALL,
            })
            .collect(),
        push_descriptor,
    })
}

pub fn pipeline_layout(set_layouts: Vec<Arc<DescriptorSetLayout>>) -> Result<Arc<PipelineLayout>> {
    PipelineLayout::new(&PipelineLayoutCreateInfo {
        set_layouts,
        push_constants: vec![PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL,
            offset: 0,
            size: 128,
        }],
    })
}

/// Begin rendering to a fresh 64x64 target with a triangle pipeline bound and the viewport covering the target
pub fn begin_triangle_pass(cmd: &mut CommandBuffer, load_op: vk::AttachmentLoadOp) -> Result<()> {
    let target = color_target(64, 64);
    let pipeline = triangle_pipeline(empty_layout()?)?;
    cmd.begin_rendering(&render_to(&target, load_op))?
        .bind_pipeline(&Pipeline::Graphics(pipeline))?
        .full_viewport_scissor()?;
    Ok(())
}

pub fn is_error(result: Result<impl Sized>, check: impl FnOnce(&Error) -> bool) -> bool {
    match result {
        Ok(_) => false,
        Err(err) => err.downcast_ref::<Error>().map(check).unwrap_or(false),
    }
}
