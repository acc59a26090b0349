//! Recording state of a command buffer: rendering targets, dynamic state, vertex input bindings and the per
//! bind point descriptor state.

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::command_buffer::sysvals::{ComputeSysvals, GraphicsSysvals};
use crate::descriptor::state::DescriptorState;
use crate::pipeline::builder::GraphicsPipeline;
use crate::pipeline::compute::ComputePipeline;
use crate::resource::buffer::Buffer;
use crate::resource::image::ImageView;
use crate::util::cached::Cached;

/// Maximum number of vertex buffer bindings.
pub const MAX_VBS: usize = 16;
/// Maximum number of color attachments.
pub const MAX_RTS: usize = 8;
/// Buffer objects of the attachments of a render pass: every color target, depth and a separate stencil.
pub type AttachmentBos = SmallVec<[u64; MAX_RTS + 2]>;

/// Maximum number of vertex attributes. Image attributes are placed after them.
pub const MAX_VS_ATTRIBS: usize = 16;

/// Clear value of an attachment.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClearValue {
    /// Clear color of a color attachment.
    Color([f32; 4]),
    /// Clear values of a depth/stencil attachment.
    DepthStencil {
        /// Depth clear value.
        depth: f32,
        /// Stencil clear value.
        stencil: u32,
    },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0; 4])
    }
}

/// One attachment of a render pass.
#[derive(Debug, Clone)]
pub struct RenderingAttachmentInfo {
    /// Attachment view.
    pub image_view: ImageView,
    /// What happens to the attachment contents at the start of the render pass.
    pub load_op: vk::AttachmentLoadOp,
    /// Clear value, used when `load_op` is `CLEAR`.
    pub clear_value: ClearValue,
}

/// Parameters of [`CommandBuffer::begin_rendering`](crate::CommandBuffer::begin_rendering).
#[derive(Debug, Clone, Default)]
pub struct RenderingInfo {
    /// Rendered area.
    pub render_area: vk::Rect2D,
    /// Number of layers rendered.
    pub layer_count: u32,
    /// Color attachments, indexed by render target. `None` leaves a hole.
    pub color_attachments: Vec<Option<RenderingAttachmentInfo>>,
    /// Depth attachment.
    pub depth_attachment: Option<RenderingAttachmentInfo>,
    /// Stencil attachment. Ignored if it is the same view as the depth attachment.
    pub stencil_attachment: Option<RenderingAttachmentInfo>,
}

/// State of one render target.
#[derive(Debug, Clone, Default)]
pub struct RenderTargetState {
    /// Attached view.
    pub view: Option<ImageView>,
    /// Clear the target at the start of the next batch.
    pub clear: bool,
    /// Load the target contents into the tile buffer at the start of the next batch.
    pub preload: bool,
    /// Clear color.
    pub clear_value: [f32; 4],
}

/// The framebuffer being rendered to.
#[derive(Debug, Clone, Default)]
pub struct FramebufferInfo {
    /// Render area of the render pass.
    pub render_area: vk::Rect2D,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of layers.
    pub layer_count: u32,
    /// Samples per pixel.
    pub nr_samples: u32,
    /// Number of render target slots, holes included.
    pub rt_count: u32,
    /// Render targets.
    pub rts: [RenderTargetState; MAX_RTS],
    /// Depth (or combined depth/stencil) view.
    pub zs_view: Option<ImageView>,
    /// Separate stencil view.
    pub s_view: Option<ImageView>,
    /// Clear depth at the start of the next batch.
    pub z_clear: bool,
    /// Clear stencil at the start of the next batch.
    pub s_clear: bool,
    /// Preload depth at the start of the next batch.
    pub z_preload: bool,
    /// Preload stencil at the start of the next batch.
    pub s_preload: bool,
    /// Depth clear value.
    pub clear_depth: f32,
    /// Stencil clear value.
    pub clear_stencil: u32,
    /// Buffer objects of every attachment.
    pub bos: AttachmentBos,
    /// Tile buffer budget in bytes.
    pub tile_buf_budget: u32,
    /// Whether a render pass is active.
    pub in_render_pass: bool,
}

impl FramebufferInfo {
    /// Whether any attachment is cleared by the next batch.
    pub fn has_clear(&self) -> bool {
        self.z_clear || self.s_clear || self.rts.iter().any(|rt| rt.clear)
    }

    /// Once a batch rendering to this framebuffer is closed, the next one has to start from the contents it
    /// left behind. Every clear is turned into a preload.
    pub(crate) fn preload_after_split(&mut self) {
        for rt in self.rts.iter_mut().filter(|rt| rt.view.is_some()) {
            rt.clear = false;
            rt.preload = true;
        }

        if self.zs_view.is_some() {
            self.z_clear = false;
            self.z_preload = true;
        }

        let zs_has_stencil = self.zs_view.as_ref().map(ImageView::is_depth_stencil).unwrap_or_default();
        if self.s_view.is_some() || zs_has_stencil {
            self.s_clear = false;
            self.s_preload = true;
        }
    }

    /// Sample pattern index of the sample count.
    pub fn sample_pattern(&self) -> u32 {
        match self.nr_samples {
            16 => 3,
            8 => 2,
            4 => 1,
            _ => 0,
        }
    }
}

/// Graphics state that can be set by commands as well as by the bound pipeline.
#[derive(Debug, Clone)]
pub struct DynamicState {
    /// Viewport.
    pub viewport: vk::Viewport,
    /// Scissor rectangle.
    pub scissor: vk::Rect2D,
    /// Blend constants.
    pub blend_constants: [f32; 4],
    /// Primitive topology.
    pub topology: vk::PrimitiveTopology,
    /// Primitive restart.
    pub primitive_restart: bool,
    /// Rasterizer discard.
    pub rasterizer_discard: bool,
    /// Line width.
    pub line_width: f32,
    /// Face culling.
    pub cull_mode: vk::CullModeFlags,
    /// Front face winding.
    pub front_face: vk::FrontFace,
}

impl Default for DynamicState {
    fn default() -> Self {
        Self {
            viewport: vk::Viewport::default(),
            scissor: vk::Rect2D::default(),
            blend_constants: [0.0; 4],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            rasterizer_discard: false,
            line_width: 1.0,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Which derived descriptors must be rebuilt before the next draw.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// The viewport changed.
    pub viewport: bool,
    /// The scissor changed.
    pub scissor: bool,
    /// The blend constants changed.
    pub blend_constants: bool,
}

impl DirtyFlags {
    /// Everything dirty.
    pub fn all() -> Self {
        Self {
            viewport: true,
            scissor: true,
            blend_constants: true,
        }
    }
}

/// A bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferBinding {
    /// Buffer.
    pub buffer: Buffer,
    /// Offset of the first element.
    pub offset: u64,
}

impl VertexBufferBinding {
    /// GPU address of the first element.
    pub fn address(&self) -> u64 {
        self.buffer.address_at(self.offset)
    }

    /// Bytes accessible from the first element.
    pub fn size(&self) -> u64 {
        self.buffer.range(self.offset, vk::WHOLE_SIZE)
    }
}

/// The bound index buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBufferBinding {
    /// Buffer.
    pub buffer: Buffer,
    /// Offset of the first index.
    pub offset: u64,
    /// Index size in bits.
    pub index_size: u32,
}

/// GPU addresses of the vertex attribute tables.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct VertexAttributeTables {
    /// Attribute buffer table.
    pub buffers: u64,
    /// Attribute table.
    pub attributes: u64,
}

/// Instancing parameters the vertex attribute tables were built for.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) struct VertexAttributeKey {
    pub first_instance: u32,
    pub instanced: bool,
}

/// Graphics bind point state.
#[derive(Debug, Default)]
pub struct GraphicsState {
    pub(crate) pipeline: Option<Arc<GraphicsPipeline>>,
    pub(crate) desc_state: DescriptorState,
    pub(crate) vbs: [Option<VertexBufferBinding>; MAX_VBS],
    pub(crate) ib: Option<IndexBufferBinding>,
    pub(crate) dynamic: DynamicState,
    pub(crate) dirty: DirtyFlags,
    pub(crate) fb: FramebufferInfo,
    pub(crate) sysvals: GraphicsSysvals,
    pub(crate) fs_rsd: Cached<u64>,
    pub(crate) viewport_desc: Cached<u64>,
    pub(crate) vs_attribs: Cached<VertexAttributeTables>,
    pub(crate) vs_attrib_key: VertexAttributeKey,
}

impl GraphicsState {
    /// Drop every descriptor derived from the vertex input bindings.
    pub(crate) fn invalidate_vs_attribs(&mut self) {
        self.vs_attribs.invalidate();
    }
}

/// Compute bind point state.
#[derive(Debug, Default)]
pub struct ComputeState {
    pub(crate) pipeline: Option<Arc<ComputePipeline>>,
    pub(crate) desc_state: DescriptorState,
    pub(crate) sysvals: ComputeSysvals,
}
