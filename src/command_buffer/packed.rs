//! Fixed-layout hardware descriptors emitted by the batch builder: job headers and payloads, framebuffer and
//! tiler descriptors, thread storage, viewports and fragment renderer state.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Alignment of every job descriptor.
pub const JOB_ALIGN: u64 = 64;
/// Alignment of framebuffer descriptors and their extensions.
pub const FRAMEBUFFER_ALIGN: u64 = 64;
/// Alignment of the remaining descriptors.
pub const DESC_ALIGN: u64 = 32;

/// Hardware job type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobType {
    /// Placeholder job doing nothing.
    Null = 1,
    /// Compute job.
    Compute = 4,
    /// Vertex shading job.
    Vertex = 5,
    /// Tiler job, bins the primitives of a draw.
    Tiler = 7,
    /// Fragment job, shades every tile of a framebuffer.
    Fragment = 9,
}

impl JobType {
    /// Decode a raw job type.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(JobType::Null),
            4 => Some(JobType::Compute),
            5 => Some(JobType::Vertex),
            7 => Some(JobType::Tiler),
            9 => Some(JobType::Fragment),
            _ => None,
        }
    }
}

/// Job header flag: wait for every previous job of the chain.
pub const JOB_BARRIER: u8 = 1 << 0;
/// Job header flag: do not prefetch the next job.
pub const JOB_SUPPRESS_PREFETCH: u8 = 1 << 1;

/// Header at the start of every job. Jobs form a singly linked list through `next`, and order among themselves
/// through up to two dependency indices.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct JobHeader {
    /// Written by the GPU.
    pub exception_status: u32,
    /// Written by the GPU.
    pub first_incomplete_task: u32,
    /// Written by the GPU.
    pub fault_pointer: u64,
    /// Raw [`JobType`].
    pub job_type: u8,
    /// `JOB_*` flags.
    pub flags: u8,
    /// Index of this job in its chain, starting at one.
    pub index: u16,
    /// First dependency, zero for none.
    pub dependency_1: u16,
    /// Second dependency, zero for none.
    pub dependency_2: u16,
    /// GPU address of the next job, zero for the last job.
    pub next: u64,
}

/// Size of the job header. Payloads start right after it.
pub const JOB_HEADER_SIZE: u64 = std::mem::size_of::<JobHeader>() as u64;

/// Number of invocations of a job, as workgroup count times local size.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct InvocationDesc {
    /// Local size in each dimension.
    pub local_size: [u16; 3],
    /// Log2 of the number of invocations per task.
    pub task_split: u16,
    /// Workgroup count in each dimension.
    pub count: [u32; 3],
    /// Must be zero.
    pub reserved: u32,
}

impl InvocationDesc {
    /// Pack `count` workgroups of `local_size` invocations.
    pub fn new(count: [u32; 3], local_size: [u32; 3]) -> Self {
        Self {
            local_size: local_size.map(|size| size.min(u16::MAX as u32) as u16),
            task_split: 0,
            count,
            reserved: 0,
        }
    }

    /// Total number of invocations.
    pub fn invocations(&self) -> u64 {
        self.count
            .iter()
            .zip(self.local_size.iter())
            .map(|(&count, &size)| count as u64 * size as u64)
            .product()
    }
}

/// Draw flag: counter-clockwise triangles are front facing.
pub const DRAW_FRONT_FACE_CCW: u32 = 1 << 0;
/// Draw flag: cull front facing triangles.
pub const DRAW_CULL_FRONT: u32 = 1 << 1;
/// Draw flag: cull back facing triangles.
pub const DRAW_CULL_BACK: u32 = 1 << 2;

/// Resources of a shader stage. Shared by vertex, tiler and compute jobs.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawDesc {
    /// Invocation count.
    pub invocation: InvocationDesc,
    /// First vertex index.
    pub offset_start: u32,
    /// Padded vertex count for instanced draws, one otherwise.
    pub instance_size: u32,
    /// `DRAW_*` flags.
    pub flags: u32,
    /// Must be zero.
    pub reserved: u32,
    /// Shader binary (vertex, compute) or renderer state descriptor (tiler).
    pub state: u64,
    /// Attribute table.
    pub attributes: u64,
    /// Attribute buffer table.
    pub attribute_buffers: u64,
    /// Varying table.
    pub varyings: u64,
    /// Varying buffer table.
    pub varying_buffers: u64,
    /// Local storage descriptor.
    pub thread_storage: u64,
    /// Uniform buffer table.
    pub uniform_buffers: u64,
    /// Push uniform blob.
    pub push_uniforms: u64,
    /// Texture table.
    pub textures: u64,
    /// Sampler table.
    pub samplers: u64,
    /// Position varying buffer (tiler only).
    pub position: u64,
    /// Viewport descriptor (tiler only).
    pub viewport: u64,
}

/// Payload of vertex and compute jobs.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ComputeJobPayload {
    /// Shader resources.
    pub draw: DrawDesc,
    /// Log2 of the number of invocations handed to a core at once.
    pub job_task_split: u32,
    /// Must be zero.
    pub reserved: u32,
}

/// Primitive flag: restart index is implicit (all ones).
pub const PRIMITIVE_RESTART: u32 = 1 << 0;
/// Primitive flag: the provoking vertex is the first vertex.
pub const PRIMITIVE_FIRST_PROVOKING_VERTEX: u32 = 1 << 1;
/// Primitive flag: point sizes are read from an array.
pub const PRIMITIVE_POINT_SIZE_ARRAY: u32 = 1 << 2;

/// Hardware draw modes.
pub mod draw_mode {
    /// Points.
    pub const POINTS: u32 = 1;
    /// Lines.
    pub const LINES: u32 = 2;
    /// Line strip.
    pub const LINE_STRIP: u32 = 4;
    /// Triangles.
    pub const TRIANGLES: u32 = 8;
    /// Triangle strip.
    pub const TRIANGLE_STRIP: u32 = 10;
    /// Triangle fan.
    pub const TRIANGLE_FAN: u32 = 12;
}

/// Hardware draw mode of a topology, `None` if the tiler cannot consume it.
pub fn draw_mode(topology: vk::PrimitiveTopology) -> Option<u32> {
    match topology {
        vk::PrimitiveTopology::POINT_LIST => Some(draw_mode::POINTS),
        vk::PrimitiveTopology::LINE_LIST => Some(draw_mode::LINES),
        vk::PrimitiveTopology::LINE_STRIP => Some(draw_mode::LINE_STRIP),
        vk::PrimitiveTopology::TRIANGLE_LIST => Some(draw_mode::TRIANGLES),
        vk::PrimitiveTopology::TRIANGLE_STRIP => Some(draw_mode::TRIANGLE_STRIP),
        vk::PrimitiveTopology::TRIANGLE_FAN => Some(draw_mode::TRIANGLE_FAN),
        _ => None,
    }
}

/// Hardware index type of an index size in bits.
pub fn index_type(index_size: u32) -> u32 {
    match index_size {
        8 => 1,
        16 => 2,
        32 => 3,
        _ => 0,
    }
}

/// Primitive assembly state of a tiler job.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct PrimitiveDesc {
    /// One of the [`draw_mode`] constants.
    pub draw_mode: u32,
    /// Index type, zero for non-indexed draws.
    pub index_type: u32,
    /// GPU address of the first index.
    pub indices: u64,
    /// Number of indices, or vertices for non-indexed draws.
    pub index_count: u32,
    /// Added to every index, relative to `offset_start`.
    pub base_vertex_offset: i32,
    /// `PRIMITIVE_*` flags.
    pub flags: u32,
    /// Log2 of the number of primitives handed to the tiler at once.
    pub job_task_split: u32,
    /// Line width or point size when no size array is used.
    pub constant_size: f32,
    /// Must be zero.
    pub reserved: u32,
    /// Point size varying buffer.
    pub size_array: u64,
}

/// Payload of tiler jobs.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct TilerJobPayload {
    /// Fragment stage resources and the position buffer.
    pub draw: DrawDesc,
    /// Primitive assembly state.
    pub primitive: PrimitiveDesc,
    /// Tiler context the primitives are binned into.
    pub tiler_context: u64,
}

/// Payload of fragment jobs. Bounds are in tiles.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentJobPayload {
    /// First tile column.
    pub bound_min_x: u16,
    /// First tile row.
    pub bound_min_y: u16,
    /// Last tile column.
    pub bound_max_x: u16,
    /// Last tile row.
    pub bound_max_y: u16,
    /// Framebuffer descriptor of the rendered layer.
    pub framebuffer: u64,
}

/// Thread-local and workgroup-local storage of a batch.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LocalStorageDesc {
    /// Per-thread stack size in bytes, zero if unused.
    pub tls_size: u32,
    /// Number of workgroup-local storage instances.
    pub wls_instances: u32,
    /// Base of the stack memory.
    pub tls_base: u64,
    /// Base of the workgroup-local memory.
    pub wls_base: u64,
    /// Workgroup-local storage size of one instance.
    pub wls_size: u32,
    /// Must be zero.
    pub reserved: u32,
}

/// Framebuffer flag: a ZS/CRC extension follows the framebuffer descriptor.
pub const FBD_HAS_ZS_EXT: u32 = 1 << 0;
/// Framebuffer flag: depth is cleared.
pub const FBD_Z_CLEAR: u32 = 1 << 1;
/// Framebuffer flag: stencil is cleared.
pub const FBD_S_CLEAR: u32 = 1 << 2;
/// Framebuffer flag: depth is preloaded into the tile buffer.
pub const FBD_Z_PRELOAD: u32 = 1 << 3;
/// Framebuffer flag: stencil is preloaded into the tile buffer.
pub const FBD_S_PRELOAD: u32 = 1 << 4;

/// Framebuffer descriptor of one layer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FramebufferDesc {
    /// Thread storage, shared with the fragment shaders.
    pub local_storage: LocalStorageDesc,
    /// Sample position table.
    pub sample_locations: u64,
    /// Tiler context of this layer.
    pub tiler: u64,
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Last pixel column.
    pub bound_max_x: u16,
    /// Last pixel row.
    pub bound_max_y: u16,
    /// Samples per pixel.
    pub sample_count: u32,
    /// Number of render target descriptors following.
    pub render_target_count: u32,
    /// `FBD_*` flags.
    pub flags: u32,
    /// Tile buffer budget in bytes.
    pub tile_buffer_budget: u32,
    /// Layer index.
    pub layer: u32,
    /// Must be zero.
    pub reserved: u32,
}

/// Depth/stencil and CRC extension of a framebuffer descriptor.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ZsCrcExtDesc {
    /// Depth (or combined depth/stencil) surface.
    pub zs_base: u64,
    /// Separate stencil surface.
    pub s_base: u64,
    /// Row stride of the depth surface.
    pub zs_row_stride: u32,
    /// Row stride of the stencil surface.
    pub s_row_stride: u32,
    /// Hardware format of the depth surface.
    pub zs_format: u32,
    /// Depth clear value.
    pub clear_depth: f32,
    /// Stencil clear value.
    pub clear_stencil: u32,
    /// Must be zero.
    pub reserved: u32,
}

/// Render target flag: the target is cleared.
pub const RT_CLEAR: u32 = 1 << 0;
/// Render target flag: the target is preloaded into the tile buffer.
pub const RT_PRELOAD: u32 = 1 << 1;
/// Render target flag: the target is written back.
pub const RT_WRITE_ENABLE: u32 = 1 << 2;

/// Render target descriptor.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct RenderTargetDesc {
    /// Surface address.
    pub base: u64,
    /// Row stride.
    pub row_stride: u32,
    /// Hardware format.
    pub format: u32,
    /// Clear color.
    pub clear: [f32; 4],
    /// `RT_*` flags.
    pub flags: u32,
    /// Offset of this target in the tile buffer.
    pub internal_buffer_offset: u32,
}

/// Device-wide tiler heap as seen by one batch.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TilerHeapDesc {
    /// Heap size.
    pub size: u32,
    /// Must be zero.
    pub reserved: u32,
    /// Heap base.
    pub base: u64,
    /// Current bottom of the heap.
    pub bottom: u64,
    /// End of the heap.
    pub top: u64,
}

/// Tiler context of one layer.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TilerContextDesc {
    /// Enabled bin hierarchy levels.
    pub hierarchy_mask: u32,
    /// Sample pattern.
    pub sample_pattern: u32,
    /// Framebuffer width.
    pub fb_width: u16,
    /// Framebuffer height.
    pub fb_height: u16,
    /// Layer index.
    pub layer: u32,
    /// Tiler heap descriptor.
    pub heap: u64,
    /// Must be zero.
    pub reserved: u64,
}

/// Viewport and scissor, intersected.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ViewportDesc {
    /// First pixel column.
    pub scissor_min_x: u16,
    /// First pixel row.
    pub scissor_min_y: u16,
    /// Last pixel column.
    pub scissor_max_x: u16,
    /// Last pixel row.
    pub scissor_max_y: u16,
    /// Minimum depth.
    pub min_depth: f32,
    /// Maximum depth.
    pub max_depth: f32,
}

/// Renderer state flag: the fragment shader runs.
pub const RSD_SHADER_ENABLED: u32 = 1 << 0;
/// Renderer state flag: depth test enabled.
pub const RSD_DEPTH_TEST: u32 = 1 << 1;
/// Renderer state flag: depth write enabled.
pub const RSD_DEPTH_WRITE: u32 = 1 << 2;
/// Renderer state flag: rasterizer discard, nothing is shaded.
pub const RSD_RASTERIZER_DISCARD: u32 = 1 << 3;

/// Fragment renderer state descriptor.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct RendererStateDesc {
    /// Fragment shader binary, zero if the shader does not run.
    pub shader: u64,
    /// `RSD_*` flags.
    pub flags: u32,
    /// Number of render targets.
    pub rt_count: u32,
    /// Blend constants.
    pub blend_constants: [f32; 4],
    /// Depth compare function.
    pub depth_func: u32,
    /// Color write masks, 4 bits per render target.
    pub rt_write_masks: u32,
    /// Must be zero.
    pub reserved: [u32; 2],
}

const_assert_eq!(std::mem::size_of::<JobHeader>(), 32);
const_assert_eq!(std::mem::size_of::<InvocationDesc>(), 24);
const_assert_eq!(std::mem::size_of::<DrawDesc>(), 136);
const_assert_eq!(std::mem::size_of::<ComputeJobPayload>(), 144);
const_assert_eq!(std::mem::size_of::<PrimitiveDesc>(), 48);
const_assert_eq!(std::mem::size_of::<TilerJobPayload>(), 192);
const_assert_eq!(std::mem::size_of::<FragmentJobPayload>(), 16);
const_assert_eq!(std::mem::size_of::<LocalStorageDesc>(), 32);
const_assert_eq!(std::mem::size_of::<FramebufferDesc>(), 80);
const_assert_eq!(std::mem::size_of::<ZsCrcExtDesc>(), 40);
const_assert_eq!(std::mem::size_of::<RenderTargetDesc>(), 40);
const_assert_eq!(std::mem::size_of::<TilerHeapDesc>(), 32);
const_assert_eq!(std::mem::size_of::<TilerContextDesc>(), 32);
const_assert_eq!(std::mem::size_of::<ViewportDesc>(), 16);
const_assert_eq!(std::mem::size_of::<RendererStateDesc>(), 48);
