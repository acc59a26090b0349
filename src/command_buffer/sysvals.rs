//! System values: shader inputs computed by the command buffer and passed in the second half of the push
//! uniform blob. Their layout is fixed by the shader compiler.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// System values read by graphics shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct GraphicsSysvals {
    /// Viewport scale, half width, half height and depth range.
    pub viewport_scale: [f32; 3],
    /// First vertex of the draw.
    pub first_vertex: u32,
    /// Viewport offset, center x, center y and minimum depth.
    pub viewport_offset: [f32; 3],
    /// Vertex offset of indexed draws, zero otherwise.
    pub base_vertex: i32,
    /// Blend constants, clamped to `[0, 1]`.
    pub blend_constants: [f32; 4],
    /// First instance of the draw.
    pub base_instance: u32,
    /// Must be zero.
    pub reserved: [u32; 3],
}

impl GraphicsSysvals {
    /// Set the draw parameters. Returns whether anything changed.
    pub fn set_draw_params(&mut self, first_vertex: u32, base_vertex: i32, base_instance: u32) -> bool {
        let changed =
            self.first_vertex != first_vertex || self.base_vertex != base_vertex || self.base_instance != base_instance;
        self.first_vertex = first_vertex;
        self.base_vertex = base_vertex;
        self.base_instance = base_instance;
        changed
    }

    /// Set the viewport transform. Returns whether anything changed.
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) -> bool {
        let half_width = 0.5 * viewport.width;
        let half_height = 0.5 * viewport.height;
        let scale = [half_width, half_height, viewport.max_depth - viewport.min_depth];
        let offset = [viewport.x + half_width, viewport.y + half_height, viewport.min_depth];
        let changed = self.viewport_scale != scale || self.viewport_offset != offset;
        self.viewport_scale = scale;
        self.viewport_offset = offset;
        changed
    }

    /// Set the blend constants. Returns whether anything changed.
    pub fn set_blend_constants(&mut self, constants: [f32; 4]) -> bool {
        let clamped = constants.map(|c| c.clamp(0.0, 1.0));
        let changed = self.blend_constants != clamped;
        self.blend_constants = clamped;
        changed
    }
}

/// System values read by compute shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ComputeSysvals {
    /// Workgroup count of the dispatch.
    pub num_work_groups: [u32; 3],
    /// Must be zero.
    pub reserved0: u32,
    /// Workgroup size of the pipeline.
    pub local_group_size: [u32; 3],
    /// Must be zero.
    pub reserved1: u32,
}

const_assert_eq!(std::mem::size_of::<GraphicsSysvals>(), 64);
const_assert_eq!(std::mem::size_of::<ComputeSysvals>(), 32);

