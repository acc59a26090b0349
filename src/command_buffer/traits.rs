//! Traits grouping the recording commands of a command buffer by kind.

use anyhow::Result;
use ash::vk;

use crate::command_buffer::state::RenderingInfo;
use crate::resource::buffer::Buffer;
use crate::sync::event::Event;

/// Trait representing a command buffer that supports graphics commands.
pub trait GraphicsCmdBuffer {
    /// Start rendering to a set of attachments and open the batch the draws are recorded into.
    /// Equivalent of `vkCmdBeginRendering`.
    fn begin_rendering(&mut self, info: &RenderingInfo) -> Result<&mut Self>;
    /// Close the rendering batch. Equivalent of `vkCmdEndRendering`.
    fn end_rendering(&mut self) -> Result<&mut Self>;
    /// Automatically set viewport and scissor region to the entire render area
    fn full_viewport_scissor(&mut self) -> Result<&mut Self>;
    /// Sets the viewport. The equivalent of `vkCmdSetViewport`.
    fn viewport(&mut self, viewport: vk::Viewport) -> Result<&mut Self>;
    /// Sets the scissor region. Equivalent of `vkCmdSetScissor`.
    fn scissor(&mut self, scissor: vk::Rect2D) -> Result<&mut Self>;
    /// Sets the blend constants. Equivalent of `vkCmdSetBlendConstants`.
    fn blend_constants(&mut self, constants: [f32; 4]) -> Result<&mut Self>;
    /// Sets the primitive topology. Equivalent of `vkCmdSetPrimitiveTopology`.
    /// # Errors
    /// * Fails with [`Error::UnsupportedTopology`](crate::Error::UnsupportedTopology) for topologies the tiler
    ///   cannot consume.
    fn primitive_topology(&mut self, topology: vk::PrimitiveTopology) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetPrimitiveRestartEnable`.
    fn primitive_restart(&mut self, enable: bool) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetRasterizerDiscardEnable`.
    fn rasterizer_discard(&mut self, enable: bool) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetLineWidth`.
    fn line_width(&mut self, width: f32) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetCullMode`.
    fn cull_mode(&mut self, mode: vk::CullModeFlags) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetFrontFace`.
    fn front_face(&mut self, face: vk::FrontFace) -> Result<&mut Self>;
    /// Equivalent of `vkCmdSetDepthBoundsTestEnable`. Enabling the test is not supported.
    fn depth_bounds_test(&mut self, enable: bool) -> Result<&mut Self>;
    /// Bind vertex buffers to consecutive bindings starting at `first_binding`.
    /// Equivalent of `vkCmdBindVertexBuffers`
    fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(&Buffer, u64)]) -> Result<&mut Self>;
    /// Bind an index buffer. Equivalent of `vkCmdBindIndexBuffer`
    fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, ty: vk::IndexType) -> Result<&mut Self>;
    /// Record a single drawcall. Equivalent of `vkCmdDraw`.
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32)
        -> Result<&mut Self>;
    /// Record a single indexed drawcall. Equivalent of `vkCmdDrawIndexed`
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<&mut Self>;
    /// Not supported.
    fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) -> Result<&mut Self>;
    /// Not supported.
    fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32)
        -> Result<&mut Self>;
}

/// Trait representing a command buffer that supports compute commands.
pub trait ComputeCmdBuffer {
    /// Dispatch compute work. Equivalent of `vkCmdDispatch`.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<&mut Self>;
    /// Dispatch compute work with a workgroup base. Only a zero base is supported.
    fn dispatch_base(&mut self, base: [u32; 3], count: [u32; 3]) -> Result<&mut Self>;
    /// Not supported.
    fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) -> Result<&mut Self>;
}

/// Trait representing a command buffer that supports synchronization commands.
pub trait SyncCmdBuffer {
    /// Insert an execution and memory dependency. Equivalent of `vkCmdPipelineBarrier2`.
    fn pipeline_barrier(&mut self, info: &vk::DependencyInfo) -> Result<&mut Self>;
    /// Signal an event once all previously recorded work is done. Equivalent of `vkCmdSetEvent2`.
    fn set_event(&mut self, event: &Event) -> Result<&mut Self>;
    /// Unsignal an event once all previously recorded work is done. Equivalent of `vkCmdResetEvent2`.
    fn reset_event(&mut self, event: &Event) -> Result<&mut Self>;
    /// Hold back all following work until every event is signaled. Equivalent of `vkCmdWaitEvents2`.
    fn wait_events(&mut self, events: &[Event]) -> Result<&mut Self>;
}
