//! The pipeline builder is used to easily create graphics pipelines correctly.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::pipeline_layout::PipelineLayout;
use crate::pipeline::shader::ShaderInfo;
use crate::util::byte_size::ByteSize;
use crate::Error;

/// A vertex buffer binding of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInputBinding {
    /// Binding index, as used by `bind_vertex_buffers`.
    pub binding: u32,
    /// Stride between consecutive elements.
    pub stride: u32,
    /// Whether the binding advances per vertex or per instance.
    pub rate: vk::VertexInputRate,
}

/// A vertex attribute of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInputAttribute {
    /// Shader input location.
    pub location: u32,
    /// Vertex buffer binding the attribute reads from.
    pub binding: u32,
    /// Attribute format.
    pub format: vk::Format,
    /// Offset of the attribute inside one element.
    pub offset: u32,
}

/// A fully built graphics pipeline. Holds the compiled shaders and every piece of static state the
/// command buffer needs when recording draws.
#[derive(Debug, Clone)]
pub struct GraphicsPipeline {
    pub(crate) name: String,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) vs: ShaderInfo,
    pub(crate) fs: Option<ShaderInfo>,
    pub(crate) vertex_bindings: Vec<VertexInputBinding>,
    pub(crate) vertex_attributes: Vec<VertexInputAttribute>,
    pub(crate) topology: vk::PrimitiveTopology,
    pub(crate) primitive_restart: bool,
    pub(crate) rasterizer_discard: bool,
    pub(crate) cull_mode: vk::CullModeFlags,
    pub(crate) front_face: vk::FrontFace,
    pub(crate) line_width: f32,
    pub(crate) depth_test: bool,
    pub(crate) depth_write: bool,
    pub(crate) depth_op: vk::CompareOp,
    pub(crate) color_write_masks: Vec<vk::ColorComponentFlags>,
    pub(crate) viewport: vk::Viewport,
    pub(crate) scissor: vk::Rect2D,
    pub(crate) blend_constants: [f32; 4],
    pub(crate) dynamic_states: Vec<vk::DynamicState>,
}

impl GraphicsPipeline {
    /// Pipeline name, for debugging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline layout.
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// Vertex shader.
    pub fn vertex_shader(&self) -> &ShaderInfo {
        &self.vs
    }

    /// Fragment shader, if any.
    pub fn fragment_shader(&self) -> Option<&ShaderInfo> {
        self.fs.as_ref()
    }

    /// Vertex buffer bindings.
    pub fn vertex_bindings(&self) -> &[VertexInputBinding] {
        &self.vertex_bindings
    }

    /// Vertex attributes.
    pub fn vertex_attributes(&self) -> &[VertexInputAttribute] {
        &self.vertex_attributes
    }

    /// Whether a piece of state is supplied through dynamic state commands instead of the pipeline.
    pub fn is_dynamic(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }

    /// Whether the fragment shader must run at all. A fragment shader that writes no color and has
    /// no side effects can be skipped.
    pub fn fs_required(&self) -> bool {
        let Some(fs) = &self.fs else {
            return false;
        };
        fs.has_side_effects || self.color_write_masks.iter().any(|mask| !mask.is_empty())
    }
}

/// Check that the tiler can consume a topology.
pub(crate) fn validate_topology(topology: vk::PrimitiveTopology) -> Result<()> {
    match topology {
        vk::PrimitiveTopology::POINT_LIST
        | vk::PrimitiveTopology::LINE_LIST
        | vk::PrimitiveTopology::LINE_STRIP
        | vk::PrimitiveTopology::TRIANGLE_LIST
        | vk::PrimitiveTopology::TRIANGLE_STRIP
        | vk::PrimitiveTopology::TRIANGLE_FAN => Ok(()),
        other => Err(Error::UnsupportedTopology(other).into()),
    }
}

/// Used to facilitate creating a graphics pipeline.
///
/// # Example
/// ```
/// # use panbatch::prelude::*;
/// # use anyhow::Result;
/// fn make_pipeline(layout: Arc<PipelineLayout>) -> Result<Arc<GraphicsPipeline>> {
///     PipelineBuilder::new("sample")
///         .layout(layout)
///         .vertex_shader(ShaderInfo::new(0x1000).writes_position(16))
///         .fragment_shader(ShaderInfo::new(0x2000))
///         // One vertex binding at binding 0. We have to specify this before adding attributes
///         .vertex_input(0, vk::VertexInputRate::VERTEX)
///         .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)?
///         .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)?
///         .dynamic_states(&[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR])
///         .blend_attachment_none()
///         .build()
/// }
/// # make_pipeline(PipelineLayout::new(&Default::default()).unwrap()).unwrap();
/// ```
#[derive(Debug)]
pub struct PipelineBuilder {
    inner: GraphicsPipeline,
    layout: Option<Arc<PipelineLayout>>,
    vertex_binding_offsets: HashMap<u32, u32>,
}

impl PipelineBuilder {
    /// Create a new empty pipeline with default settings for everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: GraphicsPipeline {
                name: name.into(),
                layout: Arc::new(PipelineLayout::empty()),
                vs: ShaderInfo::default(),
                fs: None,
                vertex_bindings: vec![],
                vertex_attributes: vec![],
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                primitive_restart: false,
                rasterizer_discard: false,
                cull_mode: vk::CullModeFlags::NONE,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                line_width: 1.0,
                depth_test: false,
                depth_write: false,
                depth_op: vk::CompareOp::ALWAYS,
                color_write_masks: vec![],
                viewport: vk::Viewport::default(),
                scissor: vk::Rect2D::default(),
                blend_constants: [0.0; 4],
                dynamic_states: vec![],
            },
            layout: None,
            vertex_binding_offsets: Default::default(),
        }
    }

    /// Set the pipeline layout.
    pub fn layout(mut self, layout: Arc<PipelineLayout>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Set the vertex shader.
    pub fn vertex_shader(mut self, info: ShaderInfo) -> Self {
        self.inner.vs = info;
        self
    }

    /// Set the fragment shader.
    pub fn fragment_shader(mut self, info: ShaderInfo) -> Self {
        self.inner.fs = Some(info);
        self
    }

    /// Add a vertex input binding. These are the binding indices for `bind_vertex_buffers`
    pub fn vertex_input(mut self, binding: u32, rate: vk::VertexInputRate) -> Self {
        self.vertex_binding_offsets.insert(binding, 0);
        self.inner.vertex_bindings.push(VertexInputBinding {
            binding,
            stride: 0,
            rate,
        });
        self
    }

    /// Add a vertex attribute to the specified binding.
    /// Doing this will automatically calculate offsets and sizes, so make sure to add these in order of declaration in
    /// the shader.
    pub fn vertex_attribute(mut self, binding: u32, location: u32, format: vk::Format) -> Result<Self> {
        let offset = self
            .vertex_binding_offsets
            .get_mut(&binding)
            .ok_or(Error::NoVertexBinding(binding))?;
        let size = format
            .byte_size()
            .ok_or_else(|| anyhow::anyhow!("Format {format:?} cannot be used as a vertex attribute"))? as u32;
        self.inner.vertex_attributes.push(VertexInputAttribute {
            location,
            binding,
            format,
            offset: *offset,
        });
        *offset += size;
        for descr in &mut self.inner.vertex_bindings {
            if descr.binding == binding {
                descr.stride += size;
            }
        }

        Ok(self)
    }

    /// Set the primitive topology.
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.inner.topology = topology;
        self
    }

    /// Toggle primitive restart.
    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.inner.primitive_restart = enable;
        self
    }

    /// Toggle rasterizer discard. Draws with rasterizer discard only run their vertex job.
    pub fn rasterizer_discard(mut self, enable: bool) -> Self {
        self.inner.rasterizer_discard = enable;
        self
    }

    /// Set the face culling mask.
    pub fn cull_mask(mut self, cull: vk::CullModeFlags) -> Self {
        self.inner.cull_mode = cull;
        self
    }

    /// Set the front face.
    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.inner.front_face = face;
        self
    }

    /// Set the line width.
    pub fn line_width(mut self, width: f32) -> Self {
        self.inner.line_width = width;
        self
    }

    /// Configure all depth state in one call.
    pub fn depth(mut self, test: bool, write: bool, op: vk::CompareOp) -> Self {
        self.inner.depth_test = test;
        self.inner.depth_write = write;
        self.inner.depth_op = op;
        self
    }

    /// Set the static viewport.
    pub fn viewport(mut self, viewport: vk::Viewport) -> Self {
        self.inner.viewport = viewport;
        self
    }

    /// Set the static scissor.
    pub fn scissor(mut self, scissor: vk::Rect2D) -> Self {
        self.inner.scissor = scissor;
        self
    }

    /// Set the static blend constants.
    pub fn blend_constants(mut self, constants: [f32; 4]) -> Self {
        self.inner.blend_constants = constants;
        self
    }

    /// Add a dynamic state to the pipeline.
    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        self.inner.dynamic_states.push(state);
        self
    }

    /// Add dynamic states to the pipeline.
    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        for state in states {
            self = self.dynamic_state(*state);
        }
        self
    }

    /// Add a color attachment with nothing written.
    pub fn blend_attachment_none(mut self) -> Self {
        self.inner.color_write_masks.push(vk::ColorComponentFlags::empty());
        self
    }

    /// Add a color attachment writing to each color component.
    pub fn blend_attachment_write_all(mut self) -> Self {
        self.inner.color_write_masks.push(vk::ColorComponentFlags::RGBA);
        self
    }

    /// Build the pipeline.
    /// # Errors
    /// * Fails with [`Error::UnsupportedTopology`] if the tiler cannot consume the primitive topology.
    pub fn build(mut self) -> Result<Arc<GraphicsPipeline>> {
        validate_topology(self.inner.topology)?;
        if let Some(layout) = self.layout.take() {
            self.inner.layout = layout;
        }

        #[cfg(feature = "log-objects")]
        trace!("Created graphics pipeline `{}`", self.inner.name);

        Ok(Arc::new(self.inner))
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}
