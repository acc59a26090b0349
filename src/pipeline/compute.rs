//! Wrapper types for compute pipelines

use std::sync::Arc;

use anyhow::Result;

use crate::pipeline::pipeline_layout::PipelineLayout;
use crate::pipeline::shader::ShaderInfo;

/// A fully built compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipeline {
    pub(crate) name: String,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) shader: ShaderInfo,
    pub(crate) local_size: [u32; 3],
}

impl ComputePipeline {
    /// Pipeline name, for debugging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline layout.
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    /// The compute shader.
    pub fn shader(&self) -> &ShaderInfo {
        &self.shader
    }

    /// Workgroup size.
    pub fn local_size(&self) -> [u32; 3] {
        self.local_size
    }
}

/// Builder struct similar to [`PipelineBuilder`](crate::PipelineBuilder), but for compute pipelines. Since compute pipelines are much simpler,
/// there is much less work to do when building one.
#[derive(Debug)]
pub struct ComputePipelineBuilder {
    inner: ComputePipeline,
}

impl ComputePipelineBuilder {
    /// Create a new compute pipeline with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: ComputePipeline {
                name: name.into(),
                layout: Arc::new(PipelineLayout::empty()),
                shader: ShaderInfo::default(),
                local_size: [1, 1, 1],
            },
        }
    }

    /// Set the pipeline layout.
    pub fn layout(mut self, layout: Arc<PipelineLayout>) -> Self {
        self.inner.layout = layout;
        self
    }

    /// Set the compute shader that will be used for this pipeline. Note that compute pipelines
    /// can only have one shader.
    pub fn set_shader(mut self, shader: ShaderInfo) -> Self {
        self.inner.shader = shader;
        self
    }

    /// Set the workgroup size.
    pub fn local_size(mut self, x: u32, y: u32, z: u32) -> Self {
        self.inner.local_size = [x, y, z];
        self
    }

    /// Build the compute pipeline.
    pub fn build(self) -> Result<Arc<ComputePipeline>> {
        if self.inner.local_size.contains(&0) {
            anyhow::bail!("Compute pipeline `{}` has an empty workgroup", self.inner.name);
        }

        #[cfg(feature = "log-objects")]
        trace!("Created compute pipeline `{}`", self.inner.name);

        Ok(Arc::new(self.inner))
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}
