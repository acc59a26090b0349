//! Compiled shader metadata, as produced by the shader compiler.
//!
//! The command buffer never looks at shader code, only at the binary address and the resource
//! requirements recorded here.

/// Varying buffer holding general varyings.
pub const VARYING_BUF_GENERAL: usize = 0;
/// Varying buffer holding the vertex position.
pub const VARYING_BUF_POSITION: usize = 1;
/// Varying buffer holding the point size.
pub const VARYING_BUF_PSIZ: usize = 2;
/// Number of varying buffers a vertex shader can write.
pub const VARYING_BUF_COUNT: usize = 3;

/// Metadata of one compiled shader stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderInfo {
    /// GPU address of the compiled binary.
    pub binary_address: u64,
    /// Thread-local storage needed per invocation, in bytes.
    pub tls_size: u32,
    /// Workgroup-local storage needed per workgroup, in bytes.
    pub wls_size: u32,
    /// Whether the shader writes a position. Vertex shaders that don't need no tiler job.
    pub writes_position: bool,
    /// Whether the shader writes a point size.
    pub writes_point_size: bool,
    /// Whether the shader accesses storage images, which go through the attribute unit.
    pub has_img_access: bool,
    /// Whether the fragment shader has side effects or writes depth or stencil.
    pub has_side_effects: bool,
    /// Stride of each varying buffer written (vertex) or read (fragment) by the shader.
    pub varying_strides: [u32; VARYING_BUF_COUNT],
}

impl ShaderInfo {
    /// Shader at `binary_address` with no special requirements.
    pub fn new(binary_address: u64) -> Self {
        Self {
            binary_address,
            ..Default::default()
        }
    }

    /// Set the thread-local storage size.
    pub fn tls_size(mut self, size: u32) -> Self {
        self.tls_size = size;
        self
    }

    /// Set the workgroup-local storage size.
    pub fn wls_size(mut self, size: u32) -> Self {
        self.wls_size = size;
        self
    }

    /// Mark the shader as writing the position, with the given position varying stride.
    pub fn writes_position(mut self, stride: u32) -> Self {
        self.writes_position = true;
        self.varying_strides[VARYING_BUF_POSITION] = stride;
        self
    }

    /// Mark the shader as writing the point size, with the given point size varying stride.
    pub fn writes_point_size(mut self, stride: u32) -> Self {
        self.writes_point_size = true;
        self.varying_strides[VARYING_BUF_PSIZ] = stride;
        self
    }

    /// Set the stride of the general varying buffer.
    pub fn general_varyings(mut self, stride: u32) -> Self {
        self.varying_strides[VARYING_BUF_GENERAL] = stride;
        self
    }

    /// Mark the shader as accessing storage images.
    pub fn image_access(mut self) -> Self {
        self.has_img_access = true;
        self
    }

    /// Mark the shader as having side effects.
    pub fn side_effects(mut self) -> Self {
        self.has_side_effects = true;
        self
    }
}
