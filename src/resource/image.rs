//! Minimal image view object as seen by the command buffer.
//!
//! An image view knows how to describe itself to the texture unit and to the attribute unit (for storage image
//! access), and which buffer object backs it so batches can keep it resident.

use std::sync::Arc;

use ash::vk;

use crate::descriptor::packed::{AttributeBufferDesc, TextureDesc};

/// Creation parameters of an [`ImageView`].
#[derive(Debug, Clone)]
pub struct ImageViewInfo {
    /// GPU address of the first texel of the viewed subresource.
    pub address: u64,
    /// View format.
    pub format: vk::Format,
    /// Extent of the viewed mip level.
    pub extent: vk::Extent3D,
    /// Number of array layers.
    pub layer_count: u32,
    /// Number of mip levels.
    pub level_count: u32,
    /// Sample count.
    pub samples: vk::SampleCountFlags,
    /// Bytes per texel.
    pub texel_size: u32,
}

impl Default for ImageViewInfo {
    fn default() -> Self {
        Self {
            address: 0,
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            layer_count: 1,
            level_count: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            texel_size: 4,
        }
    }
}

#[derive(Debug)]
struct ImageViewInner {
    info: ImageViewInfo,
}

/// Shared handle to an image view.
#[derive(Debug, Clone)]
pub struct ImageView {
    inner: Arc<ImageViewInner>,
}

impl PartialEq for ImageView {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl ImageView {
    /// Create a new image view.
    pub fn new(info: ImageViewInfo) -> Self {
        Self {
            inner: Arc::new(ImageViewInner {
                info,
            }),
        }
    }

    /// Creation parameters.
    pub fn info(&self) -> &ImageViewInfo {
        &self.inner.info
    }

    /// GPU address of the backing memory.
    pub fn address(&self) -> u64 {
        self.inner.info.address
    }

    /// View format.
    pub fn format(&self) -> vk::Format {
        self.inner.info.format
    }

    /// Hardware format code.
    pub fn hw_format(&self) -> u32 {
        self.inner.info.format.as_raw() as u32
    }

    /// Extent of the viewed level.
    pub fn extent(&self) -> vk::Extent3D {
        self.inner.info.extent
    }

    /// Number of samples per pixel.
    pub fn sample_count(&self) -> u32 {
        self.inner.info.samples.as_raw().max(1)
    }

    /// Row stride in bytes.
    pub fn row_stride(&self) -> u32 {
        self.inner.info.extent.width * self.inner.info.texel_size
    }

    /// Whether the format has both a depth and a stencil aspect.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self.inner.info.format,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    /// Texture descriptor for sampled access.
    pub fn texture_desc(&self) -> TextureDesc {
        let info = &self.inner.info;
        TextureDesc {
            format: self.hw_format(),
            width: info.extent.width.saturating_sub(1) as u16,
            height: info.extent.height.saturating_sub(1) as u16,
            depth: info.extent.depth.max(info.layer_count).saturating_sub(1) as u16,
            levels: info.level_count as u16,
            samples: self.sample_count(),
            surface: info.address,
            row_stride: self.row_stride() as u64,
        }
    }

    /// Attribute buffer pair for storage image access through the attribute unit.
    pub fn attribute_buffers(&self) -> [AttributeBufferDesc; 2] {
        let info = &self.inner.info;
        let depth = info.extent.depth.max(info.layer_count);
        let slice_stride = self.row_stride() * info.extent.height;
        [
            AttributeBufferDesc::linear(info.address, info.texel_size, slice_stride as u64 * depth as u64),
            AttributeBufferDesc::image_extent(info.extent.width, info.extent.height, depth, slice_stride),
        ]
    }
}
