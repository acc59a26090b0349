use std::mem::size_of;

use ash::vk;

/// Size in bytes of one element of a format.
pub trait ByteSize {
    /// Element size, or `None` for formats without a fixed per-element size.
    fn byte_size(&self) -> Option<usize>;
}

impl ByteSize for vk::Format {
    fn byte_size(&self) -> Option<usize> {
        let size = match *self {
            vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT => 1,
            vk::Format::R8G8_UNORM | vk::Format::R8G8_UINT => 2,
            vk::Format::R8G8B8_UNORM => 3,
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SNORM
            | vk::Format::R8G8B8A8_UINT
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB => 4,
            vk::Format::R16_UINT | vk::Format::R16_SFLOAT | vk::Format::D16_UNORM => size_of::<u16>(),
            vk::Format::R16G16_SFLOAT | vk::Format::R16G16_UINT => 2 * size_of::<u16>(),
            vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UINT => 4 * size_of::<u16>(),
            vk::Format::R32_SFLOAT | vk::Format::R32_UINT | vk::Format::R32_SINT | vk::Format::D32_SFLOAT => {
                size_of::<f32>()
            }
            vk::Format::D24_UNORM_S8_UINT => 4,
            vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 2 * size_of::<f32>(),
            vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_UINT => 3 * size_of::<f32>(),
            vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 4 * size_of::<f32>(),
            _ => return None,
        };
        Some(size)
    }
}
