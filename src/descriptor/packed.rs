//! Fixed-layout hardware descriptors stored in descriptor sets and descriptor tables.
//!
//! All of these are plain old data, so tables are built by copying slices of them into arena memory.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Uniform buffer descriptor. The low 12 bits hold the number of 16-byte entries, the upper
/// 52 bits hold the buffer address divided by 16.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UniformBufferDesc {
    raw: u64,
}

/// Largest number of 16-byte entries a uniform buffer descriptor can address.
pub const MAX_UBO_ENTRIES: u64 = 4096;

impl UniformBufferDesc {
    /// Pack a descriptor for `size` bytes at `address`. A zero size packs the null descriptor.
    pub fn new(address: u64, size: u64) -> Self {
        if size == 0 {
            return Self::default();
        }
        let entries = crate::util::align::div_round_up(size, 16).min(MAX_UBO_ENTRIES);
        // Entry count is stored minus one so all 4096 entries are reachable.
        Self {
            raw: (entries - 1) | ((address >> 4) << 12),
        }
    }

    /// Buffer address, rounded down to 16 bytes.
    pub fn address(&self) -> u64 {
        (self.raw >> 12) << 4
    }

    /// Number of 16-byte entries, zero for the null descriptor.
    pub fn entries(&self) -> u64 {
        if self.raw == 0 {
            0
        } else {
            (self.raw & 0xfff) + 1
        }
    }

    /// Whether this is the null descriptor.
    pub fn is_null(&self) -> bool {
        self.raw == 0
    }
}

/// Address and size of a storage buffer, read by shaders through a uniform buffer.
/// The trailing word must be zero.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SsboAddr {
    /// GPU address of the first byte.
    pub base_addr: u64,
    /// Size of the accessible range.
    pub size: u32,
    /// Must be zero.
    pub zero: u32,
}

impl SsboAddr {
    /// Describe `size` bytes at `base_addr`. Sizes beyond 4 GiB are clamped.
    pub fn new(base_addr: u64, size: u64) -> Self {
        Self {
            base_addr,
            size: size.min(u32::MAX as u64) as u32,
            zero: 0,
        }
    }
}

/// Texture descriptor.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureDesc {
    /// Hardware pixel format.
    pub format: u32,
    /// Width minus one.
    pub width: u16,
    /// Height minus one.
    pub height: u16,
    /// Depth or layer count minus one.
    pub depth: u16,
    /// Number of mip levels.
    pub levels: u16,
    /// Sample count.
    pub samples: u32,
    /// GPU address of the first surface.
    pub surface: u64,
    /// Row stride of the first surface.
    pub row_stride: u64,
}

/// Sampler flag: coordinates are normalized to [0, 1].
pub const SAMPLER_NORMALIZED_COORDS: u32 = 1 << 0;
/// Sampler flag: nearest filtering when magnifying.
pub const SAMPLER_MAGNIFY_NEAREST: u32 = 1 << 1;
/// Sampler flag: nearest filtering when minifying.
pub const SAMPLER_MINIFY_NEAREST: u32 = 1 << 2;
/// Sampler flag: nearest filtering between mip levels.
pub const SAMPLER_MIPMAP_NEAREST: u32 = 1 << 3;
/// Sampler flag: seamless cube map filtering.
pub const SAMPLER_SEAMLESS_CUBE: u32 = 1 << 4;

/// Sampler descriptor.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct SamplerDesc {
    /// `SAMPLER_*` flags.
    pub flags: u32,
    /// Wrap mode of the S, T and R coordinates, 8 bits each.
    pub wrap: u32,
    /// LOD bias in 1/256th.
    pub lod_bias: i16,
    /// Minimum LOD in 1/256th.
    pub min_lod: u16,
    /// Maximum LOD in 1/256th.
    pub max_lod: u16,
    /// Depth compare function, zero when disabled.
    pub compare_func: u16,
    /// Border color.
    pub border_color: [f32; 4],
}

impl SamplerDesc {
    /// Sampler used by texel fetches when the shader has no sampler of its own:
    /// nearest filtering, non-normalized coordinates.
    pub fn dummy() -> Self {
        Self {
            flags: SAMPLER_MAGNIFY_NEAREST | SAMPLER_MINIFY_NEAREST,
            ..Default::default()
        }
    }
}

/// Attribute buffer descriptor. Image attributes take two consecutive entries: the buffer
/// itself and a continuation holding the image extent.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AttributeBufferDesc {
    /// GPU address, or packed extent for an image continuation.
    pub pointer: u64,
    /// Stride between elements.
    pub stride: u32,
    /// Size of the buffer in bytes.
    pub size: u32,
}

impl AttributeBufferDesc {
    /// Describe a linear buffer.
    pub fn linear(pointer: u64, stride: u32, size: u64) -> Self {
        Self {
            pointer,
            stride,
            size: size.min(u32::MAX as u64) as u32,
        }
    }

    /// Continuation entry carrying a 3D image extent.
    pub fn image_extent(width: u32, height: u32, depth: u32, slice_stride: u32) -> Self {
        Self {
            pointer: (width as u64 & 0xffff) | ((height as u64 & 0xffff) << 16) | ((depth as u64 & 0xffff) << 32),
            stride: slice_stride,
            size: 0,
        }
    }
}

/// Attribute descriptor. Bits 0-8 of the first word select the attribute buffer, bit 9 enables
/// the offset, bits 10-31 hold the hardware format.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AttributeDesc {
    word0: u32,
    /// Byte offset added to the buffer pointer.
    pub offset: u32,
}

impl AttributeDesc {
    /// Pack an attribute reading `format` from attribute buffer `buffer_index`.
    pub fn new(buffer_index: u32, format: u32, offset: Option<u32>) -> Self {
        Self {
            word0: (buffer_index & 0x1ff) | ((offset.is_some() as u32) << 9) | ((format & 0x3f_ffff) << 10),
            offset: offset.unwrap_or(0),
        }
    }

    /// Index of the attribute buffer this attribute reads from.
    pub fn buffer_index(&self) -> u32 {
        self.word0 & 0x1ff
    }

    /// Hardware format.
    pub fn format(&self) -> u32 {
        self.word0 >> 10
    }

    /// Whether the offset field is used.
    pub fn offset_enabled(&self) -> bool {
        self.word0 & (1 << 9) != 0
    }
}

const_assert_eq!(std::mem::size_of::<UniformBufferDesc>(), 8);
const_assert_eq!(std::mem::size_of::<SsboAddr>(), 16);
const_assert_eq!(std::mem::size_of::<TextureDesc>(), 32);
const_assert_eq!(std::mem::size_of::<SamplerDesc>(), 32);
const_assert_eq!(std::mem::size_of::<AttributeBufferDesc>(), 16);
const_assert_eq!(std::mem::size_of::<AttributeDesc>(), 8);
