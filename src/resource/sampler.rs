//! Minimal sampler object, holding its pre-packed hardware descriptor.

use ash::vk;

use crate::descriptor::packed::*;

/// Creation parameters of a [`Sampler`].
#[derive(Debug, Clone)]
pub struct SamplerInfo {
    /// Magnification filter.
    pub mag_filter: vk::Filter,
    /// Minification filter.
    pub min_filter: vk::Filter,
    /// Filtering between mip levels.
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Wrap mode for the U, V and W coordinates.
    pub address_modes: [vk::SamplerAddressMode; 3],
    /// LOD bias.
    pub mip_lod_bias: f32,
    /// Minimum LOD.
    pub min_lod: f32,
    /// Maximum LOD.
    pub max_lod: f32,
    /// Depth compare function, if comparison is enabled.
    pub compare_op: Option<vk::CompareOp>,
    /// Whether texture coordinates are normalized.
    pub normalized_coordinates: bool,
    /// Border color for clamp-to-border.
    pub border_color: [f32; 4],
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_modes: [vk::SamplerAddressMode::REPEAT; 3],
            mip_lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            compare_op: None,
            normalized_coordinates: true,
            border_color: [0.0; 4],
        }
    }
}

/// A sampler. Cheap to copy, it is nothing but its descriptor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sampler {
    desc: SamplerDesc,
}

fn lod_fixed(lod: f32) -> u16 {
    (lod.clamp(0.0, 255.0) * 256.0) as u16
}

impl Sampler {
    /// Create a new sampler.
    pub fn new(info: &SamplerInfo) -> Self {
        let mut flags = 0;
        if info.normalized_coordinates {
            flags |= SAMPLER_NORMALIZED_COORDS;
        }
        if info.mag_filter == vk::Filter::NEAREST {
            flags |= SAMPLER_MAGNIFY_NEAREST;
        }
        if info.min_filter == vk::Filter::NEAREST {
            flags |= SAMPLER_MINIFY_NEAREST;
        }
        if info.mipmap_mode == vk::SamplerMipmapMode::NEAREST {
            flags |= SAMPLER_MIPMAP_NEAREST;
        }
        flags |= SAMPLER_SEAMLESS_CUBE;

        let wrap = info
            .address_modes
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, mode)| acc | ((mode.as_raw() as u32 & 0xff) << (i * 8)));

        Self {
            desc: SamplerDesc {
                flags,
                wrap,
                lod_bias: (info.mip_lod_bias.clamp(-128.0, 127.0) * 256.0) as i16,
                min_lod: lod_fixed(info.min_lod),
                max_lod: lod_fixed(info.max_lod),
                compare_func: info.compare_op.map(|op| op.as_raw() as u16 + 1).unwrap_or(0),
                border_color: info.border_color,
            },
        }
    }

    /// Hardware descriptor.
    pub fn desc(&self) -> SamplerDesc {
        self.desc
    }
}
