use ash::vk;

use super::DepthStencilAspect;

/// Memory layout of a texel block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// Size in bytes of one block of the color aspect. Zero for depth/stencil formats.
    pub block_size: u32,
    /// Texels covered by one block, `[1, 1]` for uncompressed formats.
    pub block_extent: [u32; 2],
    /// Bytes per texel of the depth aspect when copied to or from a buffer.
    pub depth_size: u32,
    /// Bytes per texel of the stencil aspect when copied to or from a buffer.
    pub stencil_size: u32,
}

impl FormatInfo {
    const fn color(block_size: u32) -> Self {
        Self {
            block_size,
            block_extent: [1, 1],
            depth_size: 0,
            stencil_size: 0,
        }
    }
    const fn compressed(block_size: u32, width: u32, height: u32) -> Self {
        Self {
            block_size,
            block_extent: [width, height],
            depth_size: 0,
            stencil_size: 0,
        }
    }
    const fn depth_stencil(depth_size: u32, stencil_size: u32) -> Self {
        Self {
            block_size: 0,
            block_extent: [1, 1],
            depth_size,
            stencil_size,
        }
    }

    pub fn aspects(&self) -> DepthStencilAspect {
        let mut aspects = DepthStencilAspect::empty();
        if self.depth_size > 0 {
            aspects |= DepthStencilAspect::DEPTH;
        }
        if self.stencil_size > 0 {
            aspects |= DepthStencilAspect::STENCIL;
        }
        aspects
    }

    pub fn is_depth_stencil(&self) -> bool {
        !self.aspects().is_empty()
    }

    /// Bytes per block of the given aspect. Only one aspect can be copied at a time.
    pub fn copy_block_size(&self, aspect: DepthStencilAspect) -> u32 {
        if aspect == DepthStencilAspect::DEPTH {
            assert!(self.depth_size > 0, "format has no depth aspect");
            self.depth_size
        } else if aspect == DepthStencilAspect::STENCIL {
            assert!(self.stencil_size > 0, "format has no stencil aspect");
            self.stencil_size
        } else {
            assert!(aspect.is_empty(), "depth and stencil must be copied separately");
            assert!(self.block_size > 0, "depth/stencil formats require an aspect to copy");
            self.block_size
        }
    }
}

pub fn format_info(format: vk::Format) -> FormatInfo {
    use vk::Format as F;
    match format {
        F::R8_UNORM | F::R8_SNORM | F::R8_UINT | F::R8_SINT | F::R8_SRGB => FormatInfo::color(1),
        F::R8G8_UNORM | F::R8G8_SNORM | F::R8G8_UINT | F::R8G8_SINT | F::R8G8_SRGB => {
            FormatInfo::color(2)
        }
        F::R8G8B8A8_UNORM
        | F::R8G8B8A8_SNORM
        | F::R8G8B8A8_UINT
        | F::R8G8B8A8_SINT
        | F::R8G8B8A8_SRGB
        | F::B8G8R8A8_UNORM
        | F::B8G8R8A8_SRGB
        | F::A2B10G10R10_UNORM_PACK32
        | F::A2R10G10B10_UNORM_PACK32
        | F::B10G11R11_UFLOAT_PACK32
        | F::E5B9G9R9_UFLOAT_PACK32 => FormatInfo::color(4),
        F::R16_UNORM | F::R16_SNORM | F::R16_UINT | F::R16_SINT | F::R16_SFLOAT => {
            FormatInfo::color(2)
        }
        F::R16G16_UNORM | F::R16G16_SNORM | F::R16G16_UINT | F::R16G16_SINT | F::R16G16_SFLOAT => {
            FormatInfo::color(4)
        }
        F::R16G16B16A16_UNORM
        | F::R16G16B16A16_SNORM
        | F::R16G16B16A16_UINT
        | F::R16G16B16A16_SINT
        | F::R16G16B16A16_SFLOAT => FormatInfo::color(8),
        F::R32_UINT | F::R32_SINT | F::R32_SFLOAT => FormatInfo::color(4),
        F::R32G32_UINT | F::R32G32_SINT | F::R32G32_SFLOAT => FormatInfo::color(8),
        F::R32G32B32_UINT | F::R32G32B32_SINT | F::R32G32B32_SFLOAT => FormatInfo::color(12),
        F::R32G32B32A32_UINT | F::R32G32B32A32_SINT | F::R32G32B32A32_SFLOAT => {
            FormatInfo::color(16)
        }

        F::BC1_RGB_UNORM_BLOCK
        | F::BC1_RGB_SRGB_BLOCK
        | F::BC1_RGBA_UNORM_BLOCK
        | F::BC1_RGBA_SRGB_BLOCK
        | F::BC4_UNORM_BLOCK
        | F::BC4_SNORM_BLOCK => FormatInfo::compressed(8, 4, 4),
        F::BC2_UNORM_BLOCK
        | F::BC2_SRGB_BLOCK
        | F::BC3_UNORM_BLOCK
        | F::BC3_SRGB_BLOCK
        | F::BC5_UNORM_BLOCK
        | F::BC5_SNORM_BLOCK
        | F::BC6H_UFLOAT_BLOCK
        | F::BC6H_SFLOAT_BLOCK
        | F::BC7_UNORM_BLOCK
        | F::BC7_SRGB_BLOCK => FormatInfo::compressed(16, 4, 4),
        F::ASTC_4X4_UNORM_BLOCK | F::ASTC_4X4_SRGB_BLOCK => FormatInfo::compressed(16, 4, 4),
        F::ASTC_8X8_UNORM_BLOCK | F::ASTC_8X8_SRGB_BLOCK => FormatInfo::compressed(16, 8, 8),

        F::D16_UNORM => FormatInfo::depth_stencil(2, 0),
        F::X8_D24_UNORM_PACK32 | F::D32_SFLOAT => FormatInfo::depth_stencil(4, 0),
        F::S8_UINT => FormatInfo::depth_stencil(0, 1),
        F::D16_UNORM_S8_UINT => FormatInfo::depth_stencil(2, 1),
        F::D24_UNORM_S8_UINT | F::D32_SFLOAT_S8_UINT => FormatInfo::depth_stencil(4, 1),
        _ => panic!("unsupported format {:?}", format),
    }
}

/// Bytes occupied by one tightly packed 2D surface of `aspect`.
pub fn compute_surface_size(
    width: u32,
    height: u32,
    format: vk::Format,
    aspect: DepthStencilAspect,
) -> u64 {
    assert!(width > 0 && height > 0, "surface must not be empty");
    let info = format_info(format);
    let [block_width, block_height] = info.block_extent;
    let blocks_x = ((width + block_width - 1) / block_width) as u64;
    let blocks_y = ((height + block_height - 1) / block_height) as u64;
    blocks_x * blocks_y * info.copy_block_size(aspect) as u64
}

/// Bytes occupied by one tightly packed 3D volume of `aspect`.
pub fn compute_volume_size(
    width: u32,
    height: u32,
    depth: u32,
    format: vk::Format,
    aspect: DepthStencilAspect,
) -> u64 {
    assert!(depth > 0, "volume must not be empty");
    compute_surface_size(width, height, format, aspect) * depth as u64
}
