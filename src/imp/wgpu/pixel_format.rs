// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::pixel_formats::PixelFormat;

pub(crate) const fn wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        PixelFormat::R16Float => wgpu::TextureFormat::R16Float,
        PixelFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::R32Float => wgpu::TextureFormat::R32Float,
        PixelFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        PixelFormat::R32Uint => wgpu::TextureFormat::R32Uint,
        PixelFormat::R32Sint => wgpu::TextureFormat::R32Sint,
        PixelFormat::Depth16Unorm => wgpu::TextureFormat::Depth16Unorm,
        PixelFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        PixelFormat::Depth24Plus => wgpu::TextureFormat::Depth24Plus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_sizes_agree_with_wgpu() {
        for format in [
            PixelFormat::R8Unorm,
            PixelFormat::Rgba8Unorm,
            PixelFormat::Bgra8UnormSrgb,
            PixelFormat::Rg16Float,
            PixelFormat::Rgba32Float,
            PixelFormat::R32Sint,
        ] {
            assert_eq!(
                wgpu_format(format).block_copy_size(None),
                format.bytes_per_texel().ok(),
                "{format:?}"
            );
        }
    }
}
