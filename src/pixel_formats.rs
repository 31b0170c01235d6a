// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel format definitions and byte accounting for GPU textures.
//!
//! Textures are described with a [`PixelFormat`] tag rather than a type parameter, because the
//! format of a texture is allowed to change at runtime (see `Director::reset_texture`).
//!
//! Each format knows:
//!
//! - its size in bytes per texel, used for memory telemetry
//! - whether it is a depth format (only usable as a depth attachment)
//! - whether it can be filled by reinterpreting 8-bit RGBA staging data
//!
//! # Byte accounting
//!
//! The director keeps a running total of texture memory.  Every allocation adds
//! [`PixelFormat::allocation_bytes`] to that total and every reallocation subtracts the
//! previous value.  Formats with an implementation-defined texel size (for example
//! [`PixelFormat::Depth24Plus`]) cannot be accounted, and textures using them are rejected
//! at construction with [`crate::Error::UnsupportedFormat`].
//!
//! ```
//! use frame_director::pixel_formats::PixelFormat;
//!
//! assert_eq!(PixelFormat::Rgba8Unorm.bytes_per_texel().unwrap(), 4);
//! assert!(PixelFormat::Depth24Plus.bytes_per_texel().is_err());
//! ```

use crate::error::Error;

/// The format of the texels stored in a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// One 8-bit normalized channel.
    R8Unorm,
    /// Two 8-bit normalized channels.
    Rg8Unorm,
    /// Four 8-bit normalized channels.  This is the staging format for image uploads.
    Rgba8Unorm,
    /// Four 8-bit normalized channels, sRGB encoded.
    Rgba8UnormSrgb,
    /// Four 8-bit normalized channels in BGRA order.
    Bgra8Unorm,
    /// Four 8-bit normalized channels in BGRA order, sRGB encoded.
    Bgra8UnormSrgb,
    /// One half-precision float channel.
    R16Float,
    /// Two half-precision float channels.
    Rg16Float,
    /// Four half-precision float channels.
    Rgba16Float,
    /// One 32-bit float channel.
    R32Float,
    /// Two 32-bit float channels.
    Rg32Float,
    /// Four 32-bit float channels.
    Rgba32Float,
    /// One 32-bit unsigned integer channel.
    R32Uint,
    /// One 32-bit signed integer channel.
    R32Sint,
    /// 16-bit normalized depth.
    Depth16Unorm,
    /// 32-bit float depth.
    Depth32Float,
    /// Depth with at least 24 bits of precision.  The physical size is up to the device.
    ///
    /// Unsupported for textures: its allocation can't be accounted, so creating or resetting a
    /// texture to this format returns [`Error::UnsupportedFormat`].  Use
    /// [`PixelFormat::Depth32Float`] instead.
    Depth24Plus,
}

impl PixelFormat {
    /// Size of a single texel in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for formats whose size is implementation-defined.
    pub fn bytes_per_texel(self) -> Result<u32, Error> {
        match self {
            PixelFormat::R8Unorm => Ok(1),
            PixelFormat::Rg8Unorm | PixelFormat::R16Float | PixelFormat::Depth16Unorm => Ok(2),
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8UnormSrgb
            | PixelFormat::Rg16Float
            | PixelFormat::R32Float
            | PixelFormat::R32Uint
            | PixelFormat::R32Sint
            | PixelFormat::Depth32Float => Ok(4),
            PixelFormat::Rgba16Float | PixelFormat::Rg32Float => Ok(8),
            PixelFormat::Rgba32Float => Ok(16),
            PixelFormat::Depth24Plus => Err(Error::UnsupportedFormat(self)),
        }
    }

    /// Whether this format is a depth format.
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::Depth16Unorm | PixelFormat::Depth32Float | PixelFormat::Depth24Plus
        )
    }

    /// Whether samplers may filter this format.
    pub const fn is_filterable(self) -> bool {
        !matches!(
            self,
            PixelFormat::R32Float
                | PixelFormat::Rg32Float
                | PixelFormat::Rgba32Float
                | PixelFormat::R32Uint
                | PixelFormat::R32Sint
        ) && !self.is_depth()
    }

    /// The staging format used by image uploads.
    pub const fn staging() -> PixelFormat {
        PixelFormat::Rgba8Unorm
    }

    /// Checks that texels uploaded as [`PixelFormat::staging`] can be reinterpreted as `self`.
    ///
    /// Reinterpretation is a byte-for-byte copy through an intermediate buffer, so it requires
    /// the same texel size and a non-depth destination.
    ///
    /// # Errors
    ///
    /// [`Error::Reinterpret`] when the texel sizes differ or the destination is a depth format,
    /// [`Error::UnsupportedFormat`] when the size of `self` is unknown.
    pub fn reinterpretable_from_staging(self) -> Result<(), Error> {
        let staging = Self::staging();
        let target = self.bytes_per_texel()?;
        let source = staging.bytes_per_texel()?;
        if target != source || self.is_depth() {
            return Err(Error::Reinterpret {
                from: staging,
                to: self,
            });
        }
        Ok(())
    }

    /// Number of mip levels of a full chain for a `width`×`height` image.
    pub fn full_mip_count(width: u32, height: u32) -> u32 {
        width.max(height).max(1).ilog2() + 1
    }

    /// Bytes occupied by a texture of this format with `mip_count` levels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for formats whose size is implementation-defined.
    pub fn allocation_bytes(self, width: u32, height: u32, mip_count: u32) -> Result<u64, Error> {
        let texel = self.bytes_per_texel()? as u64;
        let mut total = 0;
        let (mut w, mut h) = (width as u64, height as u64);
        for _ in 0..mip_count.max(1) {
            total += w * h * texel;
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_length() {
        assert_eq!(PixelFormat::full_mip_count(1, 1), 1);
        assert_eq!(PixelFormat::full_mip_count(256, 256), 9);
        assert_eq!(PixelFormat::full_mip_count(300, 2), 9);
    }

    #[test]
    fn allocation_sums_levels() {
        let bytes = PixelFormat::Rgba8Unorm.allocation_bytes(4, 4, 3).unwrap();
        assert_eq!(bytes, (16 + 4 + 1) * 4);
    }

    #[test]
    fn reinterpretation_needs_matching_texel_size() {
        assert!(PixelFormat::Rg16Float.reinterpretable_from_staging().is_ok());
        assert!(PixelFormat::R32Float.reinterpretable_from_staging().is_ok());
        assert!(matches!(
            PixelFormat::Rgba32Float.reinterpretable_from_staging(),
            Err(Error::Reinterpret { .. })
        ));
        assert!(matches!(
            PixelFormat::Depth24Plus.reinterpretable_from_staging(),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
