// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Errors surfaced by the director.
//!
//! Only static authoring mistakes are errors.  Resources that are not ready yet (unbacked
//! textures, pipelines still compiling) are skipped silently and retried on the next tick, and
//! a rejected pipeline compile is logged rather than returned.

use crate::bindings::resource_tracking::ResourceKey;
use crate::pixel_formats::PixelFormat;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Pixel format {0:?} has no known byte size")]
    UnsupportedFormat(PixelFormat),
    #[error("Can't reinterpret {from:?} texels as {to:?}")]
    Reinterpret { from: PixelFormat, to: PixelFormat },
    #[error("Buffer {buffer} already has an area named {area}")]
    DuplicateArea { buffer: String, area: String },
    #[error("Area {area} ends at byte {end}, past the {size} bytes of buffer {buffer}")]
    AreaOverflow {
        buffer: String,
        area: String,
        end: u64,
        size: u64,
    },
    #[error("Write of {len} bytes at offset {offset} exceeds data ref {name} ({available} bytes)")]
    DataOutOfBounds {
        name: String,
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("Image of {width}x{height} needs {expected} RGBA8 bytes, got {actual}")]
    ImageSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Handle {0:?} does not refer to a live resource")]
    StaleHandle(ResourceKey),
    #[error("No stage named {0}")]
    UnknownStage(String),
    #[error("A stage named {0} already exists")]
    DuplicateStage(String),
    #[error("Device unavailable: {0}")]
    Device(String),
}
