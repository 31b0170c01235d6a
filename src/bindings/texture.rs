// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Textures and their three allocation paths.
//!
//! A texture's physical image is created lazily, during the memory phase of a tick, by one of
//! three paths selected by its [`DirtyType`]:
//!
//! | Dirty type      | Source                           | Allocation                                      |
//! |-----------------|----------------------------------|-------------------------------------------------|
//! | `FromSize`      | a size, possibly viewport-driven | empty image, optional mip chain generated       |
//! | `FromImage`     | an RGBA8 bitmap                  | staging upload, reinterpreted if formats differ |
//! | `FromSwapchain` | a presentation surface           | the surface's current frame, every frame        |
//!
//! Each path leaves the texture `Clean` once the image exists.  A size that currently resolves
//! to zero (a window that has not been laid out yet) leaves the texture dirty; it is retried on
//! the next tick, and anything depending on it is skipped until then.
//!
//! [`TextureReset`] re-arms the dirty state, optionally replacing the format, usage, size or
//! image, and fires the texture's change callbacks.

use crate::bindings::resource_tracking::{ResourceKey, TextureId};
use crate::bindings::visible_to::TextureUsages;
use crate::error::Error;
use crate::imp::{Backend, DeviceLimits, TextureAllocation, TextureSampleType};
use crate::pixel_formats::PixelFormat;
use std::fmt::{Debug, Formatter};

/// The size of the drawable area, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Viewport { width, height }
    }
}

/// Tightly packed 8-bit RGBA texels, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl ImageData {
    /// # Errors
    ///
    /// [`Error::ImageSize`] when `rgba` is not exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, Error> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(Error::ImageSize {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(ImageData {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

impl Debug for ImageData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// How big a texture is.
pub enum TextureSize {
    Fixed { width: u32, height: u32 },
    /// Re-evaluated on every allocation, so render targets can follow the viewport.
    Query(Box<dyn Fn(Viewport) -> (u32, u32)>),
}

impl TextureSize {
    /// Exactly the viewport.
    pub fn viewport() -> Self {
        TextureSize::Query(Box::new(|v| (v.width, v.height)))
    }

    pub fn resolve(&self, viewport: Viewport) -> (u32, u32) {
        match self {
            TextureSize::Fixed { width, height } => (*width, *height),
            TextureSize::Query(query) => query(viewport),
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, TextureSize::Query(_))
    }
}

impl Debug for TextureSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TextureSize::Fixed { width, height } => write!(f, "Fixed({width}x{height})"),
            TextureSize::Query(_) => f.write_str("Query"),
        }
    }
}

#[derive(Debug)]
pub enum TextureSource {
    Size(TextureSize),
    Image(ImageData),
}

#[derive(Debug)]
pub struct TextureDescriptor {
    pub label: String,
    pub format: PixelFormat,
    pub usage: TextureUsages,
    pub source: TextureSource,
    /// Allocate and generate a full mip chain.
    pub mipmapped: bool,
    pub sample_count: u32,
}

impl TextureDescriptor {
    pub fn new(label: impl Into<String>, format: PixelFormat, source: TextureSource) -> Self {
        TextureDescriptor {
            label: label.into(),
            format,
            usage: TextureUsages::SAMPLED,
            source,
            mipmapped: false,
            sample_count: 1,
        }
    }

    pub fn with_usage(mut self, usage: TextureUsages) -> Self {
        self.usage = usage;
        self
    }

    pub fn mipmapped(mut self) -> Self {
        self.mipmapped = true;
        self
    }

    pub fn multisampled(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }
}

/// Replacement properties applied by a reset.  Fields left `None` keep their value.
#[derive(Debug, Default)]
pub struct TextureReset {
    pub format: Option<PixelFormat>,
    pub usage: Option<TextureUsages>,
    pub size: Option<TextureSize>,
    pub image: Option<ImageData>,
}

/// Which allocation path the next `update` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirtyType {
    Clean,
    FromImage,
    FromSize,
    FromSwapchain,
}

/// What an update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureUpdate {
    /// Nothing to do.
    Unchanged,
    /// A new owned image replaced the previous one.
    Allocated,
    /// A swapchain frame was acquired.
    Acquired,
    /// Still dirty; try again next tick.
    NotReady,
}

enum Origin<B: Backend> {
    Size(TextureSize),
    Image(ImageData),
    Swapchain {
        surface: B::Surface,
        configured: Option<(u32, u32)>,
    },
}

enum Backing<B: Backend> {
    Owned {
        //kept alive for the view
        _texture: B::Texture,
        view: B::TextureView,
    },
    Frame {
        frame: B::SurfaceFrame,
        view: B::TextureView,
    },
}

pub(crate) struct Texture<B: Backend> {
    label: String,
    format: PixelFormat,
    usage: TextureUsages,
    origin: Origin<B>,
    mipmapped: bool,
    sample_count: u32,
    dirty: DirtyType,
    backing: Option<Backing<B>>,
    width: u32,
    height: u32,
    mip_count: u32,
    bytes: u64,
    callbacks: Vec<Box<dyn FnMut(TextureId)>>,
    dependents: Vec<ResourceKey>,
}

fn validate_format(format: PixelFormat, has_image: bool) -> Result<(), Error> {
    format.bytes_per_texel()?;
    if has_image && format != PixelFormat::staging() {
        format.reinterpretable_from_staging()?;
    }
    Ok(())
}

impl<B: Backend> Texture<B> {
    pub(crate) fn new(descriptor: TextureDescriptor) -> Result<Self, Error> {
        let (origin, dirty) = match descriptor.source {
            TextureSource::Size(size) => (Origin::Size(size), DirtyType::FromSize),
            TextureSource::Image(image) => (Origin::Image(image), DirtyType::FromImage),
        };
        validate_format(descriptor.format, matches!(origin, Origin::Image(_)))?;
        Ok(Self::with_origin(
            descriptor.label,
            descriptor.format,
            descriptor.usage,
            origin,
            dirty,
            descriptor.mipmapped,
            descriptor.sample_count.max(1),
        ))
    }

    pub(crate) fn swapchain(
        label: String,
        surface: B::Surface,
        format: PixelFormat,
    ) -> Result<Self, Error> {
        validate_format(format, false)?;
        Ok(Self::with_origin(
            label,
            format,
            TextureUsages::RENDER_ATTACHMENT,
            Origin::Swapchain {
                surface,
                configured: None,
            },
            DirtyType::FromSwapchain,
            false,
            1,
        ))
    }

    fn with_origin(
        label: String,
        format: PixelFormat,
        usage: TextureUsages,
        origin: Origin<B>,
        dirty: DirtyType,
        mipmapped: bool,
        sample_count: u32,
    ) -> Self {
        Texture {
            label,
            format,
            usage,
            origin,
            mipmapped,
            sample_count,
            dirty,
            backing: None,
            width: 0,
            height: 0,
            mip_count: 0,
            bytes: 0,
            callbacks: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub(crate) fn format(&self) -> PixelFormat {
        self.format
    }

    pub(crate) fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub(crate) fn dirty_type(&self) -> DirtyType {
        self.dirty
    }

    /// Size and mip count of the current image; zero before the first allocation.
    pub(crate) fn extent(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.mip_count)
    }

    pub(crate) fn allocated_bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn is_backed(&self) -> bool {
        self.backing.is_some()
    }

    pub(crate) fn view(&self) -> Option<&B::TextureView> {
        match &self.backing {
            Some(Backing::Owned { view, .. }) | Some(Backing::Frame { view, .. }) => Some(view),
            None => None,
        }
    }

    pub(crate) fn is_swapchain(&self) -> bool {
        matches!(self.origin, Origin::Swapchain { .. })
    }

    /// Whether a viewport change can change this texture's size.
    pub(crate) fn follows_viewport(&self) -> bool {
        match &self.origin {
            Origin::Size(size) => size.is_query(),
            Origin::Swapchain { .. } => true,
            Origin::Image(_) => false,
        }
    }

    /// How the texture appears in a bind group layout.
    pub(crate) fn sample_type(&self) -> TextureSampleType {
        match self.format {
            f if f.is_depth() => TextureSampleType::Depth,
            PixelFormat::R32Uint => TextureSampleType::Uint,
            PixelFormat::R32Sint => TextureSampleType::Sint,
            f => TextureSampleType::Float {
                filterable: f.is_filterable(),
            },
        }
    }

    pub(crate) fn add_callback(&mut self, callback: Box<dyn FnMut(TextureId)>) {
        self.callbacks.push(callback);
    }

    pub(crate) fn fire_callbacks(&mut self, id: TextureId) {
        for callback in &mut self.callbacks {
            callback(id);
        }
    }

    pub(crate) fn add_dependent(&mut self, key: ResourceKey) {
        if !self.dependents.contains(&key) {
            self.dependents.push(key);
        }
    }

    pub(crate) fn remove_dependent(&mut self, key: ResourceKey) {
        self.dependents.retain(|k| *k != key);
    }

    pub(crate) fn dependents(&self) -> &[ResourceKey] {
        &self.dependents
    }

    /// Re-arms the dirty state, applying `reset` if given.  Nothing changes on error.
    pub(crate) fn reset(&mut self, reset: Option<TextureReset>) -> Result<(), Error> {
        if let Some(reset) = reset {
            let format = reset.format.unwrap_or(self.format);
            let has_image = reset.image.is_some() || matches!(self.origin, Origin::Image(_));
            validate_format(format, has_image)?;
            if format != self.format
                && let Origin::Swapchain { configured, .. } = &mut self.origin
            {
                *configured = None;
            }
            self.format = format;
            if let Some(usage) = reset.usage {
                self.usage = usage;
            }
            if !self.is_swapchain() {
                if let Some(image) = reset.image {
                    self.origin = Origin::Image(image);
                } else if let Some(size) = reset.size {
                    self.origin = Origin::Size(size);
                }
            }
        }
        self.dirty = match self.origin {
            Origin::Size(_) => DirtyType::FromSize,
            Origin::Image(_) => DirtyType::FromImage,
            Origin::Swapchain { .. } => DirtyType::FromSwapchain,
        };
        Ok(())
    }

    pub(crate) fn update(
        &mut self,
        backend: &B,
        viewport: Viewport,
        limits: DeviceLimits,
    ) -> Result<TextureUpdate, Error> {
        match self.dirty {
            DirtyType::Clean => Ok(TextureUpdate::Unchanged),
            DirtyType::FromSize => self.allocate_from_size(backend, viewport),
            DirtyType::FromImage => self.allocate_from_image(backend),
            DirtyType::FromSwapchain => Ok(self.acquire(backend, viewport, limits)),
        }
    }

    fn mip_count_for(&self, width: u32, height: u32) -> u32 {
        if self.mipmapped {
            PixelFormat::full_mip_count(width, height)
        } else {
            1
        }
    }

    fn allocate_from_size(&mut self, backend: &B, viewport: Viewport) -> Result<TextureUpdate, Error> {
        let Origin::Size(size) = &self.origin else {
            return Ok(TextureUpdate::NotReady);
        };
        let (width, height) = size.resolve(viewport);
        if width == 0 || height == 0 {
            return Ok(TextureUpdate::NotReady);
        }
        let mip_count = self.mip_count_for(width, height);
        let bytes = self.format.allocation_bytes(width, height, mip_count)?;
        logwise::trace_sync!(
            "allocating texture {label} {width}x{height}, {mips} mips",
            label = logwise::privacy::LogIt(&self.label),
            width = width,
            height = height,
            mips = mip_count
        );
        let texture = backend.create_texture(&TextureAllocation {
            label: &self.label,
            width,
            height,
            format: self.format,
            usage: self.usage,
            mip_count,
            sample_count: self.sample_count,
        });
        if mip_count > 1 {
            backend.generate_mipmaps(&texture, self.format, mip_count);
        }
        self.install(backend, texture, width, height, mip_count, bytes);
        Ok(TextureUpdate::Allocated)
    }

    fn allocate_from_image(&mut self, backend: &B) -> Result<TextureUpdate, Error> {
        let Origin::Image(image) = &self.origin else {
            return Ok(TextureUpdate::NotReady);
        };
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Ok(TextureUpdate::NotReady);
        }
        let mip_count = self.mip_count_for(width, height);
        let bytes = self.format.allocation_bytes(width, height, mip_count)?;
        let staging_format = PixelFormat::staging();
        let direct = self.format == staging_format;
        let staging_label = format!("{} staging", self.label);
        let staging = backend.create_texture(&TextureAllocation {
            label: if direct { &self.label } else { &staging_label },
            width,
            height,
            format: staging_format,
            usage: if direct {
                self.usage | TextureUsages::COPY_DST
            } else {
                TextureUsages::COPY_SRC | TextureUsages::COPY_DST
            },
            mip_count: if direct { mip_count } else { 1 },
            sample_count: 1,
        });
        backend.write_texture(&staging, image);
        let texture = if direct {
            staging
        } else {
            let texture = backend.create_texture(&TextureAllocation {
                label: &self.label,
                width,
                height,
                format: self.format,
                usage: self.usage | TextureUsages::COPY_DST,
                mip_count,
                sample_count: 1,
            });
            backend.reinterpret_texture(
                &staging,
                &texture,
                width,
                height,
                self.format.bytes_per_texel()?,
            );
            texture
        };
        if mip_count > 1 {
            backend.generate_mipmaps(&texture, self.format, mip_count);
        }
        self.install(backend, texture, width, height, mip_count, bytes);
        Ok(TextureUpdate::Allocated)
    }

    fn install(
        &mut self,
        backend: &B,
        texture: B::Texture,
        width: u32,
        height: u32,
        mip_count: u32,
        bytes: u64,
    ) {
        let view = backend.create_view(&texture);
        self.backing = Some(Backing::Owned {
            _texture: texture,
            view,
        });
        self.width = width;
        self.height = height;
        self.mip_count = mip_count;
        self.bytes = bytes;
        self.dirty = DirtyType::Clean;
    }

    fn acquire(&mut self, backend: &B, viewport: Viewport, limits: DeviceLimits) -> TextureUpdate {
        let Origin::Swapchain {
            surface,
            configured,
        } = &mut self.origin
        else {
            return TextureUpdate::NotReady;
        };
        let max = limits.max_texture_dimension_2d;
        let (width, height) = (viewport.width.min(max), viewport.height.min(max));
        if width == 0 || height == 0 {
            return TextureUpdate::NotReady;
        }
        if *configured != Some((width, height)) {
            logwise::info_sync!(
                "configuring surface {label} to {width}x{height}",
                label = logwise::privacy::LogIt(&self.label),
                width = width,
                height = height
            );
            backend.configure_surface(surface, width, height, self.format);
            *configured = Some((width, height));
        }
        let Some(frame) = backend.acquire_frame(surface) else {
            logwise::warn_sync!(
                "surface {label} has no frame this tick",
                label = logwise::privacy::LogIt(&self.label)
            );
            return TextureUpdate::NotReady;
        };
        let view = backend.frame_view(&frame);
        self.backing = Some(Backing::Frame { frame, view });
        self.width = width;
        self.height = height;
        self.mip_count = 1;
        self.bytes = self
            .format
            .allocation_bytes(width, height, 1)
            .unwrap_or_default();
        self.dirty = DirtyType::Clean;
        TextureUpdate::Acquired
    }

    /// Presents an acquired swapchain frame and re-arms the texture for the next one.
    pub(crate) fn present(&mut self, backend: &B) -> bool {
        match self.backing.take() {
            Some(Backing::Frame { frame, view }) => {
                drop(view);
                backend.present(frame);
                self.dirty = DirtyType::FromSwapchain;
                true
            }
            other => {
                self.backing = other;
                false
            }
        }
    }

    /// A texture holds nothing.
    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::recording::{QueueOp, RecordingBackend};

    fn sized(format: PixelFormat, width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor::new(
            "t",
            format,
            TextureSource::Size(TextureSize::Fixed { width, height }),
        )
    }

    #[test]
    fn unknown_texel_size_is_rejected_at_construction() {
        let result = Texture::<RecordingBackend>::new(sized(PixelFormat::Depth24Plus, 4, 4));
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn zero_size_stays_dirty() {
        let backend = RecordingBackend::new();
        let desc = TextureDescriptor::new(
            "target",
            PixelFormat::Rgba8Unorm,
            TextureSource::Size(TextureSize::viewport()),
        );
        let mut texture = Texture::<RecordingBackend>::new(desc).unwrap();
        let update = texture
            .update(&backend, Viewport::new(0, 0), DeviceLimits::default())
            .unwrap();
        assert_eq!(update, TextureUpdate::NotReady);
        assert_eq!(texture.dirty_type(), DirtyType::FromSize);
        assert!(!texture.is_backed());

        let update = texture
            .update(&backend, Viewport::new(64, 32), DeviceLimits::default())
            .unwrap();
        assert_eq!(update, TextureUpdate::Allocated);
        assert_eq!(texture.dirty_type(), DirtyType::Clean);
        assert_eq!(texture.extent(), (64, 32, 1));
        assert_eq!(texture.allocated_bytes(), 64 * 32 * 4);
    }

    #[test]
    fn mipmapped_allocation_generates_chain() {
        let backend = RecordingBackend::new();
        let mut texture =
            Texture::<RecordingBackend>::new(sized(PixelFormat::Rgba8Unorm, 8, 8).mipmapped())
                .unwrap();
        texture
            .update(&backend, Viewport::default(), DeviceLimits::default())
            .unwrap();
        assert_eq!(texture.extent(), (8, 8, 4));
        assert_eq!(
            backend.take_queue_ops(),
            vec![QueueOp::GenerateMipmaps {
                texture: "t".into(),
                mip_count: 4
            }]
        );
    }

    #[test]
    fn image_in_other_format_is_reinterpreted() {
        let backend = RecordingBackend::new();
        let image = ImageData::new(2, 2, vec![0; 16]).unwrap();
        let desc = TextureDescriptor::new("heights", PixelFormat::R32Float, TextureSource::Image(image));
        let mut texture = Texture::<RecordingBackend>::new(desc).unwrap();
        texture
            .update(&backend, Viewport::default(), DeviceLimits::default())
            .unwrap();
        assert_eq!(
            backend.take_queue_ops(),
            vec![
                QueueOp::WriteTexture {
                    texture: "heights staging".into(),
                    width: 2,
                    height: 2
                },
                QueueOp::Reinterpret {
                    from: "heights staging".into(),
                    to: "heights".into()
                },
            ]
        );
        assert!(texture.is_backed());
    }

    #[test]
    fn image_reinterpretation_is_validated() {
        let image = ImageData::new(1, 1, vec![0; 4]).unwrap();
        let desc = TextureDescriptor::new("hdr", PixelFormat::Rgba32Float, TextureSource::Image(image));
        assert!(matches!(
            Texture::<RecordingBackend>::new(desc),
            Err(Error::Reinterpret { .. })
        ));
        assert!(matches!(
            ImageData::new(2, 2, vec![0; 15]),
            Err(Error::ImageSize { expected: 16, .. })
        ));
    }

    #[test]
    fn reset_rearms_and_validates() {
        let backend = RecordingBackend::new();
        let mut texture = Texture::<RecordingBackend>::new(sized(PixelFormat::Rgba8Unorm, 4, 4)).unwrap();
        texture
            .update(&backend, Viewport::default(), DeviceLimits::default())
            .unwrap();
        assert_eq!(texture.dirty_type(), DirtyType::Clean);

        let bad = TextureReset {
            format: Some(PixelFormat::Depth24Plus),
            ..Default::default()
        };
        assert!(texture.reset(Some(bad)).is_err());
        assert_eq!(texture.dirty_type(), DirtyType::Clean);
        assert_eq!(texture.format(), PixelFormat::Rgba8Unorm);

        let grow = TextureReset {
            size: Some(TextureSize::Fixed {
                width: 16,
                height: 16,
            }),
            ..Default::default()
        };
        texture.reset(Some(grow)).unwrap();
        assert_eq!(texture.dirty_type(), DirtyType::FromSize);
        //the old image stays usable until the new one exists
        assert!(texture.is_backed());
        texture
            .update(&backend, Viewport::default(), DeviceLimits::default())
            .unwrap();
        assert_eq!(texture.extent(), (16, 16, 1));
    }

    #[test]
    fn swapchain_clamps_to_device_limits_and_rearms_after_present() {
        let backend = RecordingBackend::new();
        let surface = backend.create_surface("window");
        let mut texture =
            Texture::<RecordingBackend>::swapchain("window".into(), surface, PixelFormat::Bgra8UnormSrgb)
                .unwrap();
        let limits = DeviceLimits {
            max_texture_dimension_2d: 1024,
        };
        let update = texture.update(&backend, Viewport::new(2000, 600), limits).unwrap();
        assert_eq!(update, TextureUpdate::Acquired);
        assert_eq!(texture.extent(), (1024, 600, 1));
        assert!(texture.present(&backend));
        assert_eq!(texture.dirty_type(), DirtyType::FromSwapchain);
        assert!(!texture.is_backed());
        assert!(!texture.present(&backend));

        texture.update(&backend, Viewport::new(2000, 600), limits).unwrap();
        let configures = backend
            .take_queue_ops()
            .into_iter()
            .filter(|op| matches!(op, QueueOp::ConfigureSurface { .. }))
            .count();
        assert_eq!(configures, 1);
    }
}
