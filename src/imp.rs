// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The device/queue service the director drives.
//!
//! The director never talks to a graphics API directly.  Everything it needs from the device
//! is expressed by [`Backend`]: object creation, queue writes, command recording and
//! presentation.  Two implementations ship with the crate:
//!
//! * [`wgpu::WgpuBackend`] (feature `backend_wgpu`), the production backend.
//! * [`recording::RecordingBackend`], a headless backend that records everything it is asked
//!   to do.  Tests and tooling use it to observe scheduling decisions without a GPU.
//!
//! Handles created by a backend are opaque to the director; it only stores them and hands
//! them back.

pub mod recording;
#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

use crate::bindings::binding::DrawRange;
use crate::bindings::sampler::SamplerDescriptor;
use crate::bindings::texture::ImageData;
use crate::bindings::visible_to::{ShaderStages, TextureUsages};
use crate::images::pipeline::{ColorTargetState, DepthState, PrimitiveState};
use crate::images::render_pass::{Color, LoadOp};
use crate::images::vertex_layout::VertexLayout;
use crate::pixel_formats::PixelFormat;
use futures::future::LocalBoxFuture;

/// Capability limits of the bound device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Largest width or height of a 2D texture.  Swapchain sizing is clamped to this.
    pub max_texture_dimension_2d: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        //matches the webgl2 defaults we raise in the wgpu backend
        DeviceLimits {
            max_texture_dimension_2d: 4096,
        }
    }
}

/// The reason a pipeline compile was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CompileError(pub String);

/// A pipeline compile in flight.  Polled once per tick, never awaited.
pub type PendingCompile<P> = LocalBoxFuture<'static, Result<P, CompileError>>;

/// What a buffer holds, which decides how the device may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Index data, with the given index width.
    Index(IndexFormat),
    /// Vertex data.
    Vertex,
    /// Shader storage, readable and optionally writable by shaders.
    Storage,
    /// Uniform data.
    Uniform,
    /// Arguments for indirect draws and dispatches.
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub const fn byte_size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// A request for a device buffer.
#[derive(Debug, Clone)]
pub struct BufferAllocation<'a> {
    pub label: &'a str,
    pub kind: BufferKind,
    pub size: u64,
}

/// A request for a device texture.
#[derive(Debug, Clone)]
pub struct TextureAllocation<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: TextureUsages,
    pub mip_count: u32,
    pub sample_count: u32,
}

/// How a texture is seen by shaders in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    Float { filterable: bool },
    Depth,
    Uint,
    Sint,
}

/// How a sampler is declared in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBindingKind {
    Filtering,
    NonFiltering,
    Comparison,
}

/// The type of one entry in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutEntryType {
    UniformBuffer,
    StorageBuffer { read_only: bool },
    Texture {
        sample_type: TextureSampleType,
        multisampled: bool,
    },
    StorageTexture { format: PixelFormat },
    Sampler(SamplerBindingKind),
}

/// One entry in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutEntry {
    pub binding: u32,
    pub visibility: ShaderStages,
    pub ty: LayoutEntryType,
}

/// The resource bound by one bind group entry.
pub enum GroupResource<'a, B: Backend> {
    Buffer {
        buffer: &'a B::Buffer,
        offset: u64,
        size: Option<u64>,
    },
    TextureView(&'a B::TextureView),
    Sampler(&'a B::Sampler),
}

/// One entry in a bind group.
pub struct GroupEntry<'a, B: Backend> {
    pub binding: u32,
    pub resource: GroupResource<'a, B>,
}

/// Everything needed to request a render pipeline compile.
pub struct RenderPipelineRequest<'a, B: Backend> {
    pub label: &'a str,
    pub layout: &'a B::PipelineLayout,
    pub module: &'a B::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_entry: Option<&'a str>,
    pub vertex_buffers: &'a [VertexLayout],
    pub primitive: PrimitiveState,
    pub color_targets: &'a [ColorTargetState],
    pub depth: Option<(PixelFormat, DepthState)>,
    pub sample_count: u32,
}

/// Everything needed to request a compute pipeline compile.
pub struct ComputePipelineRequest<'a, B: Backend> {
    pub label: &'a str,
    pub layout: &'a B::PipelineLayout,
    pub module: &'a B::ShaderModule,
    pub entry: &'a str,
}

/// One color attachment of an open render pass.
pub struct ColorTarget<'a, B: Backend> {
    pub view: &'a B::TextureView,
    pub resolve: Option<&'a B::TextureView>,
    pub load: LoadOp<Color>,
    pub store: bool,
}

/// The depth attachment of an open render pass.
pub struct DepthTarget<'a, B: Backend> {
    pub view: &'a B::TextureView,
    pub load: LoadOp<f32>,
    pub store: bool,
}

/// The attachments of a render pass about to be opened.
pub struct RenderPassTargets<'a, B: Backend> {
    pub label: &'a str,
    pub colors: Vec<ColorTarget<'a, B>>,
    pub depth: Option<DepthTarget<'a, B>>,
}

/// The attachment formats a render bundle is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleLayout {
    pub color_formats: Vec<PixelFormat>,
    pub depth_format: Option<PixelFormat>,
    pub sample_count: u32,
}

/// One fully-resolved draw.  The draw is indexed iff `index_buffer` is present.
pub struct DrawCall<'a, B: Backend> {
    pub pipeline: &'a B::RenderPipeline,
    pub bind_groups: Vec<(u32, &'a B::BindGroup)>,
    pub vertex_buffers: Vec<&'a B::Buffer>,
    pub index_buffer: Option<(&'a B::Buffer, IndexFormat)>,
    /// When present the arguments come from this buffer at this offset and `range` is ignored.
    pub indirect: Option<(&'a B::Buffer, u64)>,
    /// Element counts.  `vertex_count` counts indices when an index buffer is attached.
    pub range: DrawRange,
}

/// One fully-resolved dispatch.
pub struct DispatchCall<'a, B: Backend> {
    pub pipeline: &'a B::ComputePipeline,
    pub bind_groups: Vec<(u32, &'a B::BindGroup)>,
    pub indirect: Option<(&'a B::Buffer, u64)>,
    pub workgroups: [u32; 3],
}

/**
The device/queue service.

All methods take `&self`: the director is single-threaded and backends use interior
mutability where they need it.  Object creation is synchronous except for pipelines, which
return a [`PendingCompile`] the director polls on later ticks.
*/
pub trait Backend: Sized + 'static {
    type Buffer;
    type Texture;
    type TextureView;
    type Sampler;
    type ShaderModule;
    type BindGroupLayout;
    type BindGroup;
    type PipelineLayout;
    type RenderPipeline;
    type ComputePipeline;
    type RenderBundle;
    type Encoder;
    type CommandBuffer;
    type Surface;
    type SurfaceFrame;

    fn limits(&self) -> DeviceLimits;

    fn create_buffer(&self, allocation: &BufferAllocation<'_>) -> Self::Buffer;
    /// Queue a write of `data` at `offset`.  Both are multiples of 4.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    fn create_texture(&self, allocation: &TextureAllocation<'_>) -> Self::Texture;
    fn create_view(&self, texture: &Self::Texture) -> Self::TextureView;
    /// Queue a write of tightly packed RGBA8 texels into mip level 0.
    fn write_texture(&self, texture: &Self::Texture, image: &ImageData);
    /// Fill levels `1..mip_count` by successively down-sampling level 0.
    fn generate_mipmaps(&self, texture: &Self::Texture, format: PixelFormat, mip_count: u32);
    /// Copy `source` into `destination` through an intermediate buffer, reinterpreting texels.
    fn reinterpret_texture(
        &self,
        source: &Self::Texture,
        destination: &Self::Texture,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
    );

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Self::Sampler;
    fn create_shader_module(&self, label: &str, wgsl: &str) -> Self::ShaderModule;
    fn create_bind_group_layout(&self, label: &str, entries: &[LayoutEntry])
    -> Self::BindGroupLayout;
    fn create_bind_group(
        &self,
        label: &str,
        layout: &Self::BindGroupLayout,
        entries: &[GroupEntry<'_, Self>],
    ) -> Self::BindGroup;
    fn create_pipeline_layout(
        &self,
        label: &str,
        groups: &[&Self::BindGroupLayout],
    ) -> Self::PipelineLayout;
    fn create_render_pipeline(
        &self,
        request: &RenderPipelineRequest<'_, Self>,
    ) -> PendingCompile<Self::RenderPipeline>;
    fn create_compute_pipeline(
        &self,
        request: &ComputePipelineRequest<'_, Self>,
    ) -> PendingCompile<Self::ComputePipeline>;

    fn create_encoder(&self, label: &str) -> Self::Encoder;
    fn push_debug_group(&self, encoder: &mut Self::Encoder, label: &str);
    fn pop_debug_group(&self, encoder: &mut Self::Encoder);
    fn begin_render_pass(&self, encoder: &mut Self::Encoder, targets: &RenderPassTargets<'_, Self>);
    fn end_render_pass(&self, encoder: &mut Self::Encoder);
    fn begin_compute_pass(&self, encoder: &mut Self::Encoder, label: &str);
    fn end_compute_pass(&self, encoder: &mut Self::Encoder);
    /// Record `draw` into the open render pass.
    fn draw(&self, encoder: &mut Self::Encoder, draw: &DrawCall<'_, Self>);
    /// Pre-record `draw` into a reusable bundle.
    fn record_bundle(&self, label: &str, layout: &BundleLayout, draw: &DrawCall<'_, Self>)
    -> Self::RenderBundle;
    fn execute_bundle(&self, encoder: &mut Self::Encoder, bundle: &Self::RenderBundle);
    /// Record `dispatch` into the open compute pass.
    fn dispatch(&self, encoder: &mut Self::Encoder, dispatch: &DispatchCall<'_, Self>);
    fn finish(&self, encoder: Self::Encoder) -> Self::CommandBuffer;
    /// Submit every command buffer in one batch, preserving order.
    fn submit(&self, command_buffers: Vec<Self::CommandBuffer>);

    fn configure_surface(&self, surface: &Self::Surface, width: u32, height: u32, format: PixelFormat);
    /// The current presentable image, or `None` if the surface has none to give this frame.
    fn acquire_frame(&self, surface: &Self::Surface) -> Option<Self::SurfaceFrame>;
    fn frame_view(&self, frame: &Self::SurfaceFrame) -> Self::TextureView;
    fn present(&self, frame: Self::SurfaceFrame);
}
