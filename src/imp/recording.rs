// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A headless backend that records what it is asked to do.

[`RecordingBackend`] creates lightweight handles instead of device objects, and keeps a log
of queue operations (writes, mip generation, surface configuration) and of every submitted
command buffer.  It is enough to drive a [`crate::images::director::Director`] end to end
without a GPU, which makes scheduling decisions observable:

```
use frame_director::images::director::Director;
use frame_director::bindings::texture::Viewport;
use frame_director::imp::recording::RecordingBackend;

let mut director = Director::with_backend(RecordingBackend::new(), Viewport::new(64, 64));
director.add_stage("main").unwrap();
director.tick().unwrap();
let submitted = director.backend().unwrap().submissions();
assert_eq!(submitted.len(), 1);
assert_eq!(submitted[0][0].label, "main");
```

Pipeline compiles resolve immediately unless a latency is configured with
[`RecordingBackend::set_compile_latency`]; [`RecordingBackend::fail_compile`] makes the
device reject pipelines by label.
*/

use crate::bindings::binding::DrawRange;
use crate::bindings::sampler::SamplerDescriptor;
use crate::bindings::texture::ImageData;
use crate::imp::{
    Backend, BufferAllocation, BundleLayout, CompileError, ComputePipelineRequest, DeviceLimits,
    DispatchCall, DrawCall, GroupEntry, IndexFormat, LayoutEntry, PendingCompile,
    RenderPassTargets, RenderPipelineRequest, TextureAllocation,
};
use crate::pixel_formats::PixelFormat;
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::task::Poll;

/// A queue operation, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOp {
    WriteBuffer { buffer: String, offset: u64, len: usize },
    WriteTexture { texture: String, width: u32, height: u32 },
    GenerateMipmaps { texture: String, mip_count: u32 },
    Reinterpret { from: String, to: String },
    ConfigureSurface { surface: String, width: u32, height: u32 },
    Present { surface: String },
}

/// One recorded draw, with every handle replaced by its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub pipeline: String,
    pub bind_groups: Vec<(u32, String)>,
    pub vertex_buffers: Vec<String>,
    pub index: Option<(String, IndexFormat)>,
    pub indirect: Option<(String, u64)>,
    pub range: DrawRange,
}

impl DrawRecord {
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_indirect(&self) -> bool {
        self.indirect.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub pipeline: String,
    pub bind_groups: Vec<(u32, String)>,
    pub indirect: Option<(String, u64)>,
    pub workgroups: [u32; 3],
}

/// One encoder command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PushDebugGroup(String),
    PopDebugGroup,
    BeginRenderPass {
        label: String,
        colors: Vec<String>,
        depth: Option<String>,
    },
    EndRenderPass,
    BeginComputePass(String),
    EndComputePass,
    Draw(DrawRecord),
    ExecuteBundle { bundle: String, draw: DrawRecord },
    Dispatch(DispatchRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommandBuffer {
    pub label: String,
    pub commands: Vec<Command>,
}

impl RecordedCommandBuffer {
    /// Labels of every debug group opened, in order.
    pub fn debug_groups(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::PushDebugGroup(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Draws recorded directly or replayed from bundles.
    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(draw) | Command::ExecuteBundle { draw, .. } => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn dispatches(&self) -> Vec<&DispatchRecord> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch(dispatch) => Some(dispatch),
                _ => None,
            })
            .collect()
    }

    pub fn render_passes(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::BeginRenderPass { .. }))
            .count()
    }
}

/// Object counts.  `*_freed` counts handles dropped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordingStats {
    pub buffers_created: usize,
    pub buffers_freed: usize,
    pub textures_created: usize,
    pub textures_freed: usize,
    pub samplers_created: usize,
    pub shader_modules_created: usize,
    pub bind_group_layouts_created: usize,
    pub bind_groups_created: usize,
    pub pipeline_layouts_created: usize,
    pub render_pipelines_requested: usize,
    pub compute_pipelines_requested: usize,
    pub bundles_recorded: usize,
    pub bundles_freed: usize,
}

/// Counts its own drop.
#[derive(Debug)]
struct FreeProbe(Rc<Cell<usize>>);

impl Drop for FreeProbe {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

#[derive(Debug)]
pub struct RecordedBuffer {
    pub label: String,
    pub size: u64,
    _probe: FreeProbe,
}

#[derive(Debug)]
pub struct RecordedTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_count: u32,
    _probe: FreeProbe,
}

/// Handles that only need a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labelled(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBindGroupLayout {
    pub label: String,
    pub entries: Vec<LayoutEntry>,
}

#[derive(Debug)]
pub struct RecordedBundle {
    pub label: String,
    pub layout: BundleLayout,
    draw: DrawRecord,
    _probe: FreeProbe,
}

#[derive(Debug)]
pub struct RecordedSurface {
    pub label: String,
    configured: Cell<(u32, u32)>,
}

#[derive(Debug)]
pub struct RecordedFrame {
    pub surface: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct RecordingEncoder {
    label: String,
    commands: Vec<Command>,
}

#[derive(Debug, Default)]
struct Log {
    queue: Vec<QueueOp>,
    last_writes: HashMap<String, Vec<u8>>,
    submissions: Vec<Vec<RecordedCommandBuffer>>,
    stats: RecordingStats,
    compile_latency: u32,
    failing: HashSet<String>,
    acquire_fails: bool,
}

/// The headless backend.  See the module documentation.
#[derive(Debug)]
pub struct RecordingBackend {
    log: RefCell<Log>,
    limits: DeviceLimits,
    buffers_freed: Rc<Cell<usize>>,
    textures_freed: Rc<Cell<usize>>,
    bundles_freed: Rc<Cell<usize>>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        RecordingBackend {
            log: RefCell::new(Log::default()),
            limits,
            buffers_freed: Rc::new(Cell::new(0)),
            textures_freed: Rc::new(Cell::new(0)),
            bundles_freed: Rc::new(Cell::new(0)),
        }
    }

    /// A surface for swapchain textures.
    pub fn create_surface(&self, label: &str) -> RecordedSurface {
        RecordedSurface {
            label: label.to_string(),
            configured: Cell::new((0, 0)),
        }
    }

    /// Drains the queue operation log.
    pub fn take_queue_ops(&self) -> Vec<QueueOp> {
        std::mem::take(&mut self.log.borrow_mut().queue)
    }

    /// The bytes of the most recent write to the buffer labelled `label`.
    pub fn last_write(&self, label: &str) -> Option<Vec<u8>> {
        self.log.borrow().last_writes.get(label).cloned()
    }

    /// Every submitted batch, oldest first.
    pub fn submissions(&self) -> Vec<Vec<RecordedCommandBuffer>> {
        self.log.borrow().submissions.clone()
    }

    pub fn stats(&self) -> RecordingStats {
        let mut stats = self.log.borrow().stats;
        stats.buffers_freed = self.buffers_freed.get();
        stats.textures_freed = self.textures_freed.get();
        stats.bundles_freed = self.bundles_freed.get();
        stats
    }

    /// Pipeline compiles stay pending for `polls` polls before resolving.
    pub fn set_compile_latency(&self, polls: u32) {
        self.log.borrow_mut().compile_latency = polls;
    }

    /// Pipelines labelled `label` fail to compile.
    pub fn fail_compile(&self, label: &str) {
        self.log.borrow_mut().failing.insert(label.to_string());
    }

    /// While set, surfaces have no frame to give.
    pub fn set_acquire_fails(&self, fails: bool) {
        self.log.borrow_mut().acquire_fails = fails;
    }

    fn queue(&self, op: QueueOp) {
        self.log.borrow_mut().queue.push(op);
    }

    fn compile<P: 'static>(&self, label: &str, pipeline: P) -> PendingCompile<P> {
        let log = self.log.borrow();
        let mut remaining = log.compile_latency;
        let mut result = Some(if log.failing.contains(label) {
            Err(CompileError(format!("pipeline {label} rejected")))
        } else {
            Ok(pipeline)
        });
        futures::future::poll_fn(move |cx| {
            if remaining > 0 {
                remaining -= 1;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(CompileError("compile polled after completion".into()))),
            )
        })
        .boxed_local()
    }

    fn draw_record(draw: &DrawCall<'_, Self>) -> DrawRecord {
        DrawRecord {
            pipeline: draw.pipeline.0.clone(),
            bind_groups: draw
                .bind_groups
                .iter()
                .map(|(index, group)| (*index, group.0.clone()))
                .collect(),
            vertex_buffers: draw.vertex_buffers.iter().map(|b| b.label.clone()).collect(),
            index: draw.index_buffer.map(|(b, format)| (b.label.clone(), format)),
            indirect: draw.indirect.map(|(b, offset)| (b.label.clone(), offset)),
            range: draw.range,
        }
    }
}

impl Backend for RecordingBackend {
    type Buffer = RecordedBuffer;
    type Texture = RecordedTexture;
    type TextureView = Labelled;
    type Sampler = Labelled;
    type ShaderModule = Labelled;
    type BindGroupLayout = RecordedBindGroupLayout;
    type BindGroup = Labelled;
    type PipelineLayout = Labelled;
    type RenderPipeline = Labelled;
    type ComputePipeline = Labelled;
    type RenderBundle = RecordedBundle;
    type Encoder = RecordingEncoder;
    type CommandBuffer = RecordedCommandBuffer;
    type Surface = RecordedSurface;
    type SurfaceFrame = RecordedFrame;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, allocation: &BufferAllocation<'_>) -> RecordedBuffer {
        self.log.borrow_mut().stats.buffers_created += 1;
        RecordedBuffer {
            label: allocation.label.to_string(),
            size: allocation.size,
            _probe: FreeProbe(self.buffers_freed.clone()),
        }
    }

    fn write_buffer(&self, buffer: &RecordedBuffer, offset: u64, data: &[u8]) {
        let mut log = self.log.borrow_mut();
        log.queue.push(QueueOp::WriteBuffer {
            buffer: buffer.label.clone(),
            offset,
            len: data.len(),
        });
        log.last_writes.insert(buffer.label.clone(), data.to_vec());
    }

    fn create_texture(&self, allocation: &TextureAllocation<'_>) -> RecordedTexture {
        self.log.borrow_mut().stats.textures_created += 1;
        RecordedTexture {
            label: allocation.label.to_string(),
            width: allocation.width,
            height: allocation.height,
            format: allocation.format,
            mip_count: allocation.mip_count,
            _probe: FreeProbe(self.textures_freed.clone()),
        }
    }

    fn create_view(&self, texture: &RecordedTexture) -> Labelled {
        Labelled(texture.label.clone())
    }

    fn write_texture(&self, texture: &RecordedTexture, image: &ImageData) {
        self.queue(QueueOp::WriteTexture {
            texture: texture.label.clone(),
            width: image.width(),
            height: image.height(),
        });
    }

    fn generate_mipmaps(&self, texture: &RecordedTexture, _format: PixelFormat, mip_count: u32) {
        self.queue(QueueOp::GenerateMipmaps {
            texture: texture.label.clone(),
            mip_count,
        });
    }

    fn reinterpret_texture(
        &self,
        source: &RecordedTexture,
        destination: &RecordedTexture,
        _width: u32,
        _height: u32,
        _bytes_per_texel: u32,
    ) {
        self.queue(QueueOp::Reinterpret {
            from: source.label.clone(),
            to: destination.label.clone(),
        });
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Labelled {
        self.log.borrow_mut().stats.samplers_created += 1;
        Labelled(descriptor.label.clone())
    }

    fn create_shader_module(&self, label: &str, _wgsl: &str) -> Labelled {
        self.log.borrow_mut().stats.shader_modules_created += 1;
        Labelled(label.to_string())
    }

    fn create_bind_group_layout(&self, label: &str, entries: &[LayoutEntry]) -> RecordedBindGroupLayout {
        self.log.borrow_mut().stats.bind_group_layouts_created += 1;
        RecordedBindGroupLayout {
            label: label.to_string(),
            entries: entries.to_vec(),
        }
    }

    fn create_bind_group(
        &self,
        label: &str,
        _layout: &RecordedBindGroupLayout,
        _entries: &[GroupEntry<'_, Self>],
    ) -> Labelled {
        self.log.borrow_mut().stats.bind_groups_created += 1;
        Labelled(label.to_string())
    }

    fn create_pipeline_layout(&self, label: &str, _groups: &[&RecordedBindGroupLayout]) -> Labelled {
        self.log.borrow_mut().stats.pipeline_layouts_created += 1;
        Labelled(label.to_string())
    }

    fn create_render_pipeline(
        &self,
        request: &RenderPipelineRequest<'_, Self>,
    ) -> PendingCompile<Labelled> {
        self.log.borrow_mut().stats.render_pipelines_requested += 1;
        self.compile(request.label, Labelled(request.label.to_string()))
    }

    fn create_compute_pipeline(
        &self,
        request: &ComputePipelineRequest<'_, Self>,
    ) -> PendingCompile<Labelled> {
        self.log.borrow_mut().stats.compute_pipelines_requested += 1;
        self.compile(request.label, Labelled(request.label.to_string()))
    }

    fn create_encoder(&self, label: &str) -> RecordingEncoder {
        RecordingEncoder {
            label: label.to_string(),
            commands: Vec::new(),
        }
    }

    fn push_debug_group(&self, encoder: &mut RecordingEncoder, label: &str) {
        encoder.commands.push(Command::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&self, encoder: &mut RecordingEncoder) {
        encoder.commands.push(Command::PopDebugGroup);
    }

    fn begin_render_pass(&self, encoder: &mut RecordingEncoder, targets: &RenderPassTargets<'_, Self>) {
        encoder.commands.push(Command::BeginRenderPass {
            label: targets.label.to_string(),
            colors: targets.colors.iter().map(|c| c.view.0.clone()).collect(),
            depth: targets.depth.as_ref().map(|d| d.view.0.clone()),
        });
    }

    fn end_render_pass(&self, encoder: &mut RecordingEncoder) {
        encoder.commands.push(Command::EndRenderPass);
    }

    fn begin_compute_pass(&self, encoder: &mut RecordingEncoder, label: &str) {
        encoder
            .commands
            .push(Command::BeginComputePass(label.to_string()));
    }

    fn end_compute_pass(&self, encoder: &mut RecordingEncoder) {
        encoder.commands.push(Command::EndComputePass);
    }

    fn draw(&self, encoder: &mut RecordingEncoder, draw: &DrawCall<'_, Self>) {
        encoder.commands.push(Command::Draw(Self::draw_record(draw)));
    }

    fn record_bundle(&self, label: &str, layout: &BundleLayout, draw: &DrawCall<'_, Self>) -> RecordedBundle {
        self.log.borrow_mut().stats.bundles_recorded += 1;
        RecordedBundle {
            label: label.to_string(),
            layout: layout.clone(),
            draw: Self::draw_record(draw),
            _probe: FreeProbe(self.bundles_freed.clone()),
        }
    }

    fn execute_bundle(&self, encoder: &mut RecordingEncoder, bundle: &RecordedBundle) {
        encoder.commands.push(Command::ExecuteBundle {
            bundle: bundle.label.clone(),
            draw: bundle.draw.clone(),
        });
    }

    fn dispatch(&self, encoder: &mut RecordingEncoder, dispatch: &DispatchCall<'_, Self>) {
        encoder.commands.push(Command::Dispatch(DispatchRecord {
            pipeline: dispatch.pipeline.0.clone(),
            bind_groups: dispatch
                .bind_groups
                .iter()
                .map(|(index, group)| (*index, group.0.clone()))
                .collect(),
            indirect: dispatch.indirect.map(|(b, offset)| (b.label.clone(), offset)),
            workgroups: dispatch.workgroups,
        }));
    }

    fn finish(&self, encoder: RecordingEncoder) -> RecordedCommandBuffer {
        RecordedCommandBuffer {
            label: encoder.label,
            commands: encoder.commands,
        }
    }

    fn submit(&self, command_buffers: Vec<RecordedCommandBuffer>) {
        self.log.borrow_mut().submissions.push(command_buffers);
    }

    fn configure_surface(&self, surface: &RecordedSurface, width: u32, height: u32, _format: PixelFormat) {
        surface.configured.set((width, height));
        self.queue(QueueOp::ConfigureSurface {
            surface: surface.label.clone(),
            width,
            height,
        });
    }

    fn acquire_frame(&self, surface: &RecordedSurface) -> Option<RecordedFrame> {
        if self.log.borrow().acquire_fails {
            return None;
        }
        let (width, height) = surface.configured.get();
        Some(RecordedFrame {
            surface: surface.label.clone(),
            width,
            height,
        })
    }

    fn frame_view(&self, frame: &RecordedFrame) -> Labelled {
        Labelled(frame.surface.clone())
    }

    fn present(&self, frame: RecordedFrame) {
        self.queue(QueueOp::Present {
            surface: frame.surface,
        });
    }
}
