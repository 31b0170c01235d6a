// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The director: the single owner of every resource, and the frame loop that drives them.

Client code builds resources through the director's factories, arranges passes into named
stages, and calls [`Director::tick`] once per animation frame.  Each tick:

1. Polls the device once if it is not resolved yet.  Until it is, nothing else happens.
2. Runs the memory phase: every resource in the current generation of the update list is
   updated (buffers upload dirty areas, textures allocate or acquire, shaders and samplers are
   created, dynamic uniforms refresh).  Resources that need updating every frame re-enroll
   into the next generation.
3. Runs the render phase: each visible stage, in order, records its passes into one encoder.
4. Submits every command buffer in one batch, then presents acquired swapchain frames.
5. Swaps generations.

The director is single-threaded.  Asynchronous work (device acquisition, pipeline compiles)
is polled once per tick and never awaited, and anything not ready yet is skipped silently
and retried on a later tick.

# Ownership

Every factory returns an id holding one reference, owned by the caller.  Anything that
stores an id (a binding storing a buffer, a stage storing a pass) retains it, and releases it
when it is itself destroyed.  Call [`Director::release`] exactly once for every reference you
own; see [`crate::bindings::resource_tracking`].
*/

use crate::bindings::binding::{Binding, BindingDescriptor, DrawRange, GroupOrders, UNIFORM_ALIGNMENT};
use crate::bindings::buffer::{Area, AreaOptions, Buffer, BufferDescriptor};
use crate::bindings::data_ref::{DataRef, Subscriber};
use crate::bindings::dirty_tracking::UpdateList;
use crate::bindings::resource_tracking::{
    Arena, BindingId, BufferId, ComputePassId, ComputePipelineId, DataRefId, RenderPassId,
    RenderPipelineId, ResourceKey, SamplerId, ShaderId, TextureId, Tracked,
};
use crate::bindings::sampler::{Sampler, SamplerDescriptor};
use crate::bindings::texture::{
    DirtyType, Texture, TextureDescriptor, TextureReset, TextureUpdate, Viewport,
};
use crate::error::Error;
use crate::images::compute_pass::{self, ComputePass};
use crate::images::pipeline::{
    CompileStatus, ComputePipeline, ComputePipelineDescriptor, Gate, PipelineId, RenderPipeline,
    RenderPipelineDescriptor,
};
use crate::images::render_pass::{self, RenderPass, RenderPassDescriptor};
use crate::images::shader::Shader;
use crate::images::stage::{PassId, Stage};
use crate::imp::{Backend, BufferKind, DeviceLimits};
use crate::pixel_formats::PixelFormat;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::collections::HashSet;
use std::future::Future;
use std::task::{Context, Poll};

enum DeviceSlot<B> {
    Pending(LocalBoxFuture<'static, Result<B, Error>>),
    Ready(B),
    Failed(String),
}

impl<B: Backend> DeviceSlot<B> {
    /// Polls a pending device once.  `Ok(None)` means not yet.
    fn resolve(&mut self) -> Result<Option<&B>, Error> {
        if let DeviceSlot::Pending(future) = self {
            let mut cx = Context::from_waker(futures::task::noop_waker_ref());
            match future.poll_unpin(&mut cx) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(backend)) => {
                    logwise::info_sync!("device ready");
                    *self = DeviceSlot::Ready(backend);
                }
                Poll::Ready(Err(err)) => {
                    logwise::error_sync!(
                        "device acquisition failed: {err}",
                        err = logwise::privacy::LogIt(&err)
                    );
                    *self = DeviceSlot::Failed(err.to_string());
                }
            }
        }
        match self {
            DeviceSlot::Ready(backend) => Ok(Some(backend)),
            DeviceSlot::Failed(reason) => Err(Error::Device(reason.clone())),
            DeviceSlot::Pending(_) => Ok(None),
        }
    }

    fn ready(&self) -> Option<&B> {
        match self {
            DeviceSlot::Ready(backend) => Some(backend),
            _ => None,
        }
    }
}

/// Bytes currently allocated on the device, by resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReport {
    pub buffer_bytes: u64,
    pub texture_bytes: u64,
}

impl MemoryReport {
    pub fn total(&self) -> u64 {
        self.buffer_bytes + self.texture_bytes
    }
}

/// What one [`Director::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Index of the frame this tick produced.
    pub frame: u64,
    /// Resources updated in the memory phase.
    pub updated: usize,
    pub stages_rendered: usize,
    pub command_buffers: usize,
    /// The device is not resolved yet; nothing else ran.
    pub device_pending: bool,
    /// Swapchain frames presented.
    pub presented: usize,
}

/// Everything except the device, so the device can be borrowed alongside it.
struct State<B: Backend> {
    arena: Arena<B>,
    stages: Vec<Stage>,
    updates: UpdateList,
    viewport: Viewport,
    frame: u64,
    presentable: Vec<TextureId>,
}

/// The retained-mode frame scheduler.  See the module documentation.
pub struct Director<B: Backend> {
    device: DeviceSlot<B>,
    state: State<B>,
}

fn stale<K: Into<ResourceKey>>(id: K) -> Error {
    Error::StaleHandle(id.into())
}

impl<B: Backend> Director<B> {
    /// A director whose device arrives asynchronously.  The future is polled once per tick.
    pub fn new(
        device: impl Future<Output = Result<B, Error>> + 'static,
        viewport: Viewport,
    ) -> Self {
        Self::with_slot(DeviceSlot::Pending(device.boxed_local()), viewport)
    }

    /// A director around a device that is already available.
    pub fn with_backend(backend: B, viewport: Viewport) -> Self {
        Self::with_slot(DeviceSlot::Ready(backend), viewport)
    }

    fn with_slot(device: DeviceSlot<B>, viewport: Viewport) -> Self {
        Director {
            device,
            state: State {
                arena: Arena::new(),
                stages: Vec::new(),
                updates: UpdateList::new(),
                viewport,
                frame: 0,
                presentable: Vec::new(),
            },
        }
    }

    /// The device, once resolved.
    pub fn backend(&self) -> Option<&B> {
        self.device.ready()
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    /// Frames produced so far.
    pub fn frame(&self) -> u64 {
        self.state.frame
    }

    // ---- data refs ----

    pub fn create_data_ref(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> DataRefId {
        self.state
            .arena
            .data_refs
            .insert(Tracked::new(DataRef::new(name.into(), bytes)))
    }

    /// A data ref holding the bytes of `values`.
    pub fn create_data_ref_from<T: bytemuck::Pod>(
        &mut self,
        name: impl Into<String>,
        values: &[T],
    ) -> DataRefId {
        self.create_data_ref(name, bytemuck::cast_slice(values).to_vec())
    }

    pub fn data(&self, id: DataRefId) -> Option<&[u8]> {
        self.state.arena.data_refs.get(id).map(|d| d.value.bytes())
    }

    /// Writes `values` at byte `offset` and notifies every subscriber before returning.
    pub fn write_data<T: bytemuck::Pod>(
        &mut self,
        id: DataRefId,
        offset: usize,
        values: &[T],
    ) -> Result<(), Error> {
        let data = self.state.arena.data_refs.get_mut(id).ok_or_else(|| stale(id))?;
        data.value.write(offset, bytemuck::cast_slice(values))?;
        self.state.notify(id);
        Ok(())
    }

    /// Rewrites the bytes in place and notifies every subscriber before returning.
    pub fn modify_data(&mut self, id: DataRefId, f: impl FnOnce(&mut [u8])) -> Result<(), Error> {
        let data = self.state.arena.data_refs.get_mut(id).ok_or_else(|| stale(id))?;
        f(data.value.bytes_mut());
        self.state.notify(id);
        Ok(())
    }

    /// Calls `observer` after every mutation of `id`.
    pub fn subscribe_data(
        &mut self,
        id: DataRefId,
        observer: impl FnMut(DataRefId, &[u8]) + 'static,
    ) -> Result<(), Error> {
        let data = self.state.arena.data_refs.get_mut(id).ok_or_else(|| stale(id))?;
        data.value.subscribe(Subscriber::Observer(Box::new(observer)));
        Ok(())
    }

    // ---- buffers ----

    pub fn create_buffer(&mut self, descriptor: BufferDescriptor) -> BufferId {
        let id = self
            .state
            .arena
            .buffers
            .insert(Tracked::new(Buffer::new(descriptor)));
        self.state.updates.enroll(id);
        id
    }

    /// Appends an area mirroring all of `data` (or the part `options` selects), named after the
    /// data ref.  The buffer retains `data` and uploads the area on the next tick.
    pub fn register_structure_map(
        &mut self,
        buffer: BufferId,
        data: DataRefId,
        options: AreaOptions,
    ) -> Result<Area, Error> {
        let name = self
            .state
            .arena
            .data_refs
            .get(data)
            .ok_or_else(|| stale(data))?
            .value
            .name()
            .to_string();
        self.register_named_area(buffer, name, data, options)
    }

    /// Like [`Director::register_structure_map`] with an explicit area name.
    pub fn register_named_area(
        &mut self,
        buffer: BufferId,
        name: impl Into<String>,
        data: DataRefId,
        options: AreaOptions,
    ) -> Result<Area, Error> {
        self.state.register_area(buffer, name.into(), data, options)
    }

    pub fn buffer_areas(&self, buffer: BufferId) -> Option<&[Area]> {
        self.state.arena.buffers.get(buffer).map(|b| b.value.areas())
    }

    /// Areas waiting for upload, in the order they were marked.
    pub fn dirty_areas(&self, buffer: BufferId) -> Option<&[String]> {
        self.state
            .arena
            .buffers
            .get(buffer)
            .map(|b| b.value.dirty_areas())
    }

    // ---- textures ----

    /// Validates `descriptor` and schedules the allocation.
    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> Result<TextureId, Error> {
        let texture = Texture::new(descriptor)?;
        let id = self.state.arena.textures.insert(Tracked::new(texture));
        self.state.updates.enroll(id);
        Ok(id)
    }

    /// A texture backed by the frames of `surface`.
    pub fn create_swapchain_texture(
        &mut self,
        label: impl Into<String>,
        surface: B::Surface,
        format: PixelFormat,
    ) -> Result<TextureId, Error> {
        let texture = Texture::swapchain(label.into(), surface, format)?;
        let id = self.state.arena.textures.insert(Tracked::new(texture));
        self.state.updates.enroll(id);
        Ok(id)
    }

    /// Re-arms the texture, optionally changing its description, and calls its change
    /// callbacks before returning.  On error nothing changes.
    pub fn reset_texture(&mut self, id: TextureId, reset: Option<TextureReset>) -> Result<(), Error> {
        self.state.reset_texture(id, reset)
    }

    /// Calls `callback` every time the texture is reset.
    pub fn on_texture_change(
        &mut self,
        id: TextureId,
        callback: impl FnMut(TextureId) + 'static,
    ) -> Result<(), Error> {
        let texture = self.state.arena.textures.get_mut(id).ok_or_else(|| stale(id))?;
        texture.value.add_callback(Box::new(callback));
        Ok(())
    }

    /// `(width, height, mip count)` of the current image, zero before the first allocation.
    pub fn texture_extent(&self, id: TextureId) -> Option<(u32, u32, u32)> {
        self.state.arena.textures.get(id).map(|t| t.value.extent())
    }

    pub fn texture_dirty_type(&self, id: TextureId) -> Option<DirtyType> {
        self.state.arena.textures.get(id).map(|t| t.value.dirty_type())
    }

    pub fn texture_format(&self, id: TextureId) -> Option<PixelFormat> {
        self.state.arena.textures.get(id).map(|t| t.value.format())
    }

    pub fn texture_is_backed(&self, id: TextureId) -> bool {
        self.state
            .arena
            .textures
            .get(id)
            .is_some_and(|t| t.value.is_backed())
    }

    // ---- samplers and shaders ----

    pub fn create_sampler(&mut self, descriptor: SamplerDescriptor) -> SamplerId {
        let id = self
            .state
            .arena
            .samplers
            .insert(Tracked::new(Sampler::new(descriptor)));
        self.state.updates.enroll(id);
        id
    }

    /// Registers a shader.  `wgsl` may be supplied later with
    /// [`Director::provide_shader_source`].
    pub fn create_shader(&mut self, label: impl Into<String>, wgsl: Option<String>) -> ShaderId {
        let id = self
            .state
            .arena
            .shaders
            .insert(Tracked::new(Shader::new(label.into(), wgsl)));
        self.state.updates.enroll(id);
        id
    }

    /// Supplies the source of a shader registered without one.  Returns `false` if the shader
    /// already has a module, in which case the source is ignored.
    pub fn provide_shader_source(&mut self, id: ShaderId, wgsl: String) -> Result<bool, Error> {
        let shader = self.state.arena.shaders.get_mut(id).ok_or_else(|| stale(id))?;
        let accepted = shader.value.provide_source(wgsl);
        if accepted {
            self.state.updates.enroll(id);
        }
        Ok(accepted)
    }

    pub fn shader_has_source(&self, id: ShaderId) -> bool {
        self.state
            .arena
            .shaders
            .get(id)
            .is_some_and(|s| s.value.has_source())
    }

    pub fn shader_is_complete(&self, id: ShaderId) -> bool {
        self.state
            .arena
            .shaders
            .get(id)
            .is_some_and(|s| s.value.is_complete())
    }

    // ---- bindings ----

    /// Builds a binding.  Retains every resource in `descriptor` and packs its uniform blocks
    /// into one internal uniform buffer, one 256-byte aligned area per block.
    pub fn create_binding(&mut self, descriptor: BindingDescriptor) -> Result<BindingId, Error> {
        let arena = &mut self.state.arena;
        let mut names = HashSet::new();
        let uniform_label = format!("{} uniforms", descriptor.label);
        for block in &descriptor.uniforms {
            let data = block.value.data();
            if !arena.data_refs.contains_key(data) {
                return Err(stale(data));
            }
            if !names.insert(block.name.as_str()) {
                return Err(Error::DuplicateArea {
                    buffer: uniform_label,
                    area: block.name.clone(),
                });
            }
        }

        let mut uniform_buffer = None;
        if !descriptor.uniforms.is_empty() {
            let mut buffer = Buffer::new(BufferDescriptor::new(&uniform_label, BufferKind::Uniform));
            for block in &descriptor.uniforms {
                let data = block.value.data();
                let len = arena
                    .data_refs
                    .get(data)
                    .map(|d| d.value.bytes().len())
                    .unwrap_or_default();
                buffer.register_area(
                    block.name.clone(),
                    data,
                    len,
                    AreaOptions::aligned(UNIFORM_ALIGNMENT),
                )?;
            }
            uniform_buffer = Some(buffer);
        }

        let mut retained = descriptor.referenced();
        retained.extend(
            descriptor
                .uniforms
                .iter()
                .map(|block| ResourceKey::from(block.value.data())),
        );
        arena.retain_all(&retained)?;
        let uniform_buffer = match uniform_buffer {
            Some(buffer) => {
                let blocks: Vec<(String, DataRefId)> = buffer
                    .areas()
                    .iter()
                    .map(|a| (a.name.clone(), a.data))
                    .collect();
                let id = arena.buffers.insert(Tracked::new(buffer));
                for (area, data) in blocks {
                    if let Some(d) = arena.data_refs.get_mut(data) {
                        d.value.subscribe(Subscriber::Area {
                            buffer: id,
                            area,
                        });
                    }
                }
                Some(id)
            }
            None => None,
        };

        let binding = Binding::new(descriptor, uniform_buffer);
        let textures = binding.textures();
        let dynamic = binding.has_dynamic_uniforms();
        let label = binding.label().to_string();
        let id = arena.bindings.insert(Tracked::new(binding));
        for texture in textures {
            if let Some(t) = arena.textures.get_mut(texture) {
                t.value.add_dependent(id.into());
            }
        }
        if let Some(buffer) = uniform_buffer {
            self.state.updates.enroll(buffer);
        }
        if dynamic {
            self.state.updates.enroll(id);
        }
        logwise::trace_sync!(
            "created binding {label}",
            label = logwise::privacy::LogIt(&label)
        );
        Ok(id)
    }

    /// Every live binding.
    pub fn live_bindings(&self) -> Vec<BindingId> {
        self.state.arena.bindings.keys().collect()
    }

    fn binding_mut(&mut self, id: BindingId) -> Result<&mut Binding<B>, Error> {
        self.state
            .arena
            .bindings
            .get_mut(id)
            .map(|b| &mut b.value)
            .ok_or_else(|| stale(id))
    }

    pub fn set_binding_executable(&mut self, id: BindingId, executable: bool) -> Result<(), Error> {
        self.binding_mut(id)?.set_executable(executable);
        Ok(())
    }

    pub fn set_draw_range(&mut self, id: BindingId, range: DrawRange) -> Result<(), Error> {
        self.binding_mut(id)?.set_range(range);
        self.state.mark_bundles_dirty();
        Ok(())
    }

    /// Moves the read position in the binding's indirect buffer.
    pub fn set_indirect_offset(&mut self, id: BindingId, offset: u64) -> Result<(), Error> {
        self.binding_mut(id)?.set_indirect_offset(offset);
        self.state.mark_bundles_dirty();
        Ok(())
    }

    pub fn set_workgroups(&mut self, id: BindingId, workgroups: [u32; 3]) -> Result<(), Error> {
        self.binding_mut(id)?.set_workgroups(workgroups);
        Ok(())
    }

    /// Builds the binding's layouts and groups if every resource is ready.  Passes do this
    /// on their own; calling it directly is only useful to check readiness.
    pub fn try_make_complete_binding(&mut self, id: BindingId) -> bool {
        let Some(backend) = self.device.ready() else {
            return false;
        };
        let Arena {
            buffers,
            textures,
            samplers,
            bindings,
            ..
        } = &mut self.state.arena;
        bindings
            .get_mut(id)
            .is_some_and(|b| b.value.try_make_complete(backend, buffers, textures, samplers))
    }

    pub fn binding_is_complete(&self, id: BindingId) -> bool {
        self.state
            .arena
            .bindings
            .get(id)
            .is_some_and(|b| b.value.is_complete())
    }

    pub fn group_orders(&self, id: BindingId) -> Option<GroupOrders> {
        self.state.arena.bindings.get(id).map(|b| b.value.orders())
    }

    /// Advances every time the binding's groups are (re)built.
    pub fn binding_generation(&self, id: BindingId) -> Option<u64> {
        self.state.arena.bindings.get(id).map(|b| b.value.generation())
    }

    /// The binding's internal uniform buffer, if it declared uniform blocks.
    pub fn uniform_buffer(&self, id: BindingId) -> Option<BufferId> {
        self.state
            .arena
            .bindings
            .get(id)
            .and_then(|b| b.value.uniform_buffer())
    }

    // ---- pipelines ----

    pub fn create_render_pipeline(
        &mut self,
        descriptor: RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, Error> {
        self.state.arena.retain(descriptor.shader.into())?;
        Ok(self
            .state
            .arena
            .render_pipelines
            .insert(Tracked::new(RenderPipeline::new(descriptor))))
    }

    pub fn create_compute_pipeline(
        &mut self,
        descriptor: ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, Error> {
        self.state.arena.retain(descriptor.shader.into())?;
        Ok(self
            .state
            .arena
            .compute_pipelines
            .insert(Tracked::new(ComputePipeline::new(descriptor))))
    }

    pub fn pipeline_status(&self, id: impl Into<PipelineId>) -> Option<CompileStatus> {
        let arena = &self.state.arena;
        match id.into() {
            PipelineId::Render(id) => arena.render_pipelines.get(id).map(|p| p.value.status()),
            PipelineId::Compute(id) => arena.compute_pipelines.get(id).map(|p| p.value.status()),
        }
    }

    fn gate_mut(&mut self, id: PipelineId) -> Result<&mut Gate, Error> {
        let arena = &mut self.state.arena;
        match id {
            PipelineId::Render(id) => arena
                .render_pipelines
                .get_mut(id)
                .map(|p| p.value.gate_mut())
                .ok_or_else(|| stale(id)),
            PipelineId::Compute(id) => arena
                .compute_pipelines
                .get_mut(id)
                .map(|p| p.value.gate_mut())
                .ok_or_else(|| stale(id)),
        }
    }

    pub fn set_pipeline_executable(
        &mut self,
        id: impl Into<PipelineId>,
        executable: bool,
    ) -> Result<(), Error> {
        self.gate_mut(id.into())?.set_executable(executable);
        Ok(())
    }

    /// Lets the pipeline draw or dispatch `times` more times, then stop.
    pub fn trigger_finite_times(&mut self, id: impl Into<PipelineId>, times: u32) -> Result<(), Error> {
        self.gate_mut(id.into())?.trigger_finite_times(times);
        Ok(())
    }

    /// Discards the pipeline's recorded bundles; the next draws record new ones.
    pub fn mark_bundle_dirty(&mut self, id: RenderPipelineId) -> Result<(), Error> {
        let pipeline = self
            .state
            .arena
            .render_pipelines
            .get_mut(id)
            .ok_or_else(|| stale(id))?;
        pipeline.value.mark_bundle_dirty();
        Ok(())
    }

    // ---- passes ----

    /// Creates a render pass.  Retains every attachment texture.
    pub fn create_render_pass(&mut self, descriptor: RenderPassDescriptor) -> Result<RenderPassId, Error> {
        let pass = RenderPass::new(descriptor);
        let textures = pass.attachment_textures();
        let keys: Vec<ResourceKey> = textures.iter().map(|t| (*t).into()).collect();
        let arena = &mut self.state.arena;
        arena.retain_all(&keys)?;
        let id = arena.render_passes.insert(Tracked::new(pass));
        for texture in textures {
            if let Some(t) = arena.textures.get_mut(texture) {
                t.value.add_dependent(id.into());
            }
        }
        Ok(id)
    }

    pub fn create_compute_pass(&mut self, name: impl Into<String>) -> ComputePassId {
        self.state
            .arena
            .compute_passes
            .insert(Tracked::new(ComputePass::new(name.into())))
    }

    /// Appends a draw.  The pass retains both the pipeline and the binding.
    pub fn add_render_call(
        &mut self,
        pass: RenderPassId,
        pipeline: RenderPipelineId,
        binding: BindingId,
    ) -> Result<(), Error> {
        let arena = &mut self.state.arena;
        if !arena.render_passes.contains_key(pass) {
            return Err(stale(pass));
        }
        arena.retain_all(&[pipeline.into(), binding.into()])?;
        if let Some(p) = arena.render_passes.get_mut(pass) {
            p.value.add_call(pipeline, binding);
        }
        Ok(())
    }

    /// Appends a dispatch.  The pass retains both the pipeline and the binding.
    pub fn add_compute_call(
        &mut self,
        pass: ComputePassId,
        pipeline: ComputePipelineId,
        binding: BindingId,
    ) -> Result<(), Error> {
        let arena = &mut self.state.arena;
        if !arena.compute_passes.contains_key(pass) {
            return Err(stale(pass));
        }
        arena.retain_all(&[pipeline.into(), binding.into()])?;
        if let Some(p) = arena.compute_passes.get_mut(pass) {
            p.value.add_call(pipeline, binding);
        }
        Ok(())
    }

    /// Removes every call from the pass and releases them.
    pub fn empty_pass(&mut self, pass: impl Into<PassId>) -> Result<(), Error> {
        let arena = &mut self.state.arena;
        let released: Vec<ResourceKey> = match pass.into() {
            PassId::Render(id) => arena
                .render_passes
                .get_mut(id)
                .ok_or_else(|| stale(id))?
                .value
                .empty()
                .into_iter()
                .flat_map(|(p, b)| [p.into(), b.into()])
                .collect(),
            PassId::Compute(id) => arena
                .compute_passes
                .get_mut(id)
                .ok_or_else(|| stale(id))?
                .value
                .empty()
                .into_iter()
                .flat_map(|(p, b)| [p.into(), b.into()])
                .collect(),
        };
        for key in released {
            arena.release(key);
        }
        Ok(())
    }

    pub fn set_pass_executable(&mut self, pass: impl Into<PassId>, executable: bool) -> Result<(), Error> {
        let arena = &mut self.state.arena;
        match pass.into() {
            PassId::Render(id) => arena
                .render_passes
                .get_mut(id)
                .ok_or_else(|| stale(id))?
                .value
                .set_executable(executable),
            PassId::Compute(id) => arena
                .compute_passes
                .get_mut(id)
                .ok_or_else(|| stale(id))?
                .value
                .set_executable(executable),
        }
        Ok(())
    }

    /// Number of calls in the pass.
    pub fn pass_len(&self, pass: impl Into<PassId>) -> Option<usize> {
        let arena = &self.state.arena;
        match pass.into() {
            PassId::Render(id) => arena.render_passes.get(id).map(|p| p.value.calls().len()),
            PassId::Compute(id) => arena.compute_passes.get(id).map(|p| p.value.calls().len()),
        }
    }

    // ---- stages ----

    /// Appends an empty, visible stage.  Stages render in the order they were added.
    pub fn add_stage(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        if self.state.stage(&name).is_some() {
            return Err(Error::DuplicateStage(name));
        }
        logwise::info_sync!(
            "adding stage {name}",
            name = logwise::privacy::LogIt(&name)
        );
        self.state.stages.push(Stage::new(name));
        Ok(())
    }

    pub fn show_stage(&mut self, name: &str) -> Result<(), Error> {
        self.state.set_visible(name, true)
    }

    pub fn hide_stage(&mut self, name: &str) -> Result<(), Error> {
        self.state.set_visible(name, false)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.state.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Appends a pass to a stage.  The stage retains the pass.
    pub fn add_item(&mut self, stage: &str, pass: impl Into<PassId>) -> Result<(), Error> {
        let pass = pass.into();
        let index = self
            .state
            .stage(stage)
            .ok_or_else(|| Error::UnknownStage(stage.to_string()))?;
        self.state.arena.retain(pass.into())?;
        self.state.stages[index].passes.push(pass);
        Ok(())
    }

    /// Removes the first occurrence of `pass` from the stage and releases it.  Returns whether
    /// the pass was found.
    pub fn remove_item(&mut self, stage: &str, pass: impl Into<PassId>) -> Result<bool, Error> {
        let pass = pass.into();
        let index = self
            .state
            .stage(stage)
            .ok_or_else(|| Error::UnknownStage(stage.to_string()))?;
        let passes = &mut self.state.stages[index].passes;
        let Some(position) = passes.iter().position(|p| *p == pass) else {
            return Ok(false);
        };
        passes.remove(position);
        self.state.arena.release(pass.into());
        Ok(true)
    }

    /// Removes the stage and releases every pass in it.
    pub fn remove_stage(&mut self, name: &str) -> Result<(), Error> {
        let index = self
            .state
            .stage(name)
            .ok_or_else(|| Error::UnknownStage(name.to_string()))?;
        let stage = self.state.stages.remove(index);
        for pass in stage.passes {
            self.state.arena.release(pass.into());
        }
        logwise::info_sync!(
            "removed stage {name}",
            name = logwise::privacy::LogIt(name)
        );
        Ok(())
    }

    // ---- lifetimes ----

    /// Adds a reference to `key`.
    pub fn retain(&mut self, key: impl Into<ResourceKey>) -> Result<(), Error> {
        self.state.arena.retain(key.into())
    }

    /// Drops a reference to `key`.  Returns every resource destroyed as a result, in
    /// destruction order.  Releasing a dead key logs a warning and destroys nothing.
    pub fn release(&mut self, key: impl Into<ResourceKey>) -> Vec<ResourceKey> {
        self.state.arena.release(key.into())
    }

    pub fn is_live(&self, key: impl Into<ResourceKey>) -> bool {
        self.state.arena.contains(key.into())
    }

    pub fn ref_count(&self, key: impl Into<ResourceKey>) -> Option<u32> {
        self.state.arena.ref_count(key.into())
    }

    // ---- frame ----

    /// Changes the viewport.  Every texture sized from the viewport (swapchains included) is
    /// reset, and every render pass re-reads its attachments on its next execution.
    pub fn resize(&mut self, width: u32, height: u32) {
        let state = &mut self.state;
        state.viewport = Viewport::new(width, height);
        let following: Vec<TextureId> = state
            .arena
            .textures
            .iter()
            .filter(|(_, t)| t.value.follows_viewport())
            .map(|(id, _)| id)
            .collect();
        for id in following {
            if let Err(err) = state.reset_texture(id, None) {
                logwise::warn_sync!(
                    "could not reset texture on resize: {err}",
                    err = logwise::privacy::LogIt(&err)
                );
            }
        }
        for (_, pass) in state.arena.render_passes.iter_mut() {
            pass.value.mark_dirty();
        }
        state.mark_bundles_dirty();
    }

    /// Device bytes held by buffers and textures.
    pub fn memory_report(&self) -> MemoryReport {
        let arena = &self.state.arena;
        MemoryReport {
            buffer_bytes: arena.buffers.values().map(|b| b.value.allocated_bytes()).sum(),
            texture_bytes: arena.textures.values().map(|t| t.value.allocated_bytes()).sum(),
        }
    }

    /// Resources scheduled for the next memory phase.
    pub fn pending_updates(&self) -> Vec<ResourceKey> {
        self.state.updates.current().to_vec()
    }

    /// Produces one frame.  See the module documentation for the phases.
    ///
    /// Returns an error only if device acquisition failed.
    pub fn tick(&mut self) -> Result<TickReport, Error> {
        let interval = logwise::perfwarn_begin!("Director::tick");
        let Some(backend) = self.device.resolve()? else {
            return Ok(TickReport {
                frame: self.state.frame,
                device_pending: true,
                ..Default::default()
            });
        };
        let state = &mut self.state;
        let updated = state.tick_memory(backend);
        let (stages_rendered, command_buffers) = state.tick_render(backend);
        let submitted = command_buffers.len();
        if !command_buffers.is_empty() {
            backend.submit(command_buffers);
        }
        let presented = state.present(backend);
        state.updates.advance();
        let frame = state.frame;
        state.frame += 1;
        drop(interval);
        Ok(TickReport {
            frame,
            updated,
            stages_rendered,
            command_buffers: submitted,
            device_pending: false,
            presented,
        })
    }
}

impl<B: Backend> State<B> {
    fn stage(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    fn set_visible(&mut self, name: &str, visible: bool) -> Result<(), Error> {
        let index = self
            .stage(name)
            .ok_or_else(|| Error::UnknownStage(name.to_string()))?;
        self.stages[index].visible = visible;
        logwise::info_sync!(
            "stage {name} visible: {visible}",
            name = logwise::privacy::LogIt(name),
            visible = visible
        );
        Ok(())
    }

    /// Marks every area mirroring `id` dirty and schedules its buffer.
    fn notify(&mut self, id: DataRefId) {
        let Some(data) = self.arena.data_refs.get_mut(id) else {
            return;
        };
        for (buffer, area) in data.value.notify(id) {
            if let Some(b) = self.arena.buffers.get_mut(buffer) {
                b.value.mark_dirty(&area);
                self.updates.enroll(buffer);
            }
        }
    }

    fn register_area(
        &mut self,
        buffer: BufferId,
        name: String,
        data: DataRefId,
        options: AreaOptions,
    ) -> Result<Area, Error> {
        let len = self
            .arena
            .data_refs
            .get(data)
            .ok_or_else(|| stale(data))?
            .value
            .bytes()
            .len();
        let area = self
            .arena
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| stale(buffer))?
            .value
            .register_area(name.clone(), data, len, options)?
            .clone();
        self.arena.retain(data.into())?;
        if let Some(d) = self.arena.data_refs.get_mut(data) {
            d.value.subscribe(Subscriber::Area { buffer, area: name });
        }
        self.updates.enroll(buffer);
        Ok(area)
    }

    fn reset_texture(&mut self, id: TextureId, reset: Option<TextureReset>) -> Result<(), Error> {
        let texture = self.arena.textures.get_mut(id).ok_or_else(|| stale(id))?;
        texture.value.reset(reset)?;
        texture.value.fire_callbacks(id);
        self.updates.enroll(id);
        Ok(())
    }

    fn mark_bundles_dirty(&mut self) {
        for (_, pipeline) in self.arena.render_pipelines.iter_mut() {
            pipeline.value.mark_bundle_dirty();
        }
    }

    /// Tells everything reading `id` that its image changed.
    fn texture_changed(&mut self, id: TextureId) {
        let Some(texture) = self.arena.textures.get(id) else {
            return;
        };
        for dependent in texture.value.dependents().to_vec() {
            match dependent {
                ResourceKey::Binding(binding) => {
                    if let Some(b) = self.arena.bindings.get_mut(binding) {
                        b.value.mark_texture_group_stale();
                    }
                }
                ResourceKey::RenderPass(pass) => {
                    if let Some(p) = self.arena.render_passes.get_mut(pass) {
                        p.value.mark_dirty();
                    }
                }
                _ => {}
            }
        }
    }

    /// Updates every scheduled resource, including any scheduled while doing so.
    fn tick_memory(&mut self, backend: &B) -> usize {
        let interval = logwise::perfwarn_begin!("Director::tick_memory");
        let limits = backend.limits();
        let mut updated = 0;
        while self.updates.has_current() {
            for key in self.updates.take_current() {
                if self.update_resource(backend, key, limits) {
                    updated += 1;
                }
            }
        }
        drop(interval);
        updated
    }

    fn update_resource(
        &mut self,
        backend: &B,
        key: ResourceKey,
        limits: DeviceLimits,
    ) -> bool {
        match key {
            ResourceKey::Buffer(id) => {
                let Arena {
                    buffers, data_refs, ..
                } = &mut self.arena;
                let Some(buffer) = buffers.get_mut(id) else {
                    return false;
                };
                buffer.value.update(backend, data_refs);
                true
            }
            ResourceKey::Texture(id) => {
                let viewport = self.viewport;
                let Some(texture) = self.arena.textures.get_mut(id) else {
                    return false;
                };
                match texture.value.update(backend, viewport, limits) {
                    Ok(TextureUpdate::Unchanged) => {}
                    Ok(TextureUpdate::Allocated) => self.texture_changed(id),
                    Ok(TextureUpdate::Acquired) => {
                        self.presentable.push(id);
                        self.texture_changed(id);
                    }
                    Ok(TextureUpdate::NotReady) => self.updates.enroll_next(id),
                    Err(err) => {
                        logwise::error_sync!(
                            "texture update failed: {err}",
                            err = logwise::privacy::LogIt(&err)
                        );
                    }
                }
                true
            }
            ResourceKey::Sampler(id) => {
                let Some(sampler) = self.arena.samplers.get_mut(id) else {
                    return false;
                };
                sampler.value.update(backend);
                true
            }
            ResourceKey::Shader(id) => {
                let Some(shader) = self.arena.shaders.get_mut(id) else {
                    return false;
                };
                shader.value.update(backend);
                true
            }
            ResourceKey::Binding(id) => {
                let Arena {
                    bindings, data_refs, ..
                } = &mut self.arena;
                let Some(binding) = bindings.get_mut(id) else {
                    return false;
                };
                let touched = binding.value.refresh(data_refs);
                if binding.value.has_dynamic_uniforms() {
                    self.updates.enroll_next(id);
                }
                for data in touched {
                    self.notify(data);
                }
                true
            }
            ResourceKey::DataRef(_)
            | ResourceKey::RenderPipeline(_)
            | ResourceKey::ComputePipeline(_)
            | ResourceKey::RenderPass(_)
            | ResourceKey::ComputePass(_) => false,
        }
    }

    /// Records every visible stage into its own command buffer.
    fn tick_render(&mut self, backend: &B) -> (usize, Vec<B::CommandBuffer>) {
        let mut command_buffers = Vec::new();
        for stage in &self.stages {
            if !stage.visible {
                continue;
            }
            let mut encoder = backend.create_encoder(&stage.name);
            for pass in &stage.passes {
                match pass {
                    PassId::Render(id) => {
                        render_pass::execute(backend, &mut encoder, &mut self.arena, *id);
                    }
                    PassId::Compute(id) => {
                        compute_pass::execute(backend, &mut encoder, &mut self.arena, *id);
                    }
                }
            }
            command_buffers.push(backend.finish(encoder));
        }
        (command_buffers.len(), command_buffers)
    }

    fn present(&mut self, backend: &B) -> usize {
        let mut presented = 0;
        for id in std::mem::take(&mut self.presentable) {
            if let Some(texture) = self.arena.textures.get_mut(id)
                && texture.value.present(backend)
            {
                presented += 1;
                self.updates.enroll_next(id);
            }
        }
        presented
    }
}
