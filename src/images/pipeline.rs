// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Render and compute pipelines.
//!
//! A pipeline pairs a shader with an immutable fixed-function description.  Its compiled
//! handle is produced at most once, by an asynchronous compile the director polls once per
//! tick:
//!
//! ```text
//! Idle --(shader and binding complete)--> Pending --ok--> Ready
//!                                            \----err---> Failed (logged, permanent)
//! ```
//!
//! The pipeline layout comes from the first binding the pipeline is completed against, and
//! render targets come from the pass it is first drawn in.  There is no recompilation.
//!
//! Draws are further gated by an `executable` flag and an optional trigger budget: after
//! `trigger_finite_times(n)` the pipeline draws `n` more times and then stops.

use crate::bindings::binding::Binding;
use crate::bindings::buffer::Buffer;
use crate::bindings::resource_tracking::{
    BindingId, BufferId, ComputePipelineId, RenderPipelineId, ResourceKey, ShaderId, Tracked,
};
use crate::bindings::sampler::CompareFunction;
use crate::images::render_pass::draw_call;
use crate::images::shader::Shader;
use crate::imp::{
    Backend, BundleLayout, ComputePipelineRequest, PendingCompile, RenderPipelineRequest,
};
use crate::pixel_formats::PixelFormat;
use futures::FutureExt;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveState {
    pub topology: Topology,
    /// Cull counter-clockwise-wound back faces.
    pub cull_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard premultiplied-free alpha blending.
    Alpha,
    Additive,
}

/// One color target of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    pub format: PixelFormat,
    pub blend: Option<BlendMode>,
}

/// Depth test configuration, used when the pass has a depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        DepthState {
            write: true,
            compare: CompareFunction::LessEqual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: String,
    pub shader: ShaderId,
    pub vertex_entry: String,
    /// `None` for depth-only pipelines.
    pub fragment_entry: Option<String>,
    pub primitive: PrimitiveState,
    /// Applied to every color target.
    pub blend: Option<BlendMode>,
    pub depth: DepthState,
    /// Record draws into a reusable render bundle instead of re-encoding them each frame.
    pub as_bundle: bool,
}

impl RenderPipelineDescriptor {
    pub fn new(label: impl Into<String>, shader: ShaderId) -> Self {
        RenderPipelineDescriptor {
            label: label.into(),
            shader,
            vertex_entry: "vs_main".to_string(),
            fragment_entry: Some("fs_main".to_string()),
            primitive: PrimitiveState::default(),
            blend: None,
            depth: DepthState::default(),
            as_bundle: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: String,
    pub shader: ShaderId,
    pub entry: String,
}

impl ComputePipelineDescriptor {
    pub fn new(label: impl Into<String>, shader: ShaderId) -> Self {
        ComputePipelineDescriptor {
            label: label.into(),
            shader,
            entry: "main".to_string(),
        }
    }
}

/// Either kind of pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineId {
    Render(RenderPipelineId),
    Compute(ComputePipelineId),
}

impl From<RenderPipelineId> for PipelineId {
    fn from(id: RenderPipelineId) -> Self {
        PipelineId::Render(id)
    }
}

impl From<ComputePipelineId> for PipelineId {
    fn from(id: ComputePipelineId) -> Self {
        PipelineId::Compute(id)
    }
}

impl From<PipelineId> for ResourceKey {
    fn from(id: PipelineId) -> Self {
        match id {
            PipelineId::Render(id) => id.into(),
            PipelineId::Compute(id) => id.into(),
        }
    }
}

/// Where a pipeline's compile stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileStatus {
    /// Nothing requested yet; waiting on the shader or a binding.
    Idle,
    Pending,
    Ready,
    /// The device rejected the pipeline.  It will never draw.
    Failed(String),
}

pub(crate) enum CompileState<P> {
    Idle,
    Pending(PendingCompile<P>),
    Ready(P),
    Failed(String),
}

impl<P> CompileState<P> {
    pub(crate) fn status(&self) -> CompileStatus {
        match self {
            CompileState::Idle => CompileStatus::Idle,
            CompileState::Pending(_) => CompileStatus::Pending,
            CompileState::Ready(_) => CompileStatus::Ready,
            CompileState::Failed(reason) => CompileStatus::Failed(reason.clone()),
        }
    }

    pub(crate) fn handle(&self) -> Option<&P> {
        match self {
            CompileState::Ready(p) => Some(p),
            _ => None,
        }
    }

    /// Polls an in-flight compile once.  Returns whether a handle is available.
    fn poll(&mut self, label: &str) -> bool {
        let CompileState::Pending(future) = self else {
            return matches!(self, CompileState::Ready(_));
        };
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match future.poll_unpin(&mut cx) {
            Poll::Pending => false,
            Poll::Ready(Ok(pipeline)) => {
                logwise::trace_sync!(
                    "pipeline {label} compiled",
                    label = logwise::privacy::LogIt(label)
                );
                *self = CompileState::Ready(pipeline);
                true
            }
            Poll::Ready(Err(err)) => {
                logwise::error_sync!(
                    "pipeline {label} failed to compile: {err}",
                    label = logwise::privacy::LogIt(label),
                    err = logwise::privacy::LogIt(&err)
                );
                *self = CompileState::Failed(err.0);
                false
            }
        }
    }
}

/// Executable flag plus optional trigger budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Gate {
    executable: bool,
    remaining: Option<u32>,
}

impl Gate {
    fn new() -> Self {
        Gate {
            executable: true,
            remaining: None,
        }
    }

    pub(crate) fn allows(&self) -> bool {
        self.executable && self.remaining != Some(0)
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    pub(crate) fn trigger_finite_times(&mut self, times: u32) {
        self.remaining = Some(times);
    }

    pub(crate) fn consume(&mut self) {
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(1);
        }
    }
}

pub(crate) struct RenderPipeline<B: Backend> {
    descriptor: RenderPipelineDescriptor,
    compile: CompileState<B::RenderPipeline>,
    gate: Gate,
    bundles: HashMap<BindingId, (u64, B::RenderBundle)>,
}

impl<B: Backend> RenderPipeline<B> {
    pub(crate) fn new(descriptor: RenderPipelineDescriptor) -> Self {
        RenderPipeline {
            descriptor,
            compile: CompileState::Idle,
            gate: Gate::new(),
            bundles: HashMap::new(),
        }
    }

    pub(crate) fn status(&self) -> CompileStatus {
        self.compile.status()
    }

    pub(crate) fn handle(&self) -> Option<&B::RenderPipeline> {
        self.compile.handle()
    }

    pub(crate) fn gate(&self) -> Gate {
        self.gate
    }

    pub(crate) fn gate_mut(&mut self) -> &mut Gate {
        &mut self.gate
    }

    /// True once a compiled handle exists.  Requests the compile when everything it needs is
    /// available, and polls an in-flight compile once.
    pub(crate) fn try_make_complete(
        &mut self,
        backend: &B,
        shaders: &SlotMap<ShaderId, Tracked<Shader<B>>>,
        targets: &BundleLayout,
        binding: &Binding<B>,
    ) -> bool {
        if let CompileState::Idle = self.compile {
            let Some(module) = shaders
                .get(self.descriptor.shader)
                .and_then(|s| s.value.module())
            else {
                return false;
            };
            if !binding.is_complete() {
                return false;
            }
            let label = &self.descriptor.label;
            let layout = backend.create_pipeline_layout(label, &binding.group_layouts());
            let color_targets: Vec<ColorTargetState> = targets
                .color_formats
                .iter()
                .map(|format| ColorTargetState {
                    format: *format,
                    blend: self.descriptor.blend,
                })
                .collect();
            logwise::trace_sync!(
                "requesting render pipeline {label}",
                label = logwise::privacy::LogIt(label)
            );
            self.compile = CompileState::Pending(backend.create_render_pipeline(
                &RenderPipelineRequest {
                    label,
                    layout: &layout,
                    module,
                    vertex_entry: &self.descriptor.vertex_entry,
                    fragment_entry: self.descriptor.fragment_entry.as_deref(),
                    vertex_buffers: binding.vertex_layouts(),
                    primitive: self.descriptor.primitive,
                    color_targets: &color_targets,
                    depth: targets
                        .depth_format
                        .map(|format| (format, self.descriptor.depth)),
                    sample_count: targets.sample_count,
                },
            ));
        }
        self.compile.poll(&self.descriptor.label)
    }

    /// Records a bundle for `binding` if bundling is on and no current one is cached.
    pub(crate) fn prepare_bundle(
        &mut self,
        backend: &B,
        binding_id: BindingId,
        binding: &Binding<B>,
        buffers: &SlotMap<BufferId, Tracked<Buffer<B>>>,
        targets: &BundleLayout,
    ) {
        if !self.descriptor.as_bundle {
            return;
        }
        if let Some((generation, _)) = self.bundles.get(&binding_id)
            && *generation == binding.generation()
        {
            return;
        }
        let CompileState::Ready(handle) = &self.compile else {
            return;
        };
        let Some(draw) = draw_call(handle, binding, buffers) else {
            return;
        };
        let label = format!("{} {}", self.descriptor.label, binding.label());
        let bundle = backend.record_bundle(&label, targets, &draw);
        self.bundles
            .insert(binding_id, (binding.generation(), bundle));
    }

    pub(crate) fn bundle(&self, binding_id: BindingId) -> Option<&B::RenderBundle> {
        self.bundles.get(&binding_id).map(|(_, b)| b)
    }

    /// Drops the bundle recorded for a binding that no longer exists.
    pub(crate) fn evict_bundle(&mut self, binding_id: BindingId) {
        self.bundles.remove(&binding_id);
    }

    /// Drops every cached bundle; the next draw records afresh.
    pub(crate) fn mark_bundle_dirty(&mut self) {
        self.bundles.clear();
    }

    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        vec![self.descriptor.shader.into()]
    }
}

pub(crate) struct ComputePipeline<B: Backend> {
    descriptor: ComputePipelineDescriptor,
    compile: CompileState<B::ComputePipeline>,
    gate: Gate,
}

impl<B: Backend> ComputePipeline<B> {
    pub(crate) fn new(descriptor: ComputePipelineDescriptor) -> Self {
        ComputePipeline {
            descriptor,
            compile: CompileState::Idle,
            gate: Gate::new(),
        }
    }

    pub(crate) fn status(&self) -> CompileStatus {
        self.compile.status()
    }

    pub(crate) fn handle(&self) -> Option<&B::ComputePipeline> {
        self.compile.handle()
    }

    pub(crate) fn gate(&self) -> Gate {
        self.gate
    }

    pub(crate) fn gate_mut(&mut self) -> &mut Gate {
        &mut self.gate
    }

    pub(crate) fn try_make_complete(
        &mut self,
        backend: &B,
        shaders: &SlotMap<ShaderId, Tracked<Shader<B>>>,
        binding: &Binding<B>,
    ) -> bool {
        if let CompileState::Idle = self.compile {
            let Some(module) = shaders
                .get(self.descriptor.shader)
                .and_then(|s| s.value.module())
            else {
                return false;
            };
            if !binding.is_complete() {
                return false;
            }
            let label = &self.descriptor.label;
            let layout = backend.create_pipeline_layout(label, &binding.group_layouts());
            logwise::trace_sync!(
                "requesting compute pipeline {label}",
                label = logwise::privacy::LogIt(label)
            );
            self.compile = CompileState::Pending(backend.create_compute_pipeline(
                &ComputePipelineRequest {
                    label,
                    layout: &layout,
                    module,
                    entry: &self.descriptor.entry,
                },
            ));
        }
        self.compile.poll(&self.descriptor.label)
    }

    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        vec![self.descriptor.shader.into()]
    }
}
