// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Render passes: an ordered list of draws into a fixed set of attachments.

A pass holds references to its attachment textures and to every `(pipeline, binding)` pair
added to it.  Executing it, once per tick while its stage is visible, goes:

1. Check that every attachment has a physical image.  Once that holds it is cached.
2. If the pass is dirty (new pass, or the viewport changed), re-read the attachment formats
   and sample count.
3. Stop here if the pass is not executable.
4. Open the pass and draw each call whose binding and pipeline are complete and whose
   pipeline and binding are both executable.
5. Close the pass.

The whole thing runs inside one debug group named after the pass, even when nothing is drawn.
*/

use crate::bindings::binding::Binding;
use crate::bindings::buffer::Buffer;
use crate::bindings::resource_tracking::{
    Arena, BindingId, BufferId, RenderPassId, RenderPipelineId, ResourceKey, TextureId, Tracked,
};
use crate::imp::{Backend, BundleLayout, ColorTarget, DepthTarget, DrawCall, RenderPassTargets};
use slotmap::SlotMap;

/// What happens to an attachment's previous contents when the pass opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureId,
    /// Single-sampled texture a multisampled `texture` resolves into.
    pub resolve: Option<TextureId>,
    pub load: LoadOp<Color>,
    pub store: bool,
}

impl ColorAttachment {
    /// Cleared to black and stored.
    pub fn new(texture: TextureId) -> Self {
        ColorAttachment {
            texture,
            resolve: None,
            load: LoadOp::Clear(Color::BLACK),
            store: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureId,
    pub load: LoadOp<f32>,
    pub store: bool,
}

impl DepthAttachment {
    /// Cleared to the far plane and discarded afterwards.
    pub fn new(texture: TextureId) -> Self {
        DepthAttachment {
            texture,
            load: LoadOp::Clear(1.0),
            store: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub name: String,
    pub colors: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

impl RenderPassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        RenderPassDescriptor {
            name: name.into(),
            colors: Vec::new(),
            depth: None,
        }
    }

    pub fn color(mut self, attachment: ColorAttachment) -> Self {
        self.colors.push(attachment);
        self
    }

    pub fn depth(mut self, attachment: DepthAttachment) -> Self {
        self.depth = Some(attachment);
        self
    }
}

#[derive(Debug)]
pub(crate) struct RenderPass {
    name: String,
    colors: Vec<ColorAttachment>,
    depth: Option<DepthAttachment>,
    calls: Vec<(RenderPipelineId, BindingId)>,
    dirty: bool,
    complete: bool,
    executable: bool,
    layout: Option<BundleLayout>,
}

impl RenderPass {
    pub(crate) fn new(descriptor: RenderPassDescriptor) -> Self {
        RenderPass {
            name: descriptor.name,
            colors: descriptor.colors,
            depth: descriptor.depth,
            calls: Vec::new(),
            dirty: true,
            complete: false,
            executable: true,
            layout: None,
        }
    }

    pub(crate) fn add_call(&mut self, pipeline: RenderPipelineId, binding: BindingId) {
        self.calls.push((pipeline, binding));
    }

    /// Clears the call list, handing back the calls so their references can be released.
    pub(crate) fn empty(&mut self) -> Vec<(RenderPipelineId, BindingId)> {
        std::mem::take(&mut self.calls)
    }

    pub(crate) fn calls(&self) -> &[(RenderPipelineId, BindingId)] {
        &self.calls
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn attachment_textures(&self) -> Vec<TextureId> {
        self.colors
            .iter()
            .flat_map(|c| std::iter::once(c.texture).chain(c.resolve))
            .chain(self.depth.map(|d| d.texture))
            .collect()
    }

    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .attachment_textures()
            .into_iter()
            .map(ResourceKey::from)
            .collect();
        for (pipeline, binding) in &self.calls {
            keys.push((*pipeline).into());
            keys.push((*binding).into());
        }
        keys
    }
}

/// Resolves everything one draw needs.  `None` while any buffer lacks a device allocation.
pub(crate) fn draw_call<'a, B: Backend>(
    pipeline: &'a B::RenderPipeline,
    binding: &'a Binding<B>,
    buffers: &'a SlotMap<BufferId, Tracked<Buffer<B>>>,
) -> Option<DrawCall<'a, B>> {
    let device = |id: BufferId| buffers.get(id).and_then(|b| b.value.device());
    let vertex_buffers = binding
        .vertex_buffers()
        .map(device)
        .collect::<Option<Vec<_>>>()?;
    let index_buffer = match binding.index_buffer() {
        Some(id) => Some((device(id)?, Binding::index_format(buffers, id))),
        None => None,
    };
    let indirect = match binding.indirect() {
        Some((id, offset)) => Some((device(id)?, offset)),
        None => None,
    };
    Some(DrawCall {
        pipeline,
        bind_groups: binding.bind_groups(),
        vertex_buffers,
        index_buffer,
        indirect,
        range: binding.range(),
    })
}

/// Records one render pass into `encoder`.  Returns the number of draws recorded.
pub(crate) fn execute<B: Backend>(
    backend: &B,
    encoder: &mut B::Encoder,
    arena: &mut Arena<B>,
    id: RenderPassId,
) -> usize {
    let Arena {
        buffers,
        textures,
        samplers,
        shaders,
        bindings,
        render_pipelines,
        render_passes,
        ..
    } = arena;
    let Some(pass) = render_passes.get_mut(id) else {
        return 0;
    };
    let pass = &mut pass.value;
    backend.push_debug_group(encoder, &pass.name);

    if !pass.complete {
        pass.complete = pass
            .attachment_textures()
            .iter()
            .all(|t| textures.get(*t).is_some_and(|t| t.value.is_backed()));
        if !pass.complete {
            backend.pop_debug_group(encoder);
            return 0;
        }
    }

    if pass.dirty || pass.layout.is_none() {
        let format_of = |t: TextureId| textures.get(t).map(|t| (t.value.format(), t.value.sample_count()));
        let colors: Vec<_> = pass.colors.iter().filter_map(|c| format_of(c.texture)).collect();
        let depth = pass.depth.and_then(|d| format_of(d.texture));
        let sample_count = colors
            .first()
            .or(depth.as_ref())
            .map(|(_, samples)| *samples)
            .unwrap_or(1);
        pass.layout = Some(BundleLayout {
            color_formats: colors.iter().map(|(format, _)| *format).collect(),
            depth_format: depth.map(|(format, _)| format),
            sample_count,
        });
        pass.dirty = false;
    }

    if !pass.executable {
        backend.pop_debug_group(encoder);
        return 0;
    }
    let Some(layout) = &pass.layout else {
        backend.pop_debug_group(encoder);
        return 0;
    };

    let view = |t: TextureId| textures.get(t).and_then(|t| t.value.view());
    let mut colors = Vec::with_capacity(pass.colors.len());
    for attachment in &pass.colors {
        let resolve = match attachment.resolve {
            Some(t) => view(t),
            None => None,
        };
        let Some(target) = view(attachment.texture) else {
            backend.pop_debug_group(encoder);
            return 0;
        };
        colors.push(ColorTarget {
            view: target,
            resolve,
            load: attachment.load,
            store: attachment.store,
        });
    }
    let depth = match pass.depth {
        Some(attachment) => {
            let Some(target) = view(attachment.texture) else {
                backend.pop_debug_group(encoder);
                return 0;
            };
            Some(DepthTarget {
                view: target,
                load: attachment.load,
                store: attachment.store,
            })
        }
        None => None,
    };

    let mut ready = Vec::new();
    for (pipeline_id, binding_id) in &pass.calls {
        let Some(binding) = bindings.get_mut(*binding_id) else {
            continue;
        };
        if !binding.value.try_make_complete(backend, buffers, textures, samplers) {
            continue;
        }
        let binding = &binding.value;
        let Some(pipeline) = render_pipelines.get_mut(*pipeline_id) else {
            continue;
        };
        let pipeline = &mut pipeline.value;
        if !pipeline.try_make_complete(backend, shaders, layout, binding) {
            continue;
        }
        if !pipeline.gate().allows() || !binding.executable() {
            continue;
        }
        pipeline.prepare_bundle(backend, *binding_id, binding, buffers, layout);
        pipeline.gate_mut().consume();
        ready.push((*pipeline_id, *binding_id));
    }

    backend.begin_render_pass(
        encoder,
        &RenderPassTargets {
            label: &pass.name,
            colors,
            depth,
        },
    );

    let mut draws = 0;
    for (pipeline_id, binding_id) in ready {
        let (Some(pipeline), Some(binding)) =
            (render_pipelines.get(pipeline_id), bindings.get(binding_id))
        else {
            continue;
        };
        if let Some(bundle) = pipeline.value.bundle(binding_id) {
            backend.execute_bundle(encoder, bundle);
            draws += 1;
            continue;
        }
        let Some(handle) = pipeline.value.handle() else {
            continue;
        };
        if let Some(draw) = draw_call(handle, &binding.value, buffers) {
            backend.draw(encoder, &draw);
            draws += 1;
        }
    }
    backend.end_render_pass(encoder);
    backend.pop_debug_group(encoder);
    logwise::trace_sync!(
        "render pass {name} recorded {draws} draws",
        name = logwise::privacy::LogIt(&pass.name),
        draws = draws
    );
    draws
}
