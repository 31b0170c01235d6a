// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reference-counted storage for every resource the director owns.
//!
//! Resources live in one [`slotmap::SlotMap`] per kind and are addressed by typed ids.  Each
//! slot carries a reference count next to the resource:
//!
//! - creation stores the resource with a count of 1, owned by whoever asked for it
//! - [`Arena::retain`] adds a reference
//! - [`Arena::release`] drops one; at zero the resource is destroyed and every resource it
//!   holds a reference to is released in turn
//!
//! Ownership edges only ever point from a resource to resources created before it (a pass
//! holds pipelines and bindings, a binding holds buffers and textures, a buffer holds data
//! refs), so the graph is acyclic and a release always terminates.
//!
//! Teardown walks a worklist rather than recursing.  A key whose slot is already gone is
//! reported and ignored, which makes a double release harmless.

use crate::bindings::binding::Binding;
use crate::bindings::buffer::Buffer;
use crate::bindings::data_ref::{DataRef, Subscriber};
use crate::bindings::sampler::Sampler;
use crate::bindings::texture::Texture;
use crate::error::Error;
use crate::images::compute_pass::ComputePass;
use crate::images::pipeline::{ComputePipeline, RenderPipeline};
use crate::images::render_pass::RenderPass;
use crate::images::shader::Shader;
use crate::imp::Backend;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// A named byte array observed by buffers.
    pub struct DataRefId;
    /// A device buffer packed from data refs.
    pub struct BufferId;
    /// A texture, swapchain textures included.
    pub struct TextureId;
    pub struct SamplerId;
    pub struct ShaderId;
    /// A group of resources bound together for one draw or dispatch.
    pub struct BindingId;
    pub struct RenderPipelineId;
    pub struct ComputePipelineId;
    pub struct RenderPassId;
    pub struct ComputePassId;
}

/// Any resource id, with its kind erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    DataRef(DataRefId),
    Buffer(BufferId),
    Texture(TextureId),
    Sampler(SamplerId),
    Shader(ShaderId),
    Binding(BindingId),
    RenderPipeline(RenderPipelineId),
    ComputePipeline(ComputePipelineId),
    RenderPass(RenderPassId),
    ComputePass(ComputePassId),
}

macro_rules! key_from {
    ($($id:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$id> for ResourceKey {
                fn from(id: $id) -> Self {
                    ResourceKey::$variant(id)
                }
            }
        )*
    };
}

key_from! {
    DataRefId => DataRef,
    BufferId => Buffer,
    TextureId => Texture,
    SamplerId => Sampler,
    ShaderId => Shader,
    BindingId => Binding,
    RenderPipelineId => RenderPipeline,
    ComputePipelineId => ComputePipeline,
    RenderPassId => RenderPass,
    ComputePassId => ComputePass,
}

/// A resource and its reference count.
#[derive(Debug)]
pub(crate) struct Tracked<T> {
    refs: u32,
    pub(crate) value: T,
}

impl<T> Tracked<T> {
    pub(crate) fn new(value: T) -> Self {
        Tracked { refs: 1, value }
    }
}

pub(crate) struct Arena<B: Backend> {
    pub(crate) data_refs: SlotMap<DataRefId, Tracked<DataRef>>,
    pub(crate) buffers: SlotMap<BufferId, Tracked<Buffer<B>>>,
    pub(crate) textures: SlotMap<TextureId, Tracked<Texture<B>>>,
    pub(crate) samplers: SlotMap<SamplerId, Tracked<Sampler<B>>>,
    pub(crate) shaders: SlotMap<ShaderId, Tracked<Shader<B>>>,
    pub(crate) bindings: SlotMap<BindingId, Tracked<Binding<B>>>,
    pub(crate) render_pipelines: SlotMap<RenderPipelineId, Tracked<RenderPipeline<B>>>,
    pub(crate) compute_pipelines: SlotMap<ComputePipelineId, Tracked<ComputePipeline<B>>>,
    pub(crate) render_passes: SlotMap<RenderPassId, Tracked<RenderPass>>,
    pub(crate) compute_passes: SlotMap<ComputePassId, Tracked<ComputePass>>,
}

impl<B: Backend> Arena<B> {
    pub(crate) fn new() -> Self {
        Arena {
            data_refs: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            bindings: SlotMap::with_key(),
            render_pipelines: SlotMap::with_key(),
            compute_pipelines: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            compute_passes: SlotMap::with_key(),
        }
    }

    fn refs_mut(&mut self, key: ResourceKey) -> Option<&mut u32> {
        match key {
            ResourceKey::DataRef(id) => self.data_refs.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::Buffer(id) => self.buffers.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::Texture(id) => self.textures.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::Sampler(id) => self.samplers.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::Shader(id) => self.shaders.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::Binding(id) => self.bindings.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::RenderPipeline(id) => {
                self.render_pipelines.get_mut(id).map(|t| &mut t.refs)
            }
            ResourceKey::ComputePipeline(id) => {
                self.compute_pipelines.get_mut(id).map(|t| &mut t.refs)
            }
            ResourceKey::RenderPass(id) => self.render_passes.get_mut(id).map(|t| &mut t.refs),
            ResourceKey::ComputePass(id) => self.compute_passes.get_mut(id).map(|t| &mut t.refs),
        }
    }

    /// Current reference count, or `None` for a dead key.
    pub(crate) fn ref_count(&self, key: ResourceKey) -> Option<u32> {
        match key {
            ResourceKey::DataRef(id) => self.data_refs.get(id).map(|t| t.refs),
            ResourceKey::Buffer(id) => self.buffers.get(id).map(|t| t.refs),
            ResourceKey::Texture(id) => self.textures.get(id).map(|t| t.refs),
            ResourceKey::Sampler(id) => self.samplers.get(id).map(|t| t.refs),
            ResourceKey::Shader(id) => self.shaders.get(id).map(|t| t.refs),
            ResourceKey::Binding(id) => self.bindings.get(id).map(|t| t.refs),
            ResourceKey::RenderPipeline(id) => self.render_pipelines.get(id).map(|t| t.refs),
            ResourceKey::ComputePipeline(id) => self.compute_pipelines.get(id).map(|t| t.refs),
            ResourceKey::RenderPass(id) => self.render_passes.get(id).map(|t| t.refs),
            ResourceKey::ComputePass(id) => self.compute_passes.get(id).map(|t| t.refs),
        }
    }

    pub(crate) fn contains(&self, key: ResourceKey) -> bool {
        self.ref_count(key).is_some()
    }

    /// Adds a reference to `key`.
    pub(crate) fn retain(&mut self, key: ResourceKey) -> Result<(), Error> {
        match self.refs_mut(key) {
            Some(refs) => {
                *refs += 1;
                Ok(())
            }
            None => Err(Error::StaleHandle(key)),
        }
    }

    /// Retains every key, failing before touching any count if one of them is dead.
    pub(crate) fn retain_all(&mut self, keys: &[ResourceKey]) -> Result<(), Error> {
        for key in keys {
            if !self.contains(*key) {
                return Err(Error::StaleHandle(*key));
            }
        }
        for key in keys {
            self.retain(*key)?;
        }
        Ok(())
    }

    /// Drops one reference to `key` and returns every resource destroyed as a result.
    pub(crate) fn release(&mut self, key: ResourceKey) -> Vec<ResourceKey> {
        let mut destroyed = Vec::new();
        let mut worklist = vec![key];
        while let Some(key) = worklist.pop() {
            let Some(refs) = self.refs_mut(key) else {
                logwise::warn_sync!(
                    "release of dead resource {key}",
                    key = logwise::privacy::LogIt(&key)
                );
                continue;
            };
            *refs -= 1;
            if *refs == 0 {
                worklist.extend(self.destroy(key));
                destroyed.push(key);
            }
        }
        destroyed
    }

    /// Removes `key` from the arena, unlinks it from the resources it observes, and returns
    /// the references it held.
    fn destroy(&mut self, key: ResourceKey) -> Vec<ResourceKey> {
        logwise::trace_sync!(
            "destroying {key}",
            key = logwise::privacy::LogIt(&key)
        );
        match key {
            ResourceKey::DataRef(id) => self
                .data_refs
                .remove(id)
                .map(|t| t.value.dependencies())
                .unwrap_or_default(),
            ResourceKey::Buffer(id) => {
                let Some(tracked) = self.buffers.remove(id) else {
                    return Vec::new();
                };
                for area in tracked.value.areas() {
                    if let Some(data) = self.data_refs.get_mut(area.data) {
                        data.value.unsubscribe(|s| {
                            matches!(s, Subscriber::Area { buffer, .. } if *buffer == id)
                        });
                    }
                }
                tracked.value.dependencies()
            }
            ResourceKey::Texture(id) => self
                .textures
                .remove(id)
                .map(|t| t.value.dependencies())
                .unwrap_or_default(),
            ResourceKey::Sampler(id) => self
                .samplers
                .remove(id)
                .map(|_| Vec::new())
                .unwrap_or_default(),
            ResourceKey::Shader(id) => self
                .shaders
                .remove(id)
                .map(|_| Vec::new())
                .unwrap_or_default(),
            ResourceKey::Binding(id) => {
                let Some(tracked) = self.bindings.remove(id) else {
                    return Vec::new();
                };
                for texture in tracked.value.textures() {
                    if let Some(t) = self.textures.get_mut(texture) {
                        t.value.remove_dependent(key);
                    }
                }
                for (_, pipeline) in self.render_pipelines.iter_mut() {
                    pipeline.value.evict_bundle(id);
                }
                tracked.value.dependencies()
            }
            ResourceKey::RenderPipeline(id) => self
                .render_pipelines
                .remove(id)
                .map(|t| t.value.dependencies())
                .unwrap_or_default(),
            ResourceKey::ComputePipeline(id) => self
                .compute_pipelines
                .remove(id)
                .map(|t| t.value.dependencies())
                .unwrap_or_default(),
            ResourceKey::RenderPass(id) => {
                let Some(tracked) = self.render_passes.remove(id) else {
                    return Vec::new();
                };
                for texture in tracked.value.attachment_textures() {
                    if let Some(t) = self.textures.get_mut(texture) {
                        t.value.remove_dependent(key);
                    }
                }
                tracked.value.dependencies()
            }
            ResourceKey::ComputePass(id) => self
                .compute_passes
                .remove(id)
                .map(|t| t.value.dependencies())
                .unwrap_or_default(),
        }
    }
}
