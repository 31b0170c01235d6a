// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Bindings: everything one draw or dispatch reads, gathered in one place.

A binding owns references to its index, indirect, vertex, storage and shared uniform buffers,
its textures and its samplers.  Its own uniform blocks are packed into one internal uniform
buffer, one 256-byte aligned area per block.

Resources are grouped into up to three bind groups:

| Group    | Contents                                       |
|----------|------------------------------------------------|
| uniform  | the internal uniform blocks, then shared ones  |
| storage  | storage buffers                                |
| texture  | sampled textures, storage textures, samplers   |

Group indices are assigned once, at construction, counting only non-empty groups in the
order above, so they increase strictly and never change.

# Completeness

A binding is complete once every layout and bind group exists.  `try_make_complete`
refuses (with no side effects) while any texture lacks an image or any buffer or sampler has
not been created on the device.  Completion is permanent; when a texture is reallocated the
texture group is rebuilt in place and the binding's generation advances, which tells cached
render bundles they are out of date.
*/

use crate::bindings::buffer::Buffer;
use crate::bindings::data_ref::DataRef;
use crate::bindings::resource_tracking::{
    BufferId, DataRefId, ResourceKey, SamplerId, TextureId, Tracked,
};
use crate::bindings::sampler::Sampler;
use crate::bindings::texture::Texture;
use crate::bindings::visible_to::ShaderStages;
use crate::images::vertex_layout::VertexLayout;
use crate::imp::{
    Backend, BufferKind, GroupEntry, GroupResource, IndexFormat, LayoutEntry, LayoutEntryType,
};
use slotmap::SlotMap;
use std::fmt::{Debug, Formatter};

/// Alignment of each uniform block inside the internal uniform buffer.
pub const UNIFORM_ALIGNMENT: u64 = 256;

/// Element counts for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawRange {
    /// Vertices, or indices when an index buffer is bound.
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawRange {
    pub const fn vertices(vertex_count: u32) -> Self {
        DrawRange {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    pub const fn instanced(vertex_count: u32, instance_count: u32) -> Self {
        DrawRange {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

impl Default for DrawRange {
    fn default() -> Self {
        Self::vertices(0)
    }
}

/// Where a uniform block's bytes come from.
pub enum UniformValue {
    /// Uploaded whenever the data ref changes.
    Static(DataRefId),
    /// `refresh` rewrites the data ref in place at the start of every tick.
    Dynamic {
        data: DataRefId,
        refresh: Box<dyn FnMut(&mut [u8])>,
    },
}

impl UniformValue {
    pub fn data(&self) -> DataRefId {
        match self {
            UniformValue::Static(data) | UniformValue::Dynamic { data, .. } => *data,
        }
    }
}

impl Debug for UniformValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UniformValue::Static(data) => f.debug_tuple("Static").field(data).finish(),
            UniformValue::Dynamic { data, .. } => {
                f.debug_struct("Dynamic").field("data", data).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug)]
pub struct UniformBlock {
    pub name: String,
    pub value: UniformValue,
}

impl UniformBlock {
    pub fn fixed(name: impl Into<String>, data: DataRefId) -> Self {
        UniformBlock {
            name: name.into(),
            value: UniformValue::Static(data),
        }
    }

    pub fn dynamic(
        name: impl Into<String>,
        data: DataRefId,
        refresh: impl FnMut(&mut [u8]) + 'static,
    ) -> Self {
        UniformBlock {
            name: name.into(),
            value: UniformValue::Dynamic {
                data,
                refresh: Box::new(refresh),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: BufferId,
    pub layout: VertexLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageBinding {
    pub buffer: BufferId,
    pub writable: bool,
}

#[derive(Debug)]
pub struct BindingDescriptor {
    pub label: String,
    /// Stages that see the bind groups.
    pub visibility: ShaderStages,
    /// The index format comes from the buffer's [`BufferKind::Index`].
    pub index: Option<BufferId>,
    /// Indirect argument buffer and byte offset.
    pub indirect: Option<(BufferId, u64)>,
    pub vertex: Vec<VertexBinding>,
    pub uniforms: Vec<UniformBlock>,
    pub shared_uniforms: Vec<BufferId>,
    pub storages: Vec<StorageBinding>,
    pub textures: Vec<TextureId>,
    pub storage_textures: Vec<TextureId>,
    pub samplers: Vec<SamplerId>,
    pub range: DrawRange,
    pub workgroups: [u32; 3],
}

impl BindingDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        BindingDescriptor {
            label: label.into(),
            visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            index: None,
            indirect: None,
            vertex: Vec::new(),
            uniforms: Vec::new(),
            shared_uniforms: Vec::new(),
            storages: Vec::new(),
            textures: Vec::new(),
            storage_textures: Vec::new(),
            samplers: Vec::new(),
            range: DrawRange::default(),
            workgroups: [1, 1, 1],
        }
    }

    /// Every resource the binding will hold a reference to, before its own uniform buffer.
    pub(crate) fn referenced(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = Vec::new();
        keys.extend(self.index.map(ResourceKey::from));
        keys.extend(self.indirect.map(|(b, _)| ResourceKey::from(b)));
        keys.extend(self.vertex.iter().map(|v| ResourceKey::from(v.buffer)));
        keys.extend(self.shared_uniforms.iter().map(|b| ResourceKey::from(*b)));
        keys.extend(self.storages.iter().map(|s| ResourceKey::from(s.buffer)));
        keys.extend(self.textures.iter().map(|t| ResourceKey::from(*t)));
        keys.extend(self.storage_textures.iter().map(|t| ResourceKey::from(*t)));
        keys.extend(self.samplers.iter().map(|s| ResourceKey::from(*s)));
        keys
    }
}

/// Bind group indices, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupOrders {
    pub uniform: Option<u32>,
    pub storage: Option<u32>,
    pub texture: Option<u32>,
}

impl GroupOrders {
    fn compute(has_uniform: bool, has_storage: bool, has_texture: bool) -> Self {
        let mut next = 0;
        let mut assign = |present: bool| {
            if present {
                next += 1;
                Some(next - 1)
            } else {
                None
            }
        };
        GroupOrders {
            uniform: assign(has_uniform),
            storage: assign(has_storage),
            texture: assign(has_texture),
        }
    }
}

struct Group<B: Backend> {
    index: u32,
    entries: Vec<LayoutEntry>,
    layout: B::BindGroupLayout,
    group: B::BindGroup,
}

pub(crate) struct Binding<B: Backend> {
    label: String,
    visibility: ShaderStages,
    index: Option<BufferId>,
    indirect: Option<(BufferId, u64)>,
    vertex: Vec<VertexBinding>,
    uniform_buffer: Option<BufferId>,
    uniform_blocks: Vec<String>,
    dynamic: Vec<(DataRefId, Box<dyn FnMut(&mut [u8])>)>,
    shared_uniforms: Vec<BufferId>,
    storages: Vec<StorageBinding>,
    textures: Vec<TextureId>,
    storage_textures: Vec<TextureId>,
    samplers: Vec<SamplerId>,
    range: DrawRange,
    workgroups: [u32; 3],
    orders: GroupOrders,
    executable: bool,
    complete: bool,
    texture_group_stale: bool,
    generation: u64,
    vertex_layouts: Vec<VertexLayout>,
    groups: Vec<Group<B>>,
}

impl<B: Backend> Binding<B> {
    /// Builds the binding around an already-populated internal uniform buffer.
    pub(crate) fn new(descriptor: BindingDescriptor, uniform_buffer: Option<BufferId>) -> Self {
        let orders = GroupOrders::compute(
            !descriptor.uniforms.is_empty() || !descriptor.shared_uniforms.is_empty(),
            !descriptor.storages.is_empty(),
            !descriptor.textures.is_empty()
                || !descriptor.storage_textures.is_empty()
                || !descriptor.samplers.is_empty(),
        );
        let mut uniform_blocks = Vec::new();
        let mut dynamic = Vec::new();
        for block in descriptor.uniforms {
            uniform_blocks.push(block.name);
            if let UniformValue::Dynamic { data, refresh } = block.value {
                dynamic.push((data, refresh));
            }
        }
        Binding {
            label: descriptor.label,
            visibility: descriptor.visibility,
            index: descriptor.index,
            indirect: descriptor.indirect,
            vertex: descriptor.vertex,
            uniform_buffer,
            uniform_blocks,
            dynamic,
            shared_uniforms: descriptor.shared_uniforms,
            storages: descriptor.storages,
            textures: descriptor.textures,
            storage_textures: descriptor.storage_textures,
            samplers: descriptor.samplers,
            range: descriptor.range,
            workgroups: descriptor.workgroups,
            orders,
            executable: true,
            complete: false,
            texture_group_stale: false,
            generation: 0,
            vertex_layouts: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn orders(&self) -> GroupOrders {
        self.orders
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn executable(&self) -> bool {
        self.executable
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    pub(crate) fn range(&self) -> DrawRange {
        self.range
    }

    pub(crate) fn set_range(&mut self, range: DrawRange) {
        self.range = range;
    }

    pub(crate) fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    pub(crate) fn set_workgroups(&mut self, workgroups: [u32; 3]) {
        self.workgroups = workgroups;
    }

    pub(crate) fn index_buffer(&self) -> Option<BufferId> {
        self.index
    }

    pub(crate) fn indirect(&self) -> Option<(BufferId, u64)> {
        self.indirect
    }

    pub(crate) fn set_indirect_offset(&mut self, offset: u64) {
        if let Some((_, o)) = &mut self.indirect {
            *o = offset;
        }
    }

    pub(crate) fn vertex_buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.vertex.iter().map(|v| v.buffer)
    }

    /// Vertex layouts, empty before completion.
    pub(crate) fn vertex_layouts(&self) -> &[VertexLayout] {
        &self.vertex_layouts
    }

    pub(crate) fn uniform_buffer(&self) -> Option<BufferId> {
        self.uniform_buffer
    }

    pub(crate) fn has_dynamic_uniforms(&self) -> bool {
        !self.dynamic.is_empty()
    }

    /// Every texture the binding reads or writes.
    pub(crate) fn textures(&self) -> Vec<TextureId> {
        self.textures
            .iter()
            .chain(self.storage_textures.iter())
            .copied()
            .collect()
    }

    pub(crate) fn mark_texture_group_stale(&mut self) {
        if self.orders.texture.is_some() {
            self.texture_group_stale = true;
        }
    }

    /// Layouts in group order; empty before completion.
    pub(crate) fn group_layouts(&self) -> Vec<&B::BindGroupLayout> {
        self.groups.iter().map(|g| &g.layout).collect()
    }

    /// `(group index, bind group)` pairs; empty before completion.
    pub(crate) fn bind_groups(&self) -> Vec<(u32, &B::BindGroup)> {
        self.groups.iter().map(|g| (g.index, &g.group)).collect()
    }

    /// Reruns every dynamic uniform refresher and returns the data refs it rewrote.
    pub(crate) fn refresh(
        &mut self,
        data_refs: &mut SlotMap<DataRefId, Tracked<DataRef>>,
    ) -> Vec<DataRefId> {
        let mut touched = Vec::new();
        for (data, refresh) in &mut self.dynamic {
            if let Some(tracked) = data_refs.get_mut(*data) {
                refresh(tracked.value.bytes_mut());
                touched.push(*data);
            }
        }
        touched
    }

    fn buffer_ids(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.index
            .into_iter()
            .chain(self.indirect.map(|(b, _)| b))
            .chain(self.vertex.iter().map(|v| v.buffer))
            .chain(self.uniform_buffer)
            .chain(self.shared_uniforms.iter().copied())
            .chain(self.storages.iter().map(|s| s.buffer))
    }

    fn resources_ready(
        &self,
        buffers: &SlotMap<BufferId, Tracked<Buffer<B>>>,
        textures: &SlotMap<TextureId, Tracked<Texture<B>>>,
        samplers: &SlotMap<SamplerId, Tracked<Sampler<B>>>,
    ) -> bool {
        self.textures
            .iter()
            .chain(self.storage_textures.iter())
            .all(|t| textures.get(*t).is_some_and(|t| t.value.view().is_some()))
            && self
                .buffer_ids()
                .all(|b| buffers.get(b).is_some_and(|b| b.value.device().is_some()))
            && self
                .samplers
                .iter()
                .all(|s| samplers.get(*s).is_some_and(|s| s.value.device().is_some()))
    }

    /// Tries to build every layout and bind group.  See the module documentation.
    pub(crate) fn try_make_complete(
        &mut self,
        backend: &B,
        buffers: &SlotMap<BufferId, Tracked<Buffer<B>>>,
        textures: &SlotMap<TextureId, Tracked<Texture<B>>>,
        samplers: &SlotMap<SamplerId, Tracked<Sampler<B>>>,
    ) -> bool {
        if self.complete {
            if self.texture_group_stale && self.resources_ready(buffers, textures, samplers) {
                self.rebuild_texture_group(backend, textures, samplers);
            }
            return true;
        }
        if !self.resources_ready(buffers, textures, samplers) {
            return false;
        }
        self.vertex_layouts = self.vertex.iter().map(|v| v.layout.clone()).collect();

        let mut groups = Vec::new();
        if let Some(index) = self.orders.uniform {
            let (layout, entries) = self.uniform_entries(buffers);
            groups.push(self.build_group(backend, index, "uniforms", &layout, &entries));
        }
        if let Some(index) = self.orders.storage {
            let (layout, entries) = self.storage_entries(buffers);
            groups.push(self.build_group(backend, index, "storage", &layout, &entries));
        }
        if let Some(index) = self.orders.texture {
            let (layout, entries) = self.texture_entries(textures, samplers);
            groups.push(self.build_group(backend, index, "textures", &layout, &entries));
        }
        self.groups = groups;
        self.complete = true;
        self.texture_group_stale = false;
        self.generation += 1;
        logwise::trace_sync!(
            "binding {label} complete with {groups} groups",
            label = logwise::privacy::LogIt(&self.label),
            groups = self.groups.len()
        );
        true
    }

    fn build_group(
        &self,
        backend: &B,
        index: u32,
        kind: &str,
        layout: &[LayoutEntry],
        entries: &[GroupEntry<'_, B>],
    ) -> Group<B> {
        let label = format!("{} {kind}", self.label);
        let device_layout = backend.create_bind_group_layout(&label, layout);
        let group = backend.create_bind_group(&label, &device_layout, entries);
        Group {
            index,
            entries: layout.to_vec(),
            layout: device_layout,
            group,
        }
    }

    fn rebuild_texture_group(
        &mut self,
        backend: &B,
        textures: &SlotMap<TextureId, Tracked<Texture<B>>>,
        samplers: &SlotMap<SamplerId, Tracked<Sampler<B>>>,
    ) {
        let Some(index) = self.orders.texture else {
            return;
        };
        let label = format!("{} textures", self.label);
        let (layout, entries) = self.texture_entries(textures, samplers);
        let Some(slot) = self.groups.iter().position(|g| g.index == index) else {
            return;
        };
        let current = &mut self.groups[slot];
        // a format change can move a texture to another sample type
        if current.entries != layout {
            current.layout = backend.create_bind_group_layout(&label, &layout);
            current.entries = layout;
        }
        current.group = backend.create_bind_group(&label, &current.layout, &entries);
        self.texture_group_stale = false;
        self.generation += 1;
        logwise::trace_sync!(
            "binding {label} rebuilt its texture group",
            label = logwise::privacy::LogIt(&self.label)
        );
    }

    fn uniform_entries<'a>(
        &self,
        buffers: &'a SlotMap<BufferId, Tracked<Buffer<B>>>,
    ) -> (Vec<LayoutEntry>, Vec<GroupEntry<'a, B>>) {
        let mut layout = Vec::new();
        let mut entries = Vec::new();
        let internal = self.uniform_buffer.and_then(|id| buffers.get(id));
        if let Some(buffer) = internal {
            for name in &self.uniform_blocks {
                let (Some(area), Some(device)) = (buffer.value.area(name), buffer.value.device())
                else {
                    continue;
                };
                let binding = layout.len() as u32;
                layout.push(LayoutEntry {
                    binding,
                    visibility: self.visibility,
                    ty: LayoutEntryType::UniformBuffer,
                });
                entries.push(GroupEntry {
                    binding,
                    resource: GroupResource::Buffer {
                        buffer: device,
                        offset: area.start,
                        size: Some(area.length),
                    },
                });
            }
        }
        for shared in &self.shared_uniforms {
            let Some(device) = buffers.get(*shared).and_then(|b| b.value.device()) else {
                continue;
            };
            let binding = layout.len() as u32;
            layout.push(LayoutEntry {
                binding,
                visibility: self.visibility,
                ty: LayoutEntryType::UniformBuffer,
            });
            entries.push(GroupEntry {
                binding,
                resource: GroupResource::Buffer {
                    buffer: device,
                    offset: 0,
                    size: None,
                },
            });
        }
        (layout, entries)
    }

    fn storage_entries<'a>(
        &self,
        buffers: &'a SlotMap<BufferId, Tracked<Buffer<B>>>,
    ) -> (Vec<LayoutEntry>, Vec<GroupEntry<'a, B>>) {
        let mut layout = Vec::new();
        let mut entries = Vec::new();
        for storage in &self.storages {
            let Some(device) = buffers.get(storage.buffer).and_then(|b| b.value.device()) else {
                continue;
            };
            let binding = layout.len() as u32;
            layout.push(LayoutEntry {
                binding,
                visibility: self.visibility,
                ty: LayoutEntryType::StorageBuffer {
                    read_only: !storage.writable,
                },
            });
            entries.push(GroupEntry {
                binding,
                resource: GroupResource::Buffer {
                    buffer: device,
                    offset: 0,
                    size: None,
                },
            });
        }
        (layout, entries)
    }

    fn texture_entries<'a>(
        &self,
        textures: &'a SlotMap<TextureId, Tracked<Texture<B>>>,
        samplers: &'a SlotMap<SamplerId, Tracked<Sampler<B>>>,
    ) -> (Vec<LayoutEntry>, Vec<GroupEntry<'a, B>>) {
        let mut layout = Vec::new();
        let mut entries = Vec::new();
        for id in &self.textures {
            let Some(texture) = textures.get(*id) else {
                continue;
            };
            let Some(view) = texture.value.view() else {
                continue;
            };
            let binding = layout.len() as u32;
            layout.push(LayoutEntry {
                binding,
                visibility: self.visibility,
                ty: LayoutEntryType::Texture {
                    sample_type: texture.value.sample_type(),
                    multisampled: texture.value.sample_count() > 1,
                },
            });
            entries.push(GroupEntry {
                binding,
                resource: GroupResource::TextureView(view),
            });
        }
        for id in &self.storage_textures {
            let Some(texture) = textures.get(*id) else {
                continue;
            };
            let Some(view) = texture.value.view() else {
                continue;
            };
            let binding = layout.len() as u32;
            layout.push(LayoutEntry {
                binding,
                visibility: self.visibility,
                ty: LayoutEntryType::StorageTexture {
                    format: texture.value.format(),
                },
            });
            entries.push(GroupEntry {
                binding,
                resource: GroupResource::TextureView(view),
            });
        }
        for id in &self.samplers {
            let Some(sampler) = samplers.get(*id) else {
                continue;
            };
            let Some(device) = sampler.value.device() else {
                continue;
            };
            let binding = layout.len() as u32;
            layout.push(LayoutEntry {
                binding,
                visibility: self.visibility,
                ty: LayoutEntryType::Sampler(sampler.value.descriptor().binding_kind()),
            });
            entries.push(GroupEntry {
                binding,
                resource: GroupResource::Sampler(device),
            });
        }
        (layout, entries)
    }

    /// The index format, read from the index buffer's kind.
    pub(crate) fn index_format(buffers: &SlotMap<BufferId, Tracked<Buffer<B>>>, id: BufferId) -> IndexFormat {
        match buffers.get(id).map(|b| b.value.kind()) {
            Some(BufferKind::Index(format)) => format,
            _ => IndexFormat::Uint32,
        }
    }

    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = Vec::new();
        keys.extend(self.index.map(ResourceKey::from));
        keys.extend(self.indirect.map(|(b, _)| ResourceKey::from(b)));
        keys.extend(self.vertex.iter().map(|v| ResourceKey::from(v.buffer)));
        keys.extend(self.shared_uniforms.iter().map(|b| ResourceKey::from(*b)));
        keys.extend(self.storages.iter().map(|s| ResourceKey::from(s.buffer)));
        keys.extend(self.textures.iter().map(|t| ResourceKey::from(*t)));
        keys.extend(self.storage_textures.iter().map(|t| ResourceKey::from(*t)));
        keys.extend(self.samplers.iter().map(|s| ResourceKey::from(*s)));
        keys.extend(self.uniform_buffer.map(ResourceKey::from));
        keys
    }
}
