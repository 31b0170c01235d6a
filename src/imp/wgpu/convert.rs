// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Mappings from crate descriptions to wgpu types.

use crate::bindings::sampler::{AddressMode, CompareFunction, FilterMode};
use crate::bindings::visible_to::{ShaderStages, TextureUsages};
use crate::images::pipeline::{BlendMode, PrimitiveState, Topology};
use crate::images::render_pass::{Color, LoadOp};
use crate::images::vertex_layout::{VertexFieldType, VertexLayout, VertexStep};
use crate::imp::{
    BufferKind, IndexFormat, LayoutEntry, LayoutEntryType, SamplerBindingKind, TextureSampleType,
};
use crate::imp::wgpu::pixel_format::wgpu_format;

pub(super) fn buffer_usages(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Index(_) => wgpu::BufferUsages::INDEX,
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
        BufferKind::Indirect => wgpu::BufferUsages::INDIRECT,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

pub(super) fn texture_usages(usage: TextureUsages) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsages::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsages::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    if usage.contains(TextureUsages::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsages::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsages::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

pub(super) fn shader_stages(stages: ShaderStages) -> wgpu::ShaderStages {
    let mut out = wgpu::ShaderStages::NONE;
    if stages.contains(ShaderStages::VERTEX) {
        out |= wgpu::ShaderStages::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        out |= wgpu::ShaderStages::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        out |= wgpu::ShaderStages::COMPUTE;
    }
    out
}

pub(super) fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub(super) fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

pub(super) fn compare_function(function: CompareFunction) -> wgpu::CompareFunction {
    match function {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub(super) fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

pub(super) fn layout_entry(entry: &LayoutEntry) -> wgpu::BindGroupLayoutEntry {
    let ty = match entry.ty {
        LayoutEntryType::UniformBuffer => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        LayoutEntryType::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        LayoutEntryType::Texture {
            sample_type,
            multisampled,
        } => wgpu::BindingType::Texture {
            sample_type: match sample_type {
                TextureSampleType::Float { filterable } => {
                    wgpu::TextureSampleType::Float { filterable }
                }
                TextureSampleType::Depth => wgpu::TextureSampleType::Depth,
                TextureSampleType::Uint => wgpu::TextureSampleType::Uint,
                TextureSampleType::Sint => wgpu::TextureSampleType::Sint,
            },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled,
        },
        LayoutEntryType::StorageTexture { format } => wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu_format(format),
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        LayoutEntryType::Sampler(kind) => wgpu::BindingType::Sampler(match kind {
            SamplerBindingKind::Filtering => wgpu::SamplerBindingType::Filtering,
            SamplerBindingKind::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            SamplerBindingKind::Comparison => wgpu::SamplerBindingType::Comparison,
        }),
    };
    wgpu::BindGroupLayoutEntry {
        binding: entry.binding,
        visibility: shader_stages(entry.visibility),
        ty,
        count: None,
    }
}

fn vertex_format(field: VertexFieldType) -> wgpu::VertexFormat {
    match field {
        VertexFieldType::F32 => wgpu::VertexFormat::Float32,
        VertexFieldType::F32x2 => wgpu::VertexFormat::Float32x2,
        VertexFieldType::F32x3 => wgpu::VertexFormat::Float32x3,
        VertexFieldType::F32x4 => wgpu::VertexFormat::Float32x4,
        VertexFieldType::U32 => wgpu::VertexFormat::Uint32,
        VertexFieldType::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

/// Attributes for each layout.  Shader locations continue from one buffer to the next.
pub(super) fn vertex_attributes(layouts: &[VertexLayout]) -> Vec<Vec<wgpu::VertexAttribute>> {
    let mut location = 0;
    layouts
        .iter()
        .map(|layout| {
            layout
                .attributes()
                .map(|(_, field, offset)| {
                    let attribute = wgpu::VertexAttribute {
                        format: vertex_format(field),
                        offset,
                        shader_location: location,
                    };
                    location += 1;
                    attribute
                })
                .collect()
        })
        .collect()
}

pub(super) fn step_mode(step: VertexStep) -> wgpu::VertexStepMode {
    match step {
        VertexStep::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStep::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub(super) fn primitive_state(state: PrimitiveState) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: match state.topology {
            Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            Topology::LineList => wgpu::PrimitiveTopology::LineList,
            Topology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Topology::PointList => wgpu::PrimitiveTopology::PointList,
        },
        cull_mode: state.cull_back.then_some(wgpu::Face::Back),
        ..Default::default()
    }
}

pub(super) fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        },
    }
}

pub(super) fn color_load(load: LoadOp<Color>) -> wgpu::LoadOp<wgpu::Color> {
    match load {
        LoadOp::Clear(c) => wgpu::LoadOp::Clear(wgpu::Color {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub(super) fn depth_load(load: LoadOp<f32>) -> wgpu::LoadOp<f32> {
    match load {
        LoadOp::Clear(depth) => wgpu::LoadOp::Clear(depth),
        LoadOp::Load => wgpu::LoadOp::Load,
    }
}

pub(super) fn store_op(store: bool) -> wgpu::StoreOp {
    if store {
        wgpu::StoreOp::Store
    } else {
        wgpu::StoreOp::Discard
    }
}
