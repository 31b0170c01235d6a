// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reference counting across the resource graph, and the generational update list.

use frame_director::bindings::binding::{BindingDescriptor, DrawRange, UniformBlock, VertexBinding};
use frame_director::bindings::buffer::{AreaOptions, BufferDescriptor};
use frame_director::bindings::resource_tracking::ResourceKey;
use frame_director::bindings::sampler::SamplerDescriptor;
use frame_director::bindings::texture::{TextureDescriptor, TextureSize, TextureSource, Viewport};
use frame_director::bindings::visible_to::TextureUsages;
use frame_director::images::pipeline::RenderPipelineDescriptor;
use frame_director::images::render_pass::{ColorAttachment, RenderPassDescriptor};
use frame_director::images::vertex_layout::{VertexFieldType, VertexLayout};
use frame_director::imp::BufferKind;
use frame_director::imp::recording::RecordingBackend;
use frame_director::{Director, MemoryReport};
use std::collections::HashSet;

const WGSL: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";

fn director() -> Director<RecordingBackend> {
    Director::with_backend(RecordingBackend::new(), Viewport::new(32, 32))
}

/// Once the caller has let go of everything, removing the stage tears down the whole graph
/// and frees every device object.
#[test]
fn removing_a_stage_releases_the_graph() {
    let mut director = director();
    let vertices = director.create_data_ref_from("vertices", &[0.0f32; 9]);
    let tint = director.create_data_ref_from("tint", &[1.0f32; 4]);
    let vbo = director.create_buffer(BufferDescriptor::new("vbo", BufferKind::Vertex));
    director
        .register_structure_map(vbo, vertices, AreaOptions::default())
        .unwrap();
    let albedo = director
        .create_texture(TextureDescriptor::new(
            "albedo",
            frame_director::PixelFormat::Rgba8Unorm,
            TextureSource::Size(TextureSize::Fixed {
                width: 8,
                height: 8,
            }),
        ))
        .unwrap();
    let target = director
        .create_texture(
            TextureDescriptor::new(
                "target",
                frame_director::PixelFormat::Rgba8Unorm,
                TextureSource::Size(TextureSize::viewport()),
            )
            .with_usage(TextureUsages::RENDER_ATTACHMENT),
        )
        .unwrap();
    let sampler = director.create_sampler(SamplerDescriptor::mipmapped("linear"));
    let shader = director.create_shader("mesh", Some(WGSL.to_string()));
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new("mesh", shader))
        .unwrap();

    let mut layout = VertexLayout::new();
    layout.add_field("position", VertexFieldType::F32x3);
    let mut descriptor = BindingDescriptor::new("mesh");
    descriptor.vertex.push(VertexBinding { buffer: vbo, layout });
    descriptor.uniforms.push(UniformBlock::fixed("tint", tint));
    descriptor.textures.push(albedo);
    descriptor.samplers.push(sampler);
    descriptor.range = DrawRange::vertices(3);
    let binding = director.create_binding(descriptor).unwrap();
    let uniforms = director.uniform_buffer(binding).unwrap();

    let pass = director
        .create_render_pass(RenderPassDescriptor::new("main").color(ColorAttachment::new(target)))
        .unwrap();
    director.add_render_call(pass, pipeline, binding).unwrap();
    director.add_stage("world").unwrap();
    director.add_item("world", pass).unwrap();
    director.tick().unwrap();
    assert_eq!(
        director.backend().unwrap().submissions()[0][0].draws().len(),
        1
    );
    assert_eq!(director.ref_count(tint), Some(2));
    assert_eq!(director.ref_count(albedo), Some(2));

    let caller_refs: [ResourceKey; 10] = [
        vertices.into(),
        tint.into(),
        vbo.into(),
        albedo.into(),
        target.into(),
        sampler.into(),
        shader.into(),
        pipeline.into(),
        binding.into(),
        pass.into(),
    ];
    for key in caller_refs {
        assert!(director.release(key).is_empty(), "{key:?} still in use");
    }
    assert!(director.is_live(pass));
    assert_eq!(director.ref_count(pass), Some(1));

    director.remove_stage("world").unwrap();
    let mut expected: HashSet<ResourceKey> = caller_refs.into_iter().collect();
    expected.insert(uniforms.into());
    for key in &expected {
        assert!(!director.is_live(*key), "{key:?} survived");
    }
    assert_eq!(director.memory_report(), MemoryReport::default());

    let stats = director.backend().unwrap().stats();
    assert_eq!(stats.buffers_created, 2);
    assert_eq!(stats.buffers_freed, 2);
    assert_eq!(stats.textures_created, 2);
    assert_eq!(stats.textures_freed, 2);
    assert!(director.stage_names().is_empty());
}

/// Releases report exactly what they destroyed, and a release past zero is a logged no-op.
#[test]
fn releases_report_what_they_destroy() {
    let mut director = director();
    let data = director.create_data_ref_from("points", &[0u32; 4]);
    let buffer = director.create_buffer(BufferDescriptor::new("points", BufferKind::Storage));
    director
        .register_structure_map(buffer, data, AreaOptions::default())
        .unwrap();
    assert!(director.release(data).is_empty());
    assert_eq!(director.ref_count(data), Some(1));

    let destroyed: HashSet<ResourceKey> = director.release(buffer).into_iter().collect();
    assert_eq!(
        destroyed,
        HashSet::from([ResourceKey::from(buffer), ResourceKey::from(data)])
    );
    assert!(director.release(buffer).is_empty());
    assert!(director.release(data).is_empty());
    assert_eq!(director.ref_count(buffer), None);
    assert!(director.retain(buffer).is_err());
}

#[test]
fn retained_resources_outlive_their_creator_reference() {
    let mut director = director();
    let sampler = director.create_sampler(SamplerDescriptor::pixel("nearest"));
    director.retain(sampler).unwrap();
    assert!(director.release(sampler).is_empty());
    assert!(director.is_live(sampler));
    assert_eq!(director.release(sampler), vec![ResourceKey::from(sampler)]);
    assert!(!director.is_live(sampler));
}

/// A resource is scheduled only in ticks where something about it changed.
#[test]
fn updates_are_generational() {
    let mut director = director();
    let data = director.create_data_ref_from("points", &[0u32; 4]);
    let buffer = director.create_buffer(BufferDescriptor::new("points", BufferKind::Vertex));
    director
        .register_structure_map(buffer, data, AreaOptions::default())
        .unwrap();
    assert_eq!(director.pending_updates(), vec![ResourceKey::from(buffer)]);

    let report = director.tick().unwrap();
    assert_eq!(report.updated, 1);
    assert!(director.pending_updates().is_empty());
    assert_eq!(director.tick().unwrap().updated, 0);

    director.write_data(data, 4, &[9u32]).unwrap();
    assert_eq!(director.pending_updates(), vec![ResourceKey::from(buffer)]);
    assert_eq!(director.tick().unwrap().updated, 1);
    assert!(director.pending_updates().is_empty());

    // a resource destroyed while scheduled simply drops out
    director.write_data(data, 0, &[1u32]).unwrap();
    director.release(buffer);
    assert_eq!(director.tick().unwrap().updated, 0);
    assert!(director.pending_updates().is_empty());
    assert_eq!(
        director.memory_report(),
        MemoryReport {
            buffer_bytes: 0,
            texture_bytes: 0
        }
    );
}

/// Frame-recurring work (here a dynamic uniform) is rescheduled every tick.
#[test]
fn recurring_updates_stay_scheduled() {
    let mut director = director();
    let clock = director.create_data_ref("clock", vec![0; 4]);
    let mut descriptor = BindingDescriptor::new("animated");
    descriptor
        .uniforms
        .push(UniformBlock::dynamic("clock", clock, |bytes| bytes[0] = bytes[0].wrapping_add(1)));
    let binding = director.create_binding(descriptor).unwrap();
    for _ in 0..3 {
        director.tick().unwrap();
        assert!(director.pending_updates().contains(&ResourceKey::from(binding)));
    }

    director.release(binding);
    director.tick().unwrap();
    assert!(director.pending_updates().is_empty());
}
