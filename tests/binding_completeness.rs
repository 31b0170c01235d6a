// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! When bindings become complete, and what completing them creates on the device.

use frame_director::bindings::binding::{BindingDescriptor, GroupOrders, StorageBinding, UniformBlock};
use frame_director::bindings::buffer::{AreaOptions, BufferDescriptor};
use frame_director::bindings::resource_tracking::ResourceKey;
use frame_director::bindings::sampler::SamplerDescriptor;
use frame_director::bindings::texture::{
    TextureDescriptor, TextureReset, TextureSize, TextureSource, Viewport,
};
use frame_director::imp::BufferKind;
use frame_director::imp::recording::RecordingBackend;
use frame_director::{Director, Error, PixelFormat};

fn director() -> Director<RecordingBackend> {
    Director::with_backend(RecordingBackend::new(), Viewport::new(64, 64))
}

fn fixed_texture(label: &str, width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new(
        label,
        PixelFormat::Rgba8Unorm,
        TextureSource::Size(TextureSize::Fixed { width, height }),
    )
}

fn layouts(director: &Director<RecordingBackend>) -> (usize, usize) {
    let stats = director.backend().unwrap().stats();
    (stats.bind_group_layouts_created, stats.bind_groups_created)
}

/// A binding reading a texture can't complete until the texture has an image, and once
/// complete it stays complete without creating anything further.
#[test]
fn completion_waits_for_resources_and_happens_once() {
    let mut director = director();
    let texture = director.create_texture(fixed_texture("albedo", 4, 4)).unwrap();
    let sampler = director.create_sampler(SamplerDescriptor::mipmapped("linear"));
    let tint = director.create_data_ref_from("tint", &[1.0f32; 4]);
    let mut descriptor = BindingDescriptor::new("sprite");
    descriptor.uniforms.push(UniformBlock::fixed("tint", tint));
    descriptor.textures.push(texture);
    descriptor.samplers.push(sampler);
    let binding = director.create_binding(descriptor).unwrap();

    assert!(!director.try_make_complete_binding(binding));
    assert!(!director.binding_is_complete(binding));
    assert_eq!(layouts(&director), (0, 0));

    director.tick().unwrap();
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 2));
    assert_eq!(director.binding_generation(binding), Some(1));

    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 2));
    assert_eq!(director.binding_generation(binding), Some(1));
}

/// Reallocating a bound texture rebuilds only the texture group, against the existing layout.
#[test]
fn texture_reallocation_rebuilds_texture_group() {
    let mut director = director();
    let texture = director.create_texture(fixed_texture("albedo", 4, 4)).unwrap();
    let tint = director.create_data_ref_from("tint", &[1.0f32; 4]);
    let mut descriptor = BindingDescriptor::new("sprite");
    descriptor.uniforms.push(UniformBlock::fixed("tint", tint));
    descriptor.textures.push(texture);
    let binding = director.create_binding(descriptor).unwrap();
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 2));

    let grow = TextureReset {
        size: Some(TextureSize::Fixed {
            width: 16,
            height: 16,
        }),
        ..Default::default()
    };
    director.reset_texture(texture, Some(grow)).unwrap();
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 3));
    assert_eq!(director.binding_generation(binding), Some(2));

    // nothing changed since
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 3));
}

/// A reset that changes how the texture is sampled also replaces the texture group's layout.
#[test]
fn sample_type_change_rebuilds_texture_layout() {
    let mut director = director();
    let texture = director.create_texture(fixed_texture("ids", 4, 4)).unwrap();
    let mut descriptor = BindingDescriptor::new("picking");
    descriptor.textures.push(texture);
    let binding = director.create_binding(descriptor).unwrap();
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (1, 1));

    let as_uint = TextureReset {
        format: Some(PixelFormat::R32Uint),
        ..Default::default()
    };
    director.reset_texture(texture, Some(as_uint)).unwrap();
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(binding));
    assert_eq!(layouts(&director), (2, 2));
    assert_eq!(director.binding_generation(binding), Some(2));
}

/// An indirect draw can't complete before its argument buffer exists on the device.
#[test]
fn indirect_arguments_gate_completion() {
    let mut director = director();
    let args = director.create_data_ref_from("args", &[3u32, 1, 0, 0]);
    let ind = director.create_buffer(BufferDescriptor::new("ind", BufferKind::Indirect));
    director
        .register_structure_map(ind, args, AreaOptions::default())
        .unwrap();
    let mut descriptor = BindingDescriptor::new("indirect");
    descriptor.indirect = Some((ind, 0));
    let indirect = director.create_binding(descriptor).unwrap();
    let bare = director.create_binding(BindingDescriptor::new("bare")).unwrap();

    assert!(director.try_make_complete_binding(bare));
    assert!(!director.try_make_complete_binding(indirect));
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(indirect));
}

#[test]
fn group_orders_skip_empty_groups() {
    let mut director = director();
    let data = director.create_data_ref_from("particles", &[0u32; 16]);
    let storage = director.create_buffer(BufferDescriptor::new("particles", BufferKind::Storage));
    director
        .register_structure_map(storage, data, AreaOptions::default())
        .unwrap();
    let texture = director.create_texture(fixed_texture("noise", 4, 4)).unwrap();

    let mut storage_only = BindingDescriptor::new("simulate");
    storage_only.storages.push(StorageBinding {
        buffer: storage,
        writable: true,
    });
    let storage_only = director.create_binding(storage_only).unwrap();
    assert_eq!(
        director.group_orders(storage_only),
        Some(GroupOrders {
            uniform: None,
            storage: Some(0),
            texture: None
        })
    );

    let mut mixed = BindingDescriptor::new("shade");
    mixed.uniforms.push(UniformBlock::fixed("params", data));
    mixed.textures.push(texture);
    let mixed = director.create_binding(mixed).unwrap();
    assert_eq!(
        director.group_orders(mixed),
        Some(GroupOrders {
            uniform: Some(0),
            storage: None,
            texture: Some(1)
        })
    );

    let empty = director.create_binding(BindingDescriptor::new("bare")).unwrap();
    assert_eq!(director.group_orders(empty), Some(GroupOrders::default()));
    director.tick().unwrap();
    assert!(director.try_make_complete_binding(empty));
}

/// A descriptor naming a dead resource is refused before anything is retained.
#[test]
fn stale_handles_are_refused_without_side_effects() {
    let mut director = director();
    let sampler = director.create_sampler(SamplerDescriptor::pixel("nearest"));
    let texture = director.create_texture(fixed_texture("gone", 4, 4)).unwrap();
    assert_eq!(director.release(texture), vec![ResourceKey::from(texture)]);

    let tint = director.create_data_ref_from("tint", &[1.0f32; 4]);
    let mut descriptor = BindingDescriptor::new("broken");
    descriptor.uniforms.push(UniformBlock::fixed("tint", tint));
    descriptor.samplers.push(sampler);
    descriptor.textures.push(texture);
    let result = director.create_binding(descriptor);
    assert!(matches!(result, Err(Error::StaleHandle(key)) if key == ResourceKey::from(texture)));
    assert_eq!(director.ref_count(sampler), Some(1));
    assert_eq!(director.ref_count(tint), Some(1));
    // no uniform buffer was built
    assert!(
        !director
            .pending_updates()
            .iter()
            .any(|k| matches!(k, ResourceKey::Buffer(_)))
    );
    assert!(director.live_bindings().is_empty());

    let binding = director.create_binding(BindingDescriptor::new("fine")).unwrap();
    director.release(binding);
    assert!(!director.try_make_complete_binding(binding));
    assert!(matches!(
        director.set_binding_executable(binding, false),
        Err(Error::StaleHandle(_))
    ));
}
