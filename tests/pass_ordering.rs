// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Frame structure: stage and pass order, visibility, and what happens before the device exists.

use frame_director::bindings::binding::{BindingDescriptor, DrawRange};
use frame_director::bindings::buffer::{AreaOptions, BufferDescriptor};
use frame_director::bindings::resource_tracking::{RenderPassId, ShaderId};
use frame_director::bindings::texture::{TextureDescriptor, TextureSize, TextureSource, Viewport};
use frame_director::bindings::visible_to::TextureUsages;
use frame_director::images::pipeline::{ComputePipelineDescriptor, RenderPipelineDescriptor};
use frame_director::images::render_pass::{ColorAttachment, DepthAttachment, RenderPassDescriptor};
use frame_director::imp::recording::{Command, RecordedCommandBuffer, RecordingBackend};
use frame_director::imp::{BufferKind, IndexFormat};
use frame_director::{Director, Error, PixelFormat};
use std::cell::Cell;
use std::rc::Rc;
use std::task::Poll;

const WGSL: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";

fn director() -> Director<RecordingBackend> {
    Director::with_backend(RecordingBackend::new(), Viewport::new(32, 32))
}

fn last_frame(director: &Director<RecordingBackend>) -> Vec<RecordedCommandBuffer> {
    director
        .backend()
        .and_then(|b| b.submissions().pop())
        .unwrap_or_default()
}

fn labels(frame: &[RecordedCommandBuffer]) -> Vec<String> {
    frame.iter().map(|b| b.label.clone()).collect()
}

fn groups(frame: &[RecordedCommandBuffer]) -> Vec<String> {
    frame
        .iter()
        .flat_map(|b| b.debug_groups().into_iter().map(str::to_string))
        .collect()
}

fn empty_pass(director: &mut Director<RecordingBackend>, name: &str) -> RenderPassId {
    director
        .create_render_pass(RenderPassDescriptor::new(name))
        .unwrap()
}

/// Adds a draw through a fresh pipeline labelled `label` to `pass`.
fn add_draw(director: &mut Director<RecordingBackend>, pass: RenderPassId, shader: ShaderId, label: &str) {
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new(label, shader))
        .unwrap();
    let mut binding = BindingDescriptor::new(label);
    binding.range = DrawRange::vertices(3);
    let binding = director.create_binding(binding).unwrap();
    director.add_render_call(pass, pipeline, binding).unwrap();
    director.release(pipeline);
    director.release(binding);
}

/// Stages become command buffers in insertion order, and each pass opens a debug group in
/// stage order.
#[test]
fn stages_and_passes_keep_insertion_order() {
    let mut director = director();
    for stage in ["A", "B"] {
        director.add_stage(stage).unwrap();
        for index in 0..2 {
            let pass = empty_pass(&mut director, &format!("{stage}.{index}"));
            director.add_item(stage, pass).unwrap();
            director.release(pass);
        }
    }
    assert_eq!(director.stage_names(), vec!["A", "B"]);

    let report = director.tick().unwrap();
    assert_eq!(report.stages_rendered, 2);
    assert_eq!(report.command_buffers, 2);
    let frame = last_frame(&director);
    assert_eq!(labels(&frame), vec!["A", "B"]);
    assert_eq!(groups(&frame), vec!["A.0", "A.1", "B.0", "B.1"]);
    assert_eq!(frame[0].render_passes(), 2);

    director.hide_stage("A").unwrap();
    let report = director.tick().unwrap();
    assert_eq!(report.stages_rendered, 1);
    assert_eq!(groups(&last_frame(&director)), vec!["B.0", "B.1"]);

    director.show_stage("A").unwrap();
    director.tick().unwrap();
    assert_eq!(labels(&last_frame(&director)), vec!["A", "B"]);
}

#[test]
fn draws_follow_call_order() {
    let mut director = director();
    let shader = director.create_shader("flat", Some(WGSL.to_string()));
    let pass = empty_pass(&mut director, "main");
    add_draw(&mut director, pass, shader, "second");
    add_draw(&mut director, pass, shader, "first");
    director.add_stage("world").unwrap();
    director.add_item("world", pass).unwrap();
    assert_eq!(director.pass_len(pass), Some(2));

    director.tick().unwrap();
    let frame = last_frame(&director);
    let order: Vec<&str> = frame[0].draws().iter().map(|d| d.pipeline.as_str()).collect();
    assert_eq!(order, vec!["second", "first"]);

    director.empty_pass(pass).unwrap();
    assert_eq!(director.pass_len(pass), Some(0));
    director.tick().unwrap();
    assert!(last_frame(&director)[0].draws().is_empty());
}

#[test]
fn stage_mistakes_are_errors() {
    let mut director = director();
    director.add_stage("world").unwrap();
    assert!(matches!(
        director.add_stage("world"),
        Err(Error::DuplicateStage(name)) if name == "world"
    ));
    assert!(matches!(director.hide_stage("ui"), Err(Error::UnknownStage(_))));

    let pass = empty_pass(&mut director, "main");
    assert!(matches!(director.add_item("ui", pass), Err(Error::UnknownStage(_))));
    assert_eq!(director.ref_count(pass), Some(1));
    assert!(matches!(director.remove_stage("ui"), Err(Error::UnknownStage(_))));
}

#[test]
fn removed_items_stop_rendering() {
    let mut director = director();
    director.add_stage("world").unwrap();
    let first = empty_pass(&mut director, "first");
    let second = empty_pass(&mut director, "second");
    director.add_item("world", first).unwrap();
    director.add_item("world", second).unwrap();
    assert_eq!(director.ref_count(first), Some(2));

    assert!(director.remove_item("world", first).unwrap());
    assert_eq!(director.ref_count(first), Some(1));
    assert!(!director.remove_item("world", first).unwrap());

    director.tick().unwrap();
    assert_eq!(groups(&last_frame(&director)), vec!["second"]);
}

/// Index and indirect buffers bound to a binding show up on its recorded draw.
#[test]
fn indexed_and_indirect_draws_record_their_buffers() {
    let mut director = director();
    let shader = director.create_shader("flat", Some(WGSL.to_string()));
    let pipeline = director
        .create_render_pipeline(RenderPipelineDescriptor::new("mesh", shader))
        .unwrap();
    let indices = director.create_data_ref_from("indices", &[0u16, 1, 2, 2, 1, 3]);
    let idx = director.create_buffer(BufferDescriptor::new(
        "idx",
        BufferKind::Index(IndexFormat::Uint16),
    ));
    director
        .register_structure_map(idx, indices, AreaOptions::default())
        .unwrap();
    let args = director.create_data_ref_from("args", &[6u32, 1, 0, 0, 0]);
    let ind = director.create_buffer(BufferDescriptor::new("ind", BufferKind::Indirect));
    director
        .register_structure_map(ind, args, AreaOptions::default())
        .unwrap();

    let mut indexed = BindingDescriptor::new("indexed");
    indexed.index = Some(idx);
    indexed.range = DrawRange::vertices(6);
    let indexed = director.create_binding(indexed).unwrap();
    let mut indirect = BindingDescriptor::new("indirect");
    indirect.index = Some(idx);
    indirect.indirect = Some((ind, 0));
    let indirect = director.create_binding(indirect).unwrap();

    let pass = empty_pass(&mut director, "main");
    director.add_render_call(pass, pipeline, indexed).unwrap();
    director.add_render_call(pass, pipeline, indirect).unwrap();
    director.add_stage("world").unwrap();
    director.add_item("world", pass).unwrap();
    director.tick().unwrap();

    let frame = last_frame(&director);
    let draws = frame[0].draws();
    assert_eq!(draws.len(), 2);
    assert!(draws[0].is_indexed());
    assert!(!draws[0].is_indirect());
    assert_eq!(draws[0].index, Some(("idx".to_string(), IndexFormat::Uint16)));
    assert_eq!(draws[0].range, DrawRange::vertices(6));
    assert!(draws[1].is_indexed());
    assert_eq!(draws[1].indirect, Some(("ind".to_string(), 0)));

    director.set_indirect_offset(indirect, 20).unwrap();
    director.tick().unwrap();
    let frame = last_frame(&director);
    assert_eq!(frame[0].draws()[1].indirect, Some(("ind".to_string(), 20)));
}

#[test]
fn indirect_dispatches_record_their_buffer() {
    let mut director = director();
    let shader = director.create_shader("cull", Some("@compute @workgroup_size(64) fn main() {}".into()));
    let pipeline = director
        .create_compute_pipeline(ComputePipelineDescriptor::new("cull", shader))
        .unwrap();
    let args = director.create_data_ref_from("args", &[8u32, 1, 1]);
    let ind = director.create_buffer(BufferDescriptor::new("ind", BufferKind::Indirect));
    director
        .register_structure_map(ind, args, AreaOptions::default())
        .unwrap();
    let mut binding = BindingDescriptor::new("cull");
    binding.indirect = Some((ind, 0));
    let binding = director.create_binding(binding).unwrap();
    let pass = director.create_compute_pass("cull");
    director.add_compute_call(pass, pipeline, binding).unwrap();
    director.add_stage("cull").unwrap();
    director.add_item("cull", pass).unwrap();
    director.tick().unwrap();

    let frame = last_frame(&director);
    let dispatches = frame[0].dispatches();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].indirect, Some(("ind".to_string(), 0)));
    assert_eq!(dispatches[0].pipeline, "cull");
}

/// A pass whose depth attachment has no image yet is skipped as a whole, leaving only its
/// debug group behind.
#[test]
fn passes_with_unbacked_attachments_are_skipped() {
    let mut director = director();
    let color = director
        .create_texture(
            TextureDescriptor::new(
                "color",
                PixelFormat::Rgba8Unorm,
                TextureSource::Size(TextureSize::viewport()),
            )
            .with_usage(TextureUsages::RENDER_ATTACHMENT),
        )
        .unwrap();
    let depth = director
        .create_texture(
            TextureDescriptor::new(
                "depth",
                PixelFormat::Depth32Float,
                TextureSource::Size(TextureSize::Fixed {
                    width: 0,
                    height: 0,
                }),
            )
            .with_usage(TextureUsages::RENDER_ATTACHMENT),
        )
        .unwrap();
    let shader = director.create_shader("flat", Some(WGSL.to_string()));
    let pass = director
        .create_render_pass(
            RenderPassDescriptor::new("depth tested")
                .color(ColorAttachment::new(color))
                .depth(DepthAttachment::new(depth)),
        )
        .unwrap();
    add_draw(&mut director, pass, shader, "mesh");
    director.add_stage("world").unwrap();
    director.add_item("world", pass).unwrap();

    director.tick().unwrap();
    let frame = last_frame(&director);
    assert_eq!(
        frame[0].commands,
        vec![
            Command::PushDebugGroup("depth tested".into()),
            Command::PopDebugGroup
        ]
    );
    assert!(!director.texture_is_backed(depth));
    assert_eq!(
        director.backend().unwrap().stats().render_pipelines_requested,
        0
    );
}

/// Nothing is built or recorded until the device future resolves.
#[test]
fn ticks_wait_for_the_device() {
    let polls = Rc::new(Cell::new(0));
    let counter = polls.clone();
    let device = futures::future::poll_fn(move |_| {
        counter.set(counter.get() + 1);
        if counter.get() < 3 {
            Poll::Pending
        } else {
            Poll::Ready(Ok(RecordingBackend::new()))
        }
    });
    let mut director = Director::new(device, Viewport::new(8, 8));
    director.add_stage("world").unwrap();
    let texture = director
        .create_texture(TextureDescriptor::new(
            "atlas",
            PixelFormat::Rgba8Unorm,
            TextureSource::Size(TextureSize::Fixed {
                width: 4,
                height: 4,
            }),
        ))
        .unwrap();

    for _ in 0..2 {
        let report = director.tick().unwrap();
        assert!(report.device_pending);
        assert_eq!(report.frame, 0);
        assert!(director.backend().is_none());
    }
    assert!(!director.texture_is_backed(texture));

    let report = director.tick().unwrap();
    assert!(!report.device_pending);
    assert_eq!(report.stages_rendered, 1);
    assert!(director.texture_is_backed(texture));
    assert_eq!(polls.get(), 3);
    assert_eq!(director.frame(), 1);
}

#[test]
fn device_failures_are_reported_every_tick() {
    let device = async { Err::<RecordingBackend, _>(Error::Device("no adapter".into())) };
    let mut director = Director::new(device, Viewport::new(8, 8));
    assert!(matches!(director.tick(), Err(Error::Device(_))));
    assert!(matches!(director.tick(), Err(Error::Device(_))));
}
