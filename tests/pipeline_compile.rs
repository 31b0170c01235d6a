// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Asynchronous pipeline compiles, draw gating and render bundles.

use frame_director::bindings::binding::{BindingDescriptor, DrawRange};
use frame_director::bindings::resource_tracking::{BindingId, RenderPassId, RenderPipelineId};
use frame_director::bindings::texture::{TextureDescriptor, TextureSize, TextureSource, Viewport};
use frame_director::bindings::visible_to::TextureUsages;
use frame_director::images::pipeline::{
    CompileStatus, ComputePipelineDescriptor, RenderPipelineDescriptor,
};
use frame_director::images::render_pass::{ColorAttachment, RenderPassDescriptor};
use frame_director::imp::recording::{Command, RecordingBackend};
use frame_director::{Director, PixelFormat};

const WGSL: &str = "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";

struct Scene {
    director: Director<RecordingBackend>,
    pipeline: RenderPipelineId,
    binding: BindingId,
    pass: RenderPassId,
}

fn scene(configure: impl FnOnce(&RecordingBackend), as_bundle: bool) -> Scene {
    let backend = RecordingBackend::new();
    configure(&backend);
    let mut director = Director::with_backend(backend, Viewport::new(16, 16));
    let target = director
        .create_texture(
            TextureDescriptor::new(
                "target",
                PixelFormat::Rgba8Unorm,
                TextureSource::Size(TextureSize::viewport()),
            )
            .with_usage(TextureUsages::RENDER_ATTACHMENT),
        )
        .unwrap();
    let shader = director.create_shader("triangle", Some(WGSL.to_string()));
    let mut descriptor = RenderPipelineDescriptor::new("triangle", shader);
    descriptor.as_bundle = as_bundle;
    let pipeline = director.create_render_pipeline(descriptor).unwrap();
    let mut binding = BindingDescriptor::new("triangle");
    binding.range = DrawRange::vertices(3);
    let binding = director.create_binding(binding).unwrap();
    let pass = director
        .create_render_pass(RenderPassDescriptor::new("main").color(ColorAttachment::new(target)))
        .unwrap();
    director.add_render_call(pass, pipeline, binding).unwrap();
    director.add_stage("world").unwrap();
    director.add_item("world", pass).unwrap();
    Scene {
        director,
        pipeline,
        binding,
        pass,
    }
}

/// Ticks once and returns the draws recorded by that tick.
fn draws(director: &mut Director<RecordingBackend>) -> usize {
    director.tick().unwrap();
    let submissions = director.backend().unwrap().submissions();
    submissions
        .last()
        .map(|batch| batch.iter().map(|b| b.draws().len()).sum())
        .unwrap_or(0)
}

/// A compile in flight skips the draw without failing the frame, and the draw shows up on the
/// tick the compile finishes.
#[test]
fn pending_compiles_skip_draws() {
    let Scene {
        mut director,
        pipeline,
        ..
    } = scene(|b| b.set_compile_latency(2), false);
    assert_eq!(director.pipeline_status(pipeline), Some(CompileStatus::Idle));

    assert_eq!(draws(&mut director), 0);
    assert_eq!(director.pipeline_status(pipeline), Some(CompileStatus::Pending));
    assert_eq!(draws(&mut director), 0);
    assert_eq!(draws(&mut director), 1);
    assert_eq!(director.pipeline_status(pipeline), Some(CompileStatus::Ready));
    assert_eq!(draws(&mut director), 1);

    let stats = director.backend().unwrap().stats();
    assert_eq!(stats.render_pipelines_requested, 1);
    assert_eq!(stats.pipeline_layouts_created, 1);
}

#[test]
fn failed_compiles_never_draw() {
    let Scene {
        mut director,
        pipeline,
        ..
    } = scene(|b| b.fail_compile("triangle"), false);
    for _ in 0..3 {
        assert_eq!(draws(&mut director), 0);
    }
    assert!(matches!(
        director.pipeline_status(pipeline),
        Some(CompileStatus::Failed(_))
    ));
    assert_eq!(
        director.backend().unwrap().stats().render_pipelines_requested,
        1
    );
}

#[test]
fn trigger_budget_limits_draws() {
    let Scene {
        mut director,
        pipeline,
        ..
    } = scene(|_| {}, false);
    director.trigger_finite_times(pipeline, 2).unwrap();
    let per_tick: Vec<usize> = (0..4).map(|_| draws(&mut director)).collect();
    assert_eq!(per_tick, vec![1, 1, 0, 0]);

    director.trigger_finite_times(pipeline, 1).unwrap();
    assert_eq!(draws(&mut director), 1);
    assert_eq!(draws(&mut director), 0);
}

/// Switching a pipeline or binding off skips its draws but still opens the pass; switching the
/// pass off skips the pass.
#[test]
fn executable_flags_gate_draws() {
    let Scene {
        mut director,
        pipeline,
        binding,
        ..
    } = scene(|_| {}, false);
    director.set_pipeline_executable(pipeline, false).unwrap();
    assert_eq!(draws(&mut director), 0);
    let last = director.backend().unwrap().submissions().pop().unwrap();
    assert_eq!(last[0].render_passes(), 1);

    director.set_pipeline_executable(pipeline, true).unwrap();
    director.set_binding_executable(binding, false).unwrap();
    assert_eq!(draws(&mut director), 0);

    director.set_binding_executable(binding, true).unwrap();
    assert_eq!(draws(&mut director), 1);
}

/// Bundled pipelines record once and replay until a draw parameter changes.
#[test]
fn bundles_are_recorded_once_and_replayed() {
    let Scene {
        mut director,
        binding,
        ..
    } = scene(|_| {}, true);
    assert_eq!(draws(&mut director), 1);
    assert_eq!(draws(&mut director), 1);
    let backend = director.backend().unwrap();
    assert_eq!(backend.stats().bundles_recorded, 1);
    let last = backend.submissions().pop().unwrap();
    assert!(
        last[0]
            .commands
            .iter()
            .any(|c| matches!(c, Command::ExecuteBundle { bundle, .. } if bundle == "triangle triangle"))
    );

    director
        .set_draw_range(binding, DrawRange::instanced(3, 10))
        .unwrap();
    assert_eq!(draws(&mut director), 1);
    let backend = director.backend().unwrap();
    assert_eq!(backend.stats().bundles_recorded, 2);
    let last = backend.submissions().pop().unwrap();
    assert_eq!(last[0].draws()[0].range, DrawRange::instanced(3, 10));

    director.resize(32, 32);
    assert_eq!(draws(&mut director), 1);
    assert_eq!(director.backend().unwrap().stats().bundles_recorded, 3);
}

/// Rebuilding a pass every frame around fresh bindings keeps one live bundle, not one per frame.
#[test]
fn bundles_of_destroyed_bindings_are_dropped() {
    let Scene {
        mut director,
        pipeline,
        binding,
        pass,
    } = scene(|_| {}, true);
    director.release(binding);
    for frame in 0..20 {
        director.empty_pass(pass).unwrap();
        let mut descriptor = BindingDescriptor::new(format!("frame {frame}"));
        descriptor.range = DrawRange::vertices(3);
        let binding = director.create_binding(descriptor).unwrap();
        director.add_render_call(pass, pipeline, binding).unwrap();
        director.release(binding);
        assert_eq!(draws(&mut director), 1);
    }
    let stats = director.backend().unwrap().stats();
    assert_eq!(stats.bundles_recorded, 20);
    assert_eq!(stats.bundles_freed, 19);

    director.empty_pass(pass).unwrap();
    assert_eq!(director.backend().unwrap().stats().bundles_freed, 20);
    assert!(director.is_live(pipeline));
}

#[test]
fn compute_dispatches_follow_the_same_rules() {
    let backend = RecordingBackend::new();
    backend.set_compile_latency(1);
    let mut director = Director::with_backend(backend, Viewport::new(16, 16));
    let shader = director.create_shader("blur", Some("@compute @workgroup_size(8) fn main() {}".into()));
    let pipeline = director
        .create_compute_pipeline(ComputePipelineDescriptor::new("blur", shader))
        .unwrap();
    let mut binding = BindingDescriptor::new("blur");
    binding.workgroups = [4, 4, 1];
    let binding = director.create_binding(binding).unwrap();
    let pass = director.create_compute_pass("post");
    director.add_compute_call(pass, pipeline, binding).unwrap();
    assert_eq!(director.pass_len(pass), Some(1));
    director.add_stage("post").unwrap();
    director.add_item("post", pass).unwrap();

    let dispatches = |director: &mut Director<RecordingBackend>| {
        director.tick().unwrap();
        let batch = director.backend().unwrap().submissions().pop().unwrap();
        batch[0]
            .dispatches()
            .iter()
            .map(|d| d.workgroups)
            .collect::<Vec<_>>()
    };
    assert!(dispatches(&mut director).is_empty());
    assert_eq!(dispatches(&mut director), vec![[4, 4, 1]]);

    director.set_workgroups(binding, [2, 1, 1]).unwrap();
    assert_eq!(dispatches(&mut director), vec![[2, 1, 1]]);

    director.trigger_finite_times(pipeline, 0).unwrap();
    assert!(dispatches(&mut director).is_empty());

    director.empty_pass(pass).unwrap();
    assert_eq!(director.pass_len(pass), Some(0));
}
