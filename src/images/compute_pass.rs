// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Compute passes: an ordered list of dispatches.
//!
//! Execution mirrors a render pass without attachments.

use crate::bindings::buffer::Buffer;
use crate::bindings::resource_tracking::{
    Arena, BindingId, BufferId, ComputePassId, ComputePipelineId, ResourceKey, Tracked,
};
use crate::imp::{Backend, DispatchCall};
use slotmap::SlotMap;

#[derive(Debug)]
pub(crate) struct ComputePass {
    name: String,
    calls: Vec<(ComputePipelineId, BindingId)>,
    executable: bool,
}

impl ComputePass {
    pub(crate) fn new(name: String) -> Self {
        ComputePass {
            name,
            calls: Vec::new(),
            executable: true,
        }
    }

    pub(crate) fn add_call(&mut self, pipeline: ComputePipelineId, binding: BindingId) {
        self.calls.push((pipeline, binding));
    }

    pub(crate) fn calls(&self) -> &[(ComputePipelineId, BindingId)] {
        &self.calls
    }

    pub(crate) fn empty(&mut self) -> Vec<(ComputePipelineId, BindingId)> {
        std::mem::take(&mut self.calls)
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        self.calls
            .iter()
            .flat_map(|(p, b)| [ResourceKey::from(*p), ResourceKey::from(*b)])
            .collect()
    }
}

/// Records one compute pass into `encoder`.  Returns the number of dispatches recorded.
pub(crate) fn execute<B: Backend>(
    backend: &B,
    encoder: &mut B::Encoder,
    arena: &mut Arena<B>,
    id: ComputePassId,
) -> usize {
    let Arena {
        buffers,
        textures,
        samplers,
        shaders,
        bindings,
        compute_pipelines,
        compute_passes,
        ..
    } = arena;
    let Some(pass) = compute_passes.get(id) else {
        return 0;
    };
    let pass = &pass.value;
    backend.push_debug_group(encoder, &pass.name);
    if !pass.executable {
        backend.pop_debug_group(encoder);
        return 0;
    }

    let mut ready = Vec::new();
    for (pipeline_id, binding_id) in &pass.calls {
        let Some(binding) = bindings.get_mut(*binding_id) else {
            continue;
        };
        if !binding.value.try_make_complete(backend, buffers, textures, samplers) {
            continue;
        }
        let binding = &binding.value;
        let Some(pipeline) = compute_pipelines.get_mut(*pipeline_id) else {
            continue;
        };
        let pipeline = &mut pipeline.value;
        if !pipeline.try_make_complete(backend, shaders, binding) {
            continue;
        }
        if !pipeline.gate().allows() || !binding.executable() {
            continue;
        }
        pipeline.gate_mut().consume();
        ready.push((*pipeline_id, *binding_id));
    }

    backend.begin_compute_pass(encoder, &pass.name);
    let mut dispatches = 0;
    for (pipeline_id, binding_id) in ready {
        let (Some(pipeline), Some(binding)) =
            (compute_pipelines.get(pipeline_id), bindings.get(binding_id))
        else {
            continue;
        };
        let Some(handle) = pipeline.value.handle() else {
            continue;
        };
        let indirect = match binding.value.indirect() {
            Some((buffer, offset)) => match device_buffer(buffers, buffer) {
                Some(device) => Some((device, offset)),
                None => continue,
            },
            None => None,
        };
        backend.dispatch(
            encoder,
            &DispatchCall {
                pipeline: handle,
                bind_groups: binding.value.bind_groups(),
                indirect,
                workgroups: binding.value.workgroups(),
            },
        );
        dispatches += 1;
    }
    backend.end_compute_pass(encoder);
    backend.pop_debug_group(encoder);
    dispatches
}

fn device_buffer<B: Backend>(
    buffers: &SlotMap<BufferId, Tracked<Buffer<B>>>,
    id: BufferId,
) -> Option<&B::Buffer> {
    buffers.get(id).and_then(|b| b.value.device())
}
