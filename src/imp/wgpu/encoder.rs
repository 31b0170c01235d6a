// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/// A command encoder and the pass currently open on it, if any.
///
/// Passes are detached from the encoder's borrow with `forget_lifetime`, so the encoder can be
/// threaded through the director's recording calls.  The open pass is ended by dropping it.
pub struct WgpuEncoder {
    pub(super) encoder: wgpu::CommandEncoder,
    pub(super) render: Option<wgpu::RenderPass<'static>>,
    pub(super) compute: Option<wgpu::ComputePass<'static>>,
}

impl WgpuEncoder {
    pub(super) fn new(encoder: wgpu::CommandEncoder) -> Self {
        WgpuEncoder {
            encoder,
            render: None,
            compute: None,
        }
    }

    pub(super) fn finish(mut self) -> wgpu::CommandBuffer {
        self.render = None;
        self.compute = None;
        self.encoder.finish()
    }
}

impl std::fmt::Debug for WgpuEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuEncoder")
            .field("render_pass_open", &self.render.is_some())
            .field("compute_pass_open", &self.compute.is_some())
            .finish()
    }
}
