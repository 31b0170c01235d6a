// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::Backend;

/// WGSL source and, once created, its device module.
///
/// The source may arrive after the shader is registered (for example when it is fetched
/// asynchronously).  The module is created in the first memory phase after the source is
/// known, and from then on the shader is complete.
pub(crate) struct Shader<B: Backend> {
    label: String,
    //may need additional type design for future backends
    wgsl: Option<String>,
    module: Option<B::ShaderModule>,
}

impl<B: Backend> Shader<B> {
    pub(crate) fn new(label: String, wgsl: Option<String>) -> Self {
        Shader {
            label,
            wgsl,
            module: None,
        }
    }

    pub(crate) fn has_source(&self) -> bool {
        self.wgsl.is_some()
    }

    /// Supplies the source.  Returns `false` if a module already exists; modules are never
    /// replaced because pipelines may already be compiled against them.
    pub(crate) fn provide_source(&mut self, wgsl: String) -> bool {
        if self.module.is_some() {
            logwise::warn_sync!(
                "shader {label} already has a module; ignoring new source",
                label = logwise::privacy::LogIt(&self.label)
            );
            return false;
        }
        self.wgsl = Some(wgsl);
        true
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.module.is_some()
    }

    pub(crate) fn module(&self) -> Option<&B::ShaderModule> {
        self.module.as_ref()
    }

    pub(crate) fn update(&mut self, backend: &B) {
        if self.module.is_none()
            && let Some(wgsl) = &self.wgsl
        {
            logwise::trace_sync!(
                "creating shader module {label}",
                label = logwise::privacy::LogIt(&self.label)
            );
            self.module = Some(backend.create_shader_module(&self.label, wgsl));
        }
    }
}
