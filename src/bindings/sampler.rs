// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Samplers.  Created on the device during the first memory phase after they are requested.

use crate::imp::{Backend, SamplerBindingKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Comparison used by depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: String,
    pub address_mode: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_max_clamp: f32,
    pub compare: Option<CompareFunction>,
}

impl SamplerDescriptor {
    /// Trilinear filtering over a full mip chain.
    pub fn mipmapped(label: impl Into<String>) -> Self {
        SamplerDescriptor {
            label: label.into(),
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            lod_max_clamp: 14.0,
            compare: None,
        }
    }

    /// Nearest-neighbour sampling of level 0.
    pub fn pixel(label: impl Into<String>) -> Self {
        SamplerDescriptor {
            label: label.into(),
            address_mode: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_max_clamp: 0.0,
            compare: None,
        }
    }

    pub(crate) fn binding_kind(&self) -> SamplerBindingKind {
        if self.compare.is_some() {
            SamplerBindingKind::Comparison
        } else if self.mag_filter == FilterMode::Linear
            || self.min_filter == FilterMode::Linear
            || self.mipmap_filter == FilterMode::Linear
        {
            SamplerBindingKind::Filtering
        } else {
            SamplerBindingKind::NonFiltering
        }
    }
}

pub(crate) struct Sampler<B: Backend> {
    descriptor: SamplerDescriptor,
    device: Option<B::Sampler>,
}

impl<B: Backend> Sampler<B> {
    pub(crate) fn new(descriptor: SamplerDescriptor) -> Self {
        Sampler {
            descriptor,
            device: None,
        }
    }

    pub(crate) fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    pub(crate) fn device(&self) -> Option<&B::Sampler> {
        self.device.as_ref()
    }

    pub(crate) fn update(&mut self, backend: &B) {
        if self.device.is_none() {
            logwise::trace_sync!(
                "creating sampler {label}",
                label = logwise::privacy::LogIt(&self.descriptor.label)
            );
            self.device = Some(backend.create_sampler(&self.descriptor));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_kind_follows_filters() {
        assert_eq!(
            SamplerDescriptor::mipmapped("m").binding_kind(),
            SamplerBindingKind::Filtering
        );
        assert_eq!(
            SamplerDescriptor::pixel("p").binding_kind(),
            SamplerBindingKind::NonFiltering
        );
        let mut shadow = SamplerDescriptor::pixel("shadow");
        shadow.compare = Some(CompareFunction::LessEqual);
        assert_eq!(shadow.binding_kind(), SamplerBindingKind::Comparison);
    }
}
