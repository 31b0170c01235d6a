// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bindings::resource_tracking::{ComputePassId, RenderPassId, ResourceKey};

/// A pass of either kind, as stored in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Render(RenderPassId),
    Compute(ComputePassId),
}

impl From<RenderPassId> for PassId {
    fn from(id: RenderPassId) -> Self {
        PassId::Render(id)
    }
}

impl From<ComputePassId> for PassId {
    fn from(id: ComputePassId) -> Self {
        PassId::Compute(id)
    }
}

impl From<PassId> for ResourceKey {
    fn from(id: PassId) -> Self {
        match id {
            PassId::Render(id) => id.into(),
            PassId::Compute(id) => id.into(),
        }
    }
}

/// A named, toggleable run of passes recorded into one encoder.
#[derive(Debug)]
pub(crate) struct Stage {
    pub(crate) name: String,
    pub(crate) passes: Vec<PassId>,
    pub(crate) visible: bool,
}

impl Stage {
    pub(crate) fn new(name: String) -> Self {
        Stage {
            name,
            passes: Vec::new(),
            visible: true,
        }
    }
}
