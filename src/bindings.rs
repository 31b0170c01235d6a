// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Resource types: data refs, buffers, textures, samplers and the bindings that tie them to
shaders, plus the bookkeeping that tracks their lifetimes and updates. */

pub mod binding;
pub mod buffer;
pub(crate) mod data_ref;
pub(crate) mod dirty_tracking;
pub mod resource_tracking;
pub mod sampler;
pub mod texture;
pub mod visible_to;
