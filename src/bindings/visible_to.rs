// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource visibility and usage declarations.
//!
//! Resources declare up front which shader stages see them and how a texture will be used, so
//! the backend can create layouts and allocations that allow exactly that.
//!
//! ```
//! use frame_director::bindings::visible_to::{ShaderStages, TextureUsages};
//!
//! // a uniform read by both halves of a render pipeline
//! let visibility = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
//! assert!(visibility.contains(ShaderStages::FRAGMENT));
//!
//! // an offscreen target that is later sampled
//! let usage = TextureUsages::RENDER_ATTACHMENT | TextureUsages::SAMPLED;
//! assert!(!usage.contains(TextureUsages::STORAGE));
//! ```

use bitflags::bitflags;

bitflags! {
    /// Shader stages that can see a bound resource.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

bitflags! {
    /// How a texture will be accessed.
    ///
    /// Upload and mip generation add the copy and attachment usages they need on their own;
    /// declare only what client passes and bindings do with the texture.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsages: u32 {
        /// Sampled or read through a texture binding.
        const SAMPLED           = 1 << 0;
        /// Written through a storage binding.
        const STORAGE           = 1 << 1;
        /// Used as a color or depth attachment.
        const RENDER_ATTACHMENT = 1 << 2;
        const COPY_SRC          = 1 << 3;
        const COPY_DST          = 1 << 4;
    }
}
