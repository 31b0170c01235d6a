// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vertex buffer layout descriptions.
//!
//! The GPU needs to know how to interpret the raw bytes of a vertex buffer.  A
//! [`VertexLayout`] lists the attributes of one element in memory order; shader locations are
//! assigned in that order, continuing across the vertex buffers of a binding.
//!
//! ```
//! use frame_director::images::vertex_layout::{VertexFieldType, VertexLayout};
//!
//! let mut layout = VertexLayout::new();
//! layout.add_field("position", VertexFieldType::F32x3);
//! layout.add_field("color", VertexFieldType::F32x4);
//! assert_eq!(layout.element_stride(), 28);
//! ```

/// Describes one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    pub(crate) fields: Vec<VertexField>,
    pub(crate) step: VertexStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct VertexField {
    pub(crate) name: &'static str,
    pub(crate) r#type: VertexFieldType,
}

/// Whether the buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStep {
    #[default]
    Vertex,
    Instance,
}

/// The data type of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VertexFieldType {
    F32,
    F32x2,
    F32x3,
    F32x4,
    U32,
    /// Four normalized bytes, typically a packed color.
    Unorm8x4,
}

impl VertexFieldType {
    pub(crate) fn stride(&self) -> u64 {
        match self {
            VertexFieldType::F32 | VertexFieldType::U32 | VertexFieldType::Unorm8x4 => 4,
            VertexFieldType::F32x2 => 8,
            VertexFieldType::F32x3 => 12,
            VertexFieldType::F32x4 => 16,
        }
    }
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// A layout stepped once per instance.
    pub fn per_instance() -> Self {
        VertexLayout {
            fields: Vec::new(),
            step: VertexStep::Instance,
        }
    }

    /// Appends an attribute.  Fields must be added in the order they appear in memory.
    pub fn add_field(&mut self, name: &'static str, r#type: VertexFieldType) {
        self.fields.push(VertexField { name, r#type });
    }

    pub fn element_stride(&self) -> u64 {
        self.fields.iter().map(|e| e.r#type.stride()).sum()
    }

    pub fn step(&self) -> VertexStep {
        self.step
    }

    /// `(name, type, offset)` for each attribute.
    pub fn attributes(&self) -> impl Iterator<Item = (&'static str, VertexFieldType, u64)> + '_ {
        self.fields.iter().scan(0, |offset, field| {
            let at = *offset;
            *offset += field.r#type.stride();
            Some((field.name, field.r#type, at))
        })
    }
}
