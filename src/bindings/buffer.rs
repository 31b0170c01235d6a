// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Device buffers packed from data refs.
//!
//! A buffer is a sequence of named areas.  Each area mirrors (part of) one data ref; areas are
//! appended back to back with only alignment padding between them and are never moved.
//!
//! ```text
//! offset 0            12                  28
//!        | pos (12)   | color (16)        |
//! ```
//!
//! Mutating a data ref marks the areas that mirror it dirty.  `update` then issues one
//! partial write per dirty area, so the cost of a frame is proportional to what changed
//! rather than to the size of the buffer.
//!
//! The device allocation is deferred to the first `update`.  A buffer without an explicit
//! size is sized to cover the areas registered by then; registering an area that would not
//! fit the allocation afterwards is an error.

use crate::bindings::data_ref::DataRef;
use crate::bindings::dirty_tracking::DirtySet;
use crate::bindings::resource_tracking::{DataRefId, ResourceKey, Tracked};
use crate::error::Error;
use crate::imp::{Backend, BufferAllocation, BufferKind};
use slotmap::SlotMap;
use std::collections::HashMap;

/// Minimum alignment of an area.  Device copies move whole 4-byte words.
pub const COPY_ALIGNMENT: u64 = 4;

/// Where a new area takes its bytes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaOptions {
    /// First byte of the data ref to mirror.
    pub data_offset: usize,
    /// Bytes to mirror.  Defaults to the rest of the data ref.
    pub size: Option<usize>,
    /// Alignment of the area start and length.  Raised to at least [`COPY_ALIGNMENT`].
    pub alignment: u64,
}

impl Default for AreaOptions {
    fn default() -> Self {
        AreaOptions {
            data_offset: 0,
            size: None,
            alignment: 1,
        }
    }
}

impl AreaOptions {
    pub fn aligned(alignment: u64) -> Self {
        AreaOptions {
            alignment,
            ..Default::default()
        }
    }
}

/// One named sub-range of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub name: String,
    pub start: u64,
    pub length: u64,
    pub data: DataRefId,
    pub data_offset: usize,
    pub size: Option<usize>,
}

impl Area {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub label: String,
    pub kind: BufferKind,
    /// Byte size.  When absent the buffer is sized to its areas at allocation.
    pub size: Option<u64>,
}

impl BufferDescriptor {
    pub fn new(label: impl Into<String>, kind: BufferKind) -> Self {
        BufferDescriptor {
            label: label.into(),
            kind,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

pub(crate) fn round_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

pub(crate) struct Buffer<B: Backend> {
    label: String,
    kind: BufferKind,
    size: Option<u64>,
    areas: Vec<Area>,
    index: HashMap<String, usize>,
    dirty: DirtySet<String>,
    device: Option<B::Buffer>,
    allocated: u64,
    /// Padding space for areas whose source is shorter than the area.
    scratch: Vec<u8>,
}

impl<B: Backend> Buffer<B> {
    pub(crate) fn new(descriptor: BufferDescriptor) -> Self {
        Buffer {
            label: descriptor.label,
            kind: descriptor.kind,
            size: descriptor.size,
            areas: Vec::new(),
            index: HashMap::new(),
            dirty: DirtySet::new(),
            device: None,
            allocated: 0,
            scratch: Vec::new(),
        }
    }

    pub(crate) fn kind(&self) -> BufferKind {
        self.kind
    }

    pub(crate) fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub(crate) fn area(&self, name: &str) -> Option<&Area> {
        self.index.get(name).map(|i| &self.areas[*i])
    }

    pub(crate) fn dirty_areas(&self) -> &[String] {
        self.dirty.as_slice()
    }

    pub(crate) fn device(&self) -> Option<&B::Buffer> {
        self.device.as_ref()
    }

    pub(crate) fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    fn packed_end(&self) -> u64 {
        self.areas.last().map(Area::end).unwrap_or(0)
    }

    /// The byte limit new areas must fit in, if one is known yet.
    fn capacity(&self) -> Option<u64> {
        if self.device.is_some() {
            Some(self.allocated)
        } else {
            self.size
        }
    }

    /// Appends an area mirroring `data`, whose current length is `data_len`, and marks it dirty.
    pub(crate) fn register_area(
        &mut self,
        name: String,
        data: DataRefId,
        data_len: usize,
        options: AreaOptions,
    ) -> Result<&Area, Error> {
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateArea {
                buffer: self.label.clone(),
                area: name,
            });
        }
        let alignment = options.alignment.max(COPY_ALIGNMENT);
        let size = options
            .size
            .unwrap_or_else(|| data_len.saturating_sub(options.data_offset));
        let start = round_up(self.packed_end(), alignment);
        let length = round_up(size as u64, alignment);
        if let Some(capacity) = self.capacity()
            && start + length > capacity
        {
            return Err(Error::AreaOverflow {
                buffer: self.label.clone(),
                area: name,
                end: start + length,
                size: capacity,
            });
        }
        self.index.insert(name.clone(), self.areas.len());
        self.dirty.insert(name.clone());
        self.areas.push(Area {
            name,
            start,
            length,
            data,
            data_offset: options.data_offset,
            size: options.size,
        });
        Ok(&self.areas[self.areas.len() - 1])
    }

    /// Marks `area` for upload.  Unknown names are ignored.
    pub(crate) fn mark_dirty(&mut self, area: &str) {
        if self.index.contains_key(area) {
            self.dirty.insert(area.to_string());
        }
    }

    /// Allocates on first use and uploads every dirty area.  Returns the number of writes.
    pub(crate) fn update(
        &mut self,
        backend: &B,
        data_refs: &SlotMap<DataRefId, Tracked<DataRef>>,
    ) -> usize {
        if self.device.is_none() {
            let size = round_up(
                self.size.unwrap_or_else(|| self.packed_end()).max(COPY_ALIGNMENT),
                COPY_ALIGNMENT,
            );
            logwise::trace_sync!(
                "allocating buffer {label} of {size} bytes",
                label = logwise::privacy::LogIt(&self.label),
                size = size
            );
            self.device = Some(backend.create_buffer(&BufferAllocation {
                label: &self.label,
                kind: self.kind,
                size,
            }));
            self.allocated = size;
        }
        let Some(device) = &self.device else {
            return 0;
        };
        let mut writes = 0;
        for name in self.dirty.take() {
            let Some(area) = self.index.get(&name).map(|i| &self.areas[*i]) else {
                continue;
            };
            let bytes = data_refs
                .get(area.data)
                .map(|d| d.value.bytes())
                .unwrap_or_default();
            let begin = area.data_offset.min(bytes.len());
            let end = match area.size {
                Some(size) => begin.saturating_add(size).min(bytes.len()),
                None => bytes.len(),
            };
            let length = area.length as usize;
            if end - begin >= length {
                backend.write_buffer(device, area.start, &bytes[begin..begin + length]);
            } else {
                self.scratch.clear();
                self.scratch.extend_from_slice(&bytes[begin..end]);
                self.scratch.resize(length, 0);
                backend.write_buffer(device, area.start, &self.scratch);
            }
            writes += 1;
        }
        writes
    }

    /// One reference per area.
    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        self.areas.iter().map(|a| a.data.into()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::recording::{QueueOp, RecordingBackend};

    fn data(map: &mut SlotMap<DataRefId, Tracked<DataRef>>, name: &str, len: usize) -> DataRefId {
        map.insert(Tracked::new(DataRef::new(name.to_string(), vec![1; len])))
    }

    #[test]
    fn areas_pack_with_alignment_padding() {
        let mut refs = SlotMap::with_key();
        let pos = data(&mut refs, "pos", 12);
        let color = data(&mut refs, "color", 16);
        let odd = data(&mut refs, "odd", 3);
        let mut buffer = Buffer::<RecordingBackend>::new(BufferDescriptor::new(
            "vertices",
            BufferKind::Vertex,
        ));
        let a = buffer
            .register_area("pos".into(), pos, 12, AreaOptions::default())
            .unwrap()
            .clone();
        assert_eq!((a.start, a.length), (0, 12));
        let b = buffer
            .register_area("color".into(), color, 16, AreaOptions::default())
            .unwrap()
            .clone();
        assert_eq!((b.start, b.length), (12, 16));
        let c = buffer
            .register_area("odd".into(), odd, 3, AreaOptions::aligned(16))
            .unwrap()
            .clone();
        assert_eq!((c.start, c.length), (32, 16));
        assert_eq!(buffer.dirty_areas(), &["pos", "color", "odd"]);
    }

    #[test]
    fn registration_errors() {
        let mut refs = SlotMap::with_key();
        let pos = data(&mut refs, "pos", 12);
        let mut buffer = Buffer::<RecordingBackend>::new(
            BufferDescriptor::new("small", BufferKind::Storage).with_size(16),
        );
        buffer
            .register_area("pos".into(), pos, 12, AreaOptions::default())
            .unwrap();
        assert!(matches!(
            buffer.register_area("pos".into(), pos, 12, AreaOptions::default()),
            Err(Error::DuplicateArea { .. })
        ));
        assert!(matches!(
            buffer.register_area("more".into(), pos, 12, AreaOptions::default()),
            Err(Error::AreaOverflow {
                end: 24,
                size: 16,
                ..
            })
        ));
        assert_eq!(buffer.areas().len(), 1);
    }

    #[test]
    fn update_uploads_only_dirty_areas() {
        let backend = RecordingBackend::new();
        let mut refs = SlotMap::with_key();
        let pos = data(&mut refs, "pos", 12);
        let color = data(&mut refs, "color", 16);
        let mut buffer =
            Buffer::<RecordingBackend>::new(BufferDescriptor::new("v", BufferKind::Vertex));
        buffer
            .register_area("pos".into(), pos, 12, AreaOptions::default())
            .unwrap();
        buffer
            .register_area("color".into(), color, 16, AreaOptions::default())
            .unwrap();
        assert_eq!(buffer.update(&backend, &refs), 2);
        assert_eq!(buffer.allocated_bytes(), 28);
        backend.take_queue_ops();

        assert_eq!(buffer.update(&backend, &refs), 0);
        buffer.mark_dirty("color");
        buffer.mark_dirty("color");
        buffer.mark_dirty("nope");
        assert_eq!(buffer.update(&backend, &refs), 1);
        assert_eq!(
            backend.take_queue_ops(),
            vec![QueueOp::WriteBuffer {
                buffer: "v".into(),
                offset: 12,
                len: 16
            }]
        );
    }

    #[test]
    fn short_source_is_zero_padded() {
        let backend = RecordingBackend::new();
        let mut refs = SlotMap::with_key();
        let block = data(&mut refs, "block", 8);
        let mut buffer =
            Buffer::<RecordingBackend>::new(BufferDescriptor::new("u", BufferKind::Uniform));
        buffer
            .register_area("block".into(), block, 8, AreaOptions::aligned(256))
            .unwrap();
        buffer.update(&backend, &refs);
        assert_eq!(
            backend.take_queue_ops(),
            vec![QueueOp::WriteBuffer {
                buffer: "u".into(),
                offset: 0,
                len: 256
            }]
        );
        assert_eq!(backend.last_write("u").unwrap()[..9], [1, 1, 1, 1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn padding_does_not_carry_between_areas() {
        let backend = RecordingBackend::new();
        let mut refs = SlotMap::with_key();
        let long = data(&mut refs, "long", 12);
        let short = refs.insert(Tracked::new(DataRef::new("short".into(), vec![2; 4])));
        let mut buffer =
            Buffer::<RecordingBackend>::new(BufferDescriptor::new("u", BufferKind::Uniform));
        for (name, id, len) in [("long", long, 12), ("short", short, 4)] {
            buffer
                .register_area(name.into(), id, len, AreaOptions::aligned(256))
                .unwrap();
        }
        buffer.update(&backend, &refs);
        let written = backend.last_write("u").unwrap();
        assert_eq!(written.len(), 256);
        assert_eq!(written[..6], [2, 2, 2, 2, 0, 0]);
        assert!(written[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn late_area_must_fit_allocation() {
        let backend = RecordingBackend::new();
        let mut refs = SlotMap::with_key();
        let pos = data(&mut refs, "pos", 12);
        let mut buffer =
            Buffer::<RecordingBackend>::new(BufferDescriptor::new("v", BufferKind::Vertex));
        buffer
            .register_area("pos".into(), pos, 12, AreaOptions::default())
            .unwrap();
        buffer.update(&backend, &refs);
        assert!(matches!(
            buffer.register_area("late".into(), pos, 12, AreaOptions::default()),
            Err(Error::AreaOverflow { size: 12, .. })
        ));
    }
}
