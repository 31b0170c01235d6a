// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Named CPU-side byte arrays that feed buffers.
//!
//! A data ref is the unit scene code mutates.  Buffers map data refs into sub-areas and
//! subscribe to them; every mutation notifies all subscribers before the mutating call
//! returns, so the affected areas are already marked dirty when the caller gets control back.

use crate::bindings::resource_tracking::{BufferId, DataRefId, ResourceKey};
use crate::error::Error;
use std::fmt::{Debug, Formatter};

/// Something that wants to hear about changes to a data ref.
pub(crate) enum Subscriber {
    /// A buffer area that mirrors this data ref.
    Area { buffer: BufferId, area: String },
    /// A client callback.
    Observer(Box<dyn FnMut(DataRefId, &[u8])>),
}

impl Debug for Subscriber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Subscriber::Area { buffer, area } => f
                .debug_struct("Area")
                .field("buffer", buffer)
                .field("area", area)
                .finish(),
            Subscriber::Observer(_) => f.write_str("Observer"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct DataRef {
    name: String,
    bytes: Vec<u8>,
    subscribers: Vec<Subscriber>,
}

impl DataRef {
    pub(crate) fn new(name: String, bytes: Vec<u8>) -> Self {
        DataRef {
            name,
            bytes,
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Copies `data` in at `offset`.
    pub(crate) fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Error> {
        let end = offset.checked_add(data.len());
        match end {
            Some(end) if end <= self.bytes.len() => {
                self.bytes[offset..end].copy_from_slice(data);
                Ok(())
            }
            _ => Err(Error::DataOutOfBounds {
                name: self.name.clone(),
                offset,
                len: data.len(),
                available: self.bytes.len(),
            }),
        }
    }

    pub(crate) fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    pub(crate) fn unsubscribe(&mut self, matches: impl Fn(&Subscriber) -> bool) {
        self.subscribers.retain(|s| !matches(s));
    }

    /// Runs every observer and returns the buffer areas that need to be marked dirty.
    pub(crate) fn notify(&mut self, id: DataRefId) -> Vec<(BufferId, String)> {
        let mut areas = Vec::new();
        for subscriber in &mut self.subscribers {
            match subscriber {
                Subscriber::Area { buffer, area } => areas.push((*buffer, area.clone())),
                Subscriber::Observer(f) => f(id, &self.bytes),
            }
        }
        areas
    }

    /// A data ref holds nothing.
    pub(crate) fn dependencies(&self) -> Vec<ResourceKey> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn write_rejects_out_of_range() {
        let mut data = DataRef::new("pos".to_string(), vec![0; 8]);
        assert!(data.write(4, &[1, 2, 3, 4]).is_ok());
        assert_eq!(data.bytes(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            data.write(6, &[1, 2, 3]),
            Err(Error::DataOutOfBounds {
                offset: 6,
                len: 3,
                available: 8,
                ..
            })
        ));
        assert!(data.write(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn notify_reaches_observers_and_areas() {
        let mut ids: SlotMap<DataRefId, ()> = SlotMap::with_key();
        let id = ids.insert(());
        let mut buffers: SlotMap<BufferId, ()> = SlotMap::with_key();
        let buffer = buffers.insert(());

        let seen = Rc::new(Cell::new(0));
        let mut data = DataRef::new("color".to_string(), vec![7; 4]);
        let seen_move = seen.clone();
        data.subscribe(Subscriber::Observer(Box::new(move |_, bytes| {
            seen_move.set(seen_move.get() + bytes.len());
        })));
        data.subscribe(Subscriber::Area {
            buffer,
            area: "color".to_string(),
        });

        let areas = data.notify(id);
        assert_eq!(areas, vec![(buffer, "color".to_string())]);
        assert_eq!(seen.get(), 4);

        data.unsubscribe(|s| matches!(s, Subscriber::Area { .. }));
        assert!(data.notify(id).is_empty());
    }
}
