// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Dirty tracking for the memory phase of a tick.

Two levels are tracked:

* [`DirtySet`]: within one buffer, which areas need uploading.
* [`UpdateList`]: across the director, which resources need their `update` run.

Both have set semantics: marking something dirty twice is the same as marking it once, and
iteration follows first-insertion order so uploads are deterministic.

The update list is generational.  `current` is drained by the tick; resources that must
update every frame re-enroll into `next`; [`UpdateList::advance`] then makes `next` the new
`current`.  Anything enrolled after the memory phase (a texture reset from a callback, a
swapchain re-armed after present) is carried over too.
*/

use crate::bindings::resource_tracking::ResourceKey;
use std::collections::HashSet;
use std::hash::Hash;

/// An insertion-ordered set.
#[derive(Debug, Clone)]
pub(crate) struct DirtySet<T> {
    order: Vec<T>,
    members: HashSet<T>,
}

impl<T: Clone + Eq + Hash> DirtySet<T> {
    pub(crate) fn new() -> Self {
        DirtySet {
            order: Vec::new(),
            members: HashSet::new(),
        }
    }

    /// Returns `true` if `item` was not already present.
    pub(crate) fn insert(&mut self, item: T) -> bool {
        if self.members.insert(item.clone()) {
            self.order.push(item);
            true
        } else {
            false
        }
    }

    pub(crate) fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        &self.order
    }

    /// Empties the set, returning its items in insertion order.
    pub(crate) fn take(&mut self) -> Vec<T> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}

impl<T: Clone + Eq + Hash> Default for DirtySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub(crate) struct UpdateList {
    current: DirtySet<ResourceKey>,
    next: DirtySet<ResourceKey>,
}

impl UpdateList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` for the memory phase of the current tick (or the next one, if the
    /// current memory phase already ran).
    pub(crate) fn enroll(&mut self, key: impl Into<ResourceKey>) {
        self.current.insert(key.into());
    }

    /// Schedules `key` for the next generation.
    pub(crate) fn enroll_next(&mut self, key: impl Into<ResourceKey>) {
        self.next.insert(key.into());
    }

    /// Takes the current generation for processing.
    pub(crate) fn take_current(&mut self) -> Vec<ResourceKey> {
        self.current.take()
    }

    pub(crate) fn has_current(&self) -> bool {
        !self.current.is_empty()
    }

    pub(crate) fn current(&self) -> &[ResourceKey] {
        self.current.as_slice()
    }

    /// Swaps generations, keeping anything enrolled after the memory phase.
    pub(crate) fn advance(&mut self) {
        let leftovers = self.current.take();
        self.current = std::mem::take(&mut self.next);
        for key in leftovers {
            self.current.insert(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::resource_tracking::BufferId;
    use slotmap::SlotMap;

    #[test]
    fn dirty_set_is_idempotent_and_ordered() {
        let mut set = DirtySet::new();
        assert!(set.insert("color"));
        assert!(set.insert("pos"));
        assert!(!set.insert("color"));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"pos"));
        assert_eq!(set.take(), vec!["color", "pos"]);
        assert!(set.is_empty());
        assert!(set.insert("color"));
    }

    #[test]
    fn generations_decay_unless_reenrolled() {
        let mut ids: SlotMap<BufferId, ()> = SlotMap::with_key();
        let once = ids.insert(());
        let every_frame = ids.insert(());

        let mut list = UpdateList::new();
        list.enroll(once);
        list.enroll(every_frame);
        list.enroll(once);
        assert_eq!(list.current().len(), 2);

        for key in list.take_current() {
            if key == ResourceKey::from(every_frame) {
                list.enroll_next(key);
            }
        }
        list.advance();
        assert_eq!(list.current(), &[ResourceKey::from(every_frame)]);

        list.take_current();
        list.advance();
        assert!(!list.has_current());
    }

    #[test]
    fn late_enrollment_survives_advance() {
        let mut ids: SlotMap<BufferId, ()> = SlotMap::with_key();
        let late = ids.insert(());
        let mut list = UpdateList::new();
        list.take_current();
        list.enroll(late);
        list.advance();
        assert_eq!(list.current(), &[ResourceKey::from(late)]);
    }
}
