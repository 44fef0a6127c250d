//! Stable handles into chunked stores.
//!
//! A handle is the `(chunk, slot)` position of one live instance together
//! with its dense global index. Handles stay valid until their instance is
//! removed; the single instance moved by a swap-removal is reported back as
//! a [`Relocation`] so its owner can patch the handle it holds.

use std::collections::HashMap;
use std::hash::Hash;

/// Position of a live instance inside one chunked store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    chunk: u32,
    slot: u32,
    global: u32,
}

impl Handle {
    /// Handle for the dense index `global` in chunks of `capacity` slots.
    /// `global` must fit in a u32.
    #[inline]
    pub fn from_global(global: usize, capacity: usize) -> Self {
        debug_assert!(
            global <= u32::MAX as usize,
            "global index {global} exceeds u32 range"
        );
        Self {
            chunk: (global / capacity) as u32,
            slot: (global % capacity) as u32,
            global: global as u32,
        }
    }

    /// Construct from raw parts without checking that they agree.
    /// Mainly useful for forging handles in tests.
    pub fn from_parts(chunk: u32, slot: u32, global: u32) -> Self {
        Self {
            chunk,
            slot,
            global,
        }
    }

    #[inline]
    pub fn chunk(&self) -> usize {
        self.chunk as usize
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    #[inline]
    pub fn global(&self) -> usize {
        self.global as usize
    }

    pub(crate) fn raw_parts(&self) -> (u32, u32, u32) {
        (self.chunk, self.slot, self.global)
    }

    /// True if the three indices agree for chunks of `capacity` slots.
    #[inline]
    pub fn is_consistent(&self, capacity: usize) -> bool {
        (self.slot as usize) < capacity
            && self.chunk as usize * capacity + self.slot as usize == self.global as usize
    }
}

/// Index of a batch inside one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u32);

/// What callers hold: the batch plus the slot inside that batch's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub batch: BatchId,
    pub slot: Handle,
    /// Switch count of the instance set when the handle was issued.
    pub round: u64,
}

/// The last live instance was moved into a vacated slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation<O> {
    pub owner: O,
    pub from: Handle,
    pub to: Handle,
}

/// Outcome of a successful removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed<O> {
    /// Owner of the instance that was removed.
    pub owner: O,
    /// Set when another instance had to move to keep the store dense.
    pub relocated: Option<Relocation<O>>,
}

/// Receives handle patches for owners whose instance moved.
pub trait HandleSink<O> {
    fn relocate(&mut self, owner: O, to: EntityHandle);
}

impl<O: Eq + Hash> HandleSink<O> for HashMap<O, EntityHandle> {
    fn relocate(&mut self, owner: O, to: EntityHandle) {
        self.insert(owner, to);
    }
}

/// Sink that drops every notification, for callers that re-query by owner.
pub struct IgnoreRelocations;

impl<O> HandleSink<O> for IgnoreRelocations {
    fn relocate(&mut self, _owner: O, _to: EntityHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_global_splits_into_chunk_and_slot() {
        let h = Handle::from_global(2000, 1023);
        assert_eq!(h.chunk(), 1);
        assert_eq!(h.slot(), 977);
        assert_eq!(h.global(), 2000);
        assert!(h.is_consistent(1023));
    }

    #[test]
    fn forged_handle_is_inconsistent() {
        let h = Handle::from_parts(0, 5, 9);
        assert!(!h.is_consistent(16));
        let h = Handle::from_parts(0, 20, 20);
        assert!(!h.is_consistent(16));
    }

    #[test]
    #[cfg(all(debug_assertions, target_pointer_width = "64"))]
    #[should_panic(expected = "exceeds u32 range")]
    fn global_index_past_u32_panics_in_debug() {
        Handle::from_global(u32::MAX as usize + 5, 1023);
    }

    #[test]
    fn hashmap_sink_records_latest_handle() {
        let mut map: HashMap<u32, EntityHandle> = HashMap::new();
        let to = EntityHandle {
            batch: BatchId(2),
            slot: Handle::from_global(4, 8),
            round: 0,
        };
        map.relocate(7, to);
        assert_eq!(map.get(&7), Some(&to));
    }
}
