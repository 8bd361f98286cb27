// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot indices, frame contexts, and the per-slot triple buffer.

use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of parallel copies of shared per-frame state.
pub const SLOT_COUNT: usize = 3;

/// One of the three frame slots.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    /// All slots in index order.
    pub const ALL: [Self; SLOT_COUNT] = [Self(0), Self(1), Self(2)];

    /// Creates a slot index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 3`.
    #[inline]
    #[must_use]
    pub const fn new(index: u8) -> Self {
        assert!(index < 3, "slot index out of range");
        Self(index)
    }

    /// Returns the slot as an array index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Returns the single-bit mask for this slot.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.0
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

/// The slot bindings for one traversal.
///
/// Simulation-side code writes `simulation`; render-side code reads
/// `present`. A context is obtained from
/// [`FrameSync`](super::FrameSync) at the start of a frame and passed
/// explicitly to everything that touches per-slot state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameContext {
    /// Slot written by the simulation thread.
    pub simulation: SlotIndex,
    /// Slot read by the render thread.
    pub present: SlotIndex,
    /// Frame counter. For a simulation context this is the frame being
    /// built; for a presentation context, the frame held by `present`.
    pub frame: u64,
}

impl FrameContext {
    /// Creates a context from explicit slots.
    ///
    /// Useful for driving a walk without a live synchronizer.
    ///
    /// # Panics
    ///
    /// Panics if `simulation == present`.
    #[must_use]
    pub const fn new(simulation: SlotIndex, present: SlotIndex, frame: u64) -> Self {
        assert!(
            simulation.0 != present.0,
            "simulation and present slots must differ"
        );
        Self {
            simulation,
            present,
            frame,
        }
    }
}

/// Three copies of `T`, one per slot.
///
/// The simulation role writes through [`write`](Self::write) and the render
/// role reads through [`read`](Self::read). Because the two roles never name
/// the same slot, the per-slot locks are uncontended.
#[derive(Debug, Default)]
pub struct TripleBuffer<T> {
    slots: [Mutex<T>; SLOT_COUNT],
}

impl<T> TripleBuffer<T> {
    /// Creates a buffer with each slot initialized by `init`.
    pub fn from_fn(mut init: impl FnMut(SlotIndex) -> T) -> Self {
        Self {
            slots: SlotIndex::ALL.map(|slot| Mutex::new(init(slot))),
        }
    }

    /// Locks the simulation slot of `ctx` for writing.
    pub fn write(&self, ctx: FrameContext) -> MutexGuard<'_, T> {
        self.slot(ctx.simulation)
    }

    /// Locks the present slot of `ctx` for reading.
    pub fn read(&self, ctx: FrameContext) -> MutexGuard<'_, T> {
        self.slot(ctx.present)
    }

    /// Locks an explicit slot.
    pub fn slot(&self, slot: SlotIndex) -> MutexGuard<'_, T> {
        self.slots[slot.get()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> TripleBuffer<T> {
    /// Creates a buffer with every slot holding a clone of `value`.
    pub fn new(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_bits_are_distinct() {
        let bits: u8 = SlotIndex::ALL.iter().map(|s| s.bit()).sum();
        assert_eq!(bits, 0b111);
    }

    #[test]
    #[should_panic(expected = "slot index out of range")]
    fn slot_index_out_of_range_panics() {
        let _ = SlotIndex::new(3);
    }

    #[test]
    #[should_panic(expected = "simulation and present slots must differ")]
    fn context_rejects_aliased_slots() {
        let _ = FrameContext::new(SlotIndex::new(1), SlotIndex::new(1), 0);
    }

    #[test]
    fn write_and_read_address_different_slots() {
        let buf = TripleBuffer::new(0_u32);
        let ctx = FrameContext::new(SlotIndex::new(0), SlotIndex::new(2), 0);
        *buf.write(ctx) = 7;
        assert_eq!(*buf.read(ctx), 0);
        assert_eq!(*buf.slot(SlotIndex::new(0)), 7);
    }

    #[test]
    fn write_and_read_can_be_held_together() {
        let buf = TripleBuffer::new(1_u32);
        let ctx = FrameContext::new(SlotIndex::new(1), SlotIndex::new(0), 0);
        let mut w = buf.write(ctx);
        let r = buf.read(ctx);
        *w += *r;
        assert_eq!(*w, 2);
    }

    #[test]
    fn from_fn_sees_each_slot() {
        let buf = TripleBuffer::from_fn(SlotIndex::get);
        for slot in SlotIndex::ALL {
            assert_eq!(*buf.slot(slot), slot.get());
        }
    }
}
