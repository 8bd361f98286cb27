// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame slots and their synchronization.
//!
//! Three *slots* hold parallel copies of all state shared between the
//! simulation and render threads. At any instant three roles map onto them:
//!
//! - the **simulation** slot, written by the simulation thread;
//! - the **present** slot, read by the render thread;
//! - the **ready** slot, the most recently completed frame (or the slot the
//!   renderer just released), waiting to be picked up.
//!
//! The roles are always pairwise distinct, so a slot is never written and read
//! in the same frame. [`FrameSync`] rotates the roles at frame boundaries and
//! hands out [`FrameContext`] values that name the slots for one traversal.

mod slot;
mod sync;

pub use slot::{FrameContext, SLOT_COUNT, SlotIndex, TripleBuffer};
pub use sync::{FrameSync, Signal, Subscription, SyncOrder};
