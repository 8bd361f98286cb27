// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-slot dirty-tracking channels.
//!
//! Stratum uses one [`understory_dirty`] channel per frame slot. A mutation
//! makes the mutated element stale in *every* slot, so it marks all three
//! channels. When a slot becomes the simulation slot, draining its channel
//! yields exactly the elements whose copy in that slot must be rewritten.
//!
//! # Propagation semantics
//!
//! - **Nodes** mark with [`EagerPolicy`](understory_dirty::EagerPolicy) and
//!   have dependency edges from child to parent on every slot channel, since
//!   global values are inherited. Draining with `affected()` yields
//!   parents before children, which is the order global recomputation needs.
//!
//! - **Layers** mark with the default policy. A layer's published record
//!   holds only its own properties; effective matrices are recomputed by
//!   every render walk, so nothing propagates.

use understory_dirty::Channel;

use crate::frame::SlotIndex;

/// Stale in slot 0.
pub const SLOT_0: Channel = Channel::new(0);

/// Stale in slot 1.
pub const SLOT_1: Channel = Channel::new(1);

/// Stale in slot 2.
pub const SLOT_2: Channel = Channel::new(2);

/// All slot channels, in slot order.
pub const SLOT_CHANNELS: [Channel; 3] = [SLOT_0, SLOT_1, SLOT_2];

/// Returns the channel tracking staleness for `slot`.
#[must_use]
pub const fn slot_channel(slot: SlotIndex) -> Channel {
    match slot.get() {
        0 => SLOT_0,
        1 => SLOT_1,
        _ => SLOT_2,
    }
}
