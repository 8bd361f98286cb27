// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-slot evaluation and change tracking.
//!
//! Evaluation for a slot drains that slot's dirty channel, which yields every
//! node marked since the slot was last evaluated, parents before children.
//! For each such node it:
//!
//! 1. recomputes the global value as `compose(parent_global, local)`;
//! 2. writes the global value into the slot's copy of every live shadow;
//! 3. reports the node in [`NodeChanges::stale`].
//!
//! Globals are shared across slots, so a node drained in one slot and again
//! in the next simply recomputes the same value.

use crate::dirty::slot_channel;
use crate::frame::FrameContext;
use crate::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer};

use super::NodeValue;
use super::store::{INVALID, NodeStore};

/// Changes a slot must apply to its copy of the extracted node data.
///
/// Indices are raw node indices (see [`NodeId::index`](super::NodeId::index)).
/// Apply `removed` before `stale`: a destroyed index may already be reused by
/// a new node.
#[derive(Clone, Debug, Default)]
pub struct NodeChanges {
    /// Nodes whose extracted vector changed, parents before children.
    pub stale: Vec<u32>,
    /// Nodes destroyed since this slot was last evaluated.
    pub removed: Vec<u32>,
}

impl NodeChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.stale.clear();
        self.removed.clear();
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.removed.is_empty()
    }
}

impl NodeStore {
    /// Evaluates the tree for `ctx.simulation`, returning what changed in
    /// that slot.
    ///
    /// Call once per simulation frame, after mutating nodes and before
    /// completing the frame, so that hooks and clip drawers capture the
    /// values of this frame.
    pub fn evaluate(&mut self, ctx: FrameContext) -> NodeChanges {
        let mut changes = NodeChanges::default();
        self.evaluate_into(ctx, &mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer.
    pub fn evaluate_into(&mut self, ctx: FrameContext, changes: &mut NodeChanges) {
        self.evaluate_traced(ctx, changes, &mut Tracer::none());
    }

    /// Like [`evaluate_into`](Self::evaluate_into), bracketed by
    /// [`PhaseKind::Evaluate`] events whose count is the number of stale
    /// nodes.
    pub fn evaluate_traced(
        &mut self,
        ctx: FrameContext,
        changes: &mut NodeChanges,
        tracer: &mut Tracer<'_>,
    ) {
        changes.clear();
        let slot = ctx.simulation;
        tracer.phase_begin(&PhaseBeginEvent {
            frame: ctx.frame,
            phase: PhaseKind::Evaluate,
            slot,
        });

        changes.stale.extend(
            self.dirty
                .drain(slot_channel(slot))
                .affected()
                .deterministic()
                .run(),
        );
        changes.stale.retain(|&idx| self.alive[idx as usize]);

        for &idx in &changes.stale {
            let i = idx as usize;
            let p = self.parent[i];
            let parent_global = if p != INVALID {
                self.global[p as usize]
            } else {
                NodeValue::ROOT
            };
            let global = NodeValue::compose(
                &parent_global,
                &self.local[i],
                self.layout.kind,
                self.config.tolerance,
            );
            self.global[i] = global;

            self.dependents[i].retain(|dependent| match dependent.upgrade() {
                Some(shadow) if shadow.is_hooked() => {
                    shadow.publish(slot, global);
                    true
                }
                _ => false,
            });
        }

        core::mem::swap(&mut self.pending_removed[slot.get()], &mut changes.removed);
        tracer.phase_end(&PhaseEndEvent {
            frame: ctx.frame,
            phase: PhaseKind::Evaluate,
            slot,
            count: u32::try_from(changes.stale.len()).unwrap_or(u32::MAX),
        });
    }
}
