// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-slot publication of layer records.

use std::sync::Arc;

use crate::clip::ClipDrawer;
use crate::dirty::slot_channel;
use crate::frame::FrameContext;
use crate::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer};

use super::id::LayerId;
use super::store::{LayerItems, LayerTree, MatrixSlot};

/// Everything the render walk needs to know about one layer.
#[derive(Clone, Debug)]
pub struct LayerRecord {
    /// The layer this record was published for.
    pub id: LayerId,
    /// Visibility flag.
    pub visible: bool,
    /// Projection matrix slot.
    pub projection: MatrixSlot,
    /// Modelview matrix slot.
    pub modelview: MatrixSlot,
    /// Clip drawer, if any.
    pub clip_drawer: Option<Arc<dyn ClipDrawer>>,
    /// Attached items.
    pub items: LayerItems,
    /// Raw indices of the children, in draw order.
    pub children: Vec<u32>,
}

/// One slot's snapshot of the layer tree.
#[derive(Clone, Debug, Default)]
pub struct LayerFrame {
    /// Frame that last published into this slot.
    pub frame: u64,
    /// Records indexed by raw layer index; `None` for free slots.
    pub records: Vec<Option<LayerRecord>>,
    /// Raw indices of the root layers, in draw order.
    pub roots: Vec<u32>,
}

impl LayerFrame {
    /// Returns the record published for raw index `idx`.
    #[must_use]
    pub fn record(&self, idx: u32) -> Option<&LayerRecord> {
        self.records.get(idx as usize).and_then(Option::as_ref)
    }
}

impl LayerTree {
    /// Copies every layer changed since `ctx.simulation` was last published
    /// into that slot's [`LayerFrame`].
    ///
    /// Call once per simulation frame before completing it. Returns the
    /// number of records rewritten.
    pub fn publish(&mut self, ctx: FrameContext) -> u32 {
        self.publish_traced(ctx, &mut Tracer::none())
    }

    /// Like [`publish`](Self::publish), bracketed by [`PhaseKind::Publish`]
    /// events.
    pub fn publish_traced(&mut self, ctx: FrameContext, tracer: &mut Tracer<'_>) -> u32 {
        let slot = ctx.simulation;
        tracer.phase_begin(&PhaseBeginEvent {
            frame: ctx.frame,
            phase: PhaseKind::Publish,
            slot,
        });
        let stale: Vec<u32> = self
            .dirty
            .drain(slot_channel(slot))
            .deterministic()
            .run()
            .collect();

        let mut frame = self.frames.write(ctx);
        frame.frame = ctx.frame;
        if frame.records.len() < self.len as usize {
            frame.records.resize_with(self.len as usize, || None);
        }
        for &idx in &stale {
            frame.records[idx as usize] = self.alive[idx as usize].then(|| self.record(idx));
        }
        if self.roots_stale[slot.get()] {
            frame.roots = self.sorted_roots();
            self.roots_stale[slot.get()] = false;
        }
        drop(frame);
        let count = u32::try_from(stale.len()).unwrap_or(u32::MAX);
        tracer.phase_end(&PhaseEndEvent {
            frame: ctx.frame,
            phase: PhaseKind::Publish,
            slot,
            count,
        });
        count
    }

    fn record(&self, idx: u32) -> LayerRecord {
        let i = idx as usize;
        let [projection, modelview] = self.matrices[i].clone();
        LayerRecord {
            id: self.handle(idx),
            visible: self.visible[i],
            projection,
            modelview,
            clip_drawer: self.clip_drawer[i].clone(),
            items: self.items[i].clone(),
            children: self.sorted_children(idx),
        }
    }
}
