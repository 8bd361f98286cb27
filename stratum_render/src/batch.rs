// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-slot packed node vectors.

use std::sync::MutexGuard;

use bytemuck::{Pod, Zeroable};
use stratum_core::frame::{FrameContext, TripleBuffer};
use stratum_core::node::{ExtractLayout, NodeChanges, NodeId, NodeKind, NodeStore};

/// GPU record of a translate node with no extra fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TranslateRecord {
    /// Global translation and z.
    pub position: [f32; 3],
    /// Global scale; negative when the node does not clip.
    pub scale: f32,
    /// Clip window in local coordinates: `x0, x1, y0, y1`.
    pub clip: [f32; 4],
}

/// GPU record of a rotate-translate node with no extra fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RotateTranslateRecord {
    /// `scale · cos` and `scale · sin` of the global rotation.
    pub rotation: [f32; 2],
    /// Global translation and z.
    pub position: [f32; 3],
}

/// One packed vector of extracted node data per frame slot.
///
/// The simulation thread calls [`update`](Self::update) with the changes
/// returned by [`NodeStore::evaluate`] for the same context; the render
/// thread reads the present slot through [`view`](Self::view). Node `i`
/// occupies floats `i * stride .. (i + 1) * stride`. Indices that hold no
/// node carry the hidden record.
#[derive(Debug)]
pub struct NodeBatch {
    layout: ExtractLayout,
    hidden_z: f32,
    slots: TripleBuffer<Vec<f32>>,
}

impl NodeBatch {
    /// Creates an empty batch matching the layout of `store`.
    #[must_use]
    pub fn new(store: &NodeStore) -> Self {
        Self {
            layout: store.layout().clone(),
            hidden_z: store.config().hidden_z,
            slots: TripleBuffer::default(),
        }
    }

    /// Floats per node.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Applies `changes` to the simulation slot of `ctx`.
    ///
    /// `depth` supplies the z written for each stale node.
    pub fn update(
        &self,
        ctx: FrameContext,
        store: &NodeStore,
        changes: &NodeChanges,
        mut depth: impl FnMut(NodeId) -> f32,
    ) {
        let stride = self.stride();
        let mut data = self.slots.write(ctx);
        let len = store.capacity() as usize * stride;
        if data.len() < len {
            let start = data.len();
            data.resize(len, 0.0);
            for record in data[start..].chunks_exact_mut(stride) {
                self.layout.write_hidden(self.hidden_z, record);
            }
        }
        for &idx in &changes.removed {
            let start = idx as usize * stride;
            self.layout
                .write_hidden(self.hidden_z, &mut data[start..start + stride]);
        }
        for &idx in &changes.stale {
            let Some(id) = store.id_at(idx) else {
                continue;
            };
            let start = idx as usize * stride;
            store.extract_at(idx, depth(id), &mut data[start..start + stride]);
        }
    }

    /// Locks the present slot of `ctx` for reading.
    pub fn view(&self, ctx: FrameContext) -> BatchView<'_> {
        BatchView {
            layout: &self.layout,
            data: self.slots.read(ctx),
        }
    }
}

/// A locked view of one slot of a [`NodeBatch`].
#[derive(Debug)]
pub struct BatchView<'a> {
    layout: &'a ExtractLayout,
    data: MutexGuard<'a, Vec<f32>>,
}

impl BatchView<'_> {
    /// The packed floats.
    #[must_use]
    pub fn floats(&self) -> &[f32] {
        &self.data
    }

    /// The packed floats as bytes, for upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Number of node records in this slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.layout.stride()
    }

    /// Returns `true` if the slot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The floats of node `idx`.
    #[must_use]
    pub fn record(&self, idx: u32) -> Option<&[f32]> {
        let stride = self.layout.stride();
        let start = idx as usize * stride;
        self.data.get(start..start + stride)
    }

    /// Typed records, if this is a translate layout without extras.
    #[must_use]
    pub fn translate_records(&self) -> Option<&[TranslateRecord]> {
        (self.layout.kind == NodeKind::Translate && self.layout.extras.is_empty())
            .then(|| bytemuck::cast_slice(&self.data))
    }

    /// Typed records, if this is a rotate-translate layout without extras.
    #[must_use]
    pub fn rotate_translate_records(&self) -> Option<&[RotateTranslateRecord]> {
        (self.layout.kind == NodeKind::RotateTranslate && self.layout.extras.is_empty())
            .then(|| bytemuck::cast_slice(&self.data))
    }
}

#[cfg(test)]
mod tests {
    use kurbo::{Rect, Vec2};
    use stratum_core::config::SceneConfig;
    use stratum_core::frame::FrameSync;

    use super::*;

    fn frame(
        sync: &FrameSync,
        store: &mut NodeStore,
        batch: &NodeBatch,
        depth: f32,
    ) -> FrameContext {
        let ctx = sync.begin_simulation_frame();
        let _ = sync.complete_simulation_frame_with(ctx, |ctx| {
            let changes = store.evaluate(ctx);
            batch.update(ctx, store, &changes, |_| depth);
        });
        sync.begin_presentation_frame()
    }

    #[test]
    fn translate_records_follow_globals() {
        let sync = FrameSync::new();
        let mut store = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let root = store.create_root();
        let child = store.create_child(root);
        store.set_translation(root, Vec2::new(1.0, 2.0));
        store.set_scaling_factor(root, 2.0);
        store.set_clip(child, Some(Rect::new(0.0, 0.0, 4.0, 4.0)));
        let batch = NodeBatch::new(&store);

        let present = frame(&sync, &mut store, &batch, 0.5);
        let view = batch.view(present);
        assert_eq!(view.len(), 2);
        assert_eq!(view.as_bytes().len(), 2 * 8 * 4);
        let records = view.translate_records().unwrap();
        assert_eq!(records[root.index() as usize].position, [1.0, 2.0, 0.5]);
        assert_eq!(records[root.index() as usize].scale, -2.0);
        let clipped = records[child.index() as usize];
        assert_eq!(clipped.scale, 2.0);
        assert_eq!(clipped.clip, [0.0, 4.0, 0.0, 4.0]);
        assert!(view.rotate_translate_records().is_none());
    }

    #[test]
    fn destroyed_node_becomes_hidden_in_every_slot() {
        let sync = FrameSync::new();
        let config = SceneConfig::gl();
        let mut store = NodeStore::new(ExtractLayout::new(NodeKind::RotateTranslate), config);
        let root = store.create_root();
        let child = store.create_child(root);
        let batch = NodeBatch::new(&store);
        for _ in 0..3 {
            let _ = frame(&sync, &mut store, &batch, 0.0);
        }
        store.destroy_node(child);
        for _ in 0..3 {
            let present = frame(&sync, &mut store, &batch, 0.0);
            let view = batch.view(present);
            let record = view.rotate_translate_records().unwrap()[child.index() as usize];
            assert_eq!(record.position[2], config.hidden_z);
            assert_eq!(record.rotation, [0.0, 0.0]);
        }
    }

    #[test]
    fn extras_follow_base_fields() {
        let sync = FrameSync::new();
        let layout = ExtractLayout::new(NodeKind::RotateTranslate).with_extra("alpha", 1.0);
        let mut store = NodeStore::new(layout, SceneConfig::gl());
        let node = store.create_root();
        store.set_extra(node, 0, 0.25);
        let batch = NodeBatch::new(&store);

        let present = frame(&sync, &mut store, &batch, 0.0);
        let view = batch.view(present);
        assert_eq!(batch.stride(), 6);
        assert_eq!(view.record(node.index()).unwrap()[5], 0.25);
        assert!(view.rotate_translate_records().is_none());
    }

    #[test]
    fn untouched_indices_are_hidden() {
        let sync = FrameSync::new();
        let config = SceneConfig::wgpu();
        let mut store = NodeStore::new(ExtractLayout::new(NodeKind::Translate), config);
        let a = store.create_root();
        let b = store.create_root();
        store.destroy_node(a);
        let batch = NodeBatch::new(&store);

        let present = frame(&sync, &mut store, &batch, 0.0);
        let view = batch.view(present);
        assert_eq!(view.record(a.index()).unwrap()[2], config.hidden_z);
        assert_eq!(view.record(b.index()).unwrap()[2], 0.0);
    }
}
