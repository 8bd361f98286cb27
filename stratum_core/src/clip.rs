// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip drawers: per-layer clip decisions and clip geometry.
//!
//! A [`ClipDrawer`] attached to a layer is consulted twice per walk: once to
//! decide whether the layer is drawn at all ([`ClipDrawer::clip_mode`]), and
//! around the layer's content to rasterize the clip region
//! ([`ClipDrawer::draw_region`]).
//!
//! [`RectClipDrawer`] clips to the global clip window of a `Translate` node.
//! The node tree's root frame is taken to be the model space of the clipped
//! layer's render parent.

use core::fmt;
use std::sync::Arc;

use kurbo::{Point, Rect};

use crate::frame::FrameContext;
use crate::layer::{LayerDrawState, LayerId};
use crate::node::{NodeId, NodeShadow, NodeStore, bounding_box, rect_is_empty};
use crate::target::{ClipQuad, DrawTarget};

/// Outcome of [`ClipDrawer::clip_mode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClipMode {
    /// Nothing of the layer or its subtree is visible.
    SkipLayer,
    /// The drawer does not restrict the layer.
    Unclipped,
    /// The layer is restricted to a region whose device-space bounding box
    /// is `device_bbox`.
    Clipped {
        /// Normalized device coordinates, already intersected with the
        /// parent's bounding box.
        device_bbox: Rect,
    },
}

/// One active clip on the walk's ancestor stack.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipEntry {
    /// The clipped layer.
    pub layer: LayerId,
    /// Its resolved device-space bounding box.
    pub device_bbox: Rect,
}

/// Clips of the ancestors of the layer being drawn, outermost first.
#[derive(Clone, Debug, Default)]
pub struct ClipStack {
    entries: Vec<ClipEntry>,
}

impl ClipStack {
    /// Returns every active clip, outermost first.
    #[must_use]
    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }

    /// Returns the innermost active clip.
    #[must_use]
    pub fn innermost(&self) -> Option<&ClipEntry> {
        self.entries.last()
    }

    /// Number of active clips.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn push(&mut self, entry: ClipEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<ClipEntry> {
        self.entries.pop()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Strategy deciding and drawing a layer's clip.
///
/// Both methods run on the render thread and must only read state captured
/// for `ctx.present`.
pub trait ClipDrawer: Send + Sync + fmt::Debug {
    /// Decides how the layer is clipped, given its render parent's state.
    fn clip_mode(&self, ctx: FrameContext, parent: &LayerDrawState, stack: &ClipStack) -> ClipMode;

    /// Draws the clip region using the parent's matrices.
    ///
    /// Called with `clear_z == false` before the layer's content and with
    /// `clear_z == true` after it.
    fn draw_region(
        &self,
        ctx: FrameContext,
        clear_z: bool,
        parent: &LayerDrawState,
        stack: &ClipStack,
        target: &mut dyn DrawTarget,
    );
}

/// Clips a layer to the global clip window of a `Translate` node.
///
/// Holds its own shadow of the node, refreshed by
/// [`NodeStore::evaluate`]. Once the node is destroyed the drawer skips its
/// layer.
#[derive(Debug)]
pub struct RectClipDrawer {
    shadow: Arc<NodeShadow>,
    tolerance: f64,
}

impl RectClipDrawer {
    /// Creates a drawer tracking `node`.
    ///
    /// # Panics
    ///
    /// Panics if the store's node kind has no clip windows, or if `node` is
    /// stale.
    pub fn new(store: &mut NodeStore, node: NodeId) -> Self {
        assert!(
            store.kind().supports_clip(),
            "{:?} nodes have no clip windows",
            store.kind()
        );
        Self {
            tolerance: store.config().tolerance,
            shadow: store.register_dependent(node),
        }
    }

    /// Returns whether the drawer still tracks its node.
    #[must_use]
    pub fn is_hooked(&self) -> bool {
        self.shadow.is_hooked()
    }

    /// Permanently detaches the drawer from its node.
    pub fn unhook(&self) {
        self.shadow.unhook();
    }
}

fn corners(r: Rect) -> [Point; 4] {
    [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ]
}

impl ClipDrawer for RectClipDrawer {
    fn clip_mode(&self, ctx: FrameContext, parent: &LayerDrawState, _stack: &ClipStack) -> ClipMode {
        let Some(value) = self.shadow.read(ctx.present) else {
            return ClipMode::SkipLayer;
        };
        if !value.visible {
            return ClipMode::SkipLayer;
        }
        let Some(rect) = value.clip else {
            return ClipMode::Unclipped;
        };

        let mvp = parent.projection * parent.modelview;
        let mut projected = [Point::ORIGIN; 4];
        let mut behind_eye = false;
        for (out, corner) in projected.iter_mut().zip(corners(rect)) {
            match mvp.project_point(corner, self.tolerance) {
                Some(p) => *out = p,
                None => behind_eye = true,
            }
        }
        // A corner at or behind the eye has no device position; fall back to
        // the parent's box.
        let bbox = if behind_eye {
            parent.device_bbox
        } else {
            bounding_box(&projected).intersect(parent.device_bbox)
        };
        if rect_is_empty(bbox) {
            ClipMode::SkipLayer
        } else {
            ClipMode::Clipped { device_bbox: bbox }
        }
    }

    fn draw_region(
        &self,
        ctx: FrameContext,
        clear_z: bool,
        parent: &LayerDrawState,
        _stack: &ClipStack,
        target: &mut dyn DrawTarget,
    ) {
        let Some(rect) = self.shadow.read(ctx.present).and_then(|v| v.clip) else {
            return;
        };
        let projection = if clear_z {
            parent.projection.with_row(2, parent.projection.row(3))
        } else {
            parent.projection
        };
        target.draw_clip_quad(&ClipQuad {
            corners: corners(rect),
            projection,
            modelview: parent.modelview,
            clear_z,
        });
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Vec2;

    use super::*;
    use crate::config::SceneConfig;
    use crate::frame::SlotIndex;
    use crate::layer::LayerTree;
    use crate::node::{ExtractLayout, NodeKind};
    use crate::target::{DrawPass, ItemId, RegionKind};
    use crate::transform::Transform3d;

    /// Evaluates slot 0, then presents it.
    fn present(store: &mut NodeStore) -> FrameContext {
        let _ = store.evaluate(FrameContext::new(SlotIndex::new(0), SlotIndex::new(1), 0));
        FrameContext::new(SlotIndex::new(1), SlotIndex::new(0), 1)
    }

    fn store() -> NodeStore {
        NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl())
    }

    fn root_state() -> LayerDrawState {
        LayerDrawState::root(&SceneConfig::gl())
    }

    #[derive(Default)]
    struct Quads(Vec<ClipQuad>);

    impl DrawTarget for Quads {
        fn draw_items(&mut self, _: DrawPass, _: &[ItemId], _: &LayerDrawState) {}
        fn draw_clip_quad(&mut self, quad: &ClipQuad) {
            self.0.push(*quad);
        }
        fn push_region(&mut self, _: RegionKind, _: &[ItemId], _: &LayerDrawState) {}
        fn pop_region(&mut self, _: RegionKind, _: &LayerDrawState) {}
    }

    #[test]
    fn scaled_clip_resolves_to_unit_quadrant() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        store.set_scaling_factor(node, 0.1);
        store.set_translation(node, Vec2::new(-1.0, -1.0));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);

        let mode = drawer.clip_mode(ctx, &root_state(), &ClipStack::default());
        assert_eq!(
            mode,
            ClipMode::Clipped {
                device_bbox: Rect::new(-1.0, -1.0, 0.0, 0.0)
            }
        );
    }

    #[test]
    fn clip_outside_parent_skips_layer() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(2.0, 2.0, 3.0, 3.0)));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);
        let mode = drawer.clip_mode(ctx, &root_state(), &ClipStack::default());
        assert_eq!(mode, ClipMode::SkipLayer);
    }

    #[test]
    fn unclipped_and_hidden_nodes() {
        let mut store = store();
        let node = store.create_root();
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);
        let mode = drawer.clip_mode(ctx, &root_state(), &ClipStack::default());
        assert_eq!(mode, ClipMode::Unclipped);

        store.set_visible(node, false);
        let ctx = present(&mut store);
        let mode = drawer.clip_mode(ctx, &root_state(), &ClipStack::default());
        assert_eq!(mode, ClipMode::SkipLayer);
    }

    #[test]
    fn perspective_divide_is_applied() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(-1.0, -1.0, 1.0, 1.0)));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);

        let parent = LayerDrawState {
            projection: Transform3d::perspective(core::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0),
            modelview: Transform3d::from_translation(0.0, 0.0, -4.0),
            ..root_state()
        };
        let ClipMode::Clipped { device_bbox } =
            drawer.clip_mode(ctx, &parent, &ClipStack::default())
        else {
            panic!("expected a clipped layer");
        };
        // An affine-only projection would report the full [-1, 1] box.
        for (got, want) in [device_bbox.x0, device_bbox.y0, device_bbox.x1, device_bbox.y1]
            .into_iter()
            .zip([-0.25, -0.25, 0.25, 0.25])
        {
            assert!((got - want).abs() < 1e-9, "{device_bbox:?}");
        }
    }

    #[test]
    fn corner_behind_eye_falls_back_to_parent_bbox() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(-1.0, -1.0, 1.0, 1.0)));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);

        let parent = LayerDrawState {
            projection: Transform3d::perspective(core::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0),
            modelview: Transform3d::from_translation(0.0, 0.0, 1.0),
            device_bbox: Rect::new(-0.5, -0.5, 0.5, 0.5),
            ..root_state()
        };
        let mode = drawer.clip_mode(ctx, &parent, &ClipStack::default());
        assert_eq!(
            mode,
            ClipMode::Clipped {
                device_bbox: Rect::new(-0.5, -0.5, 0.5, 0.5)
            }
        );
    }

    #[test]
    fn region_quad_uses_parent_matrices() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(0.0, 0.0, 1.0, 2.0)));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);

        let parent = LayerDrawState {
            projection: Transform3d::orthographic(-10.0, 10.0, -10.0, 10.0, -1.0, 1.0),
            modelview: Transform3d::from_translation(1.0, 0.0, 0.0),
            ..root_state()
        };
        let mut quads = Quads::default();
        drawer.draw_region(ctx, false, &parent, &ClipStack::default(), &mut quads);
        drawer.draw_region(ctx, true, &parent, &ClipStack::default(), &mut quads);

        let [first, second] = quads.0.as_slice() else {
            panic!("expected two quads, got {:?}", quads.0);
        };
        assert_eq!(first.corners[2], Point::new(1.0, 2.0));
        assert_eq!(first.projection, parent.projection);
        assert_eq!(first.modelview, parent.modelview);
        assert!(!first.clear_z);

        assert!(second.clear_z);
        assert_eq!(second.projection.row(2), parent.projection.row(3));
        assert_eq!(second.projection.row(0), parent.projection.row(0));
    }

    #[test]
    fn destroyed_node_skips_layer() {
        let mut store = store();
        let node = store.create_root();
        store.set_clip(node, Some(Rect::new(0.0, 0.0, 0.5, 0.5)));
        let drawer = RectClipDrawer::new(&mut store, node);
        let ctx = present(&mut store);
        store.destroy_node(node);
        assert!(!drawer.is_hooked());
        let mode = drawer.clip_mode(ctx, &root_state(), &ClipStack::default());
        assert_eq!(mode, ClipMode::SkipLayer);

        let mut quads = Quads::default();
        drawer.draw_region(ctx, false, &root_state(), &ClipStack::default(), &mut quads);
        assert!(quads.0.is_empty());
    }

    #[test]
    #[should_panic(expected = "RotateTranslate nodes have no clip windows")]
    fn rotate_nodes_cannot_back_a_drawer() {
        let mut store = NodeStore::new(
            ExtractLayout::new(NodeKind::RotateTranslate),
            SceneConfig::gl(),
        );
        let node = store.create_root();
        let _ = RectClipDrawer::new(&mut store, node);
    }

    #[test]
    fn stack_tracks_nesting() {
        let mut stack = ClipStack::default();
        assert!(stack.innermost().is_none());
        let mut tree = LayerTree::default();
        let layer = tree.create_root();
        stack.push(ClipEntry {
            layer,
            device_bbox: Rect::new(0.0, 0.0, 1.0, 1.0),
        });
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.innermost().map(|e| e.layer), Some(layer));
        assert!(stack.pop().is_some());
        assert_eq!(stack.depth(), 0);
    }
}
