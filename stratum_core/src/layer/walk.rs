// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The depth-first draw/clip walk over a presented slot.
//!
//! For each layer, in order:
//!
//! 1. An invisible layer is skipped with its subtree.
//! 2. The effective projection and modelview are resolved: the hook runs on
//!    the layer's own matrix, then the result is composed with the parent's
//!    effective matrix unless the mode is `UseThisMatrix`.
//! 3. If a clip drawer is attached, [`ClipDrawer::clip_mode`] either skips the
//!    layer with its subtree, or leaves it unclipped, or clips it to a device
//!    bounding box; a clipped layer draws its clip region with the parent's
//!    matrices.
//! 4. Clip-inside items push an inside region, clip-outside items push an
//!    occluder region.
//! 5. Opaque items draw, then children (by order key, then insertion), then
//!    transparent items.
//! 6. Regions pop in reverse order, and a clipped layer redraws its clip
//!    region with `clear_z` to restore depth.
//!
//! [`ClipDrawer::clip_mode`]: crate::clip::ClipDrawer::clip_mode

use std::sync::Arc;

use kurbo::Rect;

use crate::clip::{ClipEntry, ClipMode, ClipStack};
use crate::config::SceneConfig;
use crate::frame::{FrameContext, TripleBuffer};
use crate::target::{DrawPass, DrawTarget, ItemId, RegionKind};
use crate::trace::{PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer};
use crate::transform::Transform3d;

#[cfg(feature = "trace-rich")]
use crate::trace::{ClipResolvedEvent, LayerSkipEvent, LayerVisitEvent, SkipReason};

use super::id::LayerId;
use super::publish::LayerFrame;

/// Resolved state of a layer during the walk.
///
/// Exists only while the walk is inside the layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerDrawState {
    /// The layer, or `None` for the state every root layer composes with.
    pub layer: Option<LayerId>,
    /// Number of layers from the walk root down to this one.
    pub depth: u32,
    /// Effective projection.
    pub projection: Transform3d,
    /// Effective modelview.
    pub modelview: Transform3d,
    /// Device-space bounding box everything drawn here is confined to.
    pub device_bbox: Rect,
    /// How the layer's own clip drawer resolved.
    pub clip_mode: ClipMode,
}

impl LayerDrawState {
    /// The state root layers compose with: identity matrices and the
    /// configured root device bounds.
    #[must_use]
    pub fn root(config: &SceneConfig) -> Self {
        Self {
            layer: None,
            depth: 0,
            projection: Transform3d::IDENTITY,
            modelview: Transform3d::IDENTITY,
            device_bbox: config.root_device_bounds,
            clip_mode: ClipMode::Unclipped,
        }
    }
}

/// Counters accumulated by one walk, for profiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DrawStats {
    /// Layers whose content was drawn.
    pub layers_visited: u32,
    /// Layers skipped (invisible or clipped out) together with their
    /// subtrees. Descendants of a skipped layer are not counted.
    pub layers_skipped: u32,
    /// Item batches and clip quads handed to the target.
    pub draw_calls: u32,
    /// Matrix changes between consecutive item draws plus region pushes and
    /// pops.
    pub state_changes: u32,
}

/// Render-side handle that walks the present slot.
///
/// Cheap to clone and shareable across threads.
#[derive(Clone, Debug)]
pub struct LayerRenderer {
    frames: Arc<TripleBuffer<LayerFrame>>,
    config: SceneConfig,
}

impl LayerRenderer {
    pub(super) fn new(frames: Arc<TripleBuffer<LayerFrame>>, config: SceneConfig) -> Self {
        Self { frames, config }
    }

    /// Walks every root layer of `ctx.present` into `target`.
    pub fn draw(
        &self,
        ctx: FrameContext,
        target: &mut dyn DrawTarget,
        tracer: &mut Tracer<'_>,
    ) -> DrawStats {
        tracer.phase_begin(&PhaseBeginEvent {
            frame: ctx.frame,
            phase: PhaseKind::Render,
            slot: ctx.present,
        });

        let frame = self.frames.read(ctx);
        let mut walk = Walk {
            ctx,
            frame: &frame,
            target,
            #[cfg(feature = "trace-rich")]
            tracer: &mut *tracer,
            #[cfg(not(feature = "trace-rich"))]
            _tracer: core::marker::PhantomData,
            stack: ClipStack::default(),
            stats: DrawStats::default(),
            bound: None,
        };
        let root = LayerDrawState::root(&self.config);
        for &idx in &frame.roots {
            walk.visit(idx, &root);
        }
        let stats = walk.stats;
        drop(frame);

        tracer.phase_end(&PhaseEndEvent {
            frame: ctx.frame,
            phase: PhaseKind::Render,
            slot: ctx.present,
            count: stats.layers_visited,
        });
        tracer.draw_stats(ctx.frame, &stats);
        stats
    }
}

struct Walk<'w, 't> {
    ctx: FrameContext,
    frame: &'w LayerFrame,
    target: &'w mut dyn DrawTarget,
    #[cfg(feature = "trace-rich")]
    tracer: &'w mut Tracer<'t>,
    #[cfg(not(feature = "trace-rich"))]
    _tracer: core::marker::PhantomData<&'t ()>,
    stack: ClipStack,
    stats: DrawStats,
    /// Matrices of the last item draw.
    bound: Option<(Transform3d, Transform3d)>,
}

impl Walk<'_, '_> {
    fn visit(&mut self, idx: u32, parent: &LayerDrawState) {
        let frame = self.frame;
        let Some(record) = frame.record(idx) else {
            return;
        };
        if !record.visible {
            self.stats.layers_skipped += 1;
            #[cfg(feature = "trace-rich")]
            self.tracer.layer_skip(&LayerSkipEvent {
                frame: self.ctx.frame,
                layer: idx,
                reason: SkipReason::Hidden,
            });
            return;
        }

        let mut state = LayerDrawState {
            layer: Some(record.id),
            depth: parent.depth + 1,
            projection: record.projection.resolve(self.ctx, &parent.projection),
            modelview: record.modelview.resolve(self.ctx, &parent.modelview),
            device_bbox: parent.device_bbox,
            clip_mode: ClipMode::Unclipped,
        };

        let mut clipper = None;
        if let Some(drawer) = &record.clip_drawer {
            match drawer.clip_mode(self.ctx, parent, &self.stack) {
                ClipMode::SkipLayer => {
                    self.stats.layers_skipped += 1;
                    #[cfg(feature = "trace-rich")]
                    self.tracer.layer_skip(&LayerSkipEvent {
                        frame: self.ctx.frame,
                        layer: idx,
                        reason: SkipReason::ClippedOut,
                    });
                    return;
                }
                ClipMode::Unclipped => {}
                mode @ ClipMode::Clipped { device_bbox } => {
                    state.clip_mode = mode;
                    state.device_bbox = device_bbox;
                    #[cfg(feature = "trace-rich")]
                    self.tracer.clip_resolved(&ClipResolvedEvent {
                        frame: self.ctx.frame,
                        layer: idx,
                        device_bbox,
                    });
                    drawer.draw_region(self.ctx, false, parent, &self.stack, &mut *self.target);
                    self.stats.draw_calls += 1;
                    self.stack.push(ClipEntry {
                        layer: record.id,
                        device_bbox,
                    });
                    clipper = Some(drawer);
                }
            }
        }

        self.stats.layers_visited += 1;
        #[cfg(feature = "trace-rich")]
        self.tracer.layer_visit(&LayerVisitEvent {
            frame: self.ctx.frame,
            layer: idx,
            depth: state.depth,
        });

        let items = &record.items;
        let inside = !items.clip_inside.is_empty();
        let outside = !items.clip_outside.is_empty();
        if inside {
            self.target
                .push_region(RegionKind::Inside, &items.clip_inside, &state);
            self.stats.state_changes += 1;
        }
        if outside {
            self.target
                .push_region(RegionKind::Outside, &items.clip_outside, &state);
            self.stats.state_changes += 1;
        }

        self.draw_items(DrawPass::Opaque, &items.opaque, &state);
        for &child in &record.children {
            self.visit(child, &state);
        }
        self.draw_items(DrawPass::Transparent, &items.transparent, &state);

        if outside {
            self.target.pop_region(RegionKind::Outside, &state);
            self.stats.state_changes += 1;
        }
        if inside {
            self.target.pop_region(RegionKind::Inside, &state);
            self.stats.state_changes += 1;
        }
        if let Some(drawer) = clipper {
            self.stack.pop();
            drawer.draw_region(self.ctx, true, parent, &self.stack, &mut *self.target);
            self.stats.draw_calls += 1;
        }
    }

    fn draw_items(&mut self, pass: DrawPass, items: &[ItemId], state: &LayerDrawState) {
        if items.is_empty() {
            return;
        }
        let matrices = (state.projection, state.modelview);
        if self.bound != Some(matrices) {
            self.bound = Some(matrices);
            self.stats.state_changes += 1;
        }
        self.target.draw_items(pass, items, state);
        self.stats.draw_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Vec2;

    use super::*;
    use crate::clip::{ClipDrawer, RectClipDrawer};
    use crate::frame::FrameSync;
    use crate::layer::{LayerTree, MatrixKind, MatrixMode};
    use crate::node::{ExtractLayout, NodeKind, NodeStore};
    use crate::target::{ClipQuad, ItemRole};

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Items(DrawPass, Vec<ItemId>),
        Quad(bool),
        Push(RegionKind, Vec<ItemId>),
        Pop(RegionKind),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        states: Vec<LayerDrawState>,
    }

    impl DrawTarget for Recorder {
        fn draw_items(&mut self, pass: DrawPass, items: &[ItemId], state: &LayerDrawState) {
            self.calls.push(Call::Items(pass, items.to_vec()));
            self.states.push(*state);
        }
        fn draw_clip_quad(&mut self, quad: &ClipQuad) {
            self.calls.push(Call::Quad(quad.clear_z));
        }
        fn push_region(&mut self, kind: RegionKind, items: &[ItemId], _: &LayerDrawState) {
            self.calls.push(Call::Push(kind, items.to_vec()));
        }
        fn pop_region(&mut self, kind: RegionKind, _: &LayerDrawState) {
            self.calls.push(Call::Pop(kind));
        }
    }

    /// Publishes one frame through a fresh synchronizer and draws it.
    fn publish_and_draw(nodes: Option<&mut NodeStore>, tree: &mut LayerTree) -> (Recorder, DrawStats) {
        let sync = FrameSync::new();
        let ctx = sync.begin_simulation_frame();
        sync.complete_simulation_frame_with(ctx, |ctx| {
            if let Some(nodes) = nodes {
                let _ = nodes.evaluate(ctx);
            }
            let _ = tree.publish(ctx);
        });
        let ctx = sync.begin_presentation_frame();
        let mut target = Recorder::default();
        let stats = tree.renderer().draw(ctx, &mut target, &mut Tracer::none());
        (target, stats)
    }

    fn items(ids: &[u64]) -> Vec<ItemId> {
        ids.iter().copied().map(ItemId).collect()
    }

    #[test]
    fn opaque_children_transparent_order() {
        let mut tree = LayerTree::default();
        let root = tree.create_root();
        let child = tree.create_child(root);
        tree.add_item(root, ItemId(1), ItemRole::Opaque);
        tree.add_item(root, ItemId(2), ItemRole::Transparent);
        tree.add_item(child, ItemId(3), ItemRole::Opaque);
        tree.add_item(child, ItemId(4), ItemRole::Transparent);

        let (target, stats) = publish_and_draw(None, &mut tree);
        assert_eq!(
            target.calls,
            vec![
                Call::Items(DrawPass::Opaque, items(&[1])),
                Call::Items(DrawPass::Opaque, items(&[3])),
                Call::Items(DrawPass::Transparent, items(&[4])),
                Call::Items(DrawPass::Transparent, items(&[2])),
            ]
        );
        assert_eq!(stats.layers_visited, 2);
        assert_eq!(stats.draw_calls, 4);
        // Identity matrices everywhere: one bind.
        assert_eq!(stats.state_changes, 1);
    }

    #[test]
    fn children_drawn_by_key_then_insertion() {
        let mut tree = LayerTree::default();
        let root = tree.create_root();
        for id in 0..4 {
            let child = tree.create_child(root);
            tree.add_item(child, ItemId(id), ItemRole::Opaque);
            tree.set_order(child, if id == 2 { -1 } else { 0 });
        }
        let (target, _) = publish_and_draw(None, &mut tree);
        let drawn: Vec<_> = target
            .calls
            .iter()
            .map(|call| match call {
                Call::Items(_, ids) => ids[0].0,
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(drawn, vec![2, 0, 1, 3]);
    }

    #[test]
    fn hidden_layer_skips_subtree() {
        let mut tree = LayerTree::default();
        let root = tree.create_root();
        let hidden = tree.create_child(root);
        let grandchild = tree.create_child(hidden);
        tree.add_item(grandchild, ItemId(9), ItemRole::Opaque);
        tree.set_visible(hidden, false);

        let (target, stats) = publish_and_draw(None, &mut tree);
        assert!(target.calls.is_empty());
        assert_eq!(stats.layers_visited, 1);
        assert_eq!(stats.layers_skipped, 1);
    }

    #[test]
    fn clipped_out_layer_short_circuits() {
        let mut nodes = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let node = nodes.create_root();
        nodes.set_clip(node, Some(kurbo::Rect::new(5.0, 5.0, 6.0, 6.0)));
        let drawer: Arc<dyn ClipDrawer> = Arc::new(RectClipDrawer::new(&mut nodes, node));

        let mut tree = LayerTree::default();
        let root = tree.create_root();
        let clipped = tree.create_child(root);
        tree.set_clip_drawer(clipped, Some(drawer));
        for _ in 0..3 {
            let child = tree.create_child(clipped);
            tree.add_item(child, ItemId(1), ItemRole::Opaque);
        }

        let (target, stats) = publish_and_draw(Some(&mut nodes), &mut tree);
        assert!(target.calls.is_empty(), "{:?}", target.calls);
        assert_eq!(stats.layers_visited, 1);
        assert_eq!(stats.layers_skipped, 1);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn clip_and_regions_nest() {
        let mut nodes = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let node = nodes.create_root();
        nodes.set_clip(node, Some(kurbo::Rect::new(0.0, 0.0, 10.0, 10.0)));
        nodes.set_scaling_factor(node, 0.1);
        nodes.set_translation(node, Vec2::new(-1.0, -1.0));
        let drawer: Arc<dyn ClipDrawer> = Arc::new(RectClipDrawer::new(&mut nodes, node));

        let mut tree = LayerTree::default();
        let root = tree.create_root();
        let layer = tree.create_child(root);
        tree.set_clip_drawer(layer, Some(drawer));
        tree.add_item(layer, ItemId(1), ItemRole::ClipInside);
        tree.add_item(layer, ItemId(2), ItemRole::ClipOutside);
        tree.add_item(layer, ItemId(3), ItemRole::Opaque);
        tree.add_item(layer, ItemId(4), ItemRole::Transparent);

        let (target, stats) = publish_and_draw(Some(&mut nodes), &mut tree);
        assert_eq!(
            target.calls,
            vec![
                Call::Quad(false),
                Call::Push(RegionKind::Inside, items(&[1])),
                Call::Push(RegionKind::Outside, items(&[2])),
                Call::Items(DrawPass::Opaque, items(&[3])),
                Call::Items(DrawPass::Transparent, items(&[4])),
                Call::Pop(RegionKind::Outside),
                Call::Pop(RegionKind::Inside),
                Call::Quad(true),
            ]
        );
        let state = target.states[0];
        assert_eq!(state.device_bbox, kurbo::Rect::new(-1.0, -1.0, 0.0, 0.0));
        assert_eq!(
            state.clip_mode,
            ClipMode::Clipped {
                device_bbox: kurbo::Rect::new(-1.0, -1.0, 0.0, 0.0)
            }
        );
        assert_eq!(stats.draw_calls, 4);
        assert_eq!(stats.state_changes, 5);
    }

    #[test]
    fn effective_matrices_compose() {
        let mut nodes = NodeStore::new(
            ExtractLayout::new(NodeKind::RotateTranslate),
            SceneConfig::gl(),
        );
        let node = nodes.create_root();
        nodes.set_translation(node, Vec2::new(0.0, 2.0));
        let hook = nodes.create_pre_transformer(node);

        let mut tree = LayerTree::default();
        let root = tree.create_root();
        let composed = tree.create_child(root);
        let absolute = tree.create_child(root);
        let scale = Transform3d::from_scale(2.0, 2.0, 1.0);
        let shift = Transform3d::from_translation(1.0, 0.0, 0.0);
        tree.set_matrix(root, MatrixKind::Modelview, scale);
        tree.set_matrix(composed, MatrixKind::Modelview, shift);
        tree.set_matrix_hook(composed, MatrixKind::Modelview, Some(Arc::new(hook)));
        tree.set_matrix(absolute, MatrixKind::Modelview, shift);
        tree.set_matrix_mode(absolute, MatrixKind::Modelview, MatrixMode::UseThisMatrix);
        tree.add_item(composed, ItemId(1), ItemRole::Opaque);
        tree.add_item(absolute, ItemId(2), ItemRole::Opaque);

        let (target, _) = publish_and_draw(Some(&mut nodes), &mut tree);
        let node_matrix = Transform3d::from_translation(0.0, 2.0, 0.0);
        assert_eq!(target.states[0].modelview, scale * (shift * node_matrix));
        assert_eq!(target.states[1].modelview, shift);
        assert_eq!(target.states[0].projection, Transform3d::IDENTITY);
    }

    #[test]
    fn simulation_writes_do_not_leak_into_presented_slot() {
        let sync = FrameSync::new();
        let mut tree = LayerTree::default();
        let root = tree.create_root();
        tree.add_item(root, ItemId(1), ItemRole::Opaque);
        let renderer = tree.renderer();

        let ctx = sync.begin_simulation_frame();
        sync.complete_simulation_frame_with(ctx, |ctx| {
            let _ = tree.publish(ctx);
        });
        let present = sync.begin_presentation_frame();

        // Next simulation frame hides the layer but has not completed.
        let ctx = sync.begin_simulation_frame();
        tree.set_visible(root, false);
        let _ = tree.publish(ctx);

        let mut target = Recorder::default();
        let stats = renderer.draw(present, &mut target, &mut Tracer::none());
        assert_eq!(stats.layers_visited, 1);

        sync.complete_simulation_frame(ctx);
        let present = sync.begin_presentation_frame();
        let stats = renderer.draw(present, &mut Recorder::default(), &mut Tracer::none());
        assert_eq!(stats.layers_visited, 0);
        assert_eq!(stats.layers_skipped, 1);
    }

    #[test]
    fn detached_clip_drawer_stops_clipping() {
        let mut nodes = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let node = nodes.create_root();
        nodes.set_clip(node, Some(kurbo::Rect::new(5.0, 5.0, 6.0, 6.0)));
        let drawer: Arc<dyn ClipDrawer> = Arc::new(RectClipDrawer::new(&mut nodes, node));

        let mut tree = LayerTree::default();
        let layer = tree.create_root();
        tree.add_item(layer, ItemId(1), ItemRole::Opaque);
        tree.set_clip_drawer(layer, Some(drawer));
        tree.set_clip_drawer(layer, None);
        let (target, _) = publish_and_draw(Some(&mut nodes), &mut tree);
        assert_eq!(target.calls.len(), 1);
    }

    #[test]
    fn render_thread_sees_whole_frames() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const FRAMES: u32 = 200;

        let sync = FrameSync::new();
        let mut nodes = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let node = nodes.create_root();
        let hook = Arc::new(nodes.create_pre_transformer(node));

        let mut tree = LayerTree::default();
        let root = tree.create_root();
        for id in 0..2 {
            let layer = tree.create_child(root);
            tree.set_matrix_hook(layer, MatrixKind::Modelview, Some(hook.clone()));
            tree.add_item(layer, ItemId(id), ItemRole::Opaque);
        }
        let renderer = tree.renderer();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut last = 0.0;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let ctx = sync.begin_presentation_frame();
                    let mut target = Recorder::default();
                    let _ = renderer.draw(ctx, &mut target, &mut Tracer::none());
                    sync.end_presentation_frame(ctx);
                    if let [a, b] = target.states.as_slice() {
                        assert_eq!(a.modelview, b.modelview, "torn frame");
                        let x = a.modelview.col(3)[0];
                        assert!(x >= last, "presented frames went backwards");
                        last = x;
                    }
                    if finished {
                        break;
                    }
                }
            });

            let mut ctx = sync.begin_simulation_frame();
            for frame in 1..=FRAMES {
                nodes.set_translation(node, Vec2::new(f64::from(frame), 0.0));
                ctx = sync.complete_simulation_frame_with(ctx, |ctx| {
                    let _ = nodes.evaluate(ctx);
                    let _ = tree.publish(ctx);
                });
            }
            done.store(true, Ordering::Release);
        });

        let ctx = sync.begin_presentation_frame();
        let mut target = Recorder::default();
        let _ = renderer.draw(ctx, &mut target, &mut Tracer::none());
        assert_eq!(target.states[0].modelview.col(3)[0], f64::from(FRAMES));
    }
}
