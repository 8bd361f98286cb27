// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render plan: the recorded output of one layer walk.

use kurbo::Rect;
use stratum_core::layer::{LayerDrawState, LayerId};
use stratum_core::target::{ClipQuad, DrawPass, DrawTarget, ItemId, RegionKind};
use stratum_core::transform::Transform3d;

/// A single recorded call of the layer walk.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    /// A batch of items of one pass.
    Items {
        /// The layer the items are attached to.
        layer: Option<LayerId>,
        /// Which side of the children the batch was drawn on.
        pass: DrawPass,
        /// The items, in attachment order.
        items: Vec<ItemId>,
        /// Effective projection.
        projection: Transform3d,
        /// Effective modelview.
        modelview: Transform3d,
        /// Device-space bounds the items are confined to.
        device_bbox: Rect,
    },
    /// A clip quad (stencil/depth write or clear).
    ClipQuad(ClipQuad),
    /// Start of a clip region.
    PushRegion {
        /// Inside or outside region.
        kind: RegionKind,
        /// Items whose footprints form the region.
        items: Vec<ItemId>,
    },
    /// End of the innermost region of this kind.
    PopRegion {
        /// Inside or outside region.
        kind: RegionKind,
    },
}

/// An ordered list of draw commands for one presented frame.
///
/// Items are recorded back-to-front in walk order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPlan {
    /// Recorded commands.
    pub commands: Vec<DrawCommand>,
}

impl RenderPlan {
    /// Creates an empty render plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the plan for reuse.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Iterates over every drawn item with its pass, in draw order.
    pub fn drawn_items(&self) -> impl Iterator<Item = (DrawPass, ItemId)> + '_ {
        self.commands.iter().flat_map(|cmd| {
            let (pass, items) = match cmd {
                DrawCommand::Items { pass, items, .. } => (*pass, items.as_slice()),
                _ => (DrawPass::Opaque, &[][..]),
            };
            items.iter().map(move |&item| (pass, item))
        })
    }

    /// Current nesting depth of regions; zero for a complete walk.
    #[must_use]
    pub fn open_regions(&self) -> usize {
        let mut depth = 0_usize;
        for cmd in &self.commands {
            match cmd {
                DrawCommand::PushRegion { .. } => depth += 1,
                DrawCommand::PopRegion { .. } => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        depth
    }
}

impl DrawTarget for RenderPlan {
    fn draw_items(&mut self, pass: DrawPass, items: &[ItemId], state: &LayerDrawState) {
        self.commands.push(DrawCommand::Items {
            layer: state.layer,
            pass,
            items: items.to_vec(),
            projection: state.projection,
            modelview: state.modelview,
            device_bbox: state.device_bbox,
        });
    }

    fn draw_clip_quad(&mut self, quad: &ClipQuad) {
        self.commands.push(DrawCommand::ClipQuad(*quad));
    }

    fn push_region(&mut self, kind: RegionKind, items: &[ItemId], _state: &LayerDrawState) {
        self.commands.push(DrawCommand::PushRegion {
            kind,
            items: items.to_vec(),
        });
    }

    fn pop_region(&mut self, kind: RegionKind, _state: &LayerDrawState) {
        self.commands.push(DrawCommand::PopRegion { kind });
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Vec2;
    use stratum_core::clip::{ClipDrawer, RectClipDrawer};
    use stratum_core::config::SceneConfig;
    use stratum_core::frame::FrameSync;
    use stratum_core::layer::LayerTree;
    use stratum_core::node::{ExtractLayout, NodeKind, NodeStore};
    use stratum_core::target::ItemRole;
    use stratum_core::trace::Tracer;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn records_walk_in_order() {
        let sync = FrameSync::new();
        let mut nodes = NodeStore::new(ExtractLayout::new(NodeKind::Translate), SceneConfig::gl());
        let window = nodes.create_root();
        nodes.set_clip(window, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        nodes.set_scaling_factor(window, 0.1);
        nodes.set_translation(window, Vec2::new(-1.0, -1.0));
        let drawer: Arc<dyn ClipDrawer> = Arc::new(RectClipDrawer::new(&mut nodes, window));

        let mut tree = LayerTree::new(SceneConfig::gl());
        let root = tree.create_root();
        let clipped = tree.create_child(root);
        tree.set_clip_drawer(clipped, Some(drawer));
        tree.add_item(root, ItemId(1), ItemRole::Opaque);
        tree.add_item(clipped, ItemId(2), ItemRole::ClipInside);
        tree.add_item(clipped, ItemId(3), ItemRole::Opaque);
        tree.add_item(root, ItemId(4), ItemRole::Transparent);

        let ctx = sync.begin_simulation_frame();
        let _ = sync.complete_simulation_frame_with(ctx, |ctx| {
            let _ = nodes.evaluate(ctx);
            let _ = tree.publish(ctx);
        });

        let mut plan = RenderPlan::new();
        let ctx = sync.begin_presentation_frame();
        let _ = tree.renderer().draw(ctx, &mut plan, &mut Tracer::none());

        let drawn: Vec<_> = plan.drawn_items().collect();
        assert_eq!(
            drawn,
            vec![
                (DrawPass::Opaque, ItemId(1)),
                (DrawPass::Opaque, ItemId(3)),
                (DrawPass::Transparent, ItemId(4)),
            ]
        );
        assert_eq!(plan.open_regions(), 0);
        assert_eq!(plan.commands.len(), 7);
        assert!(matches!(plan.commands[1], DrawCommand::ClipQuad(q) if !q.clear_z));
        assert!(matches!(plan.commands[5], DrawCommand::ClipQuad(q) if q.clear_z));
        match &plan.commands[3] {
            DrawCommand::Items {
                layer, device_bbox, ..
            } => {
                assert_eq!(*layer, Some(clipped));
                assert_eq!(*device_bbox, Rect::new(-1.0, -1.0, 0.0, 0.0));
            }
            other => panic!("expected Items, got {other:?}"),
        }
    }

    #[test]
    fn clear_empties_plan() {
        let mut plan = RenderPlan::new();
        plan.commands.push(DrawCommand::PopRegion {
            kind: RegionKind::Inside,
        });
        plan.clear();
        assert!(plan.commands.is_empty());
        assert_eq!(plan.open_regions(), 0);
    }
}
