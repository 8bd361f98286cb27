// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-side copies of node global values.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::frame::{FrameContext, SlotIndex, TripleBuffer};
use crate::layer::MatrixHook;
use crate::transform::Transform3d;

use super::NodeValue;

/// A triple-buffered copy of one node's global value.
///
/// The owning [`NodeStore`](super::NodeStore) writes the simulation slot
/// during `evaluate`; dependents read the present slot. Once unhooked, every
/// read returns `None`.
#[derive(Debug)]
pub(crate) struct NodeShadow {
    values: TripleBuffer<Option<NodeValue>>,
    hooked: AtomicBool,
}

impl NodeShadow {
    /// Creates a hooked shadow with `value` in every slot.
    pub(crate) fn new(value: NodeValue) -> Arc<Self> {
        Arc::new(Self {
            values: TripleBuffer::new(Some(value)),
            hooked: AtomicBool::new(true),
        })
    }

    pub(crate) fn publish(&self, slot: SlotIndex, value: NodeValue) {
        *self.values.slot(slot) = Some(value);
    }

    /// Returns the value captured for `slot`, or `None` once unhooked.
    pub(crate) fn read(&self, slot: SlotIndex) -> Option<NodeValue> {
        if !self.is_hooked() {
            return None;
        }
        *self.values.slot(slot)
    }

    pub(crate) fn unhook(&self) {
        self.hooked.store(false, Ordering::Release);
    }

    pub(crate) fn is_hooked(&self) -> bool {
        self.hooked.load(Ordering::Acquire)
    }
}

/// Applies a node's global transform to a layer matrix.
///
/// Created by [`NodeStore::create_pre_transformer`](super::NodeStore::create_pre_transformer)
/// and attached to a layer matrix with
/// [`LayerTree::set_matrix_hook`](crate::layer::LayerTree::set_matrix_hook).
/// Every `PreTransformer` for the same node shares one hook, so unhooking one
/// unhooks them all.
///
/// After [`unhook`](Self::unhook), or once the node is destroyed,
/// [`modify_matrix`](Self::modify_matrix) leaves the matrix untouched.
#[derive(Clone, Debug)]
pub struct PreTransformer {
    pub(super) shadow: Arc<NodeShadow>,
}

impl PreTransformer {
    /// Right-multiplies `matrix` by the node's global transform as captured
    /// for `ctx.present`.
    pub fn modify_matrix(&self, ctx: FrameContext, matrix: &mut Transform3d) {
        if let Some(value) = self.shadow.read(ctx.present) {
            *matrix = *matrix * value.transform.to_transform3d();
        }
    }

    /// Permanently detaches this hook from its node.
    pub fn unhook(&self) {
        self.shadow.unhook();
    }

    /// Returns whether the hook still tracks its node.
    #[must_use]
    pub fn is_hooked(&self) -> bool {
        self.shadow.is_hooked()
    }
}

impl MatrixHook for PreTransformer {
    fn modify_matrix(&self, ctx: FrameContext, matrix: &mut Transform3d) {
        Self::modify_matrix(self, ctx, matrix);
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Vec2;

    use super::*;
    use crate::frame::SlotIndex;
    use crate::node::NodeTransform;

    fn translated(x: f64) -> NodeValue {
        NodeValue {
            transform: NodeTransform::new(Vec2::new(x, 0.0), 1.0),
            ..NodeValue::ROOT
        }
    }

    #[test]
    fn hook_reads_only_the_present_slot() {
        let shadow = NodeShadow::new(translated(1.0));
        let hook = PreTransformer {
            shadow: Arc::clone(&shadow),
        };
        let ctx = FrameContext::new(SlotIndex::new(0), SlotIndex::new(1), 0);

        shadow.publish(ctx.simulation, translated(5.0));
        let mut m = Transform3d::IDENTITY;
        hook.modify_matrix(ctx, &mut m);
        assert_eq!(m.col(3), [1.0, 0.0, 0.0, 1.0]);

        shadow.publish(ctx.present, translated(7.0));
        let mut m = Transform3d::IDENTITY;
        hook.modify_matrix(ctx, &mut m);
        assert_eq!(m.col(3), [7.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn hook_multiplies_on_the_right() {
        let shadow = NodeShadow::new(NodeValue {
            transform: NodeTransform::new(Vec2::new(1.0, 0.0), 2.0),
            ..NodeValue::ROOT
        });
        let hook = PreTransformer { shadow };
        let ctx = FrameContext::new(SlotIndex::new(2), SlotIndex::new(0), 0);
        let mut m = Transform3d::from_translation(10.0, 0.0, 0.0);
        hook.modify_matrix(ctx, &mut m);
        // The node transform applies before the existing matrix.
        let p = m.project_point(kurbo::Point::new(1.0, 0.0), 1e-9).unwrap();
        assert_eq!(p, kurbo::Point::new(13.0, 0.0));
    }

    #[test]
    fn unhooked_hook_is_identity() {
        let hook = PreTransformer {
            shadow: NodeShadow::new(translated(3.0)),
        };
        let copy = hook.clone();
        hook.unhook();
        assert!(!copy.is_hooked());
        let ctx = FrameContext::new(SlotIndex::new(0), SlotIndex::new(1), 0);
        let mut m = Transform3d::from_scale(2.0, 2.0, 2.0);
        copy.modify_matrix(ctx, &mut m);
        assert_eq!(m, Transform3d::from_scale(2.0, 2.0, 2.0));
    }
}
