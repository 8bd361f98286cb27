// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The receiving end of the layer walk.
//!
//! [`LayerRenderer::draw`](crate::layer::LayerRenderer::draw) walks the present
//! slot and forwards every draw, clip quad and region constraint to a
//! [`DrawTarget`]. Items are opaque [`ItemId`]s; what an item *is* (a mesh, a
//! glyph run, a sprite batch) is the target's business.

use kurbo::Point;

use crate::layer::LayerDrawState;
use crate::transform::Transform3d;

/// Opaque identifier of a drawable item attached to a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

/// How an attached item participates in its layer's draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemRole {
    /// Drawn before the layer's children.
    Opaque,
    /// Drawn after the layer's children.
    Transparent,
    /// Contributes to the region the layer's content is restricted to.
    ClipInside,
    /// Contributes to the occluder set the layer's content is suppressed
    /// behind.
    ClipOutside,
}

/// The two item passes of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawPass {
    /// Before children.
    Opaque,
    /// After children.
    Transparent,
}

/// A region constraint pushed for the duration of a layer's draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// Only draw inside the union of the region items' footprints.
    Inside,
    /// Suppress a pixel only if it is behind every occluder that covers it.
    Outside,
}

/// A clip quad to be rasterized by the target.
///
/// Issued by [`ClipDrawer::draw_region`](crate::clip::ClipDrawer::draw_region)
/// with the render parent's matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipQuad {
    /// Quad corners in the parent's model space, counter-clockwise.
    pub corners: [Point; 4],
    /// Projection to draw with. When `clear_z` is set, its z row equals its
    /// w row so that every fragment lands on the far plane.
    pub projection: Transform3d,
    /// Modelview to draw with.
    pub modelview: Transform3d,
    /// Whether this draw clears the depth written by the matching earlier
    /// draw.
    pub clear_z: bool,
}

/// Receives the output of the layer walk.
///
/// Calls arrive in walk order. Every [`push_region`](Self::push_region) is
/// matched by a [`pop_region`](Self::pop_region) of the same kind before the
/// walk leaves the layer, and regions nest.
pub trait DrawTarget {
    /// Draws `items` of one pass of the layer described by `state`.
    fn draw_items(&mut self, pass: DrawPass, items: &[ItemId], state: &LayerDrawState);

    /// Draws a clip quad.
    fn draw_clip_quad(&mut self, quad: &ClipQuad);

    /// Pushes a region constraint built from `items`.
    fn push_region(&mut self, kind: RegionKind, items: &[ItemId], state: &LayerDrawState);

    /// Pops the innermost region constraint, which has kind `kind`.
    fn pop_region(&mut self, kind: RegionKind, state: &LayerDrawState);
}
