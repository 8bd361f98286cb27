// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node values, their composition, and their linearization.

use kurbo::{Point, Rect, Vec2};

use crate::config::SceneConfig;
use crate::transform::Transform3d;

/// Returns `true` unless `r` has strictly positive width and height.
///
/// NaN extents count as empty.
#[inline]
pub(crate) fn rect_is_empty(r: Rect) -> bool {
    !(r.x1 > r.x0 && r.y1 > r.y0)
}

/// Normalizes `v`, falling back to `(1, 0)` at or below `tolerance`.
#[inline]
pub(crate) fn normalize_or_x(v: Vec2, tolerance: f64) -> Vec2 {
    let len = v.hypot();
    if len <= tolerance {
        Vec2::new(1.0, 0.0)
    } else {
        v / len
    }
}

/// Rotates `v` by the unit complex number `r`.
#[inline]
fn rotate(r: Vec2, v: Vec2) -> Vec2 {
    Vec2::new(r.x * v.x - r.y * v.y, r.y * v.x + r.x * v.y)
}

/// A planar similarity: uniform scale, rotation, then translation.
///
/// The rotation is stored as a unit complex number `(cos θ, sin θ)` so that
/// composition is a complex multiply and extraction needs no trigonometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeTransform {
    /// Translation applied last.
    pub translation: Vec2,
    /// Uniform scale factor.
    pub scale: f64,
    /// Rotation as a unit complex number.
    pub rotation: Vec2,
}

impl NodeTransform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        translation: Vec2::ZERO,
        scale: 1.0,
        rotation: Vec2::new(1.0, 0.0),
    };

    /// Creates an unrotated transform.
    #[must_use]
    pub const fn new(translation: Vec2, scale: f64) -> Self {
        Self {
            translation,
            scale,
            rotation: Vec2::new(1.0, 0.0),
        }
    }

    /// Returns a copy rotated to `radians`.
    #[must_use]
    pub fn with_angle(self, radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self {
            rotation: Vec2::new(c, s),
            ..self
        }
    }

    /// Returns the rotation angle in radians, in `(-π, π]`.
    #[must_use]
    pub fn angle(&self) -> f64 {
        self.rotation.y.atan2(self.rotation.x)
    }

    /// Returns `parent ∘ child`: `child` applies first, in its local frame,
    /// then `parent`.
    #[must_use]
    pub fn compose(parent: &Self, child: &Self) -> Self {
        Self {
            translation: parent.translation
                + rotate(parent.rotation, child.translation) * parent.scale,
            scale: parent.scale * child.scale,
            rotation: rotate(parent.rotation, child.rotation),
        }
    }

    /// Maps a point from the local frame to the parent frame.
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        (rotate(self.rotation, p.to_vec2()) * self.scale + self.translation).to_point()
    }

    /// Maps a rectangle and returns the bounding box of its image.
    ///
    /// Exact when the rotation is the identity.
    #[must_use]
    pub fn apply_rect(&self, r: Rect) -> Rect {
        let corners = [
            self.apply(Point::new(r.x0, r.y0)),
            self.apply(Point::new(r.x1, r.y0)),
            self.apply(Point::new(r.x1, r.y1)),
            self.apply(Point::new(r.x0, r.y1)),
        ];
        bounding_box(&corners)
    }

    /// Maps a rectangle back into the local frame.
    ///
    /// Returns `None` if the scale is below `tolerance`.
    #[must_use]
    pub fn inverse_apply_rect(&self, r: Rect, tolerance: f64) -> Option<Rect> {
        if self.scale.abs() <= tolerance {
            return None;
        }
        let inv_rotation = Vec2::new(self.rotation.x, -self.rotation.y);
        let inverse = |p: Point| {
            (rotate(inv_rotation, p.to_vec2() - self.translation) / self.scale).to_point()
        };
        let corners = [
            inverse(Point::new(r.x0, r.y0)),
            inverse(Point::new(r.x1, r.y0)),
            inverse(Point::new(r.x1, r.y1)),
            inverse(Point::new(r.x0, r.y1)),
        ];
        Some(bounding_box(&corners))
    }

    /// Returns the equivalent 4×4 matrix.
    #[must_use]
    pub fn to_transform3d(&self) -> Transform3d {
        Transform3d::from_similarity_2d(
            self.scale,
            self.rotation.x,
            self.rotation.y,
            self.translation.x,
            self.translation.y,
        )
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

pub(crate) fn bounding_box(points: &[Point]) -> Rect {
    let mut bbox = Rect::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    );
    for p in points {
        bbox.x0 = bbox.x0.min(p.x);
        bbox.y0 = bbox.y0.min(p.y);
        bbox.x1 = bbox.x1.max(p.x);
        bbox.y1 = bbox.y1.max(p.y);
    }
    bbox
}

/// One node's contribution to the transform/visibility/clip chain.
///
/// The same type holds a node's local value and its composed global value.
/// In a global value, `clip` is expressed in root coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeValue {
    /// Similarity transform.
    pub transform: NodeTransform,
    /// Visibility flag.
    pub visible: bool,
    /// Clip window; `Some` means clipping is active.
    pub clip: Option<Rect>,
}

impl NodeValue {
    /// The value every root composes with: identity, visible, unclipped.
    pub const ROOT: Self = Self {
        transform: NodeTransform::IDENTITY,
        visible: true,
        clip: None,
    };

    /// Returns whether a clip window is active.
    #[inline]
    #[must_use]
    pub const fn clipping_active(&self) -> bool {
        self.clip.is_some()
    }

    /// Composes a parent's global value with a child's local value.
    ///
    /// - `visible` is the conjunction of both flags.
    /// - The transform is `parent ∘ local`.
    /// - For kinds with clip windows, the local window is mapped to root
    ///   coordinates through the composed transform. If both sides clip, the
    ///   result is the intersection; if one side clips, that side's window is
    ///   kept. An empty window makes the result invisible.
    /// - Kinds without clip windows never clip.
    /// - A composed scale with magnitude at or below `tolerance` makes the
    ///   result invisible.
    #[must_use]
    pub fn compose(parent: &Self, local: &Self, kind: NodeKind, tolerance: f64) -> Self {
        let transform = NodeTransform::compose(&parent.transform, &local.transform);
        let mut visible = parent.visible && local.visible && transform.scale.abs() > tolerance;
        let clip = if kind.supports_clip() {
            let local_global = local.clip.map(|r| transform.apply_rect(r));
            match (parent.clip, local_global) {
                (Some(p), Some(l)) => Some(p.intersect(l)),
                (p, l) => p.or(l),
            }
        } else {
            None
        };
        if let Some(rect) = clip {
            visible &= !rect_is_empty(rect);
        }
        Self {
            transform,
            visible,
            clip,
        }
    }

    /// Writes this value's base fields for `kind` into `out`.
    ///
    /// The layout is a contract with GPU-side consumers:
    ///
    /// | kind              | fields                                                              |
    /// |-------------------|---------------------------------------------------------------------|
    /// | `Translate`       | `x, y, z, ±scale, clip_min_x, clip_max_x, clip_min_y, clip_max_y`   |
    /// | `RotateTranslate` | `s·cos θ, s·sin θ, x, y, z`                                         |
    ///
    /// `z` is replaced by `config.hidden_z` when the value is not visible.
    /// For `Translate`, the sign bit of the scale field is set when clipping
    /// is *inactive*, and the clip window is given in the node's local frame.
    /// Invisible values and inactive clips write zeros to the clip fields.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`NodeKind::base_width`].
    #[expect(
        clippy::cast_possible_truncation,
        reason = "extracted vectors are single precision"
    )]
    pub fn extract(&self, kind: NodeKind, z: f32, config: &SceneConfig, out: &mut [f32]) {
        let t = &self.transform;
        let z = if self.visible { z } else { config.hidden_z };
        match kind {
            NodeKind::Translate => {
                let out = &mut out[..8];
                out[0] = t.translation.x as f32;
                out[1] = t.translation.y as f32;
                out[2] = z;
                let magnitude = t.scale.abs() as f32;
                out[3] = if self.clipping_active() {
                    magnitude
                } else {
                    -magnitude
                };
                let local_clip = self
                    .clip
                    .filter(|_| self.visible)
                    .and_then(|r| t.inverse_apply_rect(r, config.tolerance));
                let clip = local_clip.map_or([0.0; 4], |r| {
                    [r.x0 as f32, r.x1 as f32, r.y0 as f32, r.y1 as f32]
                });
                out[4..8].copy_from_slice(&clip);
            }
            NodeKind::RotateTranslate => {
                let out = &mut out[..5];
                out[0] = (t.scale * t.rotation.x) as f32;
                out[1] = (t.scale * t.rotation.y) as f32;
                out[2] = t.translation.x as f32;
                out[3] = t.translation.y as f32;
                out[4] = z;
            }
        }
    }
}

impl Default for NodeValue {
    fn default() -> Self {
        Self::ROOT
    }
}

/// The closed set of node transform kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Uniform scale and translation, with clip windows.
    Translate,
    /// Uniform scale, rotation and translation, without clip windows.
    RotateTranslate,
}

impl NodeKind {
    /// Number of floats written by [`NodeValue::extract`].
    #[must_use]
    pub const fn base_width(self) -> usize {
        match self {
            Self::Translate => 8,
            Self::RotateTranslate => 5,
        }
    }

    /// Offset of the z field in the extracted vector.
    #[must_use]
    pub const fn z_offset(self) -> usize {
        match self {
            Self::Translate => 2,
            Self::RotateTranslate => 4,
        }
    }

    /// Whether nodes of this kind compose clip windows.
    #[must_use]
    pub const fn supports_clip(self) -> bool {
        matches!(self, Self::Translate)
    }

    /// Whether nodes of this kind may rotate.
    #[must_use]
    pub const fn supports_rotation(self) -> bool {
        matches!(self, Self::RotateTranslate)
    }
}

/// An additional per-node scalar appended after the base fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtraField {
    /// Name, for diagnostics and shader binding generation.
    pub name: &'static str,
    /// Value of the field on newly created nodes.
    pub default: f32,
}

/// The extracted vector layout shared by every node of a store.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractLayout {
    /// Base transform kind.
    pub kind: NodeKind,
    /// Extra fields, in extraction order.
    pub extras: Vec<ExtraField>,
}

impl ExtractLayout {
    /// Creates a layout with no extra fields.
    #[must_use]
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            extras: Vec::new(),
        }
    }

    /// Appends an extra field.
    #[must_use]
    pub fn with_extra(mut self, name: &'static str, default: f32) -> Self {
        self.extras.push(ExtraField { name, default });
        self
    }

    /// Floats per node.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.kind.base_width() + self.extras.len()
    }

    /// Returns the index of the extra field named `name`.
    #[must_use]
    pub fn extra_index(&self, name: &str) -> Option<usize> {
        self.extras.iter().position(|f| f.name == name)
    }

    /// Writes the record of a node that no longer exists: zeros with the
    /// hidden z sentinel.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`stride`](Self::stride).
    pub fn write_hidden(&self, hidden_z: f32, out: &mut [f32]) {
        let out = &mut out[..self.stride()];
        out.fill(0.0);
        out[self.kind.z_offset()] = hidden_z;
    }
}
