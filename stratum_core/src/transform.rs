// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 homogeneous matrix.
//!
//! Layer projection and modelview matrices, hook pre-transforms and clip
//! quads all use [`Transform3d`]. Points are column vectors, so `a * b`
//! applies `b` first.

use core::ops::Mul;

use kurbo::Point;

/// A column-major 4×4 matrix stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix, matching the memory layout
/// GPU APIs expect for uniform upload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from four column arrays.
    #[inline]
    #[must_use]
    pub const fn from_cols(col0: [f64; 4], col1: [f64; 4], col2: [f64; 4], col3: [f64; 4]) -> Self {
        Self {
            cols: [col0, col1, col2, col3],
        }
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Returns row `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn row(self, i: usize) -> [f64; 4] {
        [
            self.cols[0][i],
            self.cols[1][i],
            self.cols[2][i],
            self.cols[3][i],
        ]
    }

    /// Returns a copy with row `i` replaced.
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn with_row(mut self, i: usize, row: [f64; 4]) -> Self {
        self.cols[0][i] = row[0];
        self.cols[1][i] = row[1];
        self.cols[2][i] = row[2];
        self.cols[3][i] = row[3];
        self
    }

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale transform.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Z axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_z(radians: f64) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_similarity_2d(1.0, c, s, 0.0, 0.0)
    }

    /// Creates the planar similarity `p ↦ scale · R · p + (tx, ty)`, where
    /// `R` is the rotation whose unit complex number is `(cos, sin)`.
    ///
    /// Z passes through unchanged.
    #[inline]
    #[must_use]
    pub const fn from_similarity_2d(scale: f64, cos: f64, sin: f64, tx: f64, ty: f64) -> Self {
        Self {
            cols: [
                [scale * cos, scale * sin, 0.0, 0.0],
                [-scale * sin, scale * cos, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [tx, ty, 0.0, 1.0],
            ],
        }
    }

    /// Creates an orthographic projection mapping the box
    /// `[left, right] × [bottom, top] × [-near, -far]` onto `[-1, 1]³`.
    #[must_use]
    pub fn orthographic(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Self {
        let rl = right - left;
        let tb = top - bottom;
        let f_n = far - near;
        Self::from_cols(
            [2.0 / rl, 0.0, 0.0, 0.0],
            [0.0, 2.0 / tb, 0.0, 0.0],
            [0.0, 0.0, -2.0 / f_n, 0.0],
            [
                -(right + left) / rl,
                -(top + bottom) / tb,
                -(far + near) / f_n,
                1.0,
            ],
        )
    }

    /// Creates a right-handed perspective projection looking down `-z`.
    ///
    /// `fovy` is the vertical field of view in radians.
    #[must_use]
    pub fn perspective(fovy: f64, aspect: f64, near: f64, far: f64) -> Self {
        let f = 1.0 / (fovy * 0.5).tan();
        let n_f = near - far;
        Self::from_cols(
            [f / aspect, 0.0, 0.0, 0.0],
            [0.0, f, 0.0, 0.0],
            [0.0, 0.0, (far + near) / n_f, -1.0],
            [0.0, 0.0, 2.0 * far * near / n_f, 0.0],
        )
    }

    /// Multiplies the homogeneous column vector `v`.
    #[inline]
    #[must_use]
    pub fn transform_vec4(&self, v: [f64; 4]) -> [f64; 4] {
        let c = &self.cols;
        let mut out = [0.0; 4];
        for (i, o) in out.iter_mut().enumerate() {
            *o = c[0][i] * v[0] + c[1][i] * v[1] + c[2][i] * v[2] + c[3][i] * v[3];
        }
        out
    }

    /// Transforms the planar point `(p.x, p.y, 0, 1)` and divides by `w`.
    ///
    /// Returns `None` when `w <= tolerance`, i.e. the point is at or behind
    /// the eye of a perspective projection and has no meaningful device
    /// position.
    #[inline]
    #[must_use]
    pub fn project_point(&self, p: Point, tolerance: f64) -> Option<Point> {
        let [x, y, _, w] = self.transform_vec4([p.x, p.y, 0.0, 1.0]);
        if w <= tolerance {
            return None;
        }
        Some(Point::new(x / w, y / w))
    }

    /// Returns the matrix as 16 column-major `f32` values for upload.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "GPU uniforms are single precision"
    )]
    #[must_use]
    pub fn to_cols_array_f32(&self) -> [f32; 16] {
        let mut out = [0.0_f32; 16];
        for (j, col) in self.cols.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                out[j * 4 + i] = *v as f32;
            }
        }
        out
    }

    /// Is this transform [finite]?
    ///
    /// [finite]: f64::is_finite
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_point_eq(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS,
            "{a:?} != {b:?}"
        );
    }

    #[test]
    fn identity_multiply() {
        let t = Transform3d::from_translation(1.0, 2.0, 3.0);
        assert_eq!(Transform3d::IDENTITY * t, t);
        assert_eq!(t * Transform3d::IDENTITY, t);
    }

    #[test]
    fn right_operand_applies_first() {
        let s = Transform3d::from_scale(2.0, 2.0, 2.0);
        let t = Transform3d::from_translation(3.0, 4.0, 0.0);
        let p = (t * s).project_point(Point::new(1.0, 1.0), EPS).unwrap();
        assert_point_eq(p, Point::new(5.0, 6.0));
    }

    #[test]
    fn row_and_with_row() {
        let t = Transform3d::from_translation(5.0, 6.0, 7.0);
        assert_eq!(t.row(0), [1.0, 0.0, 0.0, 5.0]);
        let u = t.with_row(2, t.row(3));
        assert_eq!(u.row(2), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(u.row(0), t.row(0));
    }

    #[test]
    fn similarity_matches_rotation_then_scale() {
        let (s, c) = 0.3_f64.sin_cos();
        let sim = Transform3d::from_similarity_2d(2.0, c, s, 1.0, -1.0);
        let composed = Transform3d::from_translation(1.0, -1.0, 0.0)
            * Transform3d::from_scale(2.0, 2.0, 1.0)
            * Transform3d::from_rotation_z(0.3);
        for (a, b) in sim.cols.iter().flatten().zip(composed.cols.iter().flatten()) {
            assert!((a - b).abs() < EPS, "{sim:?} != {composed:?}");
        }
    }

    #[test]
    fn orthographic_maps_box_to_unit_cube() {
        let m = Transform3d::orthographic(0.0, 800.0, 0.0, 600.0, -1.0, 1.0);
        assert_point_eq(
            m.project_point(Point::new(0.0, 0.0), EPS).unwrap(),
            Point::new(-1.0, -1.0),
        );
        assert_point_eq(
            m.project_point(Point::new(800.0, 600.0), EPS).unwrap(),
            Point::new(1.0, 1.0),
        );
    }

    #[test]
    fn perspective_divides_by_w() {
        let m = Transform3d::perspective(core::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
            * Transform3d::from_translation(0.0, 0.0, -2.0);
        // With a 90° field of view, x/(-z) lands directly in device space.
        let p = m.project_point(Point::new(1.0, 0.5), EPS).unwrap();
        assert_point_eq(p, Point::new(0.5, 0.25));
    }

    #[test]
    fn point_behind_eye_has_no_projection() {
        let m = Transform3d::perspective(core::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
            * Transform3d::from_translation(0.0, 0.0, 2.0);
        assert!(m.project_point(Point::new(0.0, 0.0), EPS).is_none());
    }

    #[test]
    fn f32_export_is_column_major() {
        let t = Transform3d::from_translation(5.0, 6.0, 7.0);
        let a = t.to_cols_array_f32();
        assert_eq!(&a[12..], &[5.0, 6.0, 7.0, 1.0]);
    }

    #[test]
    fn infinity_detected() {
        let mut t = Transform3d::IDENTITY;
        assert!(t.is_finite());
        t.cols[0][3] = f64::INFINITY;
        assert!(!t.is_finite());
    }
}
