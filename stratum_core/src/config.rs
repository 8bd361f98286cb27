// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene-wide numeric configuration.

use kurbo::Rect;

/// Numeric conventions shared by node extraction and the draw walk.
///
/// The presets differ in the depth range of the target API, which decides
/// which z value is "out of range" for hidden nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneConfig {
    /// Z written by [`extract_values`](crate::node::NodeStore::extract_values)
    /// for nodes that are not visible. Must lie outside the depth range so
    /// that the vertex is clipped.
    pub hidden_z: f32,
    /// Magnitude below which scales, vector lengths and homogeneous `w` are
    /// treated as zero.
    pub tolerance: f64,
    /// Device-space bounding box of the root of every layer walk.
    pub root_device_bounds: Rect,
}

impl SceneConfig {
    /// Configuration for APIs with a `[-1, 1]` clip-space depth range.
    #[must_use]
    pub const fn gl() -> Self {
        Self {
            hidden_z: 2.0,
            tolerance: 1e-9,
            root_device_bounds: Rect::new(-1.0, -1.0, 1.0, 1.0),
        }
    }

    /// Configuration for APIs with a `[0, 1]` clip-space depth range.
    #[must_use]
    pub const fn wgpu() -> Self {
        Self {
            hidden_z: -1.0,
            tolerance: 1e-9,
            root_device_bounds: Rect::new(-1.0, -1.0, 1.0, 1.0),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::gl()
    }
}
