// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layer tree.
//!
//! A [`LayerTree`] is owned by the simulation thread. Each layer carries a
//! visibility flag, an order key, a projection and a modelview
//! [`MatrixSlot`], an optional [`ClipDrawer`](crate::clip::ClipDrawer) and
//! lists of opaque, transparent and clip items.
//!
//! [`LayerTree::publish`] copies changed layers into the simulation slot of a
//! shared [`LayerFrame`] triple buffer. The [`LayerRenderer`] obtained from
//! [`LayerTree::renderer`] walks the present slot on the render thread.

mod id;
mod publish;
mod store;
mod walk;

pub use id::LayerId;
pub use publish::{LayerFrame, LayerRecord};
pub use store::{LayerItems, LayerTree, MatrixHook, MatrixKind, MatrixMode, MatrixSlot};
pub use walk::{DrawStats, LayerDrawState, LayerRenderer};
