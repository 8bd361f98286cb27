// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transformation/clipping node tree.
//!
//! A *node* positions the items attached to it. Each node has:
//!
//! - An identity ([`NodeId`]), a generational handle that becomes stale when
//!   the node is destroyed.
//! - A **local** [`NodeValue`] set by the simulation thread: a similarity
//!   transform ([`NodeTransform`]), a visibility flag and an optional clip
//!   window.
//! - A **global** [`NodeValue`] produced by [`evaluate`](NodeStore::evaluate)
//!   by composing the parent's global value with the local one.
//! - Optional extra scalar fields appended to its extracted vector.
//!
//! Every store extracts with one [`ExtractLayout`], a [`NodeKind`] plus a list
//! of [`ExtraField`]s, so all nodes in a store share one stride.
//!
//! # Per-slot staleness
//!
//! A mutation marks the node and its descendants stale in all three slots
//! (see [`dirty`](crate::dirty)). `evaluate` for a slot recomputes the stale
//! nodes top-down, refreshes every registered shadow for that slot, and
//! reports the nodes whose extracted data must be rewritten in that slot's
//! GPU buffer.
//!
//! # Dependents
//!
//! [`PreTransformer`] hooks and [`RectClipDrawer`](crate::clip::RectClipDrawer)s
//! are *dependents* of a node. The node keeps weak references to their
//! shadows and unhooks them when it is destroyed, so a dependent that outlives
//! its node turns inert instead of dangling.

mod evaluate;
mod id;
mod shadow;
mod store;
mod value;

pub use evaluate::NodeChanges;
pub use id::NodeId;
pub use shadow::PreTransformer;
pub(crate) use shadow::NodeShadow;
pub use store::{Children, NodeStore};
pub(crate) use value::{bounding_box, rect_is_empty};
pub use value::{ExtraField, ExtractLayout, NodeKind, NodeTransform, NodeValue};
