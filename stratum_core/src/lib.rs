// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Triple-buffered layer tree with hierarchical transforms and clip regions.
//!
//! `stratum_core` separates a *simulation* thread, which mutates node
//! transforms, layer matrices, visibility and clip windows every tick, from a
//! *render* thread, which walks a consistent snapshot of the layer tree and
//! issues draw calls. Every piece of state that crosses the two threads exists
//! in three copies, one per frame slot.
//!
//! # Architecture
//!
//! ```text
//!   simulation thread                          render thread
//!   ─────────────────                          ─────────────
//!   FrameSync::begin_simulation_frame()
//!       │
//!   NodeStore setters / LayerTree setters
//!       │
//!   NodeStore::evaluate(ctx) ──► hook & drawer shadows (slot S)
//!   LayerTree::publish(ctx)  ──► LayerFrame (slot S)
//!       │
//!   FrameSync::complete_simulation_frame() ──► slot rotation
//!                                                  │
//!                              FrameSync::begin_presentation_frame()
//!                                                  │
//!                              LayerRenderer::draw(ctx, target) ──► DrawTarget
//! ```
//!
//! **[`frame`]**: Slot indices, [`FrameContext`](frame::FrameContext), the
//! per-slot [`TripleBuffer`](frame::TripleBuffer) and the
//! [`FrameSync`](frame::FrameSync) that rotates slot roles.
//!
//! **[`node`]**: Struct-of-arrays node tree. Local values are set by the
//! simulation thread; global values are composed top-down by
//! [`evaluate`](node::NodeStore::evaluate) and linearized into fixed-width
//! float vectors by [`extract_values`](node::NodeStore::extract_values).
//!
//! **[`clip`]**: The [`ClipDrawer`](clip::ClipDrawer) strategy and its
//! rectangle implementation backed by a node.
//!
//! **[`layer`]**: The layer tree, its per-slot publication, and the
//! depth-first draw/clip walk.
//!
//! **[`target`]**: The [`DrawTarget`](target::DrawTarget) trait that
//! receives draws from the walk.
//!
//! **[`transform`]**: Column-major 4×4 matrix used for projection and
//! modelview composition.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-layer
//!   visit, skip and clip events.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod clip;
pub mod config;
pub mod dirty;
pub mod error;
pub mod frame;
pub mod layer;
pub mod node;
pub mod target;
pub mod trace;
pub mod transform;
