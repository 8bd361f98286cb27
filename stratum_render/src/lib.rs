// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend-facing helpers for [`stratum_core`].
//!
//! - [`RenderPlan`]: a [`DrawTarget`](stratum_core::target::DrawTarget) that
//!   records the layer walk as an ordered list of [`DrawCommand`]s, for
//!   backends that replay a frame or for inspection in tests.
//! - [`NodeBatch`]: one packed `f32` buffer of extracted node vectors per
//!   frame slot, refreshed from [`NodeChanges`](stratum_core::node::NodeChanges)
//!   and viewable as bytes for GPU upload.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod batch;
mod plan;

pub use batch::{BatchView, NodeBatch, RotateTranslateRecord, TranslateRecord};
pub use plan::{DrawCommand, RenderPlan};
