// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors returned by tree mutations.
//!
//! Only topology edits that can be checked cheaply report failure. Stale
//! handles are contract violations and panic; degenerate geometry is not an
//! error at all and propagates to "not visible".

use thiserror::Error;

/// A rejected topology edit on a node or layer tree.
///
/// Indices are raw slot indices, matching the `*_at` accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum TreeError {
    /// The element was asked to become its own parent.
    #[error("element {index} cannot be its own parent")]
    SelfParent {
        /// Slot index of the element.
        index: u32,
    },
    /// The requested parent is a descendant of the element.
    #[error("reparenting {index} under {new_parent} would create a cycle")]
    Cycle {
        /// Slot index of the element being moved.
        index: u32,
        /// Slot index of the requested parent.
        new_parent: u32,
    },
}
