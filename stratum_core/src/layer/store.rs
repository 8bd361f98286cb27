// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays layer storage with allocation, topology, and property management.

use core::fmt;
use std::sync::Arc;

use understory_dirty::{CycleHandling, DirtyTracker};

use crate::clip::ClipDrawer;
use crate::config::SceneConfig;
use crate::dirty::SLOT_CHANNELS;
use crate::error::TreeError;
use crate::frame::{FrameContext, SLOT_COUNT, TripleBuffer};
use crate::target::{ItemId, ItemRole};
use crate::transform::Transform3d;

use super::id::LayerId;
use super::publish::LayerFrame;
use super::walk::LayerRenderer;

/// Sentinel for "no layer" in topology arrays.
pub(super) const INVALID: u32 = u32::MAX;

/// Selects one of a layer's two matrices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// Projection matrix.
    Projection,
    /// Modelview matrix.
    Modelview,
}

impl MatrixKind {
    const fn index(self) -> usize {
        match self {
            Self::Projection => 0,
            Self::Modelview => 1,
        }
    }
}

/// How a layer matrix combines with its parent's effective matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MatrixMode {
    /// The effective matrix is this layer's matrix alone.
    UseThisMatrix,
    /// The effective matrix is `parent * own`.
    #[default]
    ComposeWithParent,
}

/// Adjusts a layer matrix on the render thread before parent composition.
///
/// Implementations must only read state captured for `ctx.present`.
pub trait MatrixHook: Send + Sync + fmt::Debug {
    /// Modifies `matrix` in place.
    fn modify_matrix(&self, ctx: FrameContext, matrix: &mut Transform3d);
}

/// One layer matrix with its composition mode and optional hook.
#[derive(Clone, Debug)]
pub struct MatrixSlot {
    /// The layer's own matrix.
    pub matrix: Transform3d,
    /// Composition with the parent.
    pub mode: MatrixMode,
    /// Hook applied to the own matrix before composition.
    pub hook: Option<Arc<dyn MatrixHook>>,
}

impl MatrixSlot {
    /// Identity, composed with the parent, no hook.
    pub const IDENTITY: Self = Self {
        matrix: Transform3d::IDENTITY,
        mode: MatrixMode::ComposeWithParent,
        hook: None,
    };

    /// Computes the effective matrix given the parent's effective matrix.
    #[must_use]
    pub fn resolve(&self, ctx: FrameContext, parent: &Transform3d) -> Transform3d {
        let mut own = self.matrix;
        if let Some(hook) = &self.hook {
            hook.modify_matrix(ctx, &mut own);
        }
        match self.mode {
            MatrixMode::UseThisMatrix => own,
            MatrixMode::ComposeWithParent => *parent * own,
        }
    }
}

impl Default for MatrixSlot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Items attached to a layer, partitioned by role.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerItems {
    /// Drawn before children.
    pub opaque: Vec<ItemId>,
    /// Drawn after children.
    pub transparent: Vec<ItemId>,
    /// Define the region content is restricted to.
    pub clip_inside: Vec<ItemId>,
    /// Define the occluders content is suppressed behind.
    pub clip_outside: Vec<ItemId>,
}

impl LayerItems {
    /// Returns the items with `role`, in attachment order.
    #[must_use]
    pub fn get(&self, role: ItemRole) -> &[ItemId] {
        match role {
            ItemRole::Opaque => &self.opaque,
            ItemRole::Transparent => &self.transparent,
            ItemRole::ClipInside => &self.clip_inside,
            ItemRole::ClipOutside => &self.clip_outside,
        }
    }

    fn get_mut(&mut self, role: ItemRole) -> &mut Vec<ItemId> {
        match role {
            ItemRole::Opaque => &mut self.opaque,
            ItemRole::Transparent => &mut self.transparent,
            ItemRole::ClipInside => &mut self.clip_inside,
            ItemRole::ClipOutside => &mut self.clip_outside,
        }
    }

    /// Returns `true` if no items are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty()
            && self.transparent.is_empty()
            && self.clip_inside.is_empty()
            && self.clip_outside.is_empty()
    }

    fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.clip_inside.clear();
        self.clip_outside.clear();
    }
}

/// The simulation-side layer tree.
///
/// Layers are addressed by [`LayerId`] handles. Internally, each layer occupies
/// a slot in parallel arrays. Destroyed layers are recycled via a free list,
/// and generation counters prevent stale handle access.
///
/// Mutations only touch the tree. [`publish`](Self::publish) copies the
/// layers changed since a slot was last published into that slot's
/// [`LayerFrame`], where a [`LayerRenderer`] walks it.
#[derive(Debug)]
pub struct LayerTree {
    pub(super) config: SceneConfig,

    // -- Topology --
    pub(super) parent: Vec<u32>,
    pub(super) first_child: Vec<u32>,
    pub(super) next_sibling: Vec<u32>,
    pub(super) prev_sibling: Vec<u32>,

    // -- Properties --
    pub(super) visible: Vec<bool>,
    pub(super) order: Vec<i32>,
    /// Insertion sequence under the current parent; breaks order-key ties.
    pub(super) seq: Vec<u64>,
    pub(super) next_seq: u64,
    pub(super) matrices: Vec<[MatrixSlot; 2]>,
    pub(super) clip_drawer: Vec<Option<Arc<dyn ClipDrawer>>>,
    pub(super) items: Vec<LayerItems>,

    // -- Allocation --
    pub(super) generation: Vec<u32>,
    pub(super) alive: Vec<bool>,
    pub(super) free_list: Vec<u32>,
    pub(super) len: u32,

    // -- Dirty tracking --
    pub(super) dirty: DirtyTracker<u32>,
    pub(super) roots_stale: [bool; SLOT_COUNT],

    // -- Publication --
    pub(super) frames: Arc<TripleBuffer<LayerFrame>>,
}

impl Default for LayerTree {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl LayerTree {
    /// Creates an empty layer tree.
    #[must_use]
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            visible: Vec::new(),
            order: Vec::new(),
            seq: Vec::new(),
            next_seq: 0,
            matrices: Vec::new(),
            clip_drawer: Vec::new(),
            items: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            roots_stale: [true; SLOT_COUNT],
            frames: Arc::new(TripleBuffer::default()),
        }
    }

    /// Returns a render-side handle walking this tree's published frames.
    #[must_use]
    pub fn renderer(&self) -> LayerRenderer {
        LayerRenderer::new(Arc::clone(&self.frames), self.config)
    }

    // -- Allocation API --

    /// Creates a visible root layer with identity matrices and no items.
    pub fn create_root(&mut self) -> LayerId {
        let idx = self.allocate();
        self.roots_stale = [true; SLOT_COUNT];
        self.mark(idx);
        self.handle(idx)
    }

    /// Creates a layer as a child of `parent`, after its existing children
    /// with the same order key.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale.
    pub fn create_child(&mut self, parent: LayerId) -> LayerId {
        self.validate(parent);
        let idx = self.allocate();
        self.link(idx, parent.idx);
        self.mark(idx);
        self.handle(idx)
    }

    /// Destroys a layer and its entire subtree.
    ///
    /// Clip drawers, hooks and items of destroyed layers are released once
    /// every slot has been republished.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.validate(id);
        if self.parent[id.idx as usize] != INVALID {
            self.unlink_from_parent(id.idx);
        } else {
            self.roots_stale = [true; SLOT_COUNT];
        }

        let mut stack = vec![id.idx];
        while let Some(idx) = stack.pop() {
            let mut child = self.first_child[idx as usize];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
            self.release(idx);
        }
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    // -- Topology API --

    /// Returns the parent of a layer, if any.
    #[must_use]
    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.handle(p))
    }

    /// Returns the children of a layer in draw order: by order key, then by
    /// insertion.
    #[must_use]
    pub fn children(&self, id: LayerId) -> Vec<LayerId> {
        self.validate(id);
        self.sorted_children(id.idx)
            .into_iter()
            .map(|idx| self.handle(idx))
            .collect()
    }

    /// Returns the root layers in draw order.
    #[must_use]
    pub fn roots(&self) -> Vec<LayerId> {
        self.sorted_roots()
            .into_iter()
            .map(|idx| self.handle(idx))
            .collect()
    }

    /// Moves `child` (with its subtree) under `new_parent`, after the
    /// children with the same order key.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::SelfParent`] if `child == new_parent`, or
    /// [`TreeError::Cycle`] if `new_parent` lies in `child`'s subtree. The
    /// tree is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale.
    pub fn reparent(&mut self, child: LayerId, new_parent: LayerId) -> Result<(), TreeError> {
        self.validate(child);
        self.validate(new_parent);
        let (c, p) = (child.idx, new_parent.idx);

        if c == p {
            tracing::debug!(layer = c, "rejected reparenting a layer under itself");
            return Err(TreeError::SelfParent { index: c });
        }
        let mut ancestor = p;
        while ancestor != INVALID {
            if ancestor == c {
                tracing::debug!(layer = c, new_parent = p, "rejected cyclic layer reparenting");
                return Err(TreeError::Cycle {
                    index: c,
                    new_parent: p,
                });
            }
            ancestor = self.parent[ancestor as usize];
        }

        if self.parent[c as usize] != INVALID {
            self.unlink_from_parent(c);
        } else {
            self.roots_stale = [true; SLOT_COUNT];
        }
        self.link(c, p);
        Ok(())
    }

    // -- Property getters --

    /// Returns the layer's visibility flag.
    #[must_use]
    pub fn visible(&self, id: LayerId) -> bool {
        self.validate(id);
        self.visible[id.idx as usize]
    }

    /// Returns the layer's child-order key.
    #[must_use]
    pub fn order(&self, id: LayerId) -> i32 {
        self.validate(id);
        self.order[id.idx as usize]
    }

    /// Returns one of the layer's matrices.
    #[must_use]
    pub fn matrix(&self, id: LayerId, kind: MatrixKind) -> Transform3d {
        self.matrix_slot(id, kind).matrix
    }

    /// Returns the composition mode of one of the layer's matrices.
    #[must_use]
    pub fn matrix_mode(&self, id: LayerId, kind: MatrixKind) -> MatrixMode {
        self.matrix_slot(id, kind).mode
    }

    /// Returns the hook attached to one of the layer's matrices.
    #[must_use]
    pub fn matrix_hook(&self, id: LayerId, kind: MatrixKind) -> Option<&Arc<dyn MatrixHook>> {
        self.matrix_slot(id, kind).hook.as_ref()
    }

    /// Returns the full matrix slot.
    #[must_use]
    pub fn matrix_slot(&self, id: LayerId, kind: MatrixKind) -> &MatrixSlot {
        self.validate(id);
        &self.matrices[id.idx as usize][kind.index()]
    }

    /// Returns the layer's clip drawer.
    #[must_use]
    pub fn clip_drawer(&self, id: LayerId) -> Option<&Arc<dyn ClipDrawer>> {
        self.validate(id);
        self.clip_drawer[id.idx as usize].as_ref()
    }

    /// Returns the layer's items.
    #[must_use]
    pub fn items(&self, id: LayerId) -> &LayerItems {
        self.validate(id);
        &self.items[id.idx as usize]
    }

    // -- Mutation API (marks the layer stale in every slot) --

    /// Sets the visibility flag. Invisible layers are skipped with their
    /// subtree.
    pub fn set_visible(&mut self, id: LayerId, visible: bool) {
        self.validate(id);
        if self.visible[id.idx as usize] != visible {
            self.visible[id.idx as usize] = visible;
            self.mark(id.idx);
        }
    }

    /// Sets the child-order key. Lower keys draw first.
    pub fn set_order(&mut self, id: LayerId, order: i32) {
        self.validate(id);
        let idx = id.idx;
        if self.order[idx as usize] != order {
            self.order[idx as usize] = order;
            self.mark_parent_of(idx);
        }
    }

    /// Sets one of the layer's matrices.
    pub fn set_matrix(&mut self, id: LayerId, kind: MatrixKind, matrix: Transform3d) {
        self.validate(id);
        let slot = &mut self.matrices[id.idx as usize][kind.index()];
        if slot.matrix != matrix {
            slot.matrix = matrix;
            self.mark(id.idx);
        }
    }

    /// Sets the composition mode of one of the layer's matrices.
    pub fn set_matrix_mode(&mut self, id: LayerId, kind: MatrixKind, mode: MatrixMode) {
        self.validate(id);
        let slot = &mut self.matrices[id.idx as usize][kind.index()];
        if slot.mode != mode {
            slot.mode = mode;
            self.mark(id.idx);
        }
    }

    /// Attaches or detaches the hook of one of the layer's matrices.
    pub fn set_matrix_hook(
        &mut self,
        id: LayerId,
        kind: MatrixKind,
        hook: Option<Arc<dyn MatrixHook>>,
    ) {
        self.validate(id);
        self.matrices[id.idx as usize][kind.index()].hook = hook;
        self.mark(id.idx);
    }

    /// Attaches or detaches the layer's clip drawer.
    pub fn set_clip_drawer(&mut self, id: LayerId, drawer: Option<Arc<dyn ClipDrawer>>) {
        self.validate(id);
        self.clip_drawer[id.idx as usize] = drawer;
        self.mark(id.idx);
    }

    /// Attaches an item with the given role.
    pub fn add_item(&mut self, id: LayerId, item: ItemId, role: ItemRole) {
        self.validate(id);
        self.items[id.idx as usize].get_mut(role).push(item);
        self.mark(id.idx);
    }

    /// Detaches every occurrence of `item`. Returns whether any was found.
    pub fn remove_item(&mut self, id: LayerId, item: ItemId) -> bool {
        self.validate(id);
        let items = &mut self.items[id.idx as usize];
        let mut removed = false;
        for role in [
            ItemRole::Opaque,
            ItemRole::Transparent,
            ItemRole::ClipInside,
            ItemRole::ClipOutside,
        ] {
            let list = items.get_mut(role);
            let before = list.len();
            list.retain(|i| *i != item);
            removed |= list.len() != before;
        }
        if removed {
            self.mark(id.idx);
        }
        removed
    }

    /// Detaches all items.
    pub fn clear_items(&mut self, id: LayerId) {
        self.validate(id);
        if !self.items[id.idx as usize].is_empty() {
            self.items[id.idx as usize].clear();
            self.mark(id.idx);
        }
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    fn validate(&self, id: LayerId) {
        assert!(
            self.is_alive(id),
            "stale LayerId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    pub(super) fn handle(&self, idx: u32) -> LayerId {
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    pub(super) fn sorted_children(&self, idx: u32) -> Vec<u32> {
        let mut children = Vec::new();
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            children.push(child);
            child = self.next_sibling[child as usize];
        }
        self.sort_siblings(&mut children);
        children
    }

    pub(super) fn sorted_roots(&self) -> Vec<u32> {
        let mut roots: Vec<u32> = (0..self.len)
            .filter(|&idx| self.alive[idx as usize] && self.parent[idx as usize] == INVALID)
            .collect();
        self.sort_siblings(&mut roots);
        roots
    }

    fn sort_siblings(&self, siblings: &mut [u32]) {
        siblings.sort_by_key(|&idx| (self.order[idx as usize], self.seq[idx as usize]));
    }

    /// Marks `idx` stale in every slot.
    fn mark(&mut self, idx: u32) {
        for ch in SLOT_CHANNELS {
            self.dirty.mark(idx, ch);
        }
    }

    /// Marks whatever holds `idx` in its sibling list.
    fn mark_parent_of(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        if p == INVALID {
            self.roots_stale = [true; SLOT_COUNT];
        } else {
            self.mark(p);
        }
    }

    fn allocate(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.visible[i] = true;
            self.order[i] = 0;
            self.seq[i] = seq;
            self.matrices[i] = [MatrixSlot::IDENTITY, MatrixSlot::IDENTITY];
            self.clip_drawer[i] = None;
            self.items[i].clear();
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.visible.push(true);
            self.order.push(0);
            self.seq.push(seq);
            self.matrices
                .push([MatrixSlot::IDENTITY, MatrixSlot::IDENTITY]);
            self.clip_drawer.push(None);
            self.items.push(LayerItems::default());
            self.generation.push(0);
            self.alive.push(true);
            idx
        }
    }

    fn release(&mut self, idx: u32) {
        let i = idx as usize;
        self.dirty.remove_key(idx);
        self.clip_drawer[i] = None;
        self.matrices[i] = [MatrixSlot::IDENTITY, MatrixSlot::IDENTITY];
        self.items[i].clear();
        self.generation[i] = self.generation[i].wrapping_add(1);
        self.alive[i] = false;
        self.free_list.push(idx);
        // Republishing a dead index clears its record.
        self.mark(idx);
    }

    /// Appends `c` to `p`'s children with a fresh insertion sequence.
    fn link(&mut self, c: u32, p: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;
        self.seq[c as usize] = self.next_seq;
        self.next_seq += 1;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }
        self.mark(p);
    }

    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
        self.mark(p);
    }
}
