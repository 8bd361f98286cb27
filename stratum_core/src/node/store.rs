// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, and value management.

use std::sync::{Arc, Weak};

use kurbo::{Rect, Vec2};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::config::SceneConfig;
use crate::dirty::SLOT_CHANNELS;
use crate::error::TreeError;
use crate::frame::SLOT_COUNT;

use super::shadow::{NodeShadow, PreTransformer};
use super::value::normalize_or_x;
use super::{ExtractLayout, NodeId, NodeKind, NodeTransform, NodeValue};

/// Sentinel for "no node" in topology arrays.
pub(super) const INVALID: u32 = u32::MAX;

/// Struct-of-arrays storage for a tree of nodes.
///
/// Owned by the simulation thread. Nodes are addressed by [`NodeId`] handles;
/// destroyed slots are recycled through a free list and generation counters
/// catch stale handles.
///
/// All nodes of a store share one [`ExtractLayout`].
#[derive(Debug)]
pub struct NodeStore {
    pub(super) layout: ExtractLayout,
    pub(super) config: SceneConfig,

    // -- Topology --
    pub(super) parent: Vec<u32>,
    pub(super) first_child: Vec<u32>,
    pub(super) next_sibling: Vec<u32>,
    pub(super) prev_sibling: Vec<u32>,

    // -- Values --
    pub(super) local: Vec<NodeValue>,
    pub(super) global: Vec<NodeValue>,
    /// `len * layout.extras.len()` values, node-major.
    pub(super) extras: Vec<f32>,

    // -- Allocation --
    pub(super) generation: Vec<u32>,
    pub(super) alive: Vec<bool>,
    pub(super) free_list: Vec<u32>,
    pub(super) len: u32,

    // -- Dirty tracking --
    pub(super) dirty: DirtyTracker<u32>,

    // -- Dependents --
    /// Shadow shared by every `PreTransformer` of a node.
    pub(super) hook: Vec<Weak<NodeShadow>>,
    pub(super) dependents: Vec<Vec<Weak<NodeShadow>>>,

    // -- Lifecycle tracking, one list per slot --
    pub(super) pending_removed: [Vec<u32>; SLOT_COUNT],
}

impl NodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(layout: ExtractLayout, config: SceneConfig) -> Self {
        Self {
            layout,
            config,
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            local: Vec::new(),
            global: Vec::new(),
            extras: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            hook: Vec::new(),
            dependents: Vec::new(),
            pending_removed: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Returns the extraction layout shared by all nodes.
    #[must_use]
    pub fn layout(&self) -> &ExtractLayout {
        &self.layout
    }

    /// Returns the node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.layout.kind
    }

    /// Returns the scene configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Floats written per node by [`extract_values`](Self::extract_values).
    #[must_use]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Number of allocated slots, live or free.
    ///
    /// Raw node indices are always below this value.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.len
    }

    // -- Allocation API --

    /// Creates a parentless node with identity transform, visible, no clip,
    /// and default extras.
    pub fn create_root(&mut self) -> NodeId {
        let idx = self.allocate();
        self.mark(idx);
        self.handle(idx)
    }

    /// Creates a node as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale.
    pub fn create_child(&mut self, parent: NodeId) -> NodeId {
        self.validate(parent);
        let idx = self.allocate();
        self.link(idx, parent.idx);
        self.mark(idx);
        self.handle(idx)
    }

    /// Destroys a node and its entire subtree.
    ///
    /// Every hook and clip drawer attached to a destroyed node is unhooked.
    /// Each destroyed index is reported once per slot in
    /// [`NodeChanges::removed`](super::NodeChanges::removed).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_node(&mut self, id: NodeId) {
        self.validate(id);
        if self.parent[id.idx as usize] != INVALID {
            self.unlink_from_parent(id.idx);
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

    /// Returns whether the handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Returns the live handle at raw index `idx`, if any.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> Option<NodeId> {
        (idx < self.len && self.alive[idx as usize]).then(|| self.handle(idx))
    }

    // -- Topology API --

    /// Returns the parent of a node, if any.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.handle(p))
    }

    /// Returns an iterator over the direct children of a node, in creation
    /// order.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children {
            store: self,
            next: self.first_child[id.idx as usize],
        }
    }

    /// Moves `child` (with its subtree) to the end of `new_parent`'s children.
    ///
    /// The subtree's global values are recomputed at the next evaluation.
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
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> Result<(), TreeError> {
        self.validate(child);
        self.validate(new_parent);
        let (c, p) = (child.idx, new_parent.idx);

        if c == p {
            tracing::debug!(node = c, "rejected reparenting a node under itself");
            return Err(TreeError::SelfParent { index: c });
        }
        let mut ancestor = p;
        while ancestor != INVALID {
            if ancestor == c {
                tracing::debug!(node = c, new_parent = p, "rejected cyclic node reparenting");
                return Err(TreeError::Cycle {
                    index: c,
                    new_parent: p,
                });
            }
            ancestor = self.parent[ancestor as usize];
        }

        if self.parent[c as usize] != INVALID {
            self.unlink_from_parent(c);
        }
        self.link(c, p);
        self.mark(c);
        Ok(())
    }

    // -- Local value getters --

    /// Returns the local value of a node.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn local_values(&self, id: NodeId) -> &NodeValue {
        self.validate(id);
        &self.local[id.idx as usize]
    }

    /// Returns the global value of a node as of the last
    /// [`evaluate`](Self::evaluate).
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn global_values(&self, id: NodeId) -> &NodeValue {
        self.validate(id);
        &self.global[id.idx as usize]
    }

    /// Returns the local transform.
    #[must_use]
    pub fn transformation(&self, id: NodeId) -> NodeTransform {
        self.local_values(id).transform
    }

    /// Returns the local translation.
    #[must_use]
    pub fn translation(&self, id: NodeId) -> Vec2 {
        self.local_values(id).transform.translation
    }

    /// Returns the local scale factor.
    #[must_use]
    pub fn scaling_factor(&self, id: NodeId) -> f64 {
        self.local_values(id).transform.scale
    }

    /// Returns the local rotation in radians.
    #[must_use]
    pub fn rotation(&self, id: NodeId) -> f64 {
        self.local_values(id).transform.angle()
    }

    /// Returns the local rotation as a unit complex number.
    #[must_use]
    pub fn rotation_complex(&self, id: NodeId) -> Vec2 {
        self.local_values(id).transform.rotation
    }

    /// Returns the local visibility flag.
    #[must_use]
    pub fn visible(&self, id: NodeId) -> bool {
        self.local_values(id).visible
    }

    /// Returns the local clip window, in the node's local frame.
    #[must_use]
    pub fn clip(&self, id: NodeId) -> Option<Rect> {
        self.local_values(id).clip
    }

    /// Returns extra field `field`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or `field` is out of range.
    #[must_use]
    pub fn extra(&self, id: NodeId, field: usize) -> f32 {
        self.validate(id);
        self.extras[self.extra_offset(id.idx, field)]
    }

    // -- Local value setters (mark dirty unless the value is unchanged) --

    /// Sets the local transform.
    ///
    /// The rotation is renormalized; nodes of a kind without rotation must
    /// keep the identity rotation.
    pub fn set_transformation(&mut self, id: NodeId, transform: NodeTransform) {
        let rotation = normalize_or_x(transform.rotation, self.config.tolerance);
        debug_assert!(
            self.kind().supports_rotation() || rotation == Vec2::new(1.0, 0.0),
            "{:?} nodes cannot rotate",
            self.kind()
        );
        self.update(id, |v| {
            v.transform = NodeTransform {
                rotation,
                ..transform
            };
        });
    }

    /// Sets the local translation.
    pub fn set_translation(&mut self, id: NodeId, translation: Vec2) {
        self.update(id, |v| v.transform.translation = translation);
    }

    /// Sets the local scale factor.
    pub fn set_scaling_factor(&mut self, id: NodeId, scale: f64) {
        self.update(id, |v| v.transform.scale = scale);
    }

    /// Sets the local rotation in radians.
    pub fn set_rotation(&mut self, id: NodeId, radians: f64) {
        let (s, c) = radians.sin_cos();
        self.set_rotation_complex(id, Vec2::new(c, s));
    }

    /// Sets the local rotation from a complex number, which is normalized.
    ///
    /// Vectors shorter than the configured tolerance reset the rotation.
    pub fn set_rotation_complex(&mut self, id: NodeId, rotation: Vec2) {
        debug_assert!(
            self.kind().supports_rotation(),
            "{:?} nodes cannot rotate",
            self.kind()
        );
        let rotation = normalize_or_x(rotation, self.config.tolerance);
        self.update(id, |v| v.transform.rotation = rotation);
    }

    /// Sets the local visibility flag.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.update(id, |v| v.visible = visible);
    }

    /// Sets or clears the local clip window.
    ///
    /// Ignored by kinds without clip windows.
    pub fn set_clip(&mut self, id: NodeId, clip: Option<Rect>) {
        self.update(id, |v| v.clip = clip);
    }

    /// Sets extra field `field`.
    ///
    /// Extras do not propagate, so only this node is marked.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or `field` is out of range.
    pub fn set_extra(&mut self, id: NodeId, field: usize, value: f32) {
        self.validate(id);
        let offset = self.extra_offset(id.idx, field);
        if self.extras[offset].to_bits() == value.to_bits() {
            return;
        }
        self.extras[offset] = value;
        for ch in SLOT_CHANNELS {
            self.dirty.mark(id.idx, ch);
        }
    }

    // -- Extraction --

    /// Writes the node's extracted vector into `out[..stride]`.
    ///
    /// Base fields come from the global value (see [`NodeValue::extract`]),
    /// followed by the extras.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or `out` is shorter than the stride.
    pub fn extract_values(&self, id: NodeId, z: f32, out: &mut [f32]) {
        self.validate(id);
        self.extract_at(id.idx, z, out);
    }

    /// Like [`extract_values`](Self::extract_values), addressed by raw index
    /// as reported in [`NodeChanges`](super::NodeChanges).
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range or `out` is shorter than the stride.
    pub fn extract_at(&self, idx: u32, z: f32, out: &mut [f32]) {
        assert!(
            idx < self.len,
            "node index {idx} out of range (len {})",
            self.len
        );
        let kind = self.kind();
        let base = kind.base_width();
        self.global[idx as usize].extract(kind, z, &self.config, out);
        let n = self.layout.extras.len();
        let start = idx as usize * n;
        out[base..base + n].copy_from_slice(&self.extras[start..start + n]);
    }

    // -- Dependents --

    /// Returns a hook that applies the node's global transform to a layer
    /// matrix.
    ///
    /// Repeated calls for the same node return handles to one shared hook,
    /// until that hook is unhooked.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn create_pre_transformer(&mut self, id: NodeId) -> PreTransformer {
        self.validate(id);
        let idx = id.idx as usize;
        if let Some(shadow) = self.hook[idx].upgrade().filter(|s| s.is_hooked()) {
            return PreTransformer { shadow };
        }
        let shadow = self.register_dependent(id);
        self.hook[idx] = Arc::downgrade(&shadow);
        PreTransformer { shadow }
    }

    /// Creates a shadow of `id`'s global value that is refreshed on every
    /// evaluation and unhooked when the node is destroyed.
    pub(crate) fn register_dependent(&mut self, id: NodeId) -> Arc<NodeShadow> {
        self.validate(id);
        let shadow = NodeShadow::new(self.global[id.idx as usize]);
        self.dependents[id.idx as usize].push(Arc::downgrade(&shadow));
        // The global value may be stale until the next evaluation.
        for ch in SLOT_CHANNELS {
            self.dirty.mark(id.idx, ch);
        }
        shadow
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    pub(super) fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn handle(&self, idx: u32) -> NodeId {
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    fn extra_offset(&self, idx: u32, field: usize) -> usize {
        let n = self.layout.extras.len();
        assert!(field < n, "extra field {field} out of range ({n} fields)");
        idx as usize * n + field
    }

    /// Applies `f` to the local value and marks the subtree if it changed.
    fn update(&mut self, id: NodeId, f: impl FnOnce(&mut NodeValue)) {
        self.validate(id);
        let value = &mut self.local[id.idx as usize];
        let before = *value;
        f(value);
        if *value != before {
            self.mark(id.idx);
        }
    }

    /// Marks `idx` and its descendants stale in every slot.
    fn mark(&mut self, idx: u32) {
        for ch in SLOT_CHANNELS {
            self.dirty.mark_with(idx, ch, &EagerPolicy);
        }
    }

    fn allocate(&mut self) -> u32 {
        let n = self.layout.extras.len();
        if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.local[i] = NodeValue::ROOT;
            self.global[i] = NodeValue::ROOT;
            for (slot, field) in self.extras[i * n..(i + 1) * n]
                .iter_mut()
                .zip(&self.layout.extras)
            {
                *slot = field.default;
            }
            self.alive[i] = true;
            self.hook[i] = Weak::new();
            self.dependents[i].clear();
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.local.push(NodeValue::ROOT);
            self.global.push(NodeValue::ROOT);
            self.extras
                .extend(self.layout.extras.iter().map(|field| field.default));
            self.generation.push(0);
            self.alive.push(true);
            self.hook.push(Weak::new());
            self.dependents.push(Vec::new());
            idx
        }
    }

    /// Frees one slot, unhooking its dependents. Topology links of the slot
    /// itself are reset on reuse.
    fn release(&mut self, idx: u32) {
        let i = idx as usize;
        let mut unhooked = 0_usize;
        for dependent in self.dependents[i].drain(..) {
            if let Some(shadow) = dependent.upgrade() {
                shadow.unhook();
                unhooked += 1;
            }
        }
        if unhooked > 0 {
            tracing::debug!(node = idx, unhooked, "unhooked dependents of destroyed node");
        }
        self.hook[i] = Weak::new();
        self.dirty.remove_key(idx);
        self.generation[i] = self.generation[i].wrapping_add(1);
        self.alive[i] = false;
        self.free_list.push(idx);
        for pending in &mut self.pending_removed {
            pending.push(idx);
        }
    }

    /// Appends `c` to `p`'s child list and adds the dependency edges.
    fn link(&mut self, c: u32, p: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

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

        for ch in SLOT_CHANNELS {
            let _ = self.dirty.add_dependency(c, p, ch);
        }
    }

    /// Removes `idx` from its parent's child list and drops the dependency
    /// edges.
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

        for ch in SLOT_CHANNELS {
            self.dirty.remove_dependency(idx, p, ch);
        }
    }
}

/// Iterator over the direct children of a node.
#[derive(Clone, Debug)]
pub struct Children<'a> {
    store: &'a NodeStore,
    next: u32,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.next == INVALID {
            return None;
        }
        let idx = self.next;
        self.next = self.store.next_sibling[idx as usize];
        Some(self.store.handle(idx))
    }
}
