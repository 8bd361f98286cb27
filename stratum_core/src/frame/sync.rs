// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot-role rotation and frame-boundary signals.

use core::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::trace::{PresentationEvent, SlotRotationEvent, Tracer};

use super::slot::{FrameContext, SlotIndex};

/// When a simulation-complete callback runs relative to slot rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncOrder {
    /// Runs with the rotation lock held, while the completed frame's slot is
    /// still the simulation slot.
    BeforeRotation,
    /// Runs after the roles have rotated; the context names the new
    /// simulation slot.
    AfterRotation,
}

/// A frame-boundary signal that callbacks can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Raised exactly once per completed simulation frame.
    SimulationComplete(SyncOrder),
    /// Raised at the start of every presentation frame.
    PresentationBegin,
}

type Callback = Box<dyn FnMut(FrameContext) + Send>;

#[derive(Default)]
struct Registry {
    before_rotation: Vec<(u64, Callback)>,
    after_rotation: Vec<(u64, Callback)>,
    presentation_begin: Vec<(u64, Callback)>,
    next_id: u64,
}

impl Registry {
    fn list_mut(&mut self, signal: Signal) -> &mut Vec<(u64, Callback)> {
        match signal {
            Signal::SimulationComplete(SyncOrder::BeforeRotation) => &mut self.before_rotation,
            Signal::SimulationComplete(SyncOrder::AfterRotation) => &mut self.after_rotation,
            Signal::PresentationBegin => &mut self.presentation_begin,
        }
    }

    fn emit(&mut self, signal: Signal, ctx: FrameContext) {
        for (_, callback) in self.list_mut(signal).iter_mut() {
            callback(ctx);
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The three slot roles plus the "ready slot holds an unpresented frame" flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Roles {
    simulation: SlotIndex,
    ready: SlotIndex,
    present: SlotIndex,
    fresh: bool,
}

impl Roles {
    const INITIAL: Self = Self {
        simulation: SlotIndex::new(0),
        ready: SlotIndex::new(1),
        present: SlotIndex::new(2),
        fresh: false,
    };

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot indices are below 3"
    )]
    const fn pack(self) -> u32 {
        (self.simulation.get() as u32)
            | ((self.ready.get() as u32) << 2)
            | ((self.present.get() as u32) << 4)
            | ((self.fresh as u32) << 6)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "each field is masked to two bits"
    )]
    const fn unpack(bits: u32) -> Self {
        Self {
            simulation: SlotIndex::new((bits & 0b11) as u8),
            ready: SlotIndex::new(((bits >> 2) & 0b11) as u8),
            present: SlotIndex::new(((bits >> 4) & 0b11) as u8),
            fresh: (bits >> 6) & 1 == 1,
        }
    }

    const fn is_valid(self) -> bool {
        self.simulation.get() != self.ready.get()
            && self.simulation.get() != self.present.get()
            && self.ready.get() != self.present.get()
    }
}

/// Owner of the slot roles and the frame-boundary signals.
///
/// Exactly one thread drives the simulation phase functions and exactly one
/// drives the presentation phase functions. Rotation is classic triple
/// buffering:
///
/// - [`complete_simulation_frame`](Self::complete_simulation_frame) swaps the
///   simulation and ready slots and marks the ready slot fresh;
/// - [`begin_presentation_frame`](Self::begin_presentation_frame) swaps the
///   present and ready slots if the ready slot is fresh, otherwise re-presents
///   the previous frame.
///
/// Each swap is a single atomic update of the packed roles, so the render
/// thread observes either the old mapping or the new one, never a mix.
///
/// # Frame loop pseudocode
///
/// ```rust,ignore
/// // simulation thread
/// let ctx = sync.begin_simulation_frame();
/// nodes.set_translation(node, position);
/// layers.set_matrix(layer, MatrixKind::Modelview, camera);
/// sync.complete_simulation_frame_with(ctx, |ctx| {
///     nodes.evaluate(ctx);
///     layers.publish(ctx);
/// });
///
/// // render thread
/// let ctx = sync.begin_presentation_frame();
/// let stats = renderer.draw(ctx, &mut target, &mut tracer);
/// sync.end_presentation_frame(ctx);
/// ```
pub struct FrameSync {
    roles: AtomicU32,
    completed: AtomicU64,
    slot_frames: [AtomicU64; 3],
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for FrameSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSync")
            .field("roles", &self.roles())
            .field("completed", &self.completed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Default for FrameSync {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSync {
    /// Creates a synchronizer with simulation slot 0, ready slot 1 and
    /// present slot 2, and no completed frames.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: AtomicU32::new(Roles::INITIAL.pack()),
            completed: AtomicU64::new(0),
            slot_frames: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    fn roles(&self) -> Roles {
        Roles::unpack(self.roles.load(Ordering::Acquire))
    }

    /// Atomically replaces the roles with `f(roles)`, returning the old and
    /// new roles. `f` may be called more than once.
    fn rotate(&self, mut f: impl FnMut(Roles) -> Roles) -> (Roles, Roles) {
        let mut current = self.roles.load(Ordering::Acquire);
        loop {
            let old = Roles::unpack(current);
            let new = f(old);
            debug_assert!(new.is_valid(), "slot roles must stay distinct");
            match self.roles.compare_exchange_weak(
                current,
                new.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (old, new),
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns the slot currently written by the simulation thread.
    #[must_use]
    pub fn simulation_slot(&self) -> SlotIndex {
        self.roles().simulation
    }

    /// Returns the slot currently read by the render thread.
    #[must_use]
    pub fn present_slot(&self) -> SlotIndex {
        self.roles().present
    }

    /// Returns the number of completed simulation frames.
    #[must_use]
    pub fn completed_frames(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Begins a simulation frame.
    ///
    /// All node and layer mutation for the frame must happen between this
    /// call and the matching completion.
    #[must_use]
    pub fn begin_simulation_frame(&self) -> FrameContext {
        let roles = self.roles();
        FrameContext::new(roles.simulation, roles.present, self.completed_frames())
    }

    /// Completes a simulation frame and rotates the slot roles.
    ///
    /// Returns the context of the next simulation frame.
    pub fn complete_simulation_frame(&self, ctx: FrameContext) -> FrameContext {
        self.complete_simulation_frame_with(ctx, |_| {})
    }

    /// Completes a simulation frame, running `before` ahead of rotation.
    ///
    /// `before` and every [`SyncOrder::BeforeRotation`] subscriber run with
    /// the registry lock held while `ctx.simulation` is still the simulation
    /// slot; this is where per-slot shadows must be captured. After the
    /// rotation, [`SyncOrder::AfterRotation`] subscribers receive a context
    /// naming the new simulation slot.
    ///
    /// Returns the context of the next simulation frame.
    ///
    /// Callbacks must not connect or drop subscriptions on this synchronizer.
    pub fn complete_simulation_frame_with(
        &self,
        ctx: FrameContext,
        before: impl FnOnce(FrameContext),
    ) -> FrameContext {
        self.complete_simulation_frame_traced(ctx, &mut Tracer::none(), before)
    }

    /// Like [`complete_simulation_frame_with`](Self::complete_simulation_frame_with),
    /// emitting a [`SlotRotationEvent`] to `tracer` after the rotation.
    pub fn complete_simulation_frame_traced(
        &self,
        ctx: FrameContext,
        tracer: &mut Tracer<'_>,
        before: impl FnOnce(FrameContext),
    ) -> FrameContext {
        let mut registry = lock(&self.registry);
        debug_assert_eq!(
            ctx.simulation,
            self.simulation_slot(),
            "completing a frame for a slot that is not the simulation slot"
        );

        before(ctx);
        registry.emit(Signal::SimulationComplete(SyncOrder::BeforeRotation), ctx);

        self.slot_frames[ctx.simulation.get()].store(ctx.frame, Ordering::Release);
        let (_, new) = self.rotate(|roles| Roles {
            simulation: roles.ready,
            ready: roles.simulation,
            present: roles.present,
            fresh: true,
        });
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(
            frame = ctx.frame,
            completed_slot = ctx.simulation.get(),
            next_slot = new.simulation.get(),
            "rotated simulation slot"
        );

        let after = FrameContext::new(new.simulation, new.present, completed);
        registry.emit(Signal::SimulationComplete(SyncOrder::AfterRotation), after);
        drop(registry);
        tracer.slot_rotation(&SlotRotationEvent::new(ctx, after));
        after
    }

    /// Begins a presentation frame.
    ///
    /// Picks up the most recently completed frame if one is waiting;
    /// otherwise the previous present slot is presented again.
    #[must_use]
    pub fn begin_presentation_frame(&self) -> FrameContext {
        self.begin_presentation_frame_traced(&mut Tracer::none())
    }

    /// Like [`begin_presentation_frame`](Self::begin_presentation_frame),
    /// emitting a [`PresentationEvent`] to `tracer`.
    #[must_use]
    pub fn begin_presentation_frame_traced(&self, tracer: &mut Tracer<'_>) -> FrameContext {
        let (old, new) = self.rotate(|roles| {
            if roles.fresh {
                Roles {
                    simulation: roles.simulation,
                    ready: roles.present,
                    present: roles.ready,
                    fresh: false,
                }
            } else {
                roles
            }
        });
        if !old.fresh {
            tracing::trace!(slot = new.present.get(), "no new frame; re-presenting");
        }

        let frame = self.slot_frames[new.present.get()].load(Ordering::Acquire);
        let ctx = FrameContext::new(new.simulation, new.present, frame);
        lock(&self.registry).emit(Signal::PresentationBegin, ctx);
        tracer.presentation(&PresentationEvent::from(ctx));
        ctx
    }

    /// Ends a presentation frame.
    ///
    /// The present slot stays bound to the render thread until the next
    /// [`begin_presentation_frame`](Self::begin_presentation_frame).
    pub fn end_presentation_frame(&self, ctx: FrameContext) {
        debug_assert_eq!(
            ctx.present,
            self.present_slot(),
            "ending a presentation frame for a slot that is not presented"
        );
    }

    /// Subscribes `callback` to `signal`.
    ///
    /// The subscription stays connected until the returned handle is dropped.
    #[must_use = "dropping the subscription disconnects it"]
    pub fn connect(
        &self,
        signal: Signal,
        callback: impl FnMut(FrameContext) + Send + 'static,
    ) -> Subscription {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.list_mut(signal).push((id, Box::new(callback)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            signal,
            id,
        }
    }
}

/// A connected callback. Dropping it disconnects the callback.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    signal: Signal,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Returns the signal this subscription listens to.
    #[must_use]
    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry)
                .list_mut(self.signal)
                .retain(|(id, _)| *id != self.id);
        }
    }
}
