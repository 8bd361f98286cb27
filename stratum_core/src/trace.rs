// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! frame-loop instrumentation calls at each stage. All method bodies default to
//! no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! Lifecycle log lines (rejected reparenting, unhooked dependents, slot
//! rotation) go through the `tracing` crate instead.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates the per-layer
//!   [`LayerVisitEvent`], [`LayerSkipEvent`] and [`ClipResolvedEvent`]
//!   events plus the corresponding `TraceSink` methods.

use crate::frame::{FrameContext, SlotIndex};
use crate::layer::DrawStats;

#[cfg(feature = "trace-rich")]
use kurbo::Rect;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of the frame loop is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Node evaluation (global recomposition, shadow refresh).
    Evaluate,
    /// Layer publication into the simulation slot.
    Publish,
    /// The render walk over the present slot.
    Render,
}

/// Why the walk did not draw a layer.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The layer's visibility flag is off.
    Hidden,
    /// The layer's clip drawer returned
    /// [`ClipMode::SkipLayer`](crate::clip::ClipMode::SkipLayer).
    ClippedOut,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after a simulation frame completes and the slot roles rotate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRotationEvent {
    /// The completed frame.
    pub frame: u64,
    /// Slot the completed frame was written to.
    pub completed_slot: SlotIndex,
    /// Slot the next simulation frame writes to.
    pub next_simulation_slot: SlotIndex,
}

impl SlotRotationEvent {
    /// Creates an event from the completed context and the context returned
    /// by [`FrameSync::complete_simulation_frame`](crate::frame::FrameSync::complete_simulation_frame).
    #[must_use]
    pub fn new(completed: FrameContext, next: FrameContext) -> Self {
        Self {
            frame: completed.frame,
            completed_slot: completed.simulation,
            next_simulation_slot: next.simulation,
        }
    }
}

/// Emitted when a presentation frame begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationEvent {
    /// The simulation frame being presented.
    pub frame: u64,
    /// Slot being presented.
    pub present_slot: SlotIndex,
}

impl From<FrameContext> for PresentationEvent {
    fn from(ctx: FrameContext) -> Self {
        Self {
            frame: ctx.frame,
            present_slot: ctx.present,
        }
    }
}

/// Marks the beginning of a frame-loop phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Slot the phase works on.
    pub slot: SlotIndex,
}

/// Marks the end of a frame-loop phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Slot the phase worked on.
    pub slot: SlotIndex,
    /// Elements processed: nodes evaluated, layers published or layers
    /// visited.
    pub count: u32,
}

/// Emitted when the walk enters a visible layer.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerVisitEvent {
    /// Frame being presented.
    pub frame: u64,
    /// Raw layer index.
    pub layer: u32,
    /// Depth below the walk root.
    pub depth: u32,
}

/// Emitted when the walk skips a layer and its subtree.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerSkipEvent {
    /// Frame being presented.
    pub frame: u64,
    /// Raw layer index.
    pub layer: u32,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Emitted when a layer's clip drawer resolves to a clipped region.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipResolvedEvent {
    /// Frame being presented.
    pub frame: u64,
    /// Raw layer index.
    pub layer: u32,
    /// Resolved device-space bounding box.
    pub device_bbox: Rect,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after the slot roles rotate.
    fn on_slot_rotation(&mut self, e: &SlotRotationEvent) {
        _ = e;
    }

    /// Called when a presentation frame begins.
    fn on_presentation(&mut self, e: &PresentationEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame-loop phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame-loop phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called with the statistics of a finished render walk.
    fn on_draw_stats(&mut self, frame: u64, stats: &DrawStats) {
        _ = (frame, stats);
    }

    /// Called when the walk enters a layer (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_layer_visit(&mut self, e: &LayerVisitEvent) {
        _ = e;
    }

    /// Called when the walk skips a layer (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_layer_skip(&mut self, e: &LayerSkipEvent) {
        _ = e;
    }

    /// Called when a clip resolves (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_clip_resolved(&mut self, e: &ClipResolvedEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`SlotRotationEvent`].
    #[inline]
    pub fn slot_rotation(&mut self, e: &SlotRotationEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_slot_rotation(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PresentationEvent`].
    #[inline]
    pub fn presentation(&mut self, e: &PresentationEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_presentation(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits render-walk statistics.
    #[inline]
    pub fn draw_stats(&mut self, frame: u64, stats: &DrawStats) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_draw_stats(frame, stats);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = (frame, stats);
        }
    }

    /// Emits a [`LayerVisitEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layer_visit(&mut self, e: &LayerVisitEvent) {
        if let Some(s) = &mut self.sink {
            s.on_layer_visit(e);
        }
    }

    /// Emits a [`LayerSkipEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layer_skip(&mut self, e: &LayerSkipEvent) {
        if let Some(s) = &mut self.sink {
            s.on_layer_skip(e);
        }
    }

    /// Emits a [`ClipResolvedEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn clip_resolved(&mut self, e: &ClipResolvedEvent) {
        if let Some(s) = &mut self.sink {
            s.on_clip_resolved(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(simulation: u8, present: u8, frame: u64) -> FrameContext {
        FrameContext::new(SlotIndex::new(simulation), SlotIndex::new(present), frame)
    }

    #[test]
    fn rotation_event_from_contexts() {
        let evt = SlotRotationEvent::new(ctx(0, 2, 7), ctx(1, 2, 8));
        assert_eq!(evt.frame, 7);
        assert_eq!(evt.completed_slot, SlotIndex::new(0));
        assert_eq!(evt.next_simulation_slot, SlotIndex::new(1));
    }

    #[test]
    fn presentation_event_from_context() {
        let evt = PresentationEvent::from(ctx(1, 0, 3));
        assert_eq!(evt.frame, 3);
        assert_eq!(evt.present_slot, SlotIndex::new(0));
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_slot_rotation(&SlotRotationEvent::new(ctx(0, 2, 0), ctx(1, 2, 1)));
        sink.on_presentation(&PresentationEvent::from(ctx(1, 0, 0)));
        sink.on_draw_stats(0, &DrawStats::default());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        tracer.phase_begin(&PhaseBeginEvent {
            frame: 0,
            phase: PhaseKind::Evaluate,
            slot: SlotIndex::new(0),
        });
        tracer.draw_stats(0, &DrawStats::default());
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        struct RecordingSink {
            phases: Vec<(PhaseKind, u32)>,
        }
        impl TraceSink for RecordingSink {
            fn on_phase_end(&mut self, e: &PhaseEndEvent) {
                self.phases.push((e.phase, e.count));
            }
        }

        let mut sink = RecordingSink { phases: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        tracer.phase_end(&PhaseEndEvent {
            frame: 1,
            phase: PhaseKind::Publish,
            slot: SlotIndex::new(2),
            count: 5,
        });
        // Access sink after tracer is dropped.
        drop(tracer);
        assert_eq!(sink.phases, &[(PhaseKind::Publish, 5)]);
    }
}
