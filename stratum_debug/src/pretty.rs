// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use stratum_core::layer::DrawStats;
use stratum_core::trace::{
    ClipResolvedEvent, LayerSkipEvent, LayerVisitEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    PresentationEvent, SkipReason, SlotRotationEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    layers: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            layers: true,
        }
    }

    /// Enables or disables the per-layer lines (visit, skip, clip).
    #[must_use]
    pub fn with_layer_events(mut self, layers: bool) -> Self {
        self.layers = layers;
        self
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Evaluate => "eval",
        PhaseKind::Publish => "publish",
        PhaseKind::Render => "render",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_slot_rotation(&mut self, e: &SlotRotationEvent) {
        let _ = writeln!(
            self.writer,
            "[rotate] frame={} completed={} next={}",
            e.frame,
            e.completed_slot.get(),
            e.next_simulation_slot.get(),
        );
    }

    fn on_presentation(&mut self, e: &PresentationEvent) {
        let _ = writeln!(
            self.writer,
            "[present] frame={} slot={}",
            e.frame,
            e.present_slot.get(),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} slot={}",
            e.frame,
            phase_name(e.phase),
            e.slot.get(),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} slot={} count={}",
            e.frame,
            phase_name(e.phase),
            e.slot.get(),
            e.count,
        );
    }

    fn on_draw_stats(&mut self, frame: u64, stats: &DrawStats) {
        let _ = writeln!(
            self.writer,
            "[stats] frame={frame} visited={} skipped={} draws={} state_changes={}",
            stats.layers_visited, stats.layers_skipped, stats.draw_calls, stats.state_changes,
        );
    }

    fn on_layer_visit(&mut self, e: &LayerVisitEvent) {
        if self.layers {
            let _ = writeln!(
                self.writer,
                "  [layer] frame={} layer={} depth={}",
                e.frame, e.layer, e.depth,
            );
        }
    }

    fn on_layer_skip(&mut self, e: &LayerSkipEvent) {
        if self.layers {
            let reason = match e.reason {
                SkipReason::Hidden => "hidden",
                SkipReason::ClippedOut => "clipped",
            };
            let _ = writeln!(
                self.writer,
                "  [skip] frame={} layer={} {reason}",
                e.frame, e.layer,
            );
        }
    }

    fn on_clip_resolved(&mut self, e: &ClipResolvedEvent) {
        if self.layers {
            let r = e.device_bbox;
            let _ = writeln!(
                self.writer,
                "  [clip] frame={} layer={} bbox=[{:.3}, {:.3}, {:.3}, {:.3}]",
                e.frame, e.layer, r.x0, r.y0, r.x1, r.y1,
            );
        }
    }
}
