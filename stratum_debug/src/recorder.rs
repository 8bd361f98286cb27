// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use kurbo::Rect;
use stratum_core::frame::SlotIndex;
use stratum_core::layer::DrawStats;
use stratum_core::trace::{
    ClipResolvedEvent, LayerSkipEvent, LayerVisitEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    PresentationEvent, SkipReason, SlotRotationEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_SLOT_ROTATION: u8 = 1;
const TAG_PRESENTATION: u8 = 2;
const TAG_PHASE_BEGIN: u8 = 3;
const TAG_PHASE_END: u8 = 4;
const TAG_DRAW_STATS: u8 = 5;
const TAG_LAYER_VISIT: u8 = 6;
const TAG_LAYER_SKIP: u8 = 7;
const TAG_CLIP_RESOLVED: u8 = 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_slot(&mut self, slot: SlotIndex) {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot indices are below 3"
        )]
        self.write_u8(slot.get() as u8);
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Evaluate => 0,
            PhaseKind::Publish => 1,
            PhaseKind::Render => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_slot_rotation(&mut self, e: &SlotRotationEvent) {
        self.write_u8(TAG_SLOT_ROTATION);
        self.write_u64(e.frame);
        self.write_slot(e.completed_slot);
        self.write_slot(e.next_simulation_slot);
    }

    fn on_presentation(&mut self, e: &PresentationEvent) {
        self.write_u8(TAG_PRESENTATION);
        self.write_u64(e.frame);
        self.write_slot(e.present_slot);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame);
        self.write_phase(e.phase);
        self.write_slot(e.slot);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame);
        self.write_phase(e.phase);
        self.write_slot(e.slot);
        self.write_u32(e.count);
    }

    fn on_draw_stats(&mut self, frame: u64, stats: &DrawStats) {
        self.write_u8(TAG_DRAW_STATS);
        self.write_u64(frame);
        self.write_u32(stats.layers_visited);
        self.write_u32(stats.layers_skipped);
        self.write_u32(stats.draw_calls);
        self.write_u32(stats.state_changes);
    }

    fn on_layer_visit(&mut self, e: &LayerVisitEvent) {
        self.write_u8(TAG_LAYER_VISIT);
        self.write_u64(e.frame);
        self.write_u32(e.layer);
        self.write_u32(e.depth);
    }

    fn on_layer_skip(&mut self, e: &LayerSkipEvent) {
        self.write_u8(TAG_LAYER_SKIP);
        self.write_u64(e.frame);
        self.write_u32(e.layer);
        self.write_u8(match e.reason {
            SkipReason::Hidden => 0,
            SkipReason::ClippedOut => 1,
        });
    }

    fn on_clip_resolved(&mut self, e: &ClipResolvedEvent) {
        self.write_u8(TAG_CLIP_RESOLVED);
        self.write_u64(e.frame);
        self.write_u32(e.layer);
        let r = e.device_bbox;
        for v in [r.x0, r.y0, r.x1, r.y1] {
            self.write_f64(v);
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`SlotRotationEvent`].
    SlotRotation(SlotRotationEvent),
    /// A [`PresentationEvent`].
    Presentation(PresentationEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// Statistics of one render walk.
    DrawStats {
        /// Frame counter.
        frame: u64,
        /// The statistics.
        stats: DrawStats,
    },
    /// A [`LayerVisitEvent`].
    LayerVisit(LayerVisitEvent),
    /// A [`LayerSkipEvent`].
    LayerSkip(LayerSkipEvent),
    /// A [`ClipResolvedEvent`].
    ClipResolved(ClipResolvedEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }

    fn read_slot(&mut self) -> Option<SlotIndex> {
        SlotIndex::ALL.get(usize::from(self.read_u8()?)).copied()
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Evaluate,
            1 => PhaseKind::Publish,
            _ => PhaseKind::Render,
        })
    }

    fn decode_slot_rotation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SlotRotation(SlotRotationEvent {
            frame: self.read_u64()?,
            completed_slot: self.read_slot()?,
            next_simulation_slot: self.read_slot()?,
        }))
    }

    fn decode_presentation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Presentation(PresentationEvent {
            frame: self.read_u64()?,
            present_slot: self.read_slot()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame: self.read_u64()?,
            phase: self.read_phase()?,
            slot: self.read_slot()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame: self.read_u64()?,
            phase: self.read_phase()?,
            slot: self.read_slot()?,
            count: self.read_u32()?,
        }))
    }

    fn decode_draw_stats(&mut self) -> Option<RecordedEvent> {
        let frame = self.read_u64()?;
        let stats = DrawStats {
            layers_visited: self.read_u32()?,
            layers_skipped: self.read_u32()?,
            draw_calls: self.read_u32()?,
            state_changes: self.read_u32()?,
        };
        Some(RecordedEvent::DrawStats { frame, stats })
    }

    fn decode_layer_visit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayerVisit(LayerVisitEvent {
            frame: self.read_u64()?,
            layer: self.read_u32()?,
            depth: self.read_u32()?,
        }))
    }

    fn decode_layer_skip(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayerSkip(LayerSkipEvent {
            frame: self.read_u64()?,
            layer: self.read_u32()?,
            reason: match self.read_u8()? {
                0 => SkipReason::Hidden,
                _ => SkipReason::ClippedOut,
            },
        }))
    }

    fn decode_clip_resolved(&mut self) -> Option<RecordedEvent> {
        let frame = self.read_u64()?;
        let layer = self.read_u32()?;
        let x0 = self.read_f64()?;
        let y0 = self.read_f64()?;
        let x1 = self.read_f64()?;
        let y1 = self.read_f64()?;
        Some(RecordedEvent::ClipResolved(ClipResolvedEvent {
            frame,
            layer,
            device_bbox: Rect::new(x0, y0, x1, y1),
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_SLOT_ROTATION => self.decode_slot_rotation(),
            TAG_PRESENTATION => self.decode_presentation(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_DRAW_STATS => self.decode_draw_stats(),
            TAG_LAYER_VISIT => self.decode_layer_visit(),
            TAG_LAYER_SKIP => self.decode_layer_skip(),
            TAG_CLIP_RESOLVED => self.decode_clip_resolved(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
