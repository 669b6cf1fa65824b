//! Timeline transform pipeline.
//!
//! Rewrites a decoded timeline according to the profile's playback options
//! and the file's note shift. Stages run in this order:
//!
//! 1. normalize (note-on with velocity 0 becomes note-off)
//! 2. channel filter
//! 3. velocity filter, dropping the paired note-off of every dropped note-on
//! 4. transpose + note shift, clamped to 0..=127
//! 5. quantization in unscaled time (no-op without tempo metadata)
//! 6. tempo scaling
//! 7. stable sort by timestamp
//!
//! Everything here is pure: the same input always gives the same output.

use std::collections::{HashMap, VecDeque};

use midikey_types::event::MAX_NOTE;
use midikey_types::{NoteEvent, NoteKind, NoteShift, PlaybackOptions, Quantization, TempoChange, Timeline};

/// Apply every transform stage to `timeline`.
///
/// Options are assumed to be validated; out-of-range values are the caller's
/// responsibility (see `PlaybackOptions::validate`).
pub fn transform(timeline: &Timeline, options: &PlaybackOptions, note_shift: NoteShift) -> Vec<NoteEvent> {
    let semitones = options.transpose as i16 + note_shift.get() as i16;
    let mut events = filter_and_shift(&timeline.events, options, semitones);

    if let Some(grid) = TempoGrid::new(&timeline.tempo_map, options.quantization) {
        for event in &mut events {
            event.timestamp_ms = grid.snap(event.timestamp_ms);
        }
    }

    let multiplier = options.tempo_multiplier;
    for event in &mut events {
        event.timestamp_ms /= multiplier;
    }

    sort_stable(&mut events);
    events
}

/// `clamp(note + semitones, 0, 127)`
pub fn shift_note(note: u8, semitones: i16) -> u8 {
    (note as i16 + semitones).clamp(0, MAX_NOTE as i16) as u8
}

pub fn sort_stable(events: &mut [NoteEvent]) {
    events.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
}

fn normalize(mut event: NoteEvent) -> NoteEvent {
    if event.kind == NoteKind::NoteOn && event.velocity == 0 {
        event.kind = NoteKind::NoteOff;
    }
    event
}

/// Stages 1-4. Note-ons and note-offs are paired first-in first-out per
/// (channel, source note), which is how a held MIDI note is closed.
fn filter_and_shift(source: &[NoteEvent], options: &PlaybackOptions, semitones: i16) -> Vec<NoteEvent> {
    let mut open: HashMap<(u8, u8), VecDeque<bool>> = HashMap::new();
    let mut out = Vec::with_capacity(source.len());

    for event in source {
        let mut event = normalize(*event);
        if options.is_channel_ignored(event.channel) {
            continue;
        }

        let slot = (event.channel, event.note);
        match event.kind {
            NoteKind::NoteOn => {
                let kept = event.velocity >= options.velocity_threshold;
                open.entry(slot).or_default().push_back(kept);
                if !kept {
                    continue;
                }
            }
            NoteKind::NoteOff => {
                let paired_kept = open.get_mut(&slot).and_then(|q| q.pop_front());
                if paired_kept == Some(false) {
                    continue;
                }
            }
        }

        event.note = shift_note(event.note, semitones);
        out.push(event);
    }

    out
}

/// Quantization grid derived from the decoder's tempo map.
struct TempoGrid {
    /// (segment start ms, grid ms), sorted by start.
    segments: Vec<(f64, f64)>,
}

impl TempoGrid {
    /// None when quantization is off or there is no usable tempo metadata,
    /// in which case quantization is skipped entirely.
    fn new(tempo_map: &[TempoChange], quantization: Quantization) -> Option<Self> {
        quantization.division()?;
        let mut segments: Vec<(f64, f64)> = tempo_map
            .iter()
            .filter(|t| t.bpm.is_finite() && t.bpm > 0.0 && t.at_ms.is_finite())
            .filter_map(|t| quantization.grid_ms(t.quarter_ms()).map(|grid| (t.at_ms.max(0.0), grid)))
            .collect();
        if segments.is_empty() {
            return None;
        }
        segments.sort_by(|a, b| a.0.total_cmp(&b.0));
        Some(Self { segments })
    }

    /// Snap to the nearest grid line of the tempo segment containing `t`.
    /// Exact ties go to the earlier line. A snap never crosses into the next
    /// segment, which keeps the overall order of events intact.
    fn snap(&self, t: f64) -> f64 {
        let idx = self
            .segments
            .partition_point(|(start, _)| *start <= t)
            .saturating_sub(1);
        let (start, grid) = self.segments[idx];
        let next_start = self.segments.get(idx + 1).map(|(s, _)| *s);

        let pos = (t - start) / grid;
        let lower = pos.floor();
        let steps = if pos - lower > 0.5 { lower + 1.0 } else { lower };
        let mut snapped = start + steps * grid;
        if let Some(next) = next_start {
            snapped = snapped.min(next);
        }
        snapped.max(0.0)
    }
}
