//! Playback thread telemetry: tick cost and overruns.
//!
//! Samples live in a fixed ring buffer so recording never allocates on the
//! tick path.

use std::time::Duration;

use midikey_types::PlaybackFeedback;

const TICK_BUFFER_SIZE: usize = 256;

/// One reporting window worth of tick metrics, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    pub avg_us: u32,
    pub max_us: u32,
    pub p95_us: u32,
    /// Cumulative since the collector was created.
    pub overruns: u64,
}

impl From<TickSummary> for PlaybackFeedback {
    fn from(s: TickSummary) -> Self {
        PlaybackFeedback::TelemetrySummary {
            avg_tick_us: s.avg_us,
            max_tick_us: s.max_us,
            p95_tick_us: s.p95_us,
            overruns: s.overruns,
        }
    }
}

pub struct TickTelemetry {
    samples_us: [u32; TICK_BUFFER_SIZE],
    next: usize,
    len: usize,
    window_max_us: u32,
    overruns: u64,
}

impl Default for TickTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TickTelemetry {
    pub fn new() -> Self {
        Self {
            samples_us: [0; TICK_BUFFER_SIZE],
            next: 0,
            len: 0,
            window_max_us: 0,
            overruns: 0,
        }
    }

    /// Record the cost of one tick. A tick that takes longer than `budget`
    /// counts as an overrun.
    #[inline]
    pub fn record(&mut self, cost: Duration, budget: Duration) {
        let us = cost.as_micros().min(u32::MAX as u128) as u32;
        self.samples_us[self.next] = us;
        self.next = (self.next + 1) % TICK_BUFFER_SIZE;
        self.len = (self.len + 1).min(TICK_BUFFER_SIZE);
        self.window_max_us = self.window_max_us.max(us);
        if cost > budget {
            self.overruns += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Summarise the buffered samples and start a new max window.
    pub fn take_summary(&mut self) -> TickSummary {
        if self.len == 0 {
            return TickSummary {
                overruns: self.overruns,
                ..TickSummary::default()
            };
        }

        let window = &self.samples_us[..self.len];
        let sum: u64 = window.iter().map(|&us| us as u64).sum();
        let mut sorted = self.samples_us;
        sorted[..self.len].sort_unstable();
        let p95_idx = (self.len * 95 / 100).max(1) - 1;

        let summary = TickSummary {
            avg_us: (sum / self.len as u64) as u32,
            max_us: self.window_max_us,
            p95_us: sorted[p95_idx.min(self.len - 1)],
            overruns: self.overruns,
        };
        self.window_max_us = 0;
        summary
    }
}
