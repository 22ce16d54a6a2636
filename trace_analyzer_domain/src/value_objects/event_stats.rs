// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Rolling Event Statistics
//!
//! Per-pid frequency statistics maintained by the normalization stage.
//! Each update records the most recent event's cycle/time window and folds
//! the derived frequency into running min/max/mean aggregates.

/// Rolling statistics over a stream of cycle-stamped events.
#[derive(Debug, Clone)]
pub struct EventStats {
    cycle_start: i64,
    cycle_end: i64,
    ts: f64,
    dur: f64,
    pub freq_min: f64,
    pub freq_max: f64,
    pub freq_mean: f64,
    pub count: u64,
}

impl Default for EventStats {
    fn default() -> Self {
        EventStats {
            cycle_start: 0,
            cycle_end: 0,
            ts: 0.0,
            dur: 0.0,
            freq_min: f64::INFINITY,
            freq_max: 0.0,
            freq_mean: 0.0,
            count: 0,
        }
    }
}

impl EventStats {
    pub fn new() -> Self {
        EventStats::default()
    }

    pub fn start_ts(&self) -> f64 {
        self.ts
    }

    pub fn end_ts(&self) -> f64 {
        self.ts + self.dur
    }

    pub fn start_cycle(&self) -> i64 {
        self.cycle_start
    }

    pub fn end_cycle(&self) -> i64 {
        self.cycle_end
    }

    /// Records the latest event window and folds `freq` into the running
    /// aggregates (numerically stable incremental mean).
    pub fn update(&mut self, cycles: (i64, i64), ts_dur: (f64, f64), freq: f64) {
        (self.cycle_start, self.cycle_end) = cycles;
        (self.ts, self.dur) = ts_dur;

        self.freq_max = self.freq_max.max(freq);
        self.freq_min = self.freq_min.min(freq);
        self.count += 1;
        self.freq_mean += (freq - self.freq_mean) / self.count as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut stats = EventStats::new();
        stats.update((0, 100), (0.0, 1.0), 100.0);
        stats.update((100, 400), (1.0, 1.0), 300.0);
        stats.update((400, 600), (2.0, 1.0), 200.0);

        assert_eq!(stats.count, 3);
        assert!((stats.freq_mean - 200.0).abs() < 1e-9);
        assert!((stats.freq_min - 100.0).abs() < 1e-9);
        assert!((stats.freq_max - 300.0).abs() < 1e-9);
        assert_eq!(stats.start_cycle(), 400);
        assert!((stats.end_ts() - 3.0).abs() < 1e-9);
    }
}
