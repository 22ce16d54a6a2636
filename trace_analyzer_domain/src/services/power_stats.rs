// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Power Statistics Stage
//!
//! Consumes the `Power` counter samples and the kernel execution periods
//! of the trace, then reports time-weighted power statistics at
//! finalize, split into periods **with** and **without** kernel
//! activity.
//!
//! Consecutive power samples form `(start, end, watts)` intervals.
//! Kernel periods are merged into non-overlapping segments first so
//! overlapping kernels cannot double-count duration; each power interval
//! is then sliced at the kernel boundaries.

use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;

/// One sliced segment: (duration, watts, overlaps a kernel).
type Segment = (f64, f64, bool);

/// Time-weighted summary of a segment group.
#[derive(Debug, PartialEq)]
struct WeightedStats {
    min_non_zero: f64,
    max: f64,
    mean_non_zero: f64,
    median_non_zero: f64,
    avg_total: f64,
    dur_total: f64,
    dur_non_zero: f64,
}

/// The power-statistics stage (C10).
#[derive(Debug, Default)]
pub struct PowerStatsStage {
    power_periods: Vec<(f64, f64, f64)>,
    last_power_sample: Option<(f64, f64)>,
    kernel_periods: Vec<(f64, f64)>,
}

impl PowerStatsStage {
    pub fn new() -> Self {
        PowerStatsStage::default()
    }

    /// Merges overlapping periods into non-overlapping segments.
    fn merge_periods(mut periods: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
        if periods.is_empty() {
            return periods;
        }
        periods.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mut merged = vec![periods[0]];
        for (start, end) in periods.into_iter().skip(1) {
            let last_index = merged.len() - 1;
            if start <= merged[last_index].1 {
                merged[last_index].1 = merged[last_index].1.max(end);
            } else {
                merged.push((start, end));
            }
        }
        merged
    }

    /// Slices one power interval at the kernel-timeline boundaries.
    fn split_power_period(
        power_start: f64,
        power_end: f64,
        watts: f64,
        kernel_timeline: &[(f64, f64)],
    ) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut position = power_start;

        for &(k_start, k_end) in kernel_timeline {
            if k_end <= power_start || k_start >= power_end {
                continue;
            }
            let overlap_start = power_start.max(k_start);
            let overlap_end = power_end.min(k_end);
            if position < overlap_start {
                segments.push((overlap_start - position, watts, false));
            }
            segments.push((overlap_end - overlap_start, watts, true));
            position = overlap_end;
        }
        if position < power_end {
            segments.push((power_end - position, watts, false));
        }
        segments
    }

    fn weighted_stats(segments: &[(f64, f64)]) -> Option<WeightedStats> {
        if segments.is_empty() {
            return None;
        }
        let dur_total: f64 = segments.iter().map(|(d, _)| d).sum();
        let weighted_sum: f64 = segments.iter().map(|(d, p)| d * p).sum();
        let avg_total = if dur_total > 0.0 {
            weighted_sum / dur_total
        } else {
            0.0
        };

        let non_zero: Vec<(f64, f64)> = segments.iter().copied().filter(|(_, p)| *p > 0.0).collect();
        let dur_non_zero: f64 = non_zero.iter().map(|(d, _)| d).sum();
        let mean_non_zero = if dur_non_zero > 0.0 {
            non_zero.iter().map(|(d, p)| d * p).sum::<f64>() / dur_non_zero
        } else {
            0.0
        };

        // duration-weighted median over the non-zero segments
        let mut median_non_zero = 0.0;
        if !non_zero.is_empty() {
            let mut sorted = non_zero.clone();
            sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let half = dur_non_zero / 2.0;
            let mut cumulative = 0.0;
            for (dur, watts) in sorted {
                cumulative += dur;
                if cumulative >= half {
                    median_non_zero = watts;
                    break;
                }
            }
        }

        let min_non_zero = if non_zero.is_empty() {
            0.0
        } else {
            non_zero.iter().map(|(_, p)| *p).fold(f64::INFINITY, f64::min)
        };

        Some(WeightedStats {
            min_non_zero,
            max: segments.iter().map(|(_, p)| *p).fold(0.0, f64::max),
            mean_non_zero,
            median_non_zero,
            avg_total,
            dur_total,
            dur_non_zero,
        })
    }
}

impl PipelineStage for PowerStatsStage {
    fn name(&self) -> &'static str {
        "power_stats"
    }

    fn tag(&self) -> &'static str {
        "PWR"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        match event.ph {
            Phase::Counter if event.name == "Power" => {
                if let Some(watts) = event.arg_f64("Watts") {
                    if let Some((last_ts, last_watts)) = self.last_power_sample {
                        if event.ts > last_ts {
                            self.power_periods.push((last_ts, event.ts, last_watts));
                        }
                    }
                    self.last_power_sample = Some((event.ts, watts));
                }
            }
            Phase::Complete if event.name.contains("Cmpt Exec") => {
                let dur = event.dur.unwrap_or(0.0);
                if dur > 0.0 {
                    self.kernel_periods.push((event.ts, event.ts + dur));
                }
            }
            _ => {}
        }
        Ok(vec![event])
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        if self.power_periods.is_empty() {
            if self.last_power_sample.is_some() || !self.kernel_periods.is_empty() {
                return vec![Diagnostic::warning(
                    "PWR",
                    "Insufficient power data (need at least 2 samples) for statistics",
                )];
            }
            return Vec::new();
        }

        let kernel_timeline = Self::merge_periods(std::mem::take(&mut self.kernel_periods));

        let mut all_segments: Vec<Segment> = Vec::new();
        for &(start, end, watts) in &self.power_periods {
            all_segments.extend(Self::split_power_period(start, end, watts, &kernel_timeline));
        }

        let with_kernels: Vec<(f64, f64)> = all_segments
            .iter()
            .filter(|(_, _, k)| *k)
            .map(|(d, p, _)| (*d, *p))
            .collect();
        let mut without_kernels: Vec<(f64, f64)> = all_segments
            .iter()
            .filter(|(_, _, k)| !*k)
            .map(|(d, p, _)| (*d, *p))
            .collect();
        if kernel_timeline.is_empty() && without_kernels.is_empty() {
            without_kernels = all_segments.iter().map(|(d, p, _)| (*d, *p)).collect();
        }

        let mut diagnostics = Vec::new();
        for (label, data) in [
            ("Power with kernels", with_kernels),
            ("Power without kernels", without_kernels),
        ] {
            match Self::weighted_stats(&data) {
                Some(stats) => diagnostics.push(Diagnostic::info(
                    "PWR",
                    format!(
                        "{label}: min_non_zero={:.2}W, max={:.2}W, mean_non_zero={:.2}W, \
                         median_non_zero={:.2}W, avg_total={:.2}W (time-weighted, \
                         dur_total={:.2}us, dur_non_zero={:.2}us)",
                        stats.min_non_zero,
                        stats.max,
                        stats.mean_non_zero,
                        stats.median_non_zero,
                        stats.avg_total,
                        stats.dur_total,
                        stats.dur_non_zero
                    ),
                )),
                None => diagnostics.push(Diagnostic::info("PWR", format!("{label}: No data"))),
            }
        }
        diagnostics
    }
}
