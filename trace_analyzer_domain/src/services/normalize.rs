// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Normalization Stage
//!
//! First real stage of the pipeline. For every complete event it:
//!
//! 1. moves legacy `attr` keys into `args`;
//! 2. coerces hex cycle-counter strings to decimal strings;
//! 3. unifies runtime naming (`Receive`→`Recv`, `RDMA`→`Rdma`);
//! 4. applies user event filters and the event limiter;
//! 5. repairs intra-event 32-bit counter overflow (TS1..TS5 must end up
//!    monotonically non-decreasing);
//! 6. infers the SoC clock frequency from `Cmpt Exec` events, both
//!    duration-based and interval-based.
//!
//! The stage is two-phase: events are buffered while the per-pid epoch
//! references build up, and the drain pass adds `elapsed_epochs × 2^32`
//! to every counter (the **global** correction), records the overflow
//! count in `args["OVC"]`, and tracks per-job clock drift.
//!
//! A sequence still broken after the global correction is an error;
//! with `ignore_crit` it degrades to a critical warning counter.

use crate::entities::dialect::{dialect, DialectKind};
use crate::entities::job_registry::JobRegistry;
use crate::entities::trace_event::{parse_int_prefixed, Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::barrier::TwoPhaseBuffer;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::event_stats::EventStats;
use crate::value_objects::trace_warning::{TraceWarning, WarnValue, WarningSet};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const TS_KEYS: [&str; 5] = ["TS1", "TS2", "TS3", "TS4", "TS5"];
const HEX_COERCED_KEYS: [&str; 6] = ["TS1", "TS2", "TS3", "TS4", "TS5", "Power"];

/// Relative tolerance before the detected frequency triggers advice.
const FREQ_TOLERANCE: f64 = 0.1;

/// Very small sentinel so negative overflow epochs still compare sane.
const CYCLE_FLOOR: i64 = -(1 << 48);

/// User-supplied event limits (`--event_limits` JSON).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventLimits {
    /// Complete events to drop before any are admitted.
    #[serde(default)]
    pub skip: u64,
    /// Maximum number of complete events admitted after the skip.
    #[serde(default)]
    pub count: Option<u64>,
    /// Drop events ending before this timestamp.
    #[serde(default)]
    pub ts_start: Option<f64>,
    /// Drop events starting after this timestamp.
    #[serde(default)]
    pub ts_end: Option<f64>,
    /// Phase tags exempt from skip/count bookkeeping.
    #[serde(default)]
    pub no_count_types: Vec<String>,
}

impl EventLimits {
    /// Parses the `--event_limits` JSON document.
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        serde_json::from_str(text)
            .map_err(|e| AnalysisError::InvalidConfiguration(format!("event_limits: {e}")))
    }
}

/// Limiter state (counts only events subject to limiting).
#[derive(Debug, Default)]
struct EventLimiter {
    limits: EventLimits,
    skipped: u64,
    admitted: u64,
}

impl EventLimiter {
    fn admit(&mut self, event: &TraceEvent) -> bool {
        if self
            .limits
            .no_count_types
            .iter()
            .any(|t| t.as_str() == event.ph.as_str())
        {
            return true;
        }
        if let Some(start) = self.limits.ts_start {
            if event.end_ts() < start {
                return false;
            }
        }
        if let Some(end) = self.limits.ts_end {
            if event.ts > end {
                return false;
            }
        }
        if self.skipped < self.limits.skip {
            self.skipped += 1;
            return false;
        }
        if let Some(count) = self.limits.count {
            if self.admitted >= count {
                return false;
            }
        }
        self.admitted += 1;
        true
    }
}

/// Configuration for [`NormalizeStage`].
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    /// SoC clock frequency in MHz (cycles per microsecond).
    pub soc_frequency: f64,
    /// Degrade broken cycle sequences to warnings instead of aborting.
    pub ignore_crit: bool,
    /// Comma-separated `dotted.path:regex` drop filters.
    pub filter: String,
    /// Optional event limiter settings.
    pub limits: Option<EventLimits>,
}

/// Reference point of an overflow epoch: the wall-clock/cycle pair the
/// first event of a pid (or job) was observed at.
#[derive(Debug, Clone, Copy)]
struct EpochRef {
    epoch_start: f64,
    ts: f64,
    cycle: i64,
}

/// Running aggregate of the per-job "actual" frequencies.
#[derive(Debug)]
struct FrequencyTrack {
    min: f64,
    max: f64,
    count: u64,
    mean: f64,
    max_drift: f64,
}

impl Default for FrequencyTrack {
    fn default() -> Self {
        FrequencyTrack {
            min: f64::INFINITY,
            max: 0.0,
            count: 0,
            mean: 0.0,
            max_drift: 0.0,
        }
    }
}

impl FrequencyTrack {
    fn update(&mut self, freq: f64, drift: f64) {
        self.min = self.min.min(freq);
        self.max = self.max.max(freq);
        self.count += 1;
        self.mean += (freq - self.mean) / self.count as f64;
        if drift.abs() > self.max_drift.abs() {
            self.max_drift = drift;
        }
    }
}

/// Per-pid frequency-inference stats (duration- and interval-based).
#[derive(Debug, Default)]
struct PidFreqStats {
    duration: EventStats,
    interval: EventStats,
}

/// The normalization stage (C5).
pub struct NormalizeStage {
    soc_frequency: f64,
    overflow_span_us: f64,
    ignore_crit: bool,
    filters: Vec<(Vec<String>, Regex)>,
    limiter: Option<EventLimiter>,
    registry: Arc<JobRegistry>,
    // per pid: "0"-keyed reference epoch plus one entry per jobhash
    epoch_refs: HashMap<i64, HashMap<String, EpochRef>>,
    freq_track: FrequencyTrack,
    pid_stats: HashMap<i64, PidFreqStats>,
    warnings: WarningSet,
    notes: Vec<Diagnostic>,
    barrier: TwoPhaseBuffer,
}

impl NormalizeStage {
    pub fn new(config: NormalizeConfig, registry: Arc<JobRegistry>) -> Result<Self, AnalysisError> {
        if config.soc_frequency <= 0.0 {
            return Err(AnalysisError::InvalidConfiguration(
                "soc frequency must be positive".to_string(),
            ));
        }

        let mut notes = Vec::new();
        let filters = Self::parse_filters(&config.filter, &mut notes);
        if !filters.is_empty() {
            notes.push(Diagnostic::info(
                "FLTR",
                format!(
                    "Event filtering is active. {} filters enabled.",
                    filters.len()
                ),
            ));
        }

        let mut warnings = WarningSet::new();
        warnings.add(
            TraceWarning::new(
                "long_duration",
                "Detected {count} events with long duration and thus potential \
                 undetected overflow in TSx counter.",
                vec![("count".into(), WarnValue::Int(0))],
                vec![],
            )?,
        );
        warnings.add(
            TraceWarning::new(
                "ts_seq_err",
                "local correction fix has missed a spot in the TS-sequence of \
                 {count} events.",
                vec![("count".into(), WarnValue::Int(0))],
                vec![],
            )?
            .critical(),
        );

        Ok(NormalizeStage {
            soc_frequency: config.soc_frequency,
            overflow_span_us: (1u64 << 32) as f64 / config.soc_frequency,
            ignore_crit: config.ignore_crit,
            filters,
            limiter: config.limits.map(|limits| EventLimiter {
                limits,
                ..EventLimiter::default()
            }),
            registry,
            epoch_refs: HashMap::new(),
            freq_track: FrequencyTrack::default(),
            pid_stats: HashMap::new(),
            warnings,
            notes,
            barrier: TwoPhaseBuffer::new(),
        })
    }

    fn parse_filters(filter: &str, notes: &mut Vec<Diagnostic>) -> Vec<(Vec<String>, Regex)> {
        let mut filters = Vec::new();
        if filter.trim().is_empty() {
            return filters;
        }
        for entry in filter.split(',') {
            let Some((path, pattern)) = entry.split_once(':') else {
                notes.push(Diagnostic::warning(
                    "FLTR",
                    format!("key:regex pattern not found in event filter. Skipping {entry:?}"),
                ));
                continue;
            };
            match Regex::new(pattern) {
                Ok(regex) => {
                    filters.push((path.split('.').map(str::to_string).collect(), regex));
                }
                Err(e) => notes.push(Diagnostic::warning(
                    "FLTR",
                    format!("invalid filter regex {pattern:?}: {e}"),
                )),
            }
        }
        filters
    }

    fn event_filtered(&self, event: &TraceEvent) -> bool {
        for (path, regex) in &self.filters {
            let parts: Vec<&str> = path.iter().map(String::as_str).collect();
            let Some(value) = event.value_at_path(&parts) else {
                continue;
            };
            let text = match value {
                serde_json::Value::Object(_) => continue,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            if regex.is_match(&text) {
                return true;
            }
        }
        false
    }

    fn attr_to_args(event: &mut TraceEvent) {
        if let Some(attr) = event.attr.take() {
            for (key, value) in attr {
                event.args.insert(key, value);
            }
        }
    }

    fn hex_to_int_str(event: &mut TraceEvent) {
        for key in HEX_COERCED_KEYS {
            let Some(serde_json::Value::String(text)) = event.args.get(key) else {
                continue;
            };
            if let Some(parsed) = parse_int_prefixed(text) {
                event
                    .args
                    .insert(key.to_string(), serde_json::Value::from(parsed.to_string()));
            }
            // unparsable values are left alone
        }
    }

    fn unify_name(name: &str) -> String {
        name.replace("RDMA", "Rdma").replace("Receive", "Recv")
    }

    fn ts_value(event: &TraceEvent, key: &str) -> Result<i64, AnalysisError> {
        event
            .arg_i64(key)
            .ok_or_else(|| AnalysisError::InvalidEvent(format!("unreadable cycle counter {key}")))
    }

    /// Intra-event overflow repair: any counter smaller than its
    /// predecessor gains as many 2^32 epochs as the gap requires; the
    /// first repaired counter is recorded in `args["TSxOF"]`.
    fn local_correction(&mut self, event: &mut TraceEvent) -> Result<(), AnalysisError> {
        let mut prev = CYCLE_FLOOR;
        for key in TS_KEYS {
            let mut current = Self::ts_value(event, key)?;
            if current < prev && !event.args.contains_key("TSxOF") {
                event.set_arg("TSxOF", key);
            }
            while current < prev {
                current += 1 << 32;
            }
            event.set_arg(key, current.to_string());
            prev = current;
        }

        if event.dur.unwrap_or(0.0) > self.overflow_span_us {
            self.warnings.issue_count("long_duration")?;
        }

        if event.name.contains("Cmpt Exec") {
            self.infer_frequency(event)?;
        }
        Ok(())
    }

    /// Duration- and interval-based frequency inference over `Cmpt Exec`
    /// events, per pid.
    fn infer_frequency(&mut self, event: &TraceEvent) -> Result<(), AnalysisError> {
        let dur = event.dur.unwrap_or(0.0);
        if dur <= 0.0 {
            return Ok(());
        }
        let kind = event
            .arg_i64("jobhash")
            .map(|j| self.registry.dialect_of(j as u64))
            .unwrap_or(DialectKind::Flex);
        let (ts_a, ts_b) = dialect(kind).freq_window(&event.name);

        let cycle_a = Self::ts_value(event, ts_a)?;
        let cycle_b = Self::ts_value(event, ts_b)?;
        let dur_freq = (cycle_b - cycle_a) as f64 / dur;

        let stats = self.pid_stats.entry(event.pid).or_default();
        stats
            .duration
            .update((cycle_a, cycle_b), (event.ts, dur), dur_freq);

        let gap_freq = if stats.interval.count > 0 {
            let gap_cycles = cycle_a - stats.interval.start_cycle();
            let gap_time = event.ts - stats.interval.start_ts();
            if gap_time > 0.0 {
                gap_cycles as f64 / gap_time
            } else {
                dur_freq
            }
        } else {
            dur_freq
        };
        stats
            .interval
            .update((cycle_a, cycle_b), (event.ts, dur), gap_freq);
        Ok(())
    }

    /// Computes the number of elapsed 2^32-cycle epochs for an event and
    /// maintains the per-pid/per-job epoch references.
    fn overflow_count(&mut self, pid: i64, job: &str, ts: f64, cycle: i64) -> i64 {
        let epoch_start = ts - cycle as f64 / self.soc_frequency;

        let refs = self.epoch_refs.entry(pid).or_insert_with(|| {
            let mut map = HashMap::new();
            map.insert(
                "0".to_string(),
                EpochRef {
                    epoch_start,
                    ts,
                    cycle,
                },
            );
            map
        });
        let epoch0 = refs["0"];
        if self.notes.len() < 64 && !refs.contains_key(job) && refs.len() == 1 {
            self.notes.push(Diagnostic::info(
                "OVC",
                format!(
                    "Reference Epoch for pid {pid} job {job}: offset {:.3}us, start {:.3}",
                    ts - epoch_start,
                    epoch_start
                ),
            ));
        }

        let time_since_epoch0 = ts - epoch0.epoch_start;
        let elapsed_epochs = (time_since_epoch0 / self.overflow_span_us).floor() as i64;

        if !refs.contains_key(job) {
            let abs_cycle = cycle + elapsed_epochs * (1i64 << 32);
            let job_drift =
                epoch_start - (epoch0.epoch_start + elapsed_epochs as f64 * self.overflow_span_us);
            refs.insert(
                job.to_string(),
                EpochRef {
                    epoch_start,
                    ts,
                    cycle,
                },
            );
            if (ts - epoch0.ts).abs() > f64::EPSILON {
                let actual_freq = (abs_cycle - epoch0.cycle) as f64 / (ts - epoch0.ts);
                self.freq_track.update(actual_freq, job_drift);
            }
        }

        elapsed_epochs
    }

    /// Global correction: adds the elapsed-epoch offset to every counter
    /// and stores it in `args["OVC"]`.
    fn global_correction(&mut self, event: &mut TraceEvent) -> Result<(), AnalysisError> {
        let cycle = Self::ts_value(event, "TS1")?;
        let job = event
            .arg_i64("jobhash")
            .map(|j| j.to_string())
            .unwrap_or_else(|| "0".to_string());
        let ovc = self.overflow_count(event.pid, &job, event.ts, cycle);

        let mut prev = CYCLE_FLOOR;
        for key in TS_KEYS {
            let current = Self::ts_value(event, key)? + ovc * (1i64 << 32);
            if current < prev {
                if !self.ignore_crit {
                    return Err(AnalysisError::Monotonicity(format!(
                        "{key} after global correction in {}",
                        event.summary()
                    )));
                }
                self.warnings.issue_count("ts_seq_err")?;
            }
            event.set_arg(key, current.to_string());
            prev = current;
        }
        event.set_arg("OVC", ovc);
        Ok(())
    }

    fn freq_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let track = &self.freq_track;
        if track.count > 0 && track.mean.abs() > 1e-9 {
            if track.max - track.min > track.mean * 0.2 {
                diagnostics.push(Diagnostic::warning(
                    "FREQ",
                    format!(
                        "Min/Max of detected correct frequency is >20% of mean \
                         ({:.3},{:.3}). This indicates some events might have been \
                         assigned to the wrong TSx epoch.",
                        track.min, track.max
                    ),
                ));
            } else if (track.mean - self.soc_frequency).abs() > FREQ_TOLERANCE {
                diagnostics.push(Diagnostic::warning(
                    "FREQ",
                    format!(
                        "Recommendation: to minimize event time drift (max: {:.1}us) \
                         between CPU and Accelerator, use: --freq={:.3}",
                        track.max_drift, track.mean
                    ),
                ));
            }
        }

        for (label, pick) in [
            ("duration", true),
            ("interval", false),
        ] {
            let mut min = f64::INFINITY;
            let mut max = 0.0f64;
            let mut mean = 0.0;
            let mut n = 0u64;
            for stats in self.pid_stats.values() {
                let s = if pick { &stats.duration } else { &stats.interval };
                min = min.min(s.freq_min);
                max = max.max(s.freq_max);
                n += 1;
                mean += (s.freq_mean - mean) / n as f64;
            }
            if n == 0 || mean.abs() < 1e-9 {
                // no hw-clocked events, nothing to report
                continue;
            }
            let rel_range = (max - min) / mean;
            let input_ratio = self.soc_frequency / mean;
            let message = format!(
                "Detected Event-{label}-based frequency (min/mean/max): \
                 {min:.2} {mean:.2} {max:.2}; rel_range={:.3}, \
                 input_soc_freq/detected={:.3}",
                rel_range, input_ratio
            );
            if rel_range > FREQ_TOLERANCE || (1.0 - input_ratio).abs() > FREQ_TOLERANCE {
                diagnostics.push(Diagnostic::warning("FREQ", message));
            } else {
                diagnostics.push(Diagnostic::info("FREQ", message));
            }
        }

        diagnostics
    }
}

impl PipelineStage for NormalizeStage {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn tag(&self) -> &'static str {
        "NORM"
    }

    fn process(&mut self, mut event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if let Some(limiter) = &mut self.limiter {
            if !limiter.admit(&event) {
                return Ok(Vec::new());
            }
        }

        if event.ph != Phase::Complete {
            self.barrier.push(event);
            return Ok(Vec::new());
        }

        Self::attr_to_args(&mut event);
        Self::hex_to_int_str(&mut event);
        event.name = Self::unify_name(&event.name);

        if self.event_filtered(&event) {
            return Ok(Vec::new());
        }

        if let Some(jobhash) = event.arg_i64("jobhash") {
            let jobname = self.registry.job_name(jobhash as u64).to_string();
            event.set_arg("jobname", jobname);
        }

        if event.has_cycle_counters() {
            self.local_correction(&mut event)?;
        }

        self.barrier.push(event);
        Ok(Vec::new())
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        let mut events = self.barrier.take();
        for event in &mut events {
            if event.ph == Phase::Complete && event.has_cycle_counters() {
                self.global_correction(event)?;
            }
        }
        Ok(events)
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = std::mem::take(&mut self.notes);
        diagnostics.extend(self.freq_diagnostics());
        diagnostics.extend(self.warnings.drain_diagnostics("OVC"));
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::diagnostic::Severity;

    fn registry() -> Arc<JobRegistry> {
        let mut registry = JobRegistry::new();
        registry.add_job("test_frame_flex.json", DialectKind::Flex);
        Arc::new(registry)
    }

    fn stage(ignore_crit: bool) -> NormalizeStage {
        NormalizeStage::new(
            NormalizeConfig {
                soc_frequency: 1000.0,
                ignore_crit,
                filter: String::new(),
                limits: None,
            },
            registry(),
        )
        .unwrap()
    }

    fn cycle_event(values: [&str; 5]) -> TraceEvent {
        let mut event = TraceEvent::complete("testevent", 3.141, 1.0, 0, 0);
        for (key, value) in TS_KEYS.iter().zip(values) {
            event.set_arg(key, value);
        }
        event.set_arg("jobhash", 0);
        event
    }

    fn run(stage: &mut NormalizeStage, event: TraceEvent) -> Vec<TraceEvent> {
        let held = stage.process(event).unwrap();
        assert!(held.is_empty(), "normalize buffers until drain");
        stage.drain().unwrap()
    }

    #[test]
    fn test_hex_values_are_coerced() {
        let mut stage = stage(false);
        let event = cycle_event(["0x10", "0x20", "0x30", "0x40", "0x50"]);
        let out = run(&mut stage, event);

        let expected = ["16", "32", "48", "64", "80"];
        for (key, want) in TS_KEYS.iter().zip(expected) {
            assert_eq!(out[0].arg_str(key), Some(want));
        }
        assert!(out[0].arg("TSxOF").is_none());
        assert_eq!(out[0].arg_i64("OVC"), Some(0));
    }

    #[test]
    fn test_non_numeric_strings_are_left_alone() {
        let mut event = TraceEvent::complete("x", 0.0, 1.0, 0, 0);
        event.set_arg("Power", "TEXT");
        NormalizeStage::hex_to_int_str(&mut event);
        assert_eq!(event.arg_str("Power"), Some("TEXT"));
    }

    #[test]
    fn test_attr_keys_move_to_args() {
        let mut event = TraceEvent::complete("x", 0.0, 1.0, 0, 0);
        let mut attr = serde_json::Map::new();
        attr.insert("a".to_string(), serde_json::Value::from(1));
        event.attr = Some(attr);

        NormalizeStage::attr_to_args(&mut event);
        assert!(event.attr.is_none());
        assert_eq!(event.arg_i64("a"), Some(1));
    }

    #[test]
    fn test_intra_event_overflow_bumps_one_epoch() {
        let mut stage = stage(false);
        let event = cycle_event(["1000", "2000", "500", "2500", "3000"]);
        let out = run(&mut stage, event);

        assert_eq!(out[0].arg_str("TSxOF"), Some("TS3"));
        assert_eq!(out[0].arg_i64("TS3"), Some(500 + (1 << 32)));
        // after the bump the sequence is monotonic again
        let mut prev = 0;
        for key in TS_KEYS {
            let current = out[0].arg_i64(key).unwrap();
            assert!(current >= prev);
            prev = current;
        }
    }

    #[test]
    fn test_multi_epoch_gap_is_repaired() {
        let mut stage = stage(false);
        // TS3 sits more than one full epoch below TS2
        let big = (1i64 << 33) + 10;
        let event = cycle_event(["1000", &big.to_string(), "500", "600", "700"]);
        stage.process(event).unwrap();
        let out = stage.drain().unwrap();

        assert_eq!(out[0].arg_str("TSxOF"), Some("TS3"));
        let mut prev = 0;
        for key in TS_KEYS {
            let current = out[0].arg_i64(key).unwrap();
            assert!(current >= prev, "{key} regressed");
            prev = current;
        }
    }

    #[test]
    fn test_global_guard_fails_without_ignore_crit() {
        // feed a sequence the local pass never saw, as a corrupted
        // upstream producer would
        let mut stage = stage(false);
        let mut event = cycle_event(["1000", "2000", "500", "2500", "3000"]);
        event.set_arg("jobhash", 0);
        assert!(matches!(
            stage.global_correction(&mut event),
            Err(AnalysisError::Monotonicity(_))
        ));
    }

    #[test]
    fn test_global_guard_warns_with_ignore_crit() {
        let mut stage = stage(true);
        let mut event = cycle_event(["1000", "2000", "500", "2500", "3000"]);
        event.set_arg("jobhash", 0);
        stage.global_correction(&mut event).unwrap();
        assert_eq!(event.arg_i64("OVC"), Some(0));

        let diagnostics = stage.finalize();
        assert!(diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error && d.message.contains("missed a spot")));
    }

    #[test]
    fn test_name_unification() {
        assert_eq!(
            NormalizeStage::unify_name("RDMA Receive block"),
            "Rdma Recv block"
        );
    }

    #[test]
    fn test_event_filter_drops_matching_events() {
        let mut stage = NormalizeStage::new(
            NormalizeConfig {
                soc_frequency: 1000.0,
                ignore_crit: false,
                filter: "name:^Drop".to_string(),
                limits: None,
            },
            registry(),
        )
        .unwrap();

        stage
            .process(TraceEvent::complete("DropMe", 0.0, 1.0, 0, 0))
            .unwrap();
        stage
            .process(TraceEvent::complete("KeepMe", 0.0, 1.0, 0, 0))
            .unwrap();
        let out = stage.drain().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "KeepMe");
    }

    #[test]
    fn test_jobname_annotation() {
        let mut stage = stage(false);
        let mut registry = JobRegistry::new();
        let jobhash = registry.add_job("dir/trace_rank0.json", DialectKind::Flex);
        stage.registry = Arc::new(registry);

        let mut event = TraceEvent::complete("x", 0.0, 1.0, 0, 0);
        event.set_arg("jobhash", jobhash);
        let out = run(&mut stage, event);
        assert_eq!(out[0].arg_str("jobname"), Some("trace_rank0.json"));
    }

    #[test]
    fn test_limiter_skip_and_count() {
        let limits = EventLimits::from_json(r#"{"skip": 1, "count": 2}"#).unwrap();
        let mut stage = NormalizeStage::new(
            NormalizeConfig {
                soc_frequency: 1000.0,
                ignore_crit: false,
                filter: String::new(),
                limits: Some(limits),
            },
            registry(),
        )
        .unwrap();

        for i in 0..5 {
            stage
                .process(TraceEvent::complete(&format!("e{i}"), i as f64, 1.0, 0, 0))
                .unwrap();
        }
        let out = stage.drain().unwrap();
        let names: Vec<&str> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["e1", "e2"]);
    }

    #[test]
    fn test_global_correction_across_epochs() {
        let mut stage = stage(false);
        // span = 2^32 / 1000 us; second event lies one full epoch later
        let span = (1u64 << 32) as f64 / 1000.0;

        let mut first = cycle_event(["1000", "1000", "1000", "1000", "1000"]);
        first.ts = 1.0;
        let mut second = cycle_event(["1000", "1000", "1000", "1000", "1000"]);
        second.ts = 1.0 + span;

        stage.process(first).unwrap();
        stage.process(second).unwrap();
        let out = stage.drain().unwrap();

        assert_eq!(out[0].arg_i64("OVC"), Some(0));
        assert_eq!(out[1].arg_i64("OVC"), Some(1));
        assert_eq!(out[1].arg_i64("TS1"), Some(1000 + (1 << 32)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any 32-bit counter tuple comes out monotonically
            /// non-decreasing after local plus global correction.
            #[test]
            fn prop_cycle_sequence_monotonic(values in proptest::array::uniform5(0u32..)) {
                let mut stage = stage(true);
                let strings: Vec<String> = values.iter().map(u32::to_string).collect();
                let event = cycle_event([
                    &strings[0], &strings[1], &strings[2], &strings[3], &strings[4],
                ]);
                stage.process(event).unwrap();
                let out = stage.drain().unwrap();

                let mut prev = i64::MIN;
                for key in TS_KEYS {
                    let current = out[0].arg_i64(key).unwrap();
                    prop_assert!(current >= prev);
                    prev = current;
                }
            }
        }
    }

    #[test]
    fn test_non_complete_events_pass_through_in_order() {
        let mut stage = stage(false);
        let counter = TraceEvent::counter("Power", 1.0, 0, "Watts", 40.0);
        stage.process(counter).unwrap();
        stage
            .process(TraceEvent::complete("x", 2.0, 1.0, 0, 0))
            .unwrap();
        let out = stage.drain().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ph, Phase::Counter);
    }
}
