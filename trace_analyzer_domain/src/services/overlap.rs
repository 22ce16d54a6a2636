// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Overlap Resolution Stage
//!
//! Two jobs:
//!
//! 1. **CPU-stream recombination**: host-side complete events are moved
//!    to a reserved tid so each process shows one consolidated CPU
//!    stream. Accelerator events - names starting with `AIU Roundtrip`
//!    or events carrying `TS1` - keep their lanes.
//! 2. **Overlap resolution**: complete events starting before the
//!    previous event on the same (pid, tid) lane ended are handled per
//!    the configured [`OverlapMode`].
//!
//! The stage assumes per-lane timestamp order, i.e. it runs after sort.

use crate::entities::trace_event::{Phase, Tid, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::trace_warning::{TraceWarning, WarnValue, WarningSet};
use std::collections::HashMap;

/// Lane offset used by [`OverlapMode::Tid`] for colliding events.
const OVERFLOW_LANE_OFFSET: i64 = 500;

/// Strategy for complete events overlapping on one (pid, tid) lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMode {
    /// Drop the later event.
    Drop,
    /// Move the later event to an overflow lane.
    Tid,
    /// Convert the later event into an async begin/end pair.
    Async,
    /// Keep everything, count a warning.
    Warn,
    /// Shift the later event to start where the previous one ended.
    Shift,
}

impl OverlapMode {
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        match text {
            "drop" => Ok(OverlapMode::Drop),
            "tid" => Ok(OverlapMode::Tid),
            "async" => Ok(OverlapMode::Async),
            "warn" => Ok(OverlapMode::Warn),
            "shift" => Ok(OverlapMode::Shift),
            other => Err(AnalysisError::InvalidConfiguration(format!(
                "unknown overlap mode '{other}'"
            ))),
        }
    }
}

/// The overlap stage (C7).
pub struct OverlapStage {
    mode: OverlapMode,
    cpu_stream_tid: i64,
    last_end: HashMap<(i64, Tid), f64>,
    async_id_seq: i64,
    warnings: WarningSet,
}

impl OverlapStage {
    pub fn new(mode: OverlapMode, cpu_stream_tid: i64) -> Result<Self, AnalysisError> {
        let mut warnings = WarningSet::new();
        warnings.add(TraceWarning::new(
            "overlap",
            "Detected {count} overlapping events on a single stream.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);
        warnings.add(TraceWarning::new(
            "dropped",
            "Dropped {count} overlapping events.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);
        Ok(OverlapStage {
            mode,
            cpu_stream_tid,
            last_end: HashMap::new(),
            async_id_seq: 0,
            warnings,
        })
    }

    /// Accelerator events keep their lanes during recombination.
    fn is_accelerator_event(event: &TraceEvent) -> bool {
        event.name.starts_with("AIU Roundtrip") || event.has_cycle_counters()
    }

    fn record_end(&mut self, event: &TraceEvent) {
        let lane = (event.pid, event.tid.clone());
        let end = event.end_ts();
        let entry = self.last_end.entry(lane).or_insert(end);
        if end > *entry {
            *entry = end;
        }
    }
}

impl PipelineStage for OverlapStage {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn tag(&self) -> &'static str {
        "OVLP"
    }

    fn process(&mut self, mut event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if event.ph != Phase::Complete {
            return Ok(vec![event]);
        }

        if !Self::is_accelerator_event(&event) {
            event.tid = Tid::Int(self.cpu_stream_tid);
        }

        let lane = (event.pid, event.tid.clone());
        let overlaps = self
            .last_end
            .get(&lane)
            .map(|&end| event.ts < end)
            .unwrap_or(false);

        if !overlaps {
            self.record_end(&event);
            return Ok(vec![event]);
        }

        self.warnings.issue_count("overlap")?;
        match self.mode {
            OverlapMode::Warn => {
                self.record_end(&event);
                Ok(vec![event])
            }
            OverlapMode::Drop => {
                self.warnings.issue_count("dropped")?;
                Ok(Vec::new())
            }
            OverlapMode::Shift => {
                let end = self.last_end[&lane];
                event.ts = end;
                self.record_end(&event);
                Ok(vec![event])
            }
            OverlapMode::Tid => {
                event.tid = Tid::Int(event.tid.as_i64() + OVERFLOW_LANE_OFFSET);
                self.record_end(&event);
                Ok(vec![event])
            }
            OverlapMode::Async => {
                self.async_id_seq += 1;
                let mut begin = event.clone();
                begin.ph = Phase::AsyncBegin;
                begin.id = Some(self.async_id_seq);
                begin.dur = None;
                let mut end = event;
                end.ph = Phase::AsyncEnd;
                end.id = Some(self.async_id_seq);
                end.ts = end.end_ts();
                end.dur = None;
                Ok(vec![begin, end])
            }
        }
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        self.warnings.drain_diagnostics("OVLP")
    }
}
