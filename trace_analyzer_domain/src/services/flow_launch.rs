// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Launch Flow Stage
//!
//! Builds launch→kernel→schedule-wait flow arrows. During collection,
//! each correlation id accumulates a record of
//! `{src, launch, schedwait, last_ts, last_pid_tid}`:
//!
//! - `src`: the flow-start (`ph=s`) event that named the correlation;
//! - `launch`: the `Launch…ControlBlock` event with that correlation;
//! - `schedwait`: the matching `ScheduleWait` event;
//! - `last_ts`/`last_pid_tid`: advanced by every kernel event, bounded
//!   by the schedule-wait end (later events warn and are ignored).
//!
//! The apply pass duplicates the source flow for every kernel event
//! (flow start at the source, flow finish at the kernel with `bp=e`),
//! and the drain finally connects the last kernel to the schedule-wait
//! end. Fresh flow ids are allocated above the largest observed
//! correlation id to avoid collisions.

use crate::entities::trace_event::{Phase, Tid, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::barrier::TwoPhaseBuffer;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::trace_warning::{TraceWarning, WarnValue, WarningSet};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static LAUNCH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Launch.*ControlBlock").expect("regex"));

/// Keeps events on the kernel stream slightly ahead of the boundary.
const KERNEL_END_EPSILON: f64 = 0.001;

#[derive(Debug, Default)]
struct CorrelationRecord {
    src: Option<TraceEvent>,
    schedwait: Option<TraceEvent>,
    last_ts: f64,
    last_pid_tid: (i64, Tid),
}

/// The launch-flow stage (C8).
pub struct LaunchFlowStage {
    records: HashMap<i64, CorrelationRecord>,
    flow_id_seq: i64,
    barrier: TwoPhaseBuffer,
    warnings: WarningSet,
}

impl LaunchFlowStage {
    pub fn new() -> Result<Self, AnalysisError> {
        let mut warnings = WarningSet::new();
        warnings.add(TraceWarning::new(
            "out_of_range",
            "Ignored {count} kernel events ending after their schedule wait.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);
        Ok(LaunchFlowStage {
            records: HashMap::new(),
            flow_id_seq: 0,
            barrier: TwoPhaseBuffer::new(),
            warnings,
        })
    }

    fn record(&mut self, id: i64, event: &TraceEvent) -> &mut CorrelationRecord {
        self.records.entry(id).or_insert_with(|| CorrelationRecord {
            src: None,
            schedwait: None,
            last_ts: event.ts,
            last_pid_tid: (event.pid, event.tid.clone()),
        })
    }

    fn track_max_flow_id(&mut self, observed: i64) {
        self.flow_id_seq = self.flow_id_seq.max(observed);
    }

    fn next_flow_id(&mut self) -> i64 {
        self.flow_id_seq += 1;
        self.flow_id_seq
    }

    fn collect(&mut self, event: &TraceEvent) -> Result<(), AnalysisError> {
        if event.ph == Phase::FlowStart {
            if let Some(id) = event.id {
                let source = event.clone();
                self.record(id, event).src = Some(source);
            }
            return Ok(());
        }

        if event.ph != Phase::Complete {
            return Ok(());
        }
        let Some(id) = event.arg_i64("correlation") else {
            return Ok(());
        };
        if id == 0 {
            return Ok(());
        }

        if LAUNCH_PATTERN.is_match(&event.name) {
            self.track_max_flow_id(id);
            self.record(id, event);
        } else if event.name.contains("ScheduleWait") {
            self.track_max_flow_id(id);
            let waiter = event.clone();
            self.record(id, event).schedwait = Some(waiter);
        } else if event.cat.as_deref() == Some("kernel") {
            self.track_max_flow_id(id);
            self.update_last_ts(id, event)?;
        }
        Ok(())
    }

    fn update_last_ts(&mut self, id: i64, event: &TraceEvent) -> Result<(), AnalysisError> {
        let last_ts = event.end_ts() - KERNEL_END_EPSILON;
        let record = self.record(id, event);
        let sched_end = record
            .schedwait
            .as_ref()
            .map(TraceEvent::end_ts)
            .unwrap_or(last_ts);

        if last_ts <= sched_end && last_ts > record.last_ts {
            record.last_ts = last_ts;
            record.last_pid_tid = (event.pid, event.tid.clone());
        } else if last_ts > sched_end {
            self.warnings.issue_count("out_of_range")?;
        }
        Ok(())
    }

    /// Flow pair connecting the correlation's source to a kernel event.
    fn flows_for_kernel(&mut self, event: &TraceEvent) -> Vec<TraceEvent> {
        let is_kernel = event.ph == Phase::Complete
            && event.cat.as_deref() == Some("kernel")
            && event.arg_i64("correlation").is_some();
        if !is_kernel {
            return Vec::new();
        }
        let id = event.arg_i64("correlation").unwrap_or(0);
        let Some(source) = self.records.get(&id).and_then(|r| r.src.clone()) else {
            return Vec::new();
        };

        let flow_id = self.next_flow_id();
        let start = TraceEvent::flow(
            Phase::FlowStart,
            source.pid,
            source.tid.as_i64(),
            &source.name,
            source.cat.as_deref(),
            source.ts,
            flow_id,
        );
        let mut finish = TraceEvent::flow(
            Phase::FlowFinish,
            event.pid,
            event.tid.as_i64(),
            &source.name,
            source.cat.as_deref(),
            event.ts,
            flow_id,
        );
        finish.bp = Some("e".to_string());
        vec![start, finish]
    }

    /// Flows from each correlation's last kernel to its schedule-wait end.
    fn schedwait_flows(&mut self) -> Vec<TraceEvent> {
        let mut ids: Vec<i64> = self
            .records
            .iter()
            .filter(|(_, r)| r.src.is_some() && r.schedwait.is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();

        let mut flows = Vec::new();
        for id in ids {
            let flow_id = self.next_flow_id();
            let record = &self.records[&id];
            let source = record.src.as_ref().cloned();
            let waiter = record.schedwait.as_ref().cloned();
            let (Some(source), Some(waiter)) = (source, waiter) else {
                continue;
            };
            let start = TraceEvent::flow(
                Phase::FlowStart,
                record.last_pid_tid.0,
                record.last_pid_tid.1.as_i64(),
                &source.name,
                source.cat.as_deref(),
                record.last_ts,
                flow_id,
            );
            let mut finish = TraceEvent::flow(
                Phase::FlowFinish,
                waiter.pid,
                waiter.tid.as_i64(),
                &source.name,
                source.cat.as_deref(),
                waiter.end_ts(),
                flow_id,
            );
            finish.bp = Some("e".to_string());
            flows.push(start);
            flows.push(finish);
        }
        flows
    }
}

impl PipelineStage for LaunchFlowStage {
    fn name(&self) -> &'static str {
        "launch_flow"
    }

    fn tag(&self) -> &'static str {
        "FLOWS"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        self.collect(&event)?;
        self.barrier.push(event);
        Ok(Vec::new())
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        let events = self.barrier.take();
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let flows = self.flows_for_kernel(&event);
            out.push(event);
            out.extend(flows);
        }
        out.extend(self.schedwait_flows());
        Ok(out)
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        self.warnings.drain_diagnostics("FLOWS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_event(ts: f64, dur: f64, correlation: i64, pid: i64, tid: i64) -> TraceEvent {
        let mut event = TraceEvent::complete("sen_add Cmpt Exec", ts, dur, pid, tid);
        event.cat = Some("kernel".to_string());
        event.set_arg("correlation", correlation);
        event
    }

    fn flow_start(id: i64, pid: i64, tid: i64, ts: f64) -> TraceEvent {
        TraceEvent::flow(Phase::FlowStart, pid, tid, "launch", Some("launch"), ts, id)
    }

    fn run(stage: &mut LaunchFlowStage, events: Vec<TraceEvent>) -> Vec<TraceEvent> {
        for event in events {
            assert!(stage.process(event).unwrap().is_empty());
        }
        stage.drain().unwrap()
    }

    #[test]
    fn test_kernel_with_source_gets_flow_pair() {
        let mut stage = LaunchFlowStage::new().unwrap();
        let out = run(
            &mut stage,
            vec![flow_start(42, 1, 1, 100.0), kernel_event(200.0, 5.0, 42, 1, 2)],
        );

        let starts: Vec<&TraceEvent> =
            out.iter().filter(|e| e.ph == Phase::FlowStart && e.id != Some(42)).collect();
        let finishes: Vec<&TraceEvent> =
            out.iter().filter(|e| e.ph == Phase::FlowFinish).collect();
        assert_eq!(starts.len(), 1);
        assert_eq!(finishes.len(), 1);

        let finish = finishes[0];
        assert_eq!(finish.ts, 200.0);
        assert_eq!(finish.bp.as_deref(), Some("e"));
        // fresh id, above the observed correlation ids
        assert!(finish.id.unwrap() > 42);
        assert_eq!(finish.id, starts[0].id);
        // original events survive
        assert!(out.iter().any(|e| e.ph == Phase::Complete));
    }

    #[test]
    fn test_kernel_without_source_gets_nothing() {
        let mut stage = LaunchFlowStage::new().unwrap();
        let out = run(&mut stage, vec![kernel_event(200.0, 5.0, 7, 1, 2)]);
        assert!(out.iter().all(|e| e.ph == Phase::Complete));
    }

    #[test]
    fn test_schedwait_flow_from_last_kernel() {
        let mut stage = LaunchFlowStage::new().unwrap();
        let mut schedwait = TraceEvent::complete("ScheduleWait", 300.0, 10.0, 1, 1);
        schedwait.set_arg("correlation", 42);

        let out = run(
            &mut stage,
            vec![
                flow_start(42, 1, 1, 100.0),
                schedwait,
                kernel_event(200.0, 5.0, 42, 1, 2),
                kernel_event(210.0, 5.0, 42, 1, 2),
            ],
        );

        // final flow ends at the schedule-wait end
        let last_finish = out
            .iter()
            .filter(|e| e.ph == Phase::FlowFinish)
            .last()
            .unwrap();
        assert_eq!(last_finish.ts, 310.0);

        // its start sits on the kernel stream at the last kernel end
        let last_start = out
            .iter()
            .filter(|e| e.ph == Phase::FlowStart && e.id == last_finish.id)
            .last()
            .unwrap();
        assert_eq!(last_start.tid, Tid::Int(2));
        assert!((last_start.ts - (215.0 - KERNEL_END_EPSILON)).abs() < 1e-9);
    }

    #[test]
    fn test_kernel_after_schedwait_is_ignored_with_warning() {
        let mut stage = LaunchFlowStage::new().unwrap();
        let mut schedwait = TraceEvent::complete("ScheduleWait", 300.0, 10.0, 1, 1);
        schedwait.set_arg("correlation", 42);

        run(
            &mut stage,
            vec![
                flow_start(42, 1, 1, 100.0),
                schedwait,
                kernel_event(200.0, 5.0, 42, 1, 2),
                kernel_event(400.0, 5.0, 42, 1, 2), // past the wait end
            ],
        );
        let diagnostics = stage.finalize();
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("Ignored 1 kernel events")));
    }

    #[test]
    fn test_zero_correlation_is_skipped() {
        let mut stage = LaunchFlowStage::new().unwrap();
        let out = run(&mut stage, vec![kernel_event(10.0, 1.0, 0, 1, 1)]);
        assert_eq!(out.len(), 1);
        assert!(stage.records.is_empty());
    }
}
