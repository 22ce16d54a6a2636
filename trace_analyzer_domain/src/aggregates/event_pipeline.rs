// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Event Pipeline Aggregate
//!
//! The driver owning the ordered stage list. Execution is a plain
//! single-threaded loop:
//!
//! ```text
//! for event in ingest:
//!     batch = [event]
//!     for stage in stages:
//!         batch = flatmap(stage.process(e) for e in batch)
//!     emit(batch)
//! for i in 0..N:
//!     batch = stages[i].drain()
//!     for stage in stages[i+1..]:
//!         batch = flatmap(stage.process(e) for e in batch)
//!     emit(batch)
//! ```
//!
//! Drained events from stage `i` flow through stages `i+1..N` exactly as
//! if they had been ingested, which is what lets two-phase stages replay
//! their buffered, transformed events through the rest of the pipeline.
//!
//! ## Ordering Guarantee
//!
//! Within a single (pid, tid) queue, stages preserve insertion order;
//! only the sort stage reorders. Across queues nothing is guaranteed.
//!
//! ## Failure Policy
//!
//! A failing stage aborts the run; the error carries the stage name and
//! the offending event. Non-fatal anomalies go through the warning
//! accumulators and surface as finalize-time diagnostics.
//!
//! ## Cancellation
//!
//! Cooperative and coarse-grained: when a shutdown flag is attached, it
//! is polled between input events and the run ends with
//! [`AnalysisError::Aborted`].

use crate::entities::trace_event::TraceEvent;
use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordered, exclusively-owned list of pipeline stages.
pub struct EventPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl Default for EventPipeline {
    fn default() -> Self {
        EventPipeline::new()
    }
}

impl EventPipeline {
    pub fn new() -> Self {
        EventPipeline {
            stages: Vec::new(),
            shutdown: None,
        }
    }

    /// Attaches a cooperative shutdown flag polled between events.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Appends a stage; registration order is execution order.
    pub fn add_stage(&mut self, stage: Box<dyn PipelineStage>) {
        self.stages.push(stage);
    }

    /// Names of the registered stages, in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the full pipeline over the input, emitting every event that
    /// leaves the last stage. Returns the finalize-time diagnostics of
    /// all stages, in stage order.
    pub fn run(
        &mut self,
        events: impl IntoIterator<Item = TraceEvent>,
        emit: &mut dyn FnMut(TraceEvent),
    ) -> Result<Vec<Diagnostic>, AnalysisError> {
        for event in events {
            if let Some(flag) = &self.shutdown {
                if flag.load(Ordering::Relaxed) {
                    return Err(AnalysisError::Aborted);
                }
            }
            Self::flow_through(&mut self.stages, vec![event], emit)?;
        }

        for i in 0..self.stages.len() {
            let (head, tail) = self.stages.split_at_mut(i + 1);
            let stage = &mut head[i];
            let drained = stage
                .drain()
                .map_err(|e| e.in_stage(stage.name(), "<drain>".to_string()))?;
            Self::flow_through(tail, drained, emit)?;
        }

        let mut diagnostics = Vec::new();
        for stage in &mut self.stages {
            diagnostics.extend(stage.finalize());
        }
        Ok(diagnostics)
    }

    fn flow_through(
        stages: &mut [Box<dyn PipelineStage>],
        batch: Vec<TraceEvent>,
        emit: &mut dyn FnMut(TraceEvent),
    ) -> Result<(), AnalysisError> {
        let mut current = batch;
        for stage in stages.iter_mut() {
            if current.is_empty() {
                return Ok(());
            }
            let mut next = Vec::with_capacity(current.len());
            for event in current {
                let summary = event.summary();
                let produced = stage
                    .process(event)
                    .map_err(|e| e.in_stage(stage.name(), summary))?;
                next.extend(produced);
            }
            current = next;
        }
        for event in current {
            emit(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::barrier::TwoPhaseBuffer;
    use crate::pipeline::diagnostic::Diagnostic;

    /// Doubles every event's ts; emits one diagnostic at finalize.
    struct DoubleTs;

    impl PipelineStage for DoubleTs {
        fn name(&self) -> &'static str {
            "double_ts"
        }
        fn tag(&self) -> &'static str {
            "TEST"
        }
        fn process(&mut self, mut event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
            event.ts *= 2.0;
            Ok(vec![event])
        }
        fn finalize(&mut self) -> Vec<Diagnostic> {
            vec![Diagnostic::info("TEST", "done")]
        }
    }

    /// Buffers everything, emits on drain (a degenerate two-phase stage).
    struct HoldAll {
        barrier: TwoPhaseBuffer,
    }

    impl PipelineStage for HoldAll {
        fn name(&self) -> &'static str {
            "hold_all"
        }
        fn tag(&self) -> &'static str {
            "TEST"
        }
        fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
            self.barrier.push(event);
            Ok(Vec::new())
        }
        fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
            Ok(self.barrier.take())
        }
    }

    fn run_pipeline(
        pipeline: &mut EventPipeline,
        events: Vec<TraceEvent>,
    ) -> (Vec<TraceEvent>, Vec<Diagnostic>) {
        let mut out = Vec::new();
        let diagnostics = pipeline.run(events, &mut |e| out.push(e)).unwrap();
        (out, diagnostics)
    }

    #[test]
    fn test_drained_events_pass_through_downstream_stages() {
        let mut pipeline = EventPipeline::new();
        pipeline.add_stage(Box::new(HoldAll {
            barrier: TwoPhaseBuffer::new(),
        }));
        pipeline.add_stage(Box::new(DoubleTs));

        let events = vec![
            TraceEvent::complete("a", 1.0, 0.0, 0, 0),
            TraceEvent::complete("b", 2.0, 0.0, 0, 0),
        ];
        let (out, diagnostics) = run_pipeline(&mut pipeline, events);

        // both events were held back, then drained through DoubleTs
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].ts, 2.0);
        assert_eq!(out[1].ts, 4.0);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_order_preserved_within_stream() {
        let mut pipeline = EventPipeline::new();
        pipeline.add_stage(Box::new(DoubleTs));

        let events: Vec<TraceEvent> = (0..10)
            .map(|i| TraceEvent::complete(&format!("e{i}"), i as f64, 0.0, 0, 0))
            .collect();
        let (out, _) = run_pipeline(&mut pipeline, events);
        let names: Vec<&str> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names[0], "e0");
        assert_eq!(names[9], "e9");
    }

    #[test]
    fn test_shutdown_flag_aborts_between_events() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut pipeline = EventPipeline::new().with_shutdown_flag(flag);
        pipeline.add_stage(Box::new(DoubleTs));

        let mut out = Vec::new();
        let result = pipeline.run(
            vec![TraceEvent::complete("a", 1.0, 0.0, 0, 0)],
            &mut |e| out.push(e),
        );
        assert!(matches!(result, Err(AnalysisError::Aborted)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_stage_error_names_stage_and_event() {
        struct Failing;
        impl PipelineStage for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn tag(&self) -> &'static str {
                "TEST"
            }
            fn process(&mut self, _event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
                Err(AnalysisError::InvalidEvent("boom".to_string()))
            }
        }

        let mut pipeline = EventPipeline::new();
        pipeline.add_stage(Box::new(Failing));
        let mut sink = |_e: TraceEvent| {};
        let err = pipeline
            .run(vec![TraceEvent::complete("bad", 0.0, 0.0, 0, 0)], &mut sink)
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("failing"));
        assert!(rendered.contains("bad"));
    }
}
