// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Stage Trait
//!
//! This module defines the unified trait interface that ALL pipeline
//! processing stages implement, whether they transform events in place
//! (normalization, classification), hold events back (sort, two-phase
//! stages), or synthesize new ones (flows, counters).
//!
//! ## Contract
//!
//! - [`PipelineStage::process`] consumes one event and returns 0..N
//!   events. Returning an empty vector means the event is buffered (or
//!   dropped); multiplying is how derived events enter the stream.
//! - [`PipelineStage::drain`] releases buffered events after the input is
//!   exhausted. The driver feeds drained events through all *downstream*
//!   stages exactly as if they had been ingested.
//! - [`PipelineStage::finalize`] runs after the final drain and returns
//!   the stage's accumulated diagnostics. It replaces destructor-time
//!   reporting, so drop order is never load-bearing.
//!
//! Each stage owns its state exclusively; the only cross-stage channel is
//! the event stream itself.

use crate::entities::trace_event::TraceEvent;
use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;

/// A single transformation step of the event pipeline.
pub trait PipelineStage {
    /// Stable stage name (used in stage profiles and error context).
    fn name(&self) -> &'static str;

    /// Short log-line tag (`NORM`, `OVC`, `CAT`, `UTL`, ...).
    fn tag(&self) -> &'static str;

    /// Transforms one event into zero or more events.
    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError>;

    /// Releases any buffered events once the input is exhausted.
    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        Ok(Vec::new())
    }

    /// Returns accumulated diagnostics; called exactly once by the driver
    /// after the final drain.
    fn finalize(&mut self) -> Vec<Diagnostic> {
        Vec::new()
    }
}
