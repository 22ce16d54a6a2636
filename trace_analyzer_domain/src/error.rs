// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error Types
//!
//! This module defines the error currency of the domain layer. Every
//! fallible domain operation returns [`AnalysisError`], which the
//! application layer maps to exit codes and log lines.
//!
//! ## Error Categories
//!
//! - **Fatal**: malformed input, broken invariants with `ignore_crit`
//!   unset (e.g. [`AnalysisError::Monotonicity`])
//! - **Configuration**: invalid dialect predicates, sort keys, warning
//!   definitions, stage profiles
//! - **Wrapped**: [`AnalysisError::Stage`] attaches the stage name and
//!   the offending event to an inner error as it crosses the pipeline
//!   driver
//!
//! Soft (non-fatal) anomalies never surface as errors; they accumulate in
//! [`crate::value_objects::trace_warning::TraceWarning`] counters instead.

use thiserror::Error;

/// Errors produced by the trace-analysis domain.
///
/// All domain services and pipeline stages use this enum; the application
/// layer decides whether an error is fatal and which exit code it maps to.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// An event was structurally unusable for the requested operation.
    #[error("invalid trace event: {0}")]
    InvalidEvent(String),

    /// The TS1..TS5 cycle sequence stayed non-monotonic after both the
    /// local and the global overflow correction.
    #[error("cycle sequence not monotonic after correction: {0}")]
    Monotonicity(String),

    /// A dialect table entry could not be compiled into a predicate.
    #[error("invalid dialect predicate '{entry}': {reason}")]
    InvalidPredicate { entry: String, reason: String },

    /// A warning definition violated the template/data/reducer key
    /// agreement rules.
    #[error("invalid warning definition '{name}': {reason}")]
    InvalidWarning { name: String, reason: String },

    /// A composite sort key string could not be parsed.
    #[error("invalid sort key '{key}': {reason}")]
    InvalidSortKey { key: String, reason: String },

    /// The compiler log contained an ideal-cycle section the parser could
    /// not accept.
    #[error("compiler log error: {0}")]
    CompilerLog(String),

    /// Two ideal-cycle tables produced the same fingerprint; matching by
    /// similarity would be ambiguous by construction.
    #[error("fingerprint of ideal-cycle table already registered: {0}")]
    DuplicateTable(String),

    /// Bad user-supplied configuration (filters, limits, frequencies).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No job registry entry exists for the given jobhash.
    #[error("no job registered under jobhash {0}")]
    UnknownJob(u64),

    /// The shutdown flag was raised; processing stopped between events.
    #[error("pipeline aborted by shutdown request")]
    Aborted,

    /// Wrapper added by the pipeline driver: names the failing stage and
    /// carries a short rendering of the event that triggered the failure.
    #[error("stage '{stage}' failed on event {event}: {source}")]
    Stage {
        stage: &'static str,
        event: String,
        #[source]
        source: Box<AnalysisError>,
    },
}

impl AnalysisError {
    /// Wraps an error with pipeline-stage context.
    ///
    /// Used exclusively by the driver so stage implementations stay free
    /// of self-referential naming.
    pub fn in_stage(self, stage: &'static str, event: String) -> Self {
        AnalysisError::Stage {
            stage,
            event,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapper_preserves_source() {
        let inner = AnalysisError::Monotonicity("TS3 < TS2".to_string());
        let wrapped = inner.in_stage("normalize", "{\"ph\":\"X\"}".to_string());

        let rendered = wrapped.to_string();
        assert!(rendered.contains("normalize"));
        assert!(rendered.contains("TS3 < TS2"));
    }
}
