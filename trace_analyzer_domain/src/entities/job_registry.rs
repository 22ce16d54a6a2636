// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Registry
//!
//! One analyzer run ingests one or more trace files ("jobs"). Each event
//! is stamped with a `jobhash` - `hash(source_uri) mod 10000` - so every
//! downstream stage can recover the source file name and its dialect.
//!
//! The registry is populated during ingestion and frozen before the
//! pipeline runs; stages receive it as `Arc<JobRegistry>` and treat it as
//! read-only configuration.

use crate::entities::dialect::DialectKind;
use crate::entities::trace_event::stable_hash;
use std::collections::HashMap;
use std::path::Path;

/// Per-job bookkeeping: source file name and input dialect.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub file_name: String,
    pub dialect: DialectKind,
}

/// Maps `jobhash` to job metadata for the whole run.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<u64, JobInfo>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry::default()
    }

    /// Registers a source URI and returns its jobhash.
    ///
    /// Re-registering the same URI is a no-op returning the same hash;
    /// the first dialect wins.
    pub fn add_job(&mut self, source_uri: &str, dialect: DialectKind) -> u64 {
        let jobhash = stable_hash(source_uri) % 10000;
        self.jobs.entry(jobhash).or_insert_with(|| JobInfo {
            file_name: Path::new(source_uri)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| source_uri.to_string()),
            dialect,
        });
        jobhash
    }

    /// Source file name for a jobhash; unknown jobs read as
    /// `"Not Available"` (annotation must not fail the pipeline).
    pub fn job_name(&self, jobhash: u64) -> &str {
        self.jobs
            .get(&jobhash)
            .map(|j| j.file_name.as_str())
            .unwrap_or("Not Available")
    }

    /// Dialect for a jobhash; unknown jobs fall back to FLEX, the
    /// dialect whose predicates are purely name-based.
    pub fn dialect_of(&self, jobhash: u64) -> DialectKind {
        self.jobs
            .get(&jobhash)
            .map(|j| j.dialect)
            .unwrap_or(DialectKind::Flex)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobhash_is_bounded_and_stable() {
        let mut registry = JobRegistry::new();
        let a = registry.add_job("/data/run1/trace_rank0.json", DialectKind::Flex);
        let b = registry.add_job("/data/run1/trace_rank0.json", DialectKind::Torch);

        assert!(a < 10000);
        assert_eq!(a, b);
        // first registration wins
        assert_eq!(registry.dialect_of(a), DialectKind::Flex);
        assert_eq!(registry.job_name(a), "trace_rank0.json");
    }

    #[test]
    fn test_unknown_jobhash_defaults() {
        let registry = JobRegistry::new();
        assert_eq!(registry.job_name(1234), "Not Available");
        assert_eq!(registry.dialect_of(1234), DialectKind::Flex);
    }
}
