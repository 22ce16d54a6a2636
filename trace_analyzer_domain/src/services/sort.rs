// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sort Stage
//!
//! Buckets events by (pid, tid) - or into one global bucket - and stably
//! sorts each bucket by a composite key during the drain. Events whose
//! phase is excluded by the type filter, or which lack the primary key
//! field, pass through untouched.
//!
//! This is the only stage allowed to reorder events; buckets are emitted
//! in arbitrary order, matching the pipeline's cross-queue guarantee.

use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::hash_queue::{HashQueues, QueueKey};
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::sort_key::SortKey;

/// The sort stage (C7).
pub struct SortStage {
    event_types: Option<Vec<Phase>>,
    key: SortKey,
    global_sort: bool,
    queues: HashQueues<Vec<TraceEvent>>,
}

impl SortStage {
    pub fn new(event_types: Option<Vec<Phase>>, key: SortKey, global_sort: bool) -> Self {
        SortStage {
            event_types,
            key,
            global_sort,
            queues: HashQueues::new(),
        }
    }

    fn queue_key(&self, event: &TraceEvent) -> QueueKey {
        if self.global_sort {
            QueueKey::Global
        } else {
            QueueKey::by_pid_tid(event)
        }
    }
}

impl PipelineStage for SortStage {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn tag(&self) -> &'static str {
        "SORT"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if let Some(types) = &self.event_types {
            if !types.contains(&event.ph) {
                return Ok(vec![event]);
            }
        }
        if !self.key.applies_to(&event) {
            return Ok(vec![event]);
        }
        let key = self.queue_key(&event);
        self.queues.bucket(key).push(event);
        Ok(Vec::new())
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        // no cross-queue ordering is promised; emitting buckets in key
        // order keeps repeated runs byte-identical
        let mut buckets = self.queues.take_all();
        buckets.sort_by(|a, b| a.0.cmp(&b.0));

        let mut drained = Vec::new();
        for (_, mut bucket) in buckets {
            bucket.sort_by(|a, b| self.key.compare(a, b));
            drained.append(&mut bucket);
        }
        Ok(drained)
    }
}
