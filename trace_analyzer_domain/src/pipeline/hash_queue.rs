// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bucketed Stage Queues
//!
//! Most stages keep per-bucket state: per pid, per (pid, tid), per
//! correlation id, or per job. [`HashQueues`] is the shared container;
//! the bucket type is stage-specific ([`Vec<TraceEvent>`] for the sorter,
//! correlation records for the flow builder, epoch references for the
//! normalizer, ...).

use crate::entities::trace_event::{Tid, TraceEvent};
use std::collections::HashMap;

/// Bucket key derivation strategies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueKey {
    Pid(i64),
    PidTid(i64, Tid),
    Correlation(i64),
    Job(u64),
    /// Single bucket for globally scoped stages.
    Global,
}

impl QueueKey {
    pub fn by_pid(event: &TraceEvent) -> QueueKey {
        QueueKey::Pid(event.pid)
    }

    pub fn by_pid_tid(event: &TraceEvent) -> QueueKey {
        QueueKey::PidTid(event.pid, event.tid.clone())
    }

    /// Correlation id from `args["correlation"]`.
    pub fn by_correlation(event: &TraceEvent) -> Option<QueueKey> {
        event.arg_i64("correlation").map(QueueKey::Correlation)
    }

    /// Job hash from `args["jobhash"]`.
    pub fn by_job(event: &TraceEvent) -> Option<QueueKey> {
        event.arg_i64("jobhash").map(|j| QueueKey::Job(j as u64))
    }
}

/// Mapping from bucket key to stage-specific bucket state.
#[derive(Debug)]
pub struct HashQueues<B> {
    queues: HashMap<QueueKey, B>,
}

impl<B> Default for HashQueues<B> {
    fn default() -> Self {
        HashQueues {
            queues: HashMap::new(),
        }
    }
}

impl<B> HashQueues<B> {
    pub fn new() -> Self {
        HashQueues::default()
    }

    pub fn get(&self, key: &QueueKey) -> Option<&B> {
        self.queues.get(key)
    }

    pub fn get_mut(&mut self, key: &QueueKey) -> Option<&mut B> {
        self.queues.get_mut(key)
    }

    pub fn contains(&self, key: &QueueKey) -> bool {
        self.queues.contains_key(key)
    }

    pub fn insert(&mut self, key: QueueKey, bucket: B) -> Option<B> {
        self.queues.insert(key, bucket)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueueKey, &B)> {
        self.queues.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&QueueKey, &mut B)> {
        self.queues.iter_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &B> {
        self.queues.values()
    }

    /// Removes and returns all buckets (drain-time consumption).
    pub fn take_all(&mut self) -> Vec<(QueueKey, B)> {
        self.queues.drain().collect()
    }
}

impl<B: Default> HashQueues<B> {
    /// Bucket for the key, created on first access.
    pub fn bucket(&mut self, key: QueueKey) -> &mut B {
        self.queues.entry(key).or_default()
    }
}
