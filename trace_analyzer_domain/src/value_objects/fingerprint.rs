// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Kernel Stream Fingerprints
//!
//! A [`Fingerprint`] condenses an ordered stream of kernel names into a
//! bounded, order-preserving token string plus aggregate `(time, count)`
//! data. Observed per-job streams are matched against ideal-cycle tables
//! by [`Fingerprint::similarity`].
//!
//! The token for a kernel is `hash(name) mod 65535`. The small modulus is
//! intentionally collision-prone; the similarity scoring depends on it, so
//! do not swap in a wider digest.

use crate::entities::trace_event::stable_hash;
use regex::Regex;

/// Token bound for fingerprints of observed kernel streams.
pub const OBSERVED_FINGERPRINT_LIMIT: usize = 30;

/// Token bound for fingerprints of ideal-cycle tables.
pub const TABLE_FINGERPRINT_LIMIT: usize = 500;

/// Similarity below which a best match is reported as uncertain.
pub const MATCH_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Score distance below which the two best matches are ambiguous.
pub const MATCH_AMBIGUITY_MARGIN: f64 = 0.2;

/// Bounded, order-preserving hash of a kernel-name stream.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    data: String,
    tokens: usize,
    limit: usize,
    count: usize,
    total_time: f64,
    include: Option<Regex>,
}

impl Fingerprint {
    /// Creates a fingerprint with the given token bound.
    pub fn new(limit: usize) -> Self {
        Fingerprint {
            data: String::new(),
            tokens: 0,
            limit,
            count: 0,
            total_time: 0.0,
            include: None,
        }
    }

    /// Restricts which names contribute (names not matching are ignored
    /// entirely, including the time/count aggregates).
    pub fn with_filter(mut self, include: Regex) -> Self {
        self.include = Some(include);
        self
    }

    /// Adds one kernel occurrence with its observed duration (or ideal
    /// time for table fingerprints).
    pub fn add(&mut self, name: &str, time: f64) {
        if let Some(filter) = &self.include {
            if !filter.is_match(name) {
                return;
            }
        }
        self.count += 1;
        self.total_time += time;
        if self.tokens < self.limit {
            if !self.data.is_empty() {
                self.data.push('_');
            }
            self.data.push_str(&(stable_hash(name) % 65535).to_string());
            self.tokens += 1;
        }
    }

    /// Overrides the aggregate time (table fingerprints derive it from
    /// total cycles once the core frequency is known).
    pub fn set_total_time(&mut self, total_time: f64) {
        self.total_time = total_time;
    }

    /// The `_`-joined token string.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Number of contributions (not bounded by the token limit).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Aggregate time of all contributions.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Drops all accumulated state, keeping limit and filter.
    pub fn reset(&mut self) {
        self.data.clear();
        self.tokens = 0;
        self.count = 0;
        self.total_time = 0.0;
    }

    /// Weighted similarity of an observed stream against a table.
    ///
    /// Three components, each weighted 0.5:
    /// - token containment: 1.0 when the table data contains the observed
    ///   data as a substring, 0.5 otherwise;
    /// - count ratio `observed/table`, zeroed when the observed stream is
    ///   longer than the table;
    /// - time ratio `table/observed`, zeroed when the table time exceeds
    ///   the observed time.
    ///
    /// The maximum score is therefore 1.5.
    pub fn similarity(observed: &Fingerprint, table: &Fingerprint) -> f64 {
        let containment = if !observed.data.is_empty() && table.data.contains(&observed.data) {
            1.0
        } else {
            0.5
        };

        let count_score = if table.count > 0 && observed.count <= table.count {
            observed.count as f64 / table.count as f64
        } else {
            0.0
        };

        let time_score = if observed.total_time > 0.0 && table.total_time <= observed.total_time {
            table.total_time / observed.total_time
        } else {
            0.0
        };

        0.5 * containment + 0.5 * count_score + 0.5 * time_score
    }
}
