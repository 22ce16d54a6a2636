// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Utilization Engine
//!
//! Matches the observed kernel stream of every job against the
//! ideal-cycle tables extracted from the compiler log(s) and derives the
//! PT-active utilization of each compute event.
//!
//! ## Matching
//!
//! While collecting, every `Cmpt Exec` event feeds its job's observed
//! [`Fingerprint`]. At the barrier, each job picks the table with the
//! highest [`Fingerprint::similarity`] score; sub-threshold best scores
//! and near-ties between the two best candidates are reported as
//! uncertain/ambiguous matches.
//!
//! Multi-AIU runs pass one compiler log per rank; events then select
//! their rank's table set by pid. Single-log runs fold every pid onto
//! rank 0.
//!
//! ## Per-Kernel Utilization
//!
//! `utilization = (ideal_cycles / core_freq) / dur`, clamped to [0, 1]
//! (>100% increments a warning counter). Each matched event is annotated
//! with `args["pt_active"]` and `args["user_cat"]`, and emits a pair of
//! `PT Active` percent counters at `ts` and `ts + dur`.
//!
//! ## Roll-Up
//!
//! `(duration, ideal, calls)` accumulate per (pid, matched table,
//! category) plus a `Total` row; the finished [`CategoryReport`] is
//! published through a shared sink because rendering and file output
//! belong to the application layer.

use crate::entities::ideal_cycle_table::{CompilerLogTables, IdealCycleTable, PhaseLabel};
use crate::entities::trace_event::{Phase, TraceEvent};
use crate::error::AnalysisError;
use crate::pipeline::barrier::TwoPhaseBuffer;
use crate::pipeline::diagnostic::Diagnostic;
use crate::pipeline::stage::PipelineStage;
use crate::value_objects::fingerprint::{
    Fingerprint, MATCH_AMBIGUITY_MARGIN, MATCH_CONFIDENCE_THRESHOLD, OBSERVED_FINGERPRINT_LIMIT,
};
use crate::value_objects::trace_warning::{TraceWarning, WarnValue, WarningSet};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Counter name/unit of the PT-active track.
pub const PT_UTIL_COUNTER_NAME: &str = "PT Active";
pub const PT_UTIL_COUNTER_UNIT: &str = "Percent";

/// One row of the category roll-up table.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub pid: i64,
    pub phase: String,
    pub category: String,
    pub kernel_time: f64,
    pub frac_time: f64,
    pub calls: u64,
    pub ideal_time: f64,
    pub ideal_cycles: f64,
    pub frac_ideal: f64,
    pub pt_util: f64,
}

/// The finished roll-up, sorted by (pid, phase, kernel_time).
#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub rows: Vec<CategoryRow>,
}

/// Shared handle the application reads after the pipeline finishes.
pub type CategoryReportSink = Arc<Mutex<CategoryReport>>;

/// Configuration for [`UtilizationStage`].
#[derive(Debug, Clone)]
pub struct UtilizationConfig {
    /// Core (PT array) clock frequency in MHz; ideal cycles live in this
    /// clock domain.
    pub core_frequency: f64,
}

/// Identifies a matched table: (rank, table index).
type TableId = (usize, usize);

#[derive(Debug, Default)]
struct Accumulated {
    duration: f64,
    ideal: f64,
    calls: u64,
}

/// The utilization stage (C9).
pub struct UtilizationStage {
    core_frequency: f64,
    rank_tables: Vec<Vec<IdealCycleTable>>,
    multi_log: bool,
    observed: HashMap<u64, Fingerprint>,
    job_pid: HashMap<u64, i64>,
    job_table: HashMap<u64, TableId>,
    accum: HashMap<(i64, Option<TableId>, String), Accumulated>,
    warnings: WarningSet,
    notes: Vec<Diagnostic>,
    barrier: TwoPhaseBuffer,
    sink: CategoryReportSink,
}

impl UtilizationStage {
    /// Builds the stage from the already-read text of one compiler log
    /// per rank (a single entry means single-AIU).
    pub fn new(
        compiler_logs: &[String],
        config: UtilizationConfig,
        sink: CategoryReportSink,
    ) -> Result<Self, AnalysisError> {
        if config.core_frequency <= 0.0 {
            return Err(AnalysisError::InvalidConfiguration(
                "core frequency must be positive".to_string(),
            ));
        }

        let mut notes = Vec::new();
        let mut rank_tables = Vec::new();
        let mut autopilot = false;
        for text in compiler_logs {
            let mut parsed = CompilerLogTables::parse(text)?;
            notes.append(&mut parsed.notes);
            autopilot |= parsed.autopilot;
            for table in &mut parsed.tables {
                let ideal_time = table.total_cycles as f64 / config.core_frequency;
                table.fingerprint.set_total_time(ideal_time);
            }
            rank_tables.push(parsed.tables);
        }
        if autopilot {
            notes.push(Diagnostic::warning(
                "UTL",
                "Detected autopilot=1 in a compiler log; its ideal-cycle data is unusable.",
            ));
        }
        let table_count: usize = rank_tables.iter().map(Vec::len).sum();
        if table_count > 1 {
            notes.push(Diagnostic::warning(
                "UTL",
                format!(
                    "{table_count} tables with ideal cycles have been detected. \
                     Utilization results should be inspected carefully!"
                ),
            ));
        }
        let multi_log = compiler_logs.len() > 1;
        if multi_log {
            notes.push(Diagnostic::info(
                "UTL",
                format!("Multi-AIU logs provided. Entries: {}", compiler_logs.len()),
            ));
        }

        let mut warnings = WarningSet::new();
        warnings.add(TraceWarning::new(
            "util_100",
            "Encountered {count} events with >100% utilization.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);
        warnings.add(TraceWarning::new(
            "no_match",
            "No matching ideal-cycles table found for {count} events. This \
             might indicate a wrong frequency setting.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);
        warnings.add(TraceWarning::new(
            "other_cat",
            "Found {count} events without a matching kernel category, \
             accounted for as 'other'.",
            vec![("count".into(), WarnValue::Int(0))],
            vec![],
        )?);

        Ok(UtilizationStage {
            core_frequency: config.core_frequency,
            rank_tables,
            multi_log,
            observed: HashMap::new(),
            job_pid: HashMap::new(),
            job_table: HashMap::new(),
            accum: HashMap::new(),
            warnings,
            notes,
            barrier: TwoPhaseBuffer::new(),
            sink,
        })
    }

    fn is_compute_event(event: &TraceEvent) -> bool {
        event.ph == Phase::Complete
            && event.args.contains_key("TS3")
            && event.name.contains("Cmpt Exec")
    }

    fn rank_of(&self, pid: i64) -> usize {
        if self.multi_log && !self.rank_tables.is_empty() {
            pid.unsigned_abs() as usize % self.rank_tables.len()
        } else {
            0
        }
    }

    fn table(&self, id: TableId) -> Option<&IdealCycleTable> {
        self.rank_tables.get(id.0).and_then(|tables| tables.get(id.1))
    }

    /// Resolves every job's observed fingerprint to its best table.
    fn match_jobs(&mut self) {
        let mut jobs: Vec<u64> = self.observed.keys().copied().collect();
        jobs.sort_unstable();

        for job in jobs {
            let observed = &self.observed[&job];
            let rank = self.rank_of(self.job_pid.get(&job).copied().unwrap_or(0));
            let Some(tables) = self.rank_tables.get(rank) else {
                continue;
            };
            let mut scored: Vec<(f64, usize)> = tables
                .iter()
                .enumerate()
                .map(|(idx, table)| (Fingerprint::similarity(observed, &table.fingerprint), idx))
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

            let Some(&(best_score, best_idx)) = scored.first() else {
                continue;
            };
            self.job_table.insert(job, (rank, best_idx));

            if best_score < MATCH_CONFIDENCE_THRESHOLD {
                self.notes.push(Diagnostic::warning(
                    "UTL",
                    format!(
                        "Uncertain table match for job {job} (score {best_score:.2}); \
                         utilization numbers may be off."
                    ),
                ));
            }
            if let Some(&(second_score, _)) = scored.get(1) {
                if best_score - second_score < MATCH_AMBIGUITY_MARGIN {
                    self.notes.push(Diagnostic::warning(
                        "UTL",
                        format!(
                            "Ambiguous table match for job {job} \
                             (best {best_score:.2}, runner-up {second_score:.2})."
                        ),
                    ));
                }
            }
        }
    }

    fn accumulate(&mut self, pid: i64, table: Option<TableId>, category: &str, dur: f64, ideal: f64) {
        for key in [category, "Total"] {
            let slot = self
                .accum
                .entry((pid, table, key.to_string()))
                .or_default();
            slot.duration += dur;
            slot.ideal += ideal;
            slot.calls += 1;
        }
    }

    /// Annotates one compute event and returns its counter pair.
    fn apply(&mut self, event: &mut TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        let dur = event.dur.unwrap_or(0.0);
        if dur <= 0.0 {
            return Ok(Vec::new());
        }
        let jobhash = event.arg_i64("jobhash").map(|j| j as u64);
        let table_id = jobhash.and_then(|j| self.job_table.get(&j).copied());

        let lookup = table_id.and_then(|id| self.table(id)).map(|table| {
            (
                table.ideal_cycles(&event.name).unwrap_or(0),
                table.category(&event.name).map(str::to_string),
            )
        });
        let (ideal_cycles, category) = match lookup {
            Some((cycles, Some(category))) => (cycles, category),
            Some((cycles, None)) => {
                self.warnings.issue_count("other_cat")?;
                (cycles, "other".to_string())
            }
            None => {
                self.warnings.issue_count("no_match")?;
                (0, "other".to_string())
            }
        };

        let ideal_dur = ideal_cycles as f64 / self.core_frequency;
        let mut utilization = ideal_dur / dur;
        if utilization > 1.0 {
            self.warnings.issue_count("util_100")?;
            utilization = 1.0;
        }

        event.set_arg("pt_active", utilization);
        event.set_arg("user_cat", category.as_str());
        if utilization > 0.0 {
            event.set_arg("core used", true);
        }

        self.accumulate(event.pid, table_id, &category, dur, ideal_dur);

        let mut counters = vec![TraceEvent::counter(
            PT_UTIL_COUNTER_NAME,
            event.ts,
            event.pid,
            PT_UTIL_COUNTER_UNIT,
            utilization * 100.0,
        )];
        if utilization > 0.0 {
            counters.push(TraceEvent::counter(
                PT_UTIL_COUNTER_NAME,
                event.end_ts(),
                event.pid,
                PT_UTIL_COUNTER_UNIT,
                0.0,
            ));
        }
        Ok(counters)
    }

    fn build_report(&self) -> CategoryReport {
        // totals per (pid, table) section drive the fraction columns
        let mut totals: HashMap<(i64, Option<TableId>), (f64, f64)> = HashMap::new();
        for ((pid, table, category), acc) in &self.accum {
            if category == "Total" {
                totals.insert((*pid, *table), (acc.duration, acc.ideal));
            }
        }

        let mut rows = Vec::new();
        for ((pid, table, category), acc) in &self.accum {
            let (total_dur, total_ideal) = totals
                .get(&(*pid, *table))
                .copied()
                .unwrap_or((0.0, 0.0));
            let phase = table
                .and_then(|id| self.table(id))
                .map(|t| t.phase)
                .unwrap_or(PhaseLabel::Unknown);
            rows.push(CategoryRow {
                pid: *pid,
                phase: phase.to_string(),
                category: category.clone(),
                kernel_time: acc.duration,
                frac_time: if total_dur > 0.0 {
                    acc.duration / total_dur
                } else {
                    0.0
                },
                calls: acc.calls,
                ideal_time: acc.ideal,
                ideal_cycles: acc.ideal * self.core_frequency,
                frac_ideal: if total_ideal > 0.0 {
                    acc.ideal / total_ideal
                } else {
                    0.0
                },
                pt_util: if acc.duration > 0.0 {
                    acc.ideal / acc.duration
                } else {
                    0.0
                },
            });
        }
        rows.sort_by(|a, b| {
            (a.pid, &a.phase)
                .cmp(&(b.pid, &b.phase))
                .then(a.kernel_time.partial_cmp(&b.kernel_time).unwrap_or(std::cmp::Ordering::Equal))
        });
        CategoryReport { rows }
    }
}

impl PipelineStage for UtilizationStage {
    fn name(&self) -> &'static str {
        "utilization"
    }

    fn tag(&self) -> &'static str {
        "UTL"
    }

    fn process(&mut self, event: TraceEvent) -> Result<Vec<TraceEvent>, AnalysisError> {
        if Self::is_compute_event(&event) {
            if let Some(jobhash) = event.arg_i64("jobhash") {
                let jobhash = jobhash as u64;
                self.observed
                    .entry(jobhash)
                    .or_insert_with(|| Fingerprint::new(OBSERVED_FINGERPRINT_LIMIT))
                    .add(&event.name, event.dur.unwrap_or(0.0));
                self.job_pid.entry(jobhash).or_insert(event.pid);
            }
        }
        self.barrier.push(event);
        Ok(Vec::new())
    }

    fn drain(&mut self) -> Result<Vec<TraceEvent>, AnalysisError> {
        self.match_jobs();

        let events = self.barrier.take();
        let mut out = Vec::with_capacity(events.len());
        for mut event in events {
            if Self::is_compute_event(&event) && event.arg_i64("jobhash").is_some() {
                let counters = self.apply(&mut event)?;
                out.push(event);
                out.extend(counters);
            } else {
                out.push(event);
            }
        }
        Ok(out)
    }

    fn finalize(&mut self) -> Vec<Diagnostic> {
        if let Ok(mut report) = self.sink.lock() {
            *report = self.build_report();
        }
        let mut diagnostics = std::mem::take(&mut self.notes);
        diagnostics.extend(self.warnings.drain_diagnostics("UTL"));
        diagnostics
    }
}
