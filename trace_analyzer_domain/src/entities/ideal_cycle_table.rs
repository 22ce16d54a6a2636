// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ideal-Cycle Tables
//!
//! The compiler log contains zero or more `Ideal/Total Cycles` sections,
//! each listing per-kernel ideal cycle counts for one iteration phase
//! (prefill/decoding). This module parses the log text with a small line
//! state machine and produces one [`IdealCycleTable`] per section, keyed
//! by a kernel-stream [`Fingerprint`] for later matching against observed
//! traces.
//!
//! Parsing is pure text processing; opening the log file is the
//! application layer's job.
//!
//! ## Line State Machine
//!
//! | Transition | Trigger |
//! |------------|---------|
//! | SCAN → ACTIVE_TABLE | `Ideal/Total Cycles` |
//! | ACTIVE_TABLE → SCAN | `====== Perf Summary End ======` |
//! | any | `DECODING` / `PREFILL` labels the *next* table |
//! | terminate | `DSM-AutoPilot BEGIN` (autopilot runs carry no usable tables) |

use crate::error::AnalysisError;
use crate::pipeline::diagnostic::Diagnostic;
use crate::value_objects::fingerprint::{Fingerprint, TABLE_FINGERPRINT_LIMIT};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

static START_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"Ideal/Total Cycles").expect("regex"));
static END_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"====== Perf Summary End ======").expect("regex"));
static CLOCK_SCALING: Lazy<Regex> = Lazy::new(|| Regex::new(r"Ideal Clock Scaling:").expect("regex"));
static DATA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_\-a-zA-Z\d]+  +\d+ *$").expect("regex"));
static IGNORE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Precompute|-LxPreload)").expect("regex"));
static AUTOPILOT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DSM-AutoPilot BEGIN").expect("regex"));

/// Iteration phase a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhaseLabel {
    Unknown,
    /// Time-To-First-Token (prefill) phase.
    Ttft,
    /// Inter-Token-Latency (decoding) phase.
    Itl,
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseLabel::Unknown => f.write_str("-"),
            PhaseLabel::Ttft => f.write_str("TTFT"),
            PhaseLabel::Itl => f.write_str("ITL"),
        }
    }
}

/// One parsed `Ideal/Total Cycles` section.
#[derive(Debug)]
pub struct IdealCycleTable {
    /// `<kernel name> Cmpt Exec` → ideal cycles.
    pub cycles: HashMap<String, u64>,
    /// `<kernel name> Cmpt Exec` → category (`NotAvailable` for `-NA` rows).
    pub categories: HashMap<String, String>,
    /// Iteration phase, when the log labeled it.
    pub phase: PhaseLabel,
    /// Total-row cycles (sum of rows when no `Total` row is present).
    pub total_cycles: u64,
    /// Matching key for observed kernel streams.
    pub fingerprint: Fingerprint,
}

impl IdealCycleTable {
    fn new(phase: PhaseLabel) -> Self {
        IdealCycleTable {
            cycles: HashMap::new(),
            categories: HashMap::new(),
            phase,
            total_cycles: 0,
            fingerprint: Fingerprint::new(TABLE_FINGERPRINT_LIMIT),
        }
    }

    /// Ideal cycles for a kernel (keys carry the ` Cmpt Exec` suffix).
    pub fn ideal_cycles(&self, kernel: &str) -> Option<u64> {
        self.cycles.get(kernel).copied()
    }

    /// Category for a kernel, if the compiler annotated one.
    pub fn category(&self, kernel: &str) -> Option<&str> {
        self.categories.get(kernel).map(String::as_str)
    }
}

/// All tables extracted from one compiler log.
#[derive(Debug, Default)]
pub struct CompilerLogTables {
    pub tables: Vec<IdealCycleTable>,
    /// Autopilot runs are unusable for utilization; parsing stops early.
    pub autopilot: bool,
    /// Parse-time observations (duplicates, obsolete settings).
    pub notes: Vec<Diagnostic>,
}

impl CompilerLogTables {
    /// Parses the full text of one compiler log.
    pub fn parse(text: &str) -> Result<Self, AnalysisError> {
        let mut result = CompilerLogTables::default();
        let mut active: Option<IdealCycleTable> = None;
        let mut pending_phase = PhaseLabel::Unknown;

        for line in text.lines() {
            if AUTOPILOT_PATTERN.is_match(line) {
                result.autopilot = true;
                return Ok(result);
            }
            if CLOCK_SCALING.is_match(line) {
                result.notes.push(Diagnostic::warning(
                    "UTL",
                    "Found obsolete 'Ideal Clock Scaling' setting in logfile. \
                     This setting is ignored. Use '--freq=<soc>:<core>'.",
                ));
                continue;
            }
            if line.contains("DECODING") {
                pending_phase = PhaseLabel::Itl;
                continue;
            }
            if line.contains("PREFILL") {
                pending_phase = PhaseLabel::Ttft;
                continue;
            }
            if START_PATTERN.is_match(line) {
                active = Some(IdealCycleTable::new(pending_phase));
                pending_phase = PhaseLabel::Unknown;
                continue;
            }

            if END_PATTERN.is_match(line) {
                let Some(mut finished) = active.take() else {
                    continue;
                };
                if finished.total_cycles == 0 {
                    finished.total_cycles = finished.cycles.values().sum();
                }
                if result
                    .tables
                    .iter()
                    .any(|t| t.fingerprint.data() == finished.fingerprint.data())
                {
                    return Err(AnalysisError::DuplicateTable(
                        finished.fingerprint.data().to_string(),
                    ));
                }
                result.tables.push(finished);
                continue;
            }

            let Some(table) = active.as_mut() else {
                continue;
            };

            if !DATA_PATTERN.is_match(line) || IGNORE_PATTERN.is_match(line) {
                continue;
            }

            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() != 2 {
                result.notes.push(Diagnostic::warning(
                    "UTL",
                    format!("found data pattern line with unexpected column count: {line:?}"),
                ));
                continue;
            }
            let cycles: u64 = columns[1]
                .parse()
                .map_err(|_| AnalysisError::CompilerLog(format!("bad cycle count in {line:?}")))?;

            let (base_name, category) = split_kernel_category(columns[0]);
            if base_name == "Total" {
                table.total_cycles = cycles;
                continue;
            }
            let kernel = format!("{base_name} Cmpt Exec");
            table.fingerprint.add(&kernel, cycles as f64);

            match table.cycles.get(&kernel).copied() {
                None => {
                    if cycles != 0 {
                        table.cycles.insert(kernel.clone(), cycles);
                    }
                }
                Some(existing) if existing != cycles => {
                    result.notes.push(Diagnostic::warning(
                        "UTL",
                        format!(
                            "Kernel already has an entry with different cycle count: \
                             {kernel} {cycles} {existing}"
                        ),
                    ));
                }
                Some(_) => {} // same kernel, same cycles: consistent
            }

            match table.categories.get(&kernel).cloned() {
                None => {
                    table.categories.insert(kernel, category);
                }
                Some(existing) if existing != category => {
                    result.notes.push(Diagnostic::warning(
                        "UTL",
                        format!(
                            "Kernel category map already has an entry with different \
                             category: {kernel} {category} {existing}"
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(result)
    }
}

/// Splits a table row name into base kernel name and category:
/// `name-opCat-<cat>` carries an explicit category, `name-NA` has none.
fn split_kernel_category(name: &str) -> (&str, String) {
    if let Some(pos) = name.find("-opCat-") {
        let category = &name[pos + "-opCat-".len()..];
        (&name[..pos], category.to_string())
    } else if let Some(base) = name.strip_suffix("-NA") {
        (base, "NotAvailable".to_string())
    } else {
        (name, "NotAvailable".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LOG: &str = "\
some preamble\n\
PREFILL phase statistics\n\
 Ideal/Total Cycles \n\
sen_matmul-opCat-MatMul  5000\n\
sen_add-NA  300\n\
sen_PrecomputeWeights  900\n\
Total  5300\n\
====== Perf Summary End ======\n\
DECODING phase statistics\n\
 Ideal/Total Cycles \n\
sen_decode-opCat-Attention  750\n\
====== Perf Summary End ======\n";

    #[test]
    fn test_two_tables_with_phase_labels() {
        let parsed = CompilerLogTables::parse(SAMPLE_LOG).unwrap();
        assert_eq!(parsed.tables.len(), 2);
        assert!(!parsed.autopilot);

        let first = &parsed.tables[0];
        assert_eq!(first.phase, PhaseLabel::Ttft);
        assert_eq!(first.ideal_cycles("sen_matmul Cmpt Exec"), Some(5000));
        assert_eq!(first.category("sen_matmul Cmpt Exec"), Some("MatMul"));
        assert_eq!(first.ideal_cycles("sen_add Cmpt Exec"), Some(300));
        assert_eq!(first.category("sen_add Cmpt Exec"), Some("NotAvailable"));
        assert_eq!(first.total_cycles, 5300);
        // Precompute rows never enter the table
        assert!(first.ideal_cycles("sen_PrecomputeWeights Cmpt Exec").is_none());

        let second = &parsed.tables[1];
        assert_eq!(second.phase, PhaseLabel::Itl);
        assert_eq!(second.total_cycles, 750);
    }

    #[test]
    fn test_autopilot_terminates_parsing() {
        let log = "DSM-AutoPilot BEGIN\n Ideal/Total Cycles \nsen_x-NA  5\n";
        let parsed = CompilerLogTables::parse(log).unwrap();
        assert!(parsed.autopilot);
        assert!(parsed.tables.is_empty());
    }

    #[test]
    fn test_clock_scaling_is_noted_and_skipped() {
        let log = "Ideal Clock Scaling: 0.5\n";
        let parsed = CompilerLogTables::parse(log).unwrap();
        assert_eq!(parsed.notes.len(), 1);
        assert!(parsed.notes[0].message.contains("--freq"));
    }

    #[test]
    fn test_duplicate_cycle_count_warns() {
        let log = " Ideal/Total Cycles \n\
                   sen_x-NA  10\n\
                   sen_x-NA  20\n\
                   ====== Perf Summary End ======\n";
        let parsed = CompilerLogTables::parse(log).unwrap();
        assert_eq!(parsed.tables[0].ideal_cycles("sen_x Cmpt Exec"), Some(10));
        assert!(parsed
            .notes
            .iter()
            .any(|n| n.message.contains("different cycle count")));
    }

    #[test]
    fn test_duplicate_table_fingerprint_is_rejected() {
        let log = " Ideal/Total Cycles \n\
                   sen_x-NA  10\n\
                   ====== Perf Summary End ======\n\
                   Ideal/Total Cycles \n\
                   sen_x-NA  10\n\
                   ====== Perf Summary End ======\n";
        assert!(matches!(
            CompilerLogTables::parse(log),
            Err(AnalysisError::DuplicateTable(_))
        ));
    }

    #[test]
    fn test_zero_cycle_rows_are_not_inserted() {
        let log = " Ideal/Total Cycles \n\
                   sen_idle-NA  0\n\
                   ====== Perf Summary End ======\n";
        let parsed = CompilerLogTables::parse(log).unwrap();
        assert!(parsed.tables[0].ideal_cycles("sen_idle Cmpt Exec").is_none());
    }
}
