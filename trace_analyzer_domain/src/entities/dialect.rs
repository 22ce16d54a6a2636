// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Input Dialects
//!
//! The raw traces come from two runtimes with different naming schemes:
//! `FLEX` (the native runtime) and `TORCH` (the framework bridge). A
//! [`Dialect`] maps abstract category keys (`acc_kernel`,
//! `acc_collective`, ...) to [`Predicate`]s so that every stage can ask
//! *"is this a kernel event?"* without knowing runtime-specific names.
//!
//! ## Predicate Forms
//!
//! | Form | Meaning |
//! |------|---------|
//! | `is.<path>;<regex>` | value at `event.<path>` matches the regex |
//! | `has.<path>` | key present at `event.<path>` |
//! | plain string | name pattern; `$Ident` placeholders match any token |
//! | `-` | category exists but never matches in this dialect |
//!
//! The two built-in tables are process-wide and immutable; callers obtain
//! them through [`dialect`] and thread them (via the job registry) into
//! stage constructors.

use crate::entities::trace_event::TraceEvent;
use crate::error::AnalysisError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies one of the two supported trace dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectKind {
    Flex,
    Torch,
}

impl DialectKind {
    /// Upper-case wire/name form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Flex => "FLEX",
            DialectKind::Torch => "TORCH",
        }
    }
}

/// A compiled dialect predicate.
#[derive(Debug)]
pub enum Predicate {
    /// Value at `path` matches the regex.
    Is { path: Vec<String>, regex: Regex },
    /// Key present at `path`.
    Has { path: Vec<String> },
    /// Event name matches the compiled name pattern.
    Name { regex: Regex },
    /// Category is declared but never matches in this dialect.
    Never,
}

impl Predicate {
    /// Compiles a dialect table entry into a predicate.
    pub fn parse(entry: &str) -> Result<Predicate, AnalysisError> {
        let invalid = |reason: &str| AnalysisError::InvalidPredicate {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        if entry == "-" {
            return Ok(Predicate::Never);
        }
        if let Some(rest) = entry.strip_prefix("is.") {
            let (path, pattern) = rest
                .split_once(';')
                .ok_or_else(|| invalid("'is' form requires '<path>;<regex>'"))?;
            if path.is_empty() || pattern.is_empty() {
                return Err(invalid("empty path or regex"));
            }
            let regex = Regex::new(pattern).map_err(|e| invalid(&e.to_string()))?;
            return Ok(Predicate::Is {
                path: path.split('.').map(str::to_string).collect(),
                regex,
            });
        }
        if let Some(path) = entry.strip_prefix("has.") {
            if path.is_empty() {
                return Err(invalid("'has' form requires a path"));
            }
            return Ok(Predicate::Has {
                path: path.split('.').map(str::to_string).collect(),
            });
        }
        let regex =
            Regex::new(&compile_name_pattern(entry)).map_err(|e| invalid(&e.to_string()))?;
        Ok(Predicate::Name { regex })
    }

    /// Evaluates the predicate against an event.
    pub fn matches(&self, event: &TraceEvent) -> bool {
        match self {
            Predicate::Never => false,
            Predicate::Name { regex } => regex.is_match(&event.name),
            Predicate::Has { path } => {
                let parts: Vec<&str> = path.iter().map(String::as_str).collect();
                event.has_path(&parts)
            }
            Predicate::Is { path, regex } => {
                let parts: Vec<&str> = path.iter().map(String::as_str).collect();
                match event.value_at_path(&parts) {
                    Some(serde_json::Value::String(s)) => regex.is_match(&s),
                    Some(other) => regex.is_match(&other.to_string()),
                    None => false,
                }
            }
        }
    }
}

/// Compiles a plain-name pattern: `$Ident` placeholders become `.+`, all
/// other text is matched literally, and a trailing `$` keeps its anchor
/// meaning (patterns like `Cmpt Prep$` must not match mid-name).
fn compile_name_pattern(pattern: &str) -> String {
    let mut compiled = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            let mut ident = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    ident.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if ident.is_empty() {
                compiled.push('$');
            } else {
                compiled.push_str(".+");
            }
        } else {
            compiled.push_str(&regex::escape(&c.to_string()));
        }
    }
    compiled
}

/// An immutable category-to-predicate table for one dialect.
pub struct Dialect {
    kind: DialectKind,
    entries: HashMap<&'static str, Predicate>,
}

impl Dialect {
    /// The dialect this table belongs to.
    pub fn kind(&self) -> DialectKind {
        self.kind
    }

    /// Predicate lookup; unknown categories yield `None`.
    pub fn get(&self, category: &str) -> Option<&Predicate> {
        self.entries.get(category)
    }

    /// Whether the event satisfies the named category predicate.
    ///
    /// Unknown categories never match - stages probe categories that only
    /// some dialects define.
    pub fn is_category(&self, event: &TraceEvent, category: &str) -> bool {
        self.entries
            .get(category)
            .map(|p| p.matches(event))
            .unwrap_or(false)
    }

    /// Whether the event is an accelerator-side event (the
    /// `acc_event_cat` probe used by TensorBoard refinement).
    pub fn is_accelerator_event(&self, event: &TraceEvent) -> bool {
        self.is_category(event, "acc_event_cat")
    }

    /// The runtime-specific category string for kernel events.
    pub fn kernel_category(&self) -> &'static str {
        "kernel"
    }

    /// The cycle-counter pair framing an event's duration, used by the
    /// frequency inference. `Cmpt Prep` covers TS1..TS2, `Cmpt Exec`
    /// covers TS3..TS5, everything else spans the full sequence.
    pub fn freq_window(&self, name: &str) -> (&'static str, &'static str) {
        if name.contains("Cmpt Exec") {
            ("TS3", "TS5")
        } else if name.contains("Cmpt Prep") {
            ("TS1", "TS2")
        } else {
            ("TS1", "TS5")
        }
    }
}

fn build_dialect(kind: DialectKind, table: &[(&'static str, &'static str)]) -> Dialect {
    let mut entries = HashMap::new();
    for (category, entry) in table {
        let predicate = Predicate::parse(entry)
            .unwrap_or_else(|e| panic!("builtin {} dialect table: {e}", kind.as_str()));
        entries.insert(*category, predicate);
    }
    Dialect { kind, entries }
}

static FLEX_TABLE: &[(&str, &str)] = &[
    ("acc_launch_cb", "-"),
    ("acc_graph_init", "-"),
    ("acc_graph_exec", "Execute Graph"),
    ("acc_malloc", "FixupAllocations"),
    ("acc_resize_tensor_alloc", "AllocateFrame of graph"),
    ("acc_supernode_launch", "Flex Roundtrip"),
    ("acc_supernode_exec", "Flex Roundtrip"),
    ("acc_node_compute", "Compute of $NodeName"),
    ("acc_data_convert", "Compute of $NodeName-HostPrep"),
    ("acc_scheduler_init", "SchedulerConstruct"),
    ("acc_virtaddr_create", "CreatePipoIovas"),
    ("acc_launch_schedule_compute", "ScheduleCompute"),
    ("acc_schedule_wait", "WaitForCompletionAndReturnStatus"),
    ("acc_dma_prep", "PrepareDmas"),
    ("acc_rdma_prep_sync", "PrepareAndSyncRdma"),
    ("acc_cache_clear", "LaunchClearScratchpad"),
    ("acc_cache_preload", "LaunchPreloadScratchpad"),
    ("acc_launch_compute_stream", "LaunchComputeStream"),
    ("acc_barrier", "Barrier:"),
    ("acc_collective", "has.args.CollGroup"),
    ("acc_datatransfer_DtoH", "is.name;DmaO"),
    ("acc_datatransfer_HtoD", "is.name;DmaI"),
    ("acc_clock_calibration", "-"),
    ("acc_compile_graph", "-"),
    ("acc_category_kernel", "kernel"),
    ("acc_category_runtime", "cuda_runtime"),
    ("acc_compute_prep", "Cmpt Prep"),
    ("acc_kernel", "is.name;Cmpt Exec"),
    ("acc_event_cat", "has.args.TS1"),
];

static TORCH_TABLE: &[(&str, &str)] = &[
    ("acc_launch_cb", "aiuLaunchControlBlocks"),
    ("acc_graph_init", "aiuInitGraph"),
    ("acc_graph_exec", "aiuGraphExecution"),
    ("acc_malloc", "aiuMalloc"),
    ("acc_resize_tensor_alloc", "aiuResizeTensorAllocation"),
    ("acc_supernode_launch", "aiuLaunchSuperNode"),
    ("acc_supernode_exec", "aiuSuperNodeExecution"),
    ("acc_node_compute", "aiuNodeCompute"),
    ("acc_data_convert", "aiuDataConvert"),
    ("acc_scheduler_init", "aiuInitScheduler"),
    ("acc_virtaddr_create", "aiuCreateVirtualAddresses"),
    ("acc_launch_schedule_compute", "aiuLaunchScheduleCompute"),
    ("acc_schedule_wait", "aiuScheduleWait"),
    ("acc_dma_prep", "aiuPrepareDMAs"),
    ("acc_rdma_prep_sync", "aiuPrepareAndSyncRDMA"),
    ("acc_cache_clear", "aiuClearCache"),
    ("acc_cache_preload", "aiuPreloadCache"),
    ("acc_launch_compute_stream", "aiuLaunchComputeStream"),
    ("acc_barrier", "is.name;Barrier"),
    ("acc_collective", "has.args.CollGroup"),
    ("acc_datatransfer_DtoH", "aiuDataTransferDtoH"),
    ("acc_datatransfer_HtoD", "aiuDataTransferHtoD"),
    ("acc_clock_calibration", "aiuClockCalibration"),
    ("acc_compile_graph", "aiuCompileGraph"),
    ("acc_category_kernel", "kernel"),
    ("acc_category_runtime", "cuda_runtime"),
    ("acc_compute_prep", "Cmpt Prep$"),
    ("acc_kernel", "is.cat;kernel"),
    ("acc_event_cat", "is.cat;kernel"),
];

static FLEX: Lazy<Dialect> = Lazy::new(|| build_dialect(DialectKind::Flex, FLEX_TABLE));
static TORCH: Lazy<Dialect> = Lazy::new(|| build_dialect(DialectKind::Torch, TORCH_TABLE));

/// Returns the immutable, process-wide table for a dialect.
pub fn dialect(kind: DialectKind) -> &'static Dialect {
    match kind {
        DialectKind::Flex => &FLEX,
        DialectKind::Torch => &TORCH,
    }
}
