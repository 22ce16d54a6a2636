// /////////////////////////////////////////////////////////////////////////////
// AIU Trace Analyzer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Warning Accumulators
//!
//! Create-once, accumulate-many warning objects. Instead of logging the
//! same complaint thousands of times while streaming events, a stage
//! defines a [`TraceWarning`] with a message template and typed reducers,
//! calls [`TraceWarning::update`] per occurrence, and the rendered summary
//! is emitted exactly once on teardown.
//!
//! ## Template Contract
//!
//! The template uses `{key}` placeholders. The placeholder key set, the
//! data key set, and the reducer key set must agree; the constructor
//! rejects any mismatch. Reducers omitted for a key fall back to the
//! type default: integer addition for counters, max for floats, union
//! for sets.
//!
//! ```
//! use trace_analyzer_domain::value_objects::trace_warning::{
//!     Reducer, TraceWarning, WarnValue,
//! };
//!
//! let mut w = TraceWarning::new(
//!     "util_overflow",
//!     "Encountered {count} events with >100% utilization (worst {max})",
//!     vec![
//!         ("count".into(), WarnValue::Int(0)),
//!         ("max".into(), WarnValue::Float(0.0)),
//!     ],
//!     vec![("count".into(), Reducer::Add), ("max".into(), Reducer::Max)],
//! )
//! .unwrap();
//!
//! w.update(&[("count", WarnValue::Int(1)), ("max", WarnValue::Float(1.2))])
//!     .unwrap();
//! assert!(w.has_warning());
//! ```

use crate::error::AnalysisError;
use crate::pipeline::diagnostic::{Diagnostic, Severity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("placeholder pattern"));

/// A typed warning datum.
#[derive(Debug, Clone, PartialEq)]
pub enum WarnValue {
    Int(i64),
    Float(f64),
    Set(BTreeSet<String>),
}

impl fmt::Display for WarnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarnValue::Int(v) => write!(f, "{v}"),
            WarnValue::Float(v) => write!(f, "{v:.3}"),
            WarnValue::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

/// Reducer applied when a warning datum is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Integer addition (counter semantics).
    Add,
    /// Keep the numeric maximum.
    Max,
    /// Keep the numeric minimum.
    Min,
    /// Keep the value with the largest absolute magnitude (signed drift).
    MaxAbs,
    /// Set union.
    Union,
}

impl Reducer {
    /// Type-driven default: add for ints, max for floats, union for sets.
    fn default_for(value: &WarnValue) -> Reducer {
        match value {
            WarnValue::Int(_) => Reducer::Add,
            WarnValue::Float(_) => Reducer::Max,
            WarnValue::Set(_) => Reducer::Union,
        }
    }

    fn apply(&self, current: &WarnValue, incoming: &WarnValue) -> WarnValue {
        match (self, current, incoming) {
            (Reducer::Add, WarnValue::Int(a), WarnValue::Int(b)) => WarnValue::Int(a + b),
            (Reducer::Add, WarnValue::Float(a), WarnValue::Float(b)) => WarnValue::Float(a + b),
            (Reducer::Max, WarnValue::Int(a), WarnValue::Int(b)) => WarnValue::Int(*a.max(b)),
            (Reducer::Max, WarnValue::Float(a), WarnValue::Float(b)) => WarnValue::Float(a.max(*b)),
            (Reducer::Min, WarnValue::Int(a), WarnValue::Int(b)) => WarnValue::Int(*a.min(b)),
            (Reducer::Min, WarnValue::Float(a), WarnValue::Float(b)) => WarnValue::Float(a.min(*b)),
            (Reducer::MaxAbs, WarnValue::Float(a), WarnValue::Float(b)) => {
                if b.abs() > a.abs() {
                    WarnValue::Float(*b)
                } else {
                    WarnValue::Float(*a)
                }
            }
            (Reducer::Union, WarnValue::Set(a), WarnValue::Set(b)) => {
                let mut merged = a.clone();
                merged.extend(b.iter().cloned());
                WarnValue::Set(merged)
            }
            // Mismatched value kinds keep the current value; the
            // constructor contract makes this unreachable in practice.
            _ => current.clone(),
        }
    }
}

/// Severity class of a warning summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningClass {
    Warning,
    Critical,
}

/// A named, templated, reducer-driven warning accumulator.
#[derive(Debug, Clone)]
pub struct TraceWarning {
    name: String,
    template: String,
    data: BTreeMap<String, WarnValue>,
    reducers: BTreeMap<String, Reducer>,
    class: WarningClass,
    occurred: bool,
}

impl TraceWarning {
    /// Builds a warning, validating that template placeholders, data keys,
    /// and reducer keys agree. Missing reducers get type defaults.
    pub fn new(
        name: &str,
        template: &str,
        data: Vec<(String, WarnValue)>,
        reducers: Vec<(String, Reducer)>,
    ) -> Result<Self, AnalysisError> {
        let invalid = |reason: String| AnalysisError::InvalidWarning {
            name: name.to_string(),
            reason,
        };

        let data: BTreeMap<String, WarnValue> = data.into_iter().collect();
        let mut reducers: BTreeMap<String, Reducer> = reducers.into_iter().collect();

        let template_keys: BTreeSet<String> = PLACEHOLDER
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .collect();

        if template_keys.len() != data.len() {
            return Err(invalid(format!(
                "number of data keys ({}) must match template placeholders ({})",
                data.len(),
                template_keys.len()
            )));
        }
        for key in &template_keys {
            if !data.contains_key(key) {
                return Err(invalid(format!("template key '{key}' not found in data")));
            }
        }
        for key in data.keys() {
            if !template_keys.contains(key) {
                return Err(invalid(format!("data key '{key}' not found in template")));
            }
        }
        for key in reducers.keys() {
            if !data.contains_key(key) {
                return Err(invalid(format!("reducer key '{key}' not found in data")));
            }
        }
        for (key, value) in &data {
            reducers
                .entry(key.clone())
                .or_insert_with(|| Reducer::default_for(value));
        }

        Ok(TraceWarning {
            name: name.to_string(),
            template: template.to_string(),
            data,
            reducers,
            class: WarningClass::Warning,
            occurred: false,
        })
    }

    /// Marks the warning as critical; it renders at ERROR severity.
    pub fn critical(mut self) -> Self {
        self.class = WarningClass::Critical;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> WarningClass {
        self.class
    }

    /// Applies the per-key reducers to the given updates.
    pub fn update(&mut self, updates: &[(&str, WarnValue)]) -> Result<usize, AnalysisError> {
        let mut changed = 0;
        for (key, incoming) in updates {
            let current = self.data.get(*key).ok_or_else(|| AnalysisError::InvalidWarning {
                name: self.name.clone(),
                reason: format!("update key '{key}' does not exist"),
            })?;
            let reduced = self.reducers[*key].apply(current, incoming);
            self.data.insert((*key).to_string(), reduced);
            changed += 1;
        }
        self.occurred |= changed > 0;
        Ok(changed)
    }

    /// Whether any update was recorded.
    pub fn has_warning(&self) -> bool {
        self.occurred
    }

    /// Current value of a datum (test and threshold inspection).
    pub fn value(&self, key: &str) -> Option<&WarnValue> {
        self.data.get(key)
    }

    /// Renders the template against the accumulated data.
    pub fn render(&self) -> String {
        let mut rendered = self.template.clone();
        for (key, value) in &self.data {
            rendered = rendered.replace(&format!("{{{key}}}"), &value.to_string());
        }
        rendered
    }
}

/// Per-stage collection of warnings, keyed by name.
#[derive(Debug, Default)]
pub struct WarningSet {
    warnings: BTreeMap<String, TraceWarning>,
}

impl WarningSet {
    pub fn new() -> Self {
        WarningSet::default()
    }

    /// Registers a warning (last registration under a name wins).
    pub fn add(&mut self, warning: TraceWarning) {
        self.warnings.insert(warning.name().to_string(), warning);
    }

    /// Applies updates to a named warning.
    pub fn issue(&mut self, name: &str, updates: &[(&str, WarnValue)]) -> Result<(), AnalysisError> {
        let warning = self
            .warnings
            .get_mut(name)
            .ok_or_else(|| AnalysisError::InvalidWarning {
                name: name.to_string(),
                reason: "warning was never registered".to_string(),
            })?;
        warning.update(updates)?;
        Ok(())
    }

    /// Bumps a pure counter warning by one.
    pub fn issue_count(&mut self, name: &str) -> Result<(), AnalysisError> {
        self.issue(name, &[("count", WarnValue::Int(1))])
    }

    pub fn get(&self, name: &str) -> Option<&TraceWarning> {
        self.warnings.get(name)
    }

    /// Renders every triggered warning into a diagnostic, once.
    ///
    /// Idempotent: the triggered flag is consumed, so a second call
    /// returns nothing.
    pub fn drain_diagnostics(&mut self, tag: &'static str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for warning in self.warnings.values_mut() {
            if warning.has_warning() {
                let severity = match warning.class() {
                    WarningClass::Warning => Severity::Warning,
                    WarningClass::Critical => Severity::Error,
                };
                diagnostics.push(Diagnostic {
                    severity,
                    tag,
                    message: warning.render(),
                });
                warning.occurred = false;
            }
        }
        diagnostics
    }
}
